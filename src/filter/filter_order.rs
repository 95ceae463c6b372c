use super::error::FilterError;
use super::types::{lookup_column, Column, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse clauses like `"created_at desc"` or `"amount asc, narration"`.
    /// Every column must be in `columns`.
    pub fn validate_and_parse(entries: &[String], columns: &[Column]) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for entry in entries {
            // split on commas, then each token into column and direction
            for part in entry.split(',') {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let mut it = trimmed.split_whitespace();
                let name = it.next().unwrap_or_default();
                let column = lookup_column(columns, name)
                    .ok_or_else(|| FilterError::InvalidOrder(format!("cannot sort by '{}'", name)))?;
                let sort = match it.next() {
                    None => SortDirection::Asc,
                    Some(dir) if dir.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                    Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    Some(dir) => return Err(FilterError::InvalidOrder(format!("unknown direction '{}'", dir))),
                };
                if let Some(extra) = it.next() {
                    return Err(FilterError::InvalidOrder(format!("unexpected '{}' in '{}'", extra, trimmed)));
                }
                out.push(FilterOrderInfo { column: column.name, sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}
