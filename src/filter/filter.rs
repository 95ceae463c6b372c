use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{lookup_column, Column, FilterOrderInfo, FindRequest, SqlResult};
use crate::config::FilterConfig;

/// Builds the SELECT and COUNT statements for one Find call.
pub struct Filter<'a> {
    table_name: &'static str,
    columns: &'a [Column],
    conditions: Vec<String>,
    params: Vec<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
    include_archived: bool,
}

impl<'a> Filter<'a> {
    pub fn new(table_name: &'static str, columns: &'a [Column]) -> Self {
        Self {
            table_name,
            columns,
            conditions: vec![],
            params: vec![],
            order_data: vec![],
            limit: None,
            offset: None,
            include_archived: false,
        }
    }

    pub fn assign(&mut self, data: &FindRequest, config: &FilterConfig) -> Result<&mut Self, FilterError> {
        if let Some(expression) = data.where_clause.as_deref().filter(|w| !w.trim().is_empty()) {
            self.where_clause(expression, &data.args)?;
        } else if !data.args.is_empty() {
            return Err(FilterError::ArgumentMismatch("arguments supplied without a where clause".to_string()));
        }
        self.order(&data.order)?;
        self.limit(data.limit, data.offset, config)?;
        self.include_archived = data.include_archived;
        Ok(self)
    }

    pub fn where_clause(&mut self, expression: &str, args: &[Value]) -> Result<&mut Self, FilterError> {
        let (sql, params) = FilterWhere::compile(expression, args, self.columns, self.params.len())?;
        self.conditions.push(format!("({})", sql));
        self.params.extend(params);
        Ok(self)
    }

    /// Adds `column = value` with the value bound as a parameter.
    pub fn and_equals(&mut self, column: &str, value: Value) -> Result<&mut Self, FilterError> {
        let column = self.column(column)?;
        self.params.push(value);
        self.conditions
            .push(format!("\"{}\" = ${}::{}", column.name, self.params.len(), column.kind.cast()));
        Ok(self)
    }

    /// Adds `(a ILIKE %term% OR b ILIKE %term% ...)`.
    pub fn and_search(&mut self, columns: &[&str], term: &str) -> Result<&mut Self, FilterError> {
        if term.trim().is_empty() || columns.is_empty() {
            return Ok(self);
        }
        let mut names = Vec::with_capacity(columns.len());
        for name in columns {
            names.push(self.column(name)?.name);
        }
        self.params.push(Value::String(format!("%{}%", term.trim())));
        let index = self.params.len();
        let parts: Vec<String> = names.iter().map(|n| format!("\"{}\"::text ILIKE ${}::text", n, index)).collect();
        self.conditions.push(format!("({})", parts.join(" OR ")));
        Ok(self)
    }

    pub fn order(&mut self, specs: &[String]) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(specs, self.columns)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: Option<i64>, offset: Option<i64>, config: &FilterConfig) -> Result<&mut Self, FilterError> {
        let limit = limit.unwrap_or(config.default_limit);
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        if let Some(off) = offset {
            if off < 0 {
                return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
            }
        }

        // Apply max limit from config
        let max_limit = config.max_limit.unwrap_or(i64::MAX);
        let applied_limit = if limit > max_limit {
            if config.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            }
            max_limit
        } else {
            limit
        };

        self.limit = Some(applied_limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn include_archived(&mut self, include: bool) -> &mut Self {
        self.include_archived = include;
        self
    }

    pub fn to_sql(&self) -> SqlResult {
        let query = [
            "SELECT *".to_string(),
            format!("FROM \"{}\"", self.table_name),
            self.build_where_clause(),
            FilterOrder::generate(&self.order_data),
            self.build_limit_clause(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        SqlResult { query, params: self.params.clone() }
    }

    /// Same predicate as `to_sql`, without ordering or paging.
    pub fn to_count_sql(&self) -> SqlResult {
        let where_clause = self.build_where_clause();
        let query = if where_clause.is_empty() {
            format!("SELECT COUNT(*) AS count FROM \"{}\"", self.table_name)
        } else {
            format!("SELECT COUNT(*) AS count FROM \"{}\" {}", self.table_name, where_clause)
        };
        SqlResult { query, params: self.params.clone() }
    }

    fn column(&self, name: &str) -> Result<Column, FilterError> {
        lookup_column(self.columns, name)
            .copied()
            .ok_or_else(|| FilterError::InvalidColumn(format!("unknown column '{}'", name)))
    }

    fn build_where_clause(&self) -> String {
        let mut conditions = self.conditions.clone();
        if !self.include_archived {
            conditions.push("\"archived_at\" IS NULL".to_string());
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::uuid("id"),
        Column::float("amount"),
        Column::uuid("sales_rep_id"),
        Column::text("narration"),
        Column::timestamp("created_at"),
    ];

    fn config() -> FilterConfig {
        AppConfig::production().filter
    }

    #[test]
    fn default_find_excludes_archived_and_applies_default_limit() {
        let mut filter = Filter::new("deposits", COLUMNS);
        filter.assign(&FindRequest::default(), &config()).unwrap();
        let sql = filter.to_sql();
        assert_eq!(sql.query, "SELECT * FROM \"deposits\" WHERE \"archived_at\" IS NULL LIMIT 20");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn include_archived_drops_the_predicate() {
        let request = FindRequest { include_archived: true, ..Default::default() };
        let mut filter = Filter::new("deposits", COLUMNS);
        filter.assign(&request, &config()).unwrap();
        assert!(!filter.to_sql().query.contains("archived_at"));
    }

    #[test]
    fn combines_where_order_and_paging() {
        let request = FindRequest {
            where_clause: Some("amount > ?".to_string()),
            args: vec![json!(1000)],
            order: vec!["created_at desc".to_string()],
            limit: Some(10),
            offset: Some(0),
            include_archived: false,
        };
        let mut filter = Filter::new("deposits", COLUMNS);
        filter.assign(&request, &config()).unwrap();
        filter.and_equals("sales_rep_id", json!("5f1c5c9e-0000-4000-8000-000000000000")).unwrap();

        let sql = filter.to_sql();
        assert_eq!(
            sql.query,
            "SELECT * FROM \"deposits\" WHERE (\"amount\" > $1::float8) AND \"sales_rep_id\" = $2::uuid AND \"archived_at\" IS NULL ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 0"
        );
        assert_eq!(sql.params.len(), 2);

        let count = filter.to_count_sql();
        assert_eq!(
            count.query,
            "SELECT COUNT(*) AS count FROM \"deposits\" WHERE (\"amount\" > $1::float8) AND \"sales_rep_id\" = $2::uuid AND \"archived_at\" IS NULL"
        );
    }

    #[test]
    fn caps_limit_and_rejects_negative_paging() {
        let mut filter = Filter::new("deposits", COLUMNS);
        filter.limit(Some(10_000), None, &config()).unwrap();
        assert!(filter.to_sql().query.ends_with("LIMIT 100"));

        assert!(matches!(filter.limit(Some(-1), None, &config()), Err(FilterError::InvalidLimit(_))));
        assert!(matches!(filter.limit(None, Some(-5), &config()), Err(FilterError::InvalidOffset(_))));
    }

    #[test]
    fn search_reuses_one_parameter() {
        let mut filter = Filter::new("deposits", COLUMNS);
        filter.and_search(&["narration", "amount"], "cash").unwrap();
        let sql = filter.to_sql();
        assert!(sql
            .query
            .contains("(\"narration\"::text ILIKE $1::text OR \"amount\"::text ILIKE $1::text)"));
        assert_eq!(sql.params, vec![json!("%cash%")]);
    }

    #[test]
    fn args_without_where_are_rejected() {
        let request = FindRequest { args: vec![json!(1)], ..Default::default() };
        let mut filter = Filter::new("deposits", COLUMNS);
        assert!(filter.assign(&request, &config()).is_err());
    }
}
