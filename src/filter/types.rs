use serde_json::Value;

/// Storage type of a filterable column; bound parameters are cast to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Float,
    Timestamp,
    Bool,
}

impl ColumnKind {
    pub fn cast(&self) -> &'static str {
        match self {
            ColumnKind::Uuid => "uuid",
            ColumnKind::Text => "text",
            ColumnKind::Float => "float8",
            ColumnKind::Timestamp => "timestamptz",
            ColumnKind::Bool => "bool",
        }
    }
}

/// A column a client may filter or sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn uuid(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Uuid }
    }

    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text }
    }

    pub const fn float(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Float }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Timestamp }
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Bool }
    }
}

pub fn lookup_column<'a>(columns: &'a [Column], name: &str) -> Option<&'a Column> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Filter/order/page envelope shared by every Find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub where_clause: Option<String>,
    pub args: Vec<Value>,
    pub order: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub include_archived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: &'static str,
    pub sort: SortDirection,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
