//! Column metadata returned by schema introspection.

/// One column of a table as reported by [`RowStore::schema`].
///
/// [`RowStore::schema`]: crate::RowStore::schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Database type as declared (e.g. `VARCHAR(40)`, `TEXT`, `INTEGER`)
    pub db_type: String,
    /// Maximum number of characters for sized text columns
    pub char_limit: Option<usize>,
}

impl ColumnSchema {
    /// Build column metadata from a declared SQL type, deriving the
    /// character limit for sized text types.
    pub fn from_declared(name: impl Into<String>, declared: &str) -> Self {
        let parsed = ParsedSqlType::parse(declared);
        let char_limit = if parsed.is_text() { parsed.length } else { None };
        Self {
            name: name.into(),
            db_type: parsed.base_type,
            char_limit,
        }
    }

    /// Is this a text column?
    pub fn is_text(&self) -> bool {
        ParsedSqlType::parse(&self.db_type).is_text()
    }
}

/// A declared SQL type split into its name and optional size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSqlType {
    /// Upper-cased type name, e.g. `VARCHAR`
    pub base_type: String,
    /// The single size argument, e.g. 255 for `VARCHAR(255)`. Types with
    /// several arguments such as `DECIMAL(10,2)` have none.
    pub length: Option<usize>,
}

impl ParsedSqlType {
    pub fn parse(type_str: &str) -> Self {
        let type_str = type_str.trim().to_uppercase();
        let Some((base, args)) = type_str.split_once('(') else {
            return Self {
                base_type: type_str,
                length: None,
            };
        };
        let args = args.trim_end_matches(')');
        let length = if args.contains(',') {
            None
        } else {
            args.trim().parse().ok()
        };
        Self {
            base_type: base.trim().to_string(),
            length,
        }
    }

    /// Check if this is a text/string type.
    pub fn is_text(&self) -> bool {
        matches!(
            self.base_type.as_str(),
            "VARCHAR" | "CHAR" | "TEXT" | "CLOB" | "NVARCHAR" | "NCHAR" | "NTEXT" | "JSON"
        )
    }
}
