//! The single-row counter table every probe writes to.

pub const DEFAULT_TABLE: &str = "t";
pub const DEFAULT_COLUMN: &str = "n";

/// Table holding one integer counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTable {
    name: String,
    column: String,
}

impl CounterTable {
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Drop, recreate and seed the table with a zero counter, as one batch.
    pub fn reset_sql(&self) -> String {
        let table = quote_identifier(&self.name);
        let column = quote_identifier(&self.column);
        format!(
            "drop table if exists {table};\n\
             create table {table}({column} int not null);\n\
             insert into {table}({column}) values(0);"
        )
    }

    pub fn increment_sql(&self) -> String {
        let column = quote_identifier(&self.column);
        format!(
            "update {} set {column}={column}+1",
            quote_identifier(&self.name)
        )
    }

    pub fn select_sql(&self) -> String {
        format!(
            "select {} from {}",
            quote_identifier(&self.column),
            quote_identifier(&self.name)
        )
    }
}

impl Default for CounterTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE, DEFAULT_COLUMN)
    }
}

pub(crate) fn quote_identifier(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_statements() {
        let table = CounterTable::default();
        assert_eq!(
            table.reset_sql(),
            "drop table if exists \"t\";\n\
             create table \"t\"(\"n\" int not null);\n\
             insert into \"t\"(\"n\") values(0);"
        );
        assert_eq!(table.increment_sql(), "update \"t\" set \"n\"=\"n\"+1");
        assert_eq!(table.select_sql(), "select \"n\" from \"t\"");
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let table = CounterTable::new("odd\"name", "n");
        assert!(table.select_sql().ends_with("from \"odd\"\"name\""));
    }
}
