//! Raw input rows

use serde::Serialize;

/// One line of the input table, before any validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRow {
    /// Line number in the source file (the header is line 1)
    pub row_number: usize,
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(row_number: usize, fields: Vec<(String, String)>) -> Self {
        Self { row_number, fields }
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<'a>(row_number: usize, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::new(row_number, fields)
    }

    /// Value of a column, `None` if the column is absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of a column with blanks treated as absent
    pub fn non_blank(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_non_blank() {
        let row = RawRow::from_pairs(2, [("account_id", "10"), ("cogs", "  ")]);
        assert_eq!(row.get("account_id"), Some("10"));
        assert_eq!(row.get("cogs"), Some("  "));
        assert_eq!(row.non_blank("cogs"), None);
        assert_eq!(row.get("rate"), None);
    }
}
