//! Named-column access to query results.
//!
//! Results are requested in ClickHouse's `JSONCompactStrings` format: a `meta`
//! array describing the columns and a `data` array of rows where every value is
//! either a string or `null`.

use std::collections::HashMap;

use serde::Deserialize;

use super::errors::{ExecutorError, RowError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<String, Option<String>>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: Option<String>) {
        self.values.insert(column.to_string(), value);
    }

    /// Raw access. A column that was not selected is a caller bug and is
    /// reported as such rather than read as NULL.
    pub fn get(&self, column: &str) -> Result<Option<&str>, RowError> {
        self.values
            .get(column)
            .map(|v| v.as_deref())
            .ok_or_else(|| RowError::MissingColumn {
                column: column.to_string(),
            })
    }

    pub fn get_string(&self, column: &str) -> Result<String, RowError> {
        self.get(column)?
            .map(str::to_string)
            .ok_or_else(|| RowError::UnexpectedNull {
                column: column.to_string(),
            })
    }

    /// NULL is `None`; an empty string stays `Some("")`.
    pub fn get_nullable_string(&self, column: &str) -> Result<Option<String>, RowError> {
        Ok(self.get(column)?.map(str::to_string))
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, RowError> {
        let value = self.get_string(column)?;
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(RowError::InvalidValue {
                column: column.to_string(),
                value,
                expected: "boolean",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JsonCompactStrings {
    meta: Vec<ColumnMeta>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Decodes a `JSONCompactStrings` response body into rows.
pub fn rows_from_json_compact_strings(body: &str) -> Result<Vec<Row>, ExecutorError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed: JsonCompactStrings = serde_json::from_str(body)?;

    parsed
        .data
        .into_iter()
        .map(|values| {
            if values.len() != parsed.meta.len() {
                return Err(ExecutorError::Decode(format!(
                    "row has {} values but {} columns were described",
                    values.len(),
                    parsed.meta.len()
                )));
            }

            let mut row = Row::new();
            for (meta, value) in parsed.meta.iter().zip(values) {
                row.set(&meta.name, value);
            }
            Ok(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::row;

    #[test]
    fn test_get_missing_column() {
        let r = row(&[("name", Some("alice"))]);
        assert_eq!(
            r.get("id"),
            Err(RowError::MissingColumn {
                column: "id".to_string()
            })
        );
    }

    #[test]
    fn test_get_string_rejects_null() {
        let r = row(&[("comment", None)]);
        assert_eq!(
            r.get_string("comment"),
            Err(RowError::UnexpectedNull {
                column: "comment".to_string()
            })
        );
    }

    #[test]
    fn test_nullable_string_keeps_empty_distinct_from_null() {
        let r = row(&[("a", None), ("b", Some(""))]);
        assert_eq!(r.get_nullable_string("a").unwrap(), None);
        assert_eq!(r.get_nullable_string("b").unwrap(), Some(String::new()));
    }

    #[test]
    fn test_get_bool() {
        let r = row(&[
            ("one", Some("1")),
            ("zero", Some("0")),
            ("t", Some("TRUE")),
            ("f", Some("false")),
            ("bad", Some("yes")),
        ]);
        assert!(r.get_bool("one").unwrap());
        assert!(!r.get_bool("zero").unwrap());
        assert!(r.get_bool("t").unwrap());
        assert!(!r.get_bool("f").unwrap());
        assert!(matches!(
            r.get_bool("bad"),
            Err(RowError::InvalidValue { expected: "boolean", .. })
        ));
    }

    #[test]
    fn test_decode_json_compact_strings() {
        let body = r#"{
            "meta": [{"name": "name", "type": "String"}, {"name": "comment", "type": "Nullable(String)"}],
            "data": [["analytics", null], ["logs", ""]],
            "rows": 2
        }"#;
        let rows = rows_from_json_compact_strings(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_string("name").unwrap(), "analytics");
        assert_eq!(rows[0].get_nullable_string("comment").unwrap(), None);
        assert_eq!(
            rows[1].get_nullable_string("comment").unwrap(),
            Some(String::new())
        );
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(rows_from_json_compact_strings("").unwrap().is_empty());
        assert!(rows_from_json_compact_strings(r#"{"meta": [], "data": []}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_decode_rejects_mismatched_row() {
        let body = r#"{"meta": [{"name": "a", "type": "String"}], "data": [["x", "y"]]}"#;
        assert!(matches!(
            rows_from_json_compact_strings(body),
            Err(ExecutorError::Decode(_))
        ));
    }
}
