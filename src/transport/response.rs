//! Engine REST response types

use serde::{Deserialize, Serialize};

/// Status value of a successful engine response
pub const STATUS_SUCCESS: &str = "succ";

/// Raw response body of the engine's REST endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EngineResponse {
    pub status: String,
    #[serde(default)]
    pub head: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
    /// Column name, type code and length per column (newer engines)
    #[serde(default)]
    pub column_meta: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub code: i64,
    /// Error description, or the token on a successful login
    #[serde(default)]
    pub desc: String,
}

impl EngineResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn into_tabular(self) -> TabularData {
        TabularData {
            head: self.head,
            data: self.data,
        }
    }
}

/// Ordered column names plus ordered rows of untyped scalars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularData {
    pub head: Vec<String>,
    pub data: Vec<Vec<serde_json::Value>>,
}

impl TabularData {
    pub fn new(head: Vec<String>, data: Vec<Vec<serde_json::Value>>) -> Self {
        Self { head, data }
    }

    /// Position of a column by name, ignoring ASCII case
    pub fn column(&self, name: &str) -> Option<usize> {
        self.head.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_body() {
        let body = r#"{
            "status": "succ",
            "head": ["ts", "temp"],
            "column_meta": [["ts", 9, 8], ["temp", 6, 4]],
            "data": [["2024-01-15 10:00:00.000", 21.5]],
            "rows": 1
        }"#;
        let resp: EngineResponse = serde_json::from_str(body).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.rows, 1);

        let table = resp.into_tabular();
        assert_eq!(table.column("temp"), Some(1));
        assert_eq!(table.column("TEMP"), Some(1));
        assert_eq!(table.column("Ts"), Some(0));
        assert_eq!(table.column("humidity"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_decode_error_body() {
        let body = r#"{"status":"error","code":866,"desc":"Table does not exist"}"#;
        let resp: EngineResponse = serde_json::from_str(body).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.code, 866);
        assert_eq!(resp.desc, "Table does not exist");
        assert!(resp.into_tabular().is_empty());
    }
}
