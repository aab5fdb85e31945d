// src/query/client.rs

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use thiserror::Error;

/// A single typed cell value returned by the query service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Render this value as a literal suitable for substitution into query
    /// text (strings are single-quoted with embedded quotes doubled).
    pub fn as_literal(&self) -> String {
        match self {
            CellValue::Null => "null".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// The raw text of the value, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("null"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }
}

/// Typed rows/columns returned from a successful query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Errors surfaced by the query service.
///
/// Timeouts are distinguishable from other failures so callers can reword
/// them for humans.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("query execution timed out after running for {elapsed_secs:.2}s")]
    Timeout { elapsed_secs: f64 },

    #[error("query failed: {0}")]
    Execute(String),
}

/// Trait abstracting the backing query engine.
///
/// Implementations must be safe for concurrent invocation by multiple
/// callers; the engine shares one client handle across the whole tree.
pub trait QueryClient: Send + Sync {
    /// Execute a fully resolved statement and return its rows, or an error.
    fn execute_sync<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<QueryResult, QueryError>> + Send + 'a>>;
}
