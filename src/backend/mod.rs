// src/backend/mod.rs
// Query backend seam: column metadata plus row batches, never rewound

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;

use crate::error::Result;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Canonical timestamp layout for every artifact format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single scalar cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form; `None` for null.
    pub fn to_canonical(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(f.to_string())),
            other => other.to_canonical().map(Json::String).unwrap_or(Json::Null),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_canonical() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

/// Live result of a query. Yields column names once and row batches until exhausted.
#[async_trait]
pub trait ResultCursor: Send {
    fn columns(&self) -> &[String];

    /// Next batch of at most `max_rows` rows. An empty batch means the cursor is exhausted.
    async fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Row>>;
}

/// The query execution collaborator.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Number of rows the query would return, without transferring them.
    async fn count_rows(&self, query: &str) -> Result<u64>;

    /// Run the query and hand back a live cursor.
    async fn execute(&self, query: &str) -> Result<Box<dyn ResultCursor>>;
}

/// Wrap a query as a count-only subquery.
pub fn count_query(query: &str) -> String {
    let inner = query.trim().trim_end_matches(';').trim_end();
    format!("SELECT COUNT(*) FROM ({}) AS _query_output_count", inner)
}
