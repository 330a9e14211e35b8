// src/backend/sqlite.rs
// SQLite query backend on sqlx

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row as _, Statement, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{QueryBackend, ResultCursor, Row, Value, count_query};
use crate::error::{OutputError, Result};

/// Rows buffered between the fetch task and the consumer
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqlitePoolOptions::new();
        // Each connection to an in-memory URL opens its own empty database
        let options = if is_memory_url(url) {
            options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options.max_connections(5)
        };
        let pool = options.connect(url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    async fn count_rows(&self, query: &str) -> Result<u64> {
        let sql = count_query(query);
        debug!(sql = %sql, "Issuing row-count probe");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn execute(&self, query: &str) -> Result<Box<dyn ResultCursor>> {
        let statement = (&self.pool).prepare(query).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let sql = query.to_string();

        tokio::spawn(async move {
            let mut stream = sqlx::query(&sql).fetch(&pool);
            while let Some(item) = stream.next().await {
                let message = item.map_err(OutputError::from).map(|row| decode_row(&row));
                let failed = message.is_err();
                // Receiver gone means the consumer stopped early
                if tx.send(message).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Box::new(SqliteCursor {
            columns,
            rx,
            done: false,
        }))
    }
}

struct SqliteCursor {
    columns: Vec<String>,
    rx: mpsc::Receiver<Result<Row>>,
    done: bool,
}

#[async_trait]
impl ResultCursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let mut batch = Vec::with_capacity(max_rows.min(CHANNEL_CAPACITY));
        while !self.done && batch.len() < max_rows {
            match self.rx.recv().await {
                Some(Ok(row)) => batch.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => self.done = true,
            }
        }
        Ok(batch)
    }
}

fn decode_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(column = index, error = %e, "Failed to read column, emitting null");
            return Value::Null;
        }
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_uppercase();
    let declared = row.columns()[index].type_info().name().to_uppercase();

    let decoded = match storage.as_str() {
        "INTEGER" if declared == "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(Value::Bool),
        "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(Value::Int),
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes),
        _ if matches!(declared.as_str(), "DATETIME" | "TIMESTAMP") => row
            .try_get_unchecked::<chrono::NaiveDateTime, _>(index)
            .map(Value::Timestamp)
            .or_else(|_| row.try_get_unchecked::<String, _>(index).map(Value::Text)),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::Text),
    };

    decoded.unwrap_or_else(|e| {
        warn!(column = index, error = %e, "Failed to decode value, emitting null");
        Value::Null
    })
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}
