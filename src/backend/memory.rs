// src/backend/memory.rs
// In-memory backend over a fixed result set (tests, demos, pre-fetched results)

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{QueryBackend, ResultCursor, Row};
use crate::error::Result;

/// Serves the same result for every query. Tracks how often it was probed and executed.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    columns: Arc<Vec<String>>,
    rows: Arc<Vec<Row>>,
    count_calls: Arc<AtomicUsize>,
    execute_calls: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
            ..Default::default()
        }
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn count_rows(&self, _query: &str) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.len() as u64)
    }

    async fn execute(&self, _query: &str) -> Result<Box<dyn ResultCursor>> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            columns: self.columns.as_ref().clone(),
            rows: self.rows.clone(),
            position: 0,
        }))
    }
}

struct MemoryCursor {
    columns: Vec<String>,
    rows: Arc<Vec<Row>>,
    position: usize,
}

#[async_trait]
impl ResultCursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let end = self.position.saturating_add(max_rows).min(self.rows.len());
        let batch = self.rows[self.position..end].to_vec();
        self.position = end;
        Ok(batch)
    }
}
