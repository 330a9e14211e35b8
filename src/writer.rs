// src/writer.rs
// Chunked CSV / JSON serialization of a result cursor

use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{ResultCursor, Row};
use crate::config::OutputFormat;
use crate::error::{OutputError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Counts for a finished artifact. `bytes` is read back from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub rows: u64,
    pub columns: usize,
    pub bytes: u64,
}

/// Writes a cursor to disk one batch at a time.
///
/// Only the current batch and its encoded bytes are held in memory. On any
/// failure the partially written file is left in place for inspection.
pub struct StreamingWriter {
    chunk_size: usize,
    cancel: CancellationToken,
}

impl StreamingWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn write(
        &self,
        cursor: &mut dyn ResultCursor,
        path: &Path,
        format: OutputFormat,
    ) -> Result<WriteStats> {
        if self.cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }

        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| write_error(path, e))?;
        let mut out = BufWriter::new(file);

        let columns = cursor.columns().to_vec();
        let mut encoder = Encoder::new(format, columns.clone());
        let mut buf = Vec::new();
        let mut rows: u64 = 0;

        encoder.header(&mut buf).map_err(|e| write_error(path, e))?;
        self.flush_chunk(&mut out, &mut buf, path).await?;

        loop {
            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(OutputError::Cancelled),
                batch = cursor.fetch_batch(self.chunk_size) => batch?,
            };
            if batch.is_empty() {
                break;
            }

            encoder.rows(&batch, &mut buf).map_err(|e| write_error(path, e))?;
            self.flush_chunk(&mut out, &mut buf, path).await?;
            rows += batch.len() as u64;
            debug!(rows, path = %path.display(), "Chunk written");
        }

        encoder.footer(&mut buf);
        self.flush_chunk(&mut out, &mut buf, path).await?;
        out.shutdown().await.map_err(|e| write_error(path, e))?;
        drop(out);

        let bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| write_error(path, e))?
            .len();

        info!(rows, columns = columns.len(), bytes, format = %format, path = %path.display(), "Result written to file");
        Ok(WriteStats {
            rows,
            columns: columns.len(),
            bytes,
        })
    }

    async fn flush_chunk(
        &self,
        out: &mut BufWriter<tokio::fs::File>,
        buf: &mut Vec<u8>,
        path: &Path,
    ) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }
        out.write_all(buf).await.map_err(|e| write_error(path, e))?;
        buf.clear();
        Ok(())
    }
}

fn write_error(path: &Path, source: std::io::Error) -> OutputError {
    OutputError::Write {
        path: PathBuf::from(path),
        source,
    }
}

enum Encoder {
    Csv { columns: Vec<String> },
    Json { columns: Vec<String>, first: bool },
}

impl Encoder {
    fn new(format: OutputFormat, columns: Vec<String>) -> Self {
        match format {
            OutputFormat::Csv => Encoder::Csv { columns },
            OutputFormat::Json => Encoder::Json {
                columns,
                first: true,
            },
        }
    }

    fn header(&mut self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            Encoder::Csv { columns } => {
                let mut writer = csv_writer(buf);
                writer.write_record(columns.iter())?;
                writer.flush()
            }
            Encoder::Json { .. } => {
                buf.push(b'[');
                Ok(())
            }
        }
    }

    fn rows(&mut self, batch: &[Row], buf: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            Encoder::Csv { .. } => {
                let mut writer = csv_writer(buf);
                for row in batch {
                    writer.write_record(
                        row.iter().map(|v| v.to_canonical().unwrap_or_default()),
                    )?;
                }
                writer.flush()
            }
            Encoder::Json { columns, first } => {
                for row in batch {
                    let object: serde_json::Map<String, serde_json::Value> = columns
                        .iter()
                        .zip(row.iter())
                        .map(|(col, value)| (col.clone(), value.to_json()))
                        .collect();
                    let separator: &[u8] = if *first { b"\n  " } else { b",\n  " };
                    buf.extend_from_slice(separator);
                    serde_json::to_writer(&mut *buf, &object)?;
                    *first = false;
                }
                Ok(())
            }
        }
    }

    fn footer(&mut self, buf: &mut Vec<u8>) {
        if let Encoder::Json { first, .. } = self {
            let close: &[u8] = if *first { b"]\n" } else { b"\n]\n" };
            buf.extend_from_slice(close);
        }
    }
}

/// Minimal quoting: only fields containing the delimiter, quote or a line break.
fn csv_writer(buf: &mut Vec<u8>) -> csv::Writer<&mut Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .has_headers(false)
        .from_writer(buf)
}
