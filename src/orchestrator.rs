// src/orchestrator.rs
// Request pipeline: validate, name, decide, then render inline or stream to file

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::QueryBackend;
use crate::config::{OutputConfig, OutputFormat, OutputMode};
use crate::decision::{DecisionEngine, DecisionReasoning, TokenEstimate};
use crate::error::{OutputError, Result};
use crate::filename;
use crate::paths::PathResolver;
use crate::render::render_table;
use crate::validation;
use crate::writer::StreamingWriter;

/// Per-call parameters. Everything but the query falls back to configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputRequest {
    pub query: String,
    pub mode: Option<String>,
    pub format: Option<String>,
    pub location: Option<String>,
    pub filename: Option<String>,
    pub chunk_size: Option<usize>,
}

impl OutputRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// Metadata of a written artifact
#[derive(Debug, Clone, Serialize)]
pub struct FileArtifact {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub rows: u64,
    pub columns: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "output", rename_all = "lowercase")]
pub enum Outcome {
    Screen {
        columns: Vec<String>,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
        truncated: bool,
        rendered: String,
        decision: DecisionReasoning,
    },
    File {
        artifact: FileArtifact,
        decision: DecisionReasoning,
    },
}

impl Outcome {
    pub fn decision(&self) -> &DecisionReasoning {
        match self {
            Outcome::Screen { decision, .. } | Outcome::File { decision, .. } => decision,
        }
    }

    pub fn artifact(&self) -> Option<&FileArtifact> {
        match self {
            Outcome::File { artifact, .. } => Some(artifact),
            Outcome::Screen { .. } => None,
        }
    }

    /// Caller-facing summary, suitable for a tool response
    pub fn summary(&self) -> String {
        match self {
            Outcome::Screen {
                rendered, decision, ..
            } => format!("{}\n\n{}", rendered, decision.reason),
            Outcome::File { artifact, decision } => format!(
                "Wrote {} rows x {} columns ({} bytes) as {} to {}\n{}",
                artifact.rows,
                artifact.columns,
                artifact.bytes,
                artifact.format,
                artifact.path.display(),
                decision.reason
            ),
        }
    }
}

/// Parameters after precedence resolution and validation
#[derive(Debug)]
struct Params {
    mode: OutputMode,
    format: OutputFormat,
    location: String,
    filename: String,
    chunk_size: usize,
}

pub struct OutputOrchestrator {
    config: Arc<OutputConfig>,
    engine: DecisionEngine,
    resolver: PathResolver,
}

impl OutputOrchestrator {
    pub fn new(config: Arc<OutputConfig>) -> Self {
        Self {
            engine: DecisionEngine::new(config.clone()),
            resolver: PathResolver::new(config.clone()),
            config,
        }
    }

    pub fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        request: OutputRequest,
        backend: &dyn QueryBackend,
    ) -> Result<Outcome> {
        self.execute_with_cancel(request, backend, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        request: OutputRequest,
        backend: &dyn QueryBackend,
        cancel: CancellationToken,
    ) -> Result<Outcome> {
        let params = self.prepare(&request)?;
        debug!(?params, "Output request validated");

        let decision = self
            .engine
            .decide(&request.query, backend, params.mode)
            .await?;
        if cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }

        if !decision.use_file {
            return self.inline(&request.query, backend, decision).await;
        }

        let path = self
            .resolver
            .resolve(Some(params.location.as_str()), &params.filename)
            .await?;
        let mut cursor = backend.execute(&request.query).await?;
        let stats = StreamingWriter::new(params.chunk_size)
            .with_cancellation(cancel)
            .write(cursor.as_mut(), &path, params.format)
            .await?;

        Ok(Outcome::File {
            artifact: FileArtifact {
                path,
                format: params.format,
                rows: stats.rows,
                columns: stats.columns,
                bytes: stats.bytes,
            },
            decision,
        })
    }

    /// Advisory size estimate using the configured sample size.
    pub async fn estimate(&self, query: &str, backend: &dyn QueryBackend) -> Result<TokenEstimate> {
        validation::validate_query(query)?;
        self.engine
            .estimate(query, backend, self.config.sample_size)
            .await
    }

    /// Apply precedence (explicit parameter, then configuration) and validate.
    fn prepare(&self, request: &OutputRequest) -> Result<Params> {
        validation::validate_query(&request.query)?;

        let mode = match &request.mode {
            Some(m) => m.parse::<OutputMode>()?,
            None => self.config.default_mode,
        };
        let format = match &request.format {
            Some(f) => f.parse::<OutputFormat>()?,
            None => self.config.default_format,
        };
        let location = request
            .location
            .clone()
            .unwrap_or_else(|| self.config.default_output_dir.clone());
        validation::validate_location(&location)?;

        let chunk_size = request.chunk_size.unwrap_or(self.config.chunk_size);
        validation::validate_chunk_size(chunk_size)?;

        let filename = match &request.filename {
            Some(name) => {
                validation::validate_filename(name)?;
                filename::with_extension(name, format)
            }
            None => filename::generate(
                &self.config.filename_pattern,
                &request.query,
                format,
                Local::now(),
            ),
        };
        // Generated names come from a configurable pattern and get the same scrutiny
        validation::validate_filename(&filename)?;

        Ok(Params {
            mode,
            format,
            location,
            filename,
            chunk_size,
        })
    }

    async fn inline(
        &self,
        query: &str,
        backend: &dyn QueryBackend,
        decision: DecisionReasoning,
    ) -> Result<Outcome> {
        let cap = self.config.inline_row_cap;
        let mut cursor = backend.execute(query).await?;
        let columns = cursor.columns().to_vec();
        // One extra row tells us whether the result was cut
        let mut rows = cursor.fetch_batch(cap.saturating_add(1)).await?;
        drop(cursor);

        let truncated = rows.len() > cap;
        rows.truncate(cap);
        info!(rows = rows.len(), truncated, "Returning result inline");

        let rendered = render_table(&columns, &rows, truncated);
        let json_rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect()
            })
            .collect();

        Ok(Outcome::Screen {
            columns,
            rows: json_rows,
            truncated,
            rendered,
            decision,
        })
    }
}
