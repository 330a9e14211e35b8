// src/decision.rs
// Inline-vs-file decision (row-count heuristic) and the advisory token estimate

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{QueryBackend, Row};
use crate::config::{OutputConfig, OutputMode};
use crate::error::Result;

/// Average characters per token for plain text
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Discount for delimiter-heavy tabular text, which tokenizes more densely
pub const STRUCTURE_FACTOR: f64 = 0.85;

/// Hard cap on sampled rows regardless of requested sample size
pub const MAX_SAMPLE_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Map a coefficient of variation to a confidence level.
    pub fn from_variation(cv: f64) -> Self {
        if cv < 0.2 {
            Confidence::High
        } else if cv < 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Sampled size estimate. Advisory only; never changes a decision.
#[derive(Debug, Clone, Serialize)]
pub struct TokenEstimate {
    pub row_count: u64,
    pub sampled_rows: usize,
    pub mean_tokens_per_row: f64,
    pub std_dev_tokens: f64,
    pub coefficient_of_variation: f64,
    pub estimated_total_tokens: u64,
    pub estimated_bytes: u64,
    pub confidence: Confidence,
    pub token_limit: usize,
    pub exceeds_token_limit: bool,
}

/// Outcome of a decision plus the measurements behind it
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReasoning {
    pub use_file: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    pub threshold: u64,
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<TokenEstimate>,
}

impl DecisionReasoning {
    /// Pure row-count rule: more rows than the threshold goes to a file.
    pub fn from_row_count(row_count: u64, threshold: u64) -> Self {
        let use_file = row_count > threshold;
        let reason = if use_file {
            format!(
                "Result has {} rows, above the screen threshold of {}; writing to file",
                row_count, threshold
            )
        } else {
            format!(
                "Result has {} rows, within the screen threshold of {} (row_count <= threshold); showing inline",
                row_count, threshold
            )
        };
        Self {
            use_file,
            reason,
            row_count: Some(row_count),
            threshold,
            forced: false,
            estimate: None,
        }
    }

    pub fn forced(mode: OutputMode, threshold: u64) -> Self {
        let use_file = mode == OutputMode::File;
        Self {
            use_file,
            reason: format!(
                "Explicit user override: mode={} requested, {}",
                mode,
                if use_file { "writing to file" } else { "showing inline" }
            ),
            row_count: None,
            threshold,
            forced: true,
            estimate: None,
        }
    }
}

pub struct DecisionEngine {
    config: Arc<OutputConfig>,
}

impl DecisionEngine {
    pub fn new(config: Arc<OutputConfig>) -> Self {
        Self { config }
    }

    /// Decide where a query's result goes. Forced modes skip the count probe.
    pub async fn decide(
        &self,
        query: &str,
        backend: &dyn QueryBackend,
        mode: OutputMode,
    ) -> Result<DecisionReasoning> {
        let threshold = self.config.screen_row_threshold;
        if mode != OutputMode::Auto {
            info!(mode = %mode, "Output mode forced by caller");
            return Ok(DecisionReasoning::forced(mode, threshold));
        }

        let row_count = backend.count_rows(query).await?;
        let decision = DecisionReasoning::from_row_count(row_count, threshold);
        info!(row_count, threshold, use_file = decision.use_file, "Output decision made");
        Ok(decision)
    }

    /// Sample up to `sample_size` rows (capped) and extrapolate a token count.
    pub async fn estimate(
        &self,
        query: &str,
        backend: &dyn QueryBackend,
        sample_size: usize,
    ) -> Result<TokenEstimate> {
        let row_count = backend.count_rows(query).await?;
        let limit = sample_size.clamp(1, MAX_SAMPLE_ROWS);

        let mut cursor = backend.execute(query).await?;
        let columns = cursor.columns().to_vec();
        let sample = cursor.fetch_batch(limit).await?;
        drop(cursor);

        let rendered: Vec<String> = sample.iter().map(|row| flatten_row(&columns, row)).collect();
        let estimate = summarize(row_count, &rendered, self.config.effective_token_limit());
        debug!(
            sampled = estimate.sampled_rows,
            mean = estimate.mean_tokens_per_row,
            total = estimate.estimated_total_tokens,
            confidence = ?estimate.confidence,
            "Token estimate computed"
        );
        Ok(estimate)
    }
}

/// `"col: value | col: value"`, nulls shown as `NULL`.
pub fn flatten_row(columns: &[String], row: &Row) -> String {
    columns
        .iter()
        .zip(row.iter())
        .map(|(col, value)| format!("{}: {}", col, value))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN * STRUCTURE_FACTOR
}

fn summarize(row_count: u64, rendered: &[String], token_limit: usize) -> TokenEstimate {
    let sampled_rows = rendered.len();
    if sampled_rows == 0 {
        return TokenEstimate {
            row_count,
            sampled_rows,
            mean_tokens_per_row: 0.0,
            std_dev_tokens: 0.0,
            coefficient_of_variation: 0.0,
            estimated_total_tokens: 0,
            estimated_bytes: 0,
            confidence: Confidence::High,
            token_limit,
            exceeds_token_limit: false,
        };
    }

    let n = sampled_rows as f64;
    let tokens: Vec<f64> = rendered.iter().map(|r| estimate_tokens(r)).collect();
    let mean = tokens.iter().sum::<f64>() / n;
    let variance = tokens.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let mean_chars = rendered.iter().map(|r| r.len()).sum::<usize>() as f64 / n;

    let total_tokens = (mean * row_count as f64).round() as u64;
    TokenEstimate {
        row_count,
        sampled_rows,
        mean_tokens_per_row: mean,
        std_dev_tokens: std_dev,
        coefficient_of_variation: cv,
        estimated_total_tokens: total_tokens,
        estimated_bytes: (mean_chars * row_count as f64).round() as u64,
        confidence: Confidence::from_variation(cv),
        token_limit,
        exceeds_token_limit: total_tokens > token_limit as u64,
    }
}
