// src/config/env.rs
// Environment-based loading - single source of truth for QUERY_OUTPUT_* vars

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{OutputConfig, OutputFormat, OutputMode, SandboxPolicy};
use crate::error::{OutputError, Result};

pub const ENV_CLIENT_ROOT: &str = "QUERY_OUTPUT_CLIENT_ROOT";
pub const ENV_MODEL_NAME: &str = "QUERY_OUTPUT_MODEL_NAME";
pub const ENV_CONTEXT_LIMIT: &str = "QUERY_OUTPUT_CONTEXT_LIMIT";
pub const ENV_SAFETY_MARGIN: &str = "QUERY_OUTPUT_SAFETY_MARGIN";
pub const ENV_DEFAULT_MODE: &str = "QUERY_OUTPUT_DEFAULT_MODE";
pub const ENV_DEFAULT_FORMAT: &str = "QUERY_OUTPUT_DEFAULT_FORMAT";
pub const ENV_DEFAULT_DIR: &str = "QUERY_OUTPUT_DEFAULT_DIR";
pub const ENV_ROW_THRESHOLD: &str = "QUERY_OUTPUT_SCREEN_ROW_THRESHOLD";
pub const ENV_FILENAME_PATTERN: &str = "QUERY_OUTPUT_FILENAME_PATTERN";
pub const ENV_SAMPLE_SIZE: &str = "QUERY_OUTPUT_SAMPLE_SIZE";
pub const ENV_CHUNK_SIZE: &str = "QUERY_OUTPUT_CHUNK_SIZE";
pub const ENV_INLINE_ROW_CAP: &str = "QUERY_OUTPUT_INLINE_ROW_CAP";
pub const ENV_SANDBOX_POLICY: &str = "QUERY_OUTPUT_SANDBOX_POLICY";
pub const ENV_DEBUG: &str = "QUERY_OUTPUT_DEBUG";

/// A problem in the loaded configuration, tied to the variable that sets it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Outcome of `OutputConfig::validate`. Errors block startup, warnings are logged.
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

impl ConfigValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, key: &'static str, message: impl Into<String>) {
        self.errors.push(ConfigIssue {
            key,
            message: message.into(),
        });
    }

    pub(crate) fn warning(&mut self, key: &'static str, message: impl Into<String>) {
        self.warnings.push(ConfigIssue {
            key,
            message: message.into(),
        });
    }

    /// Collapse every error into a single `OutputError::Config`.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(OutputError::Config(joined))
    }

    /// One line per issue, errors first
    pub fn report(&self) -> String {
        let lines: Vec<String> = self
            .errors
            .iter()
            .map(|issue| format!("error: {}", issue))
            .chain(self.warnings.iter().map(|issue| format!("warning: {}", issue)))
            .collect();
        if lines.is_empty() {
            "configuration ok".to_string()
        } else {
            lines.join("\n")
        }
    }
}

impl OutputConfig {
    /// Load from `.env` (if present) and the process environment, then validate.
    /// Call once at startup.
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            debug!(".env file not found, using process environment");
        }
        info!("Loading output configuration");
        Self::from_lookup(|key| std::env::var(key).ok())?.validated()
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// set-but-unparseable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = OutputConfig::default();

        let config = OutputConfig {
            model_name: get(ENV_MODEL_NAME).unwrap_or(defaults.model_name),
            context_limit: parse_or(ENV_CONTEXT_LIMIT, get(ENV_CONTEXT_LIMIT), defaults.context_limit)?,
            safety_margin: parse_or(ENV_SAFETY_MARGIN, get(ENV_SAFETY_MARGIN), defaults.safety_margin)?,
            default_mode: match get(ENV_DEFAULT_MODE) {
                Some(v) => v.parse::<OutputMode>().map_err(|e| config_error(ENV_DEFAULT_MODE, e))?,
                None => defaults.default_mode,
            },
            default_format: match get(ENV_DEFAULT_FORMAT) {
                Some(v) => v
                    .parse::<OutputFormat>()
                    .map_err(|e| config_error(ENV_DEFAULT_FORMAT, e))?,
                None => defaults.default_format,
            },
            default_output_dir: get(ENV_DEFAULT_DIR).unwrap_or(defaults.default_output_dir),
            chunk_size: parse_or(ENV_CHUNK_SIZE, get(ENV_CHUNK_SIZE), defaults.chunk_size)?,
            client_root: get(ENV_CLIENT_ROOT).map(PathBuf::from),
            sandbox_policy: match get(ENV_SANDBOX_POLICY) {
                Some(v) => v.parse::<SandboxPolicy>()?,
                None => defaults.sandbox_policy,
            },
            screen_row_threshold: parse_or(ENV_ROW_THRESHOLD, get(ENV_ROW_THRESHOLD), defaults.screen_row_threshold)?,
            sample_size: parse_or(ENV_SAMPLE_SIZE, get(ENV_SAMPLE_SIZE), defaults.sample_size)?,
            inline_row_cap: parse_or(ENV_INLINE_ROW_CAP, get(ENV_INLINE_ROW_CAP), defaults.inline_row_cap)?,
            filename_pattern: get(ENV_FILENAME_PATTERN).unwrap_or(defaults.filename_pattern),
            debug_logging: match get(ENV_DEBUG) {
                Some(v) => parse_bool(&v).ok_or_else(|| {
                    OutputError::Config(format!("{} must be a boolean, got '{}'", ENV_DEBUG, v))
                })?,
                None => defaults.debug_logging,
            },
        };

        if config.client_root.is_none() {
            warn!("{} is not set; relative output locations will be refused", ENV_CLIENT_ROOT);
        }

        Ok(config)
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| OutputError::Config(format!("{} has an invalid value '{}'", key, v))),
        None => Ok(default),
    }
}

fn config_error(key: &str, err: OutputError) -> OutputError {
    OutputError::Config(format!("{}: {}", key, err))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
