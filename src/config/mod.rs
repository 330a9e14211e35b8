// src/config/mod.rs
// Output configuration and the mode/format vocabulary

pub mod env;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{OutputError, Result};

pub use env::{ConfigIssue, ConfigValidation};

/// Default filename pattern when none is configured
pub const DEFAULT_FILENAME_PATTERN: &str = "query_result_{timestamp}_{query_hash}";

/// Where a result should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Let the decision engine pick based on row count
    Auto,
    /// Always return rows inline
    Screen,
    /// Always write a file
    File,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Auto => "auto",
            OutputMode::Screen => "screen",
            OutputMode::File => "file",
        }
    }
}

impl FromStr for OutputMode {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(OutputMode::Auto),
            "screen" => Ok(OutputMode::Screen),
            "file" => Ok(OutputMode::File),
            _ => Err(OutputError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(OutputError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether absolute output paths may point outside the sandbox root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxPolicy {
    /// Absolute paths only have to stay out of the install tree
    Allow,
    /// Absolute paths must also live under the sandbox root
    Deny,
}

impl FromStr for SandboxPolicy {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(SandboxPolicy::Allow),
            "deny" => Ok(SandboxPolicy::Deny),
            _ => Err(OutputError::Config(format!(
                "invalid sandbox policy '{}': expected allow or deny",
                s
            ))),
        }
    }
}

/// Process-wide output settings, loaded and validated once at startup.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    // ── Model (informational)
    pub model_name: String,
    pub context_limit: usize,
    pub safety_margin: f64,

    // ── Defaults for per-call parameters
    pub default_mode: OutputMode,
    pub default_format: OutputFormat,
    pub default_output_dir: String,
    pub chunk_size: usize,

    // ── Sandbox
    pub client_root: Option<PathBuf>,
    pub sandbox_policy: SandboxPolicy,

    // ── Decision and estimation
    pub screen_row_threshold: u64,
    pub sample_size: usize,
    pub inline_row_cap: usize,

    pub filename_pattern: String,
    pub debug_logging: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_name: "claude-sonnet".to_string(),
            context_limit: 200_000,
            safety_margin: 0.8,
            default_mode: OutputMode::Auto,
            default_format: OutputFormat::Csv,
            default_output_dir: "./output".to_string(),
            chunk_size: 5000,
            client_root: None,
            sandbox_policy: SandboxPolicy::Allow,
            screen_row_threshold: 1000,
            sample_size: 100,
            inline_row_cap: 1000,
            filename_pattern: DEFAULT_FILENAME_PATTERN.to_string(),
            debug_logging: false,
        }
    }
}

impl OutputConfig {
    /// Token budget after applying the safety margin
    pub fn effective_token_limit(&self) -> usize {
        (self.context_limit as f64 * self.safety_margin) as usize
    }

    /// Field-level checks, each reported against the variable that sets the field.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();

        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            validation.error(
                env::ENV_SAFETY_MARGIN,
                format!("must be in (0, 1], got {}", self.safety_margin),
            );
        }
        for (key, value) in [
            (env::ENV_ROW_THRESHOLD, self.screen_row_threshold as usize),
            (env::ENV_SAMPLE_SIZE, self.sample_size),
            (env::ENV_CHUNK_SIZE, self.chunk_size),
            (env::ENV_INLINE_ROW_CAP, self.inline_row_cap),
        ] {
            if value == 0 {
                validation.error(key, "must be greater than zero");
            }
        }
        if self.filename_pattern.trim().is_empty() {
            validation.error(env::ENV_FILENAME_PATTERN, "must not be empty");
        } else if !self.filename_pattern.contains('{') {
            validation.warning(
                env::ENV_FILENAME_PATTERN,
                "has no placeholders; every generated file gets the same name",
            );
        }
        if self.default_output_dir.trim().is_empty() {
            validation.error(env::ENV_DEFAULT_DIR, "must not be empty");
        }

        match &self.client_root {
            Some(root) if !root.is_absolute() => {
                validation.error(
                    env::ENV_CLIENT_ROOT,
                    format!("must be an absolute path, got '{}'", root.display()),
                );
            }
            Some(root) if !root.is_dir() => {
                validation.warning(
                    env::ENV_CLIENT_ROOT,
                    format!("'{}' does not exist yet", root.display()),
                );
            }
            Some(_) => {}
            None => {
                validation.warning(
                    env::ENV_CLIENT_ROOT,
                    "not set; relative output locations will be rejected",
                );
            }
        }

        if self.sandbox_policy == SandboxPolicy::Deny && self.client_root.is_none() {
            validation.warning(
                env::ENV_SANDBOX_POLICY,
                "is deny but no client root is set; every file write will be rejected",
            );
        }

        validation
    }

    /// Validate and turn errors into a single configuration error.
    pub fn validated(self) -> Result<Self> {
        self.validate().into_result()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("AUTO".parse::<OutputMode>().unwrap(), OutputMode::Auto);
        assert_eq!(" file ".parse::<OutputMode>().unwrap(), OutputMode::File);
        assert!(matches!(
            "inline".parse::<OutputMode>(),
            Err(OutputError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "xlsx".parse::<OutputFormat>(),
            Err(OutputError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = OutputConfig::default();
        let validation = config.validate();
        assert!(validation.is_valid());
        // Missing client root only warns
        assert!(!validation.warnings.is_empty());
        assert_eq!(config.effective_token_limit(), 160_000);
    }

    #[test]
    fn test_safety_margin_out_of_range() {
        let config = OutputConfig {
            safety_margin: 0.0,
            ..Default::default()
        };
        assert!(!config.validate().is_valid());

        let config = OutputConfig {
            safety_margin: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validated(), Err(OutputError::Config(_))));
    }

    #[test]
    fn test_zero_threshold_and_sample_size() {
        let config = OutputConfig {
            screen_row_threshold: 0,
            sample_size: 0,
            ..Default::default()
        };
        let validation = config.validate();
        let keys: Vec<&str> = validation.errors.iter().map(|issue| issue.key).collect();
        assert_eq!(keys, vec![env::ENV_ROW_THRESHOLD, env::ENV_SAMPLE_SIZE]);
    }

    #[test]
    fn test_zero_inline_row_cap_rejected() {
        let config = OutputConfig {
            inline_row_cap: 0,
            ..Default::default()
        };
        let validation = config.validate();
        assert_eq!(validation.errors.len(), 1);
        assert_eq!(validation.errors[0].key, env::ENV_INLINE_ROW_CAP);
        assert!(matches!(config.validated(), Err(OutputError::Config(_))));
    }

    #[test]
    fn test_relative_client_root_rejected() {
        let config = OutputConfig {
            client_root: Some(PathBuf::from("relative/root")),
            ..Default::default()
        };
        assert!(!config.validate().is_valid());
    }
}
