// src/lib.rs
// query-output - inline-or-file output manager for tabular query results

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod backend;
pub mod config;
pub mod decision;
pub mod error;
pub mod filename;
pub mod orchestrator;
pub mod paths;
pub mod render;
pub mod validation;
pub mod writer;

pub use config::{OutputConfig, OutputFormat, OutputMode};
pub use error::{OutputError, Result};
pub use orchestrator::{FileArtifact, Outcome, OutputOrchestrator, OutputRequest};
