// src/filename.rs
// Output filename generation from the configured pattern

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::config::OutputFormat;

/// First 8 hex characters of the SHA-256 of the query text.
pub fn query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

/// Substitute `{date}`, `{time}`, `{timestamp}` and `{query_hash}` and append the extension.
pub fn generate(pattern: &str, query: &str, format: OutputFormat, now: DateTime<Local>) -> String {
    let stem = pattern
        .replace("{timestamp}", &now.format("%Y%m%d_%H%M%S").to_string())
        .replace("{date}", &now.format("%Y%m%d").to_string())
        .replace("{time}", &now.format("%H%M%S").to_string())
        .replace("{query_hash}", &query_hash(query));
    with_extension(&stem, format)
}

/// Append the format's extension unless the name already ends with it.
pub fn with_extension(name: &str, format: OutputFormat) -> String {
    let suffix = format!(".{}", format.extension());
    if name.to_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}
