// src/validation.rs
// Per-call parameter checks. Purely lexical: no database or filesystem access.

use std::path::Path;

use crate::error::{OutputError, Result};

/// Characters refused in filenames on at least one supported platform
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Device names Windows refuses as file stems
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Extensions that mark a location as a file rather than a directory
const FILE_EXTENSIONS: &[&str] = &["csv", "json", "txt"];

pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(OutputError::EmptyQuery);
    }
    Ok(())
}

pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(OutputError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = |reason: &str| OutputError::InvalidFilename {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("filename is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("filename must name a file"));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(&format!("contains forbidden character '{}'", c)));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }
    if is_reserved_name(name) {
        return Err(OutputError::ReservedFilename(name.to_string()));
    }
    Ok(())
}

/// `CON`, `con.csv`, `Lpt3.tar.gz` are all reserved.
pub fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    let stem = stem.trim_end_matches([' ', '.']).to_uppercase();
    RESERVED_NAMES.contains(&stem.as_str())
}

/// A location must denote a directory.
pub fn validate_location(location: &str) -> Result<()> {
    let invalid = |reason: &str| OutputError::InvalidLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    };

    if location.trim().is_empty() {
        return Err(invalid("location is empty"));
    }
    if location.contains('\0') {
        return Err(invalid("contains a NUL byte"));
    }

    let looks_like_file = Path::new(location)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FILE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);
    if looks_like_file && !location.ends_with('/') && !location.ends_with('\\') {
        return Err(invalid(
            "looks like a file path; pass the directory as location and the name as filename",
        ));
    }
    Ok(())
}
