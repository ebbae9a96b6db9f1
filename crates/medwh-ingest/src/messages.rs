//! Discovery and parsing of scraped message files.
//!
//! The scraper writes `<messages_dir>/<YYYY-MM-DD>/<channel>.json`; each file
//! holds either a single message object or an array of them. Discovery is
//! recursive, so any nesting below the root is picked up.

use std::path::{Path, PathBuf};

use medwh_core::RawMessage;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::normalize::normalize_message;

/// Messages parsed from a directory tree, with counts of what was lost.
#[derive(Debug, Default)]
pub struct ParsedMessages {
    pub records: Vec<RawMessage>,
    pub files_read: usize,
    /// Files that could not be read or were not valid message JSON.
    pub files_skipped: usize,
    /// Records that lacked a usable `message_id` or `channel_name`.
    pub records_dropped: usize,
}

/// Recursively list every `*.json` file under `root`, sorted by path.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] if `root` is not a directory.
pub fn discover_message_files(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::SourceMissing {
            path: root.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();

    files.sort();
    Ok(files)
}

/// Read one message file into its JSON objects.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or is neither an
/// object nor an array.
pub fn read_message_file(path: &Path) -> Result<Vec<Value>, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| IngestError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        _ => Err(IngestError::UnsupportedShape {
            path: path.to_path_buf(),
        }),
    }
}

/// Discover, read and normalize every message under `root`.
///
/// A bad file is logged and skipped; a record missing its key is logged and
/// dropped. Neither aborts the read.
///
/// # Errors
///
/// Returns [`IngestError::SourceMissing`] if `root` is not a directory.
pub fn read_message_files(root: &Path) -> Result<ParsedMessages, IngestError> {
    let files = discover_message_files(root)?;
    let mut parsed = ParsedMessages::default();

    for path in &files {
        let items = match read_message_file(path) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping message file");
                parsed.files_skipped += 1;
                continue;
            }
        };
        parsed.files_read += 1;

        for item in &items {
            match normalize_message(item) {
                Ok(msg) => parsed.records.push(msg),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "dropping message record");
                    parsed.records_dropped += 1;
                }
            }
        }
    }

    tracing::info!(
        files_read = parsed.files_read,
        files_skipped = parsed.files_skipped,
        records = parsed.records.len(),
        records_dropped = parsed.records_dropped,
        "parsed message files"
    );
    Ok(parsed)
}
