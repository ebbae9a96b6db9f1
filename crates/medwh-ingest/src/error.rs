use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: expected a JSON object or array of objects", path.display())]
    UnsupportedShape { path: PathBuf },

    #[error("record is missing required key '{key}'")]
    MissingKey { key: &'static str },

    #[error("record has unusable value for required key '{key}': {value}")]
    InvalidKey { key: &'static str, value: String },

    #[error(transparent)]
    Db(#[from] medwh_db::DbError),
}
