use std::path::PathBuf;

/// Failures at the I/O edges: loading input files, profile files and settings.
/// The classifier and normalizer themselves never fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON on line {line} of {path}: {source}")]
    JsonLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}: expected an array of lots, a search-API response or JSON lines")]
    UnsupportedShape(PathBuf),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("profile `{id}` extends unknown profile `{base}`")]
    UnknownProfileBase { id: String, base: String },

    #[error("unknown category `{0}`")]
    UnknownCategory(String),
}
