use std::io;

pub type Result<T> = std::result::Result<T, MapError>;

/// Every failure the crate can surface.
///
/// Only ingestion, snapshot loading and configuration can fail once a dataset
/// is built; queries against a finished store or grid are total.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("malformed document at line {line}: {message}")]
    MalformedDocument { line: u64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{quantity} {value} is outside the web mercator domain")]
    Domain { quantity: &'static str, value: f64 },

    #[error("way {way_id} references unknown node {node_id}")]
    MissingReference { way_id: i64, node_id: i64 },

    #[error("external process '{program}' failed: {message}")]
    ExternalProcess { program: String, message: String },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid bounding box coordinates")]
    InvalidBoundingBox,
}

impl MapError {
    pub fn malformed(line: u64, message: impl Into<String>) -> Self {
        MapError::MalformedDocument {
            line,
            message: message.into(),
        }
    }

    pub fn external(program: impl Into<String>, message: impl Into<String>) -> Self {
        MapError::ExternalProcess {
            program: program.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for MapError {
    fn from(err: serde_yaml::Error) -> Self {
        MapError::Config(err.to_string())
    }
}
