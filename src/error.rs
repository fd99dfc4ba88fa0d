use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse engine config JSON at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{var} is set but empty")]
    EmptyConfigPath { var: &'static str },

    #[error("turn {turn_id} was rejected: id already present in the conversation")]
    TurnRejected { turn_id: String },

    #[error("failed to spawn event worker for turn {turn_id}: {source}")]
    WorkerSpawn {
        turn_id: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ConfigParse {
            path: path.into(),
            source,
        }
    }
}
