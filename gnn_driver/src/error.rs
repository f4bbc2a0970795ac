use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GnnError {
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` line {line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("graph cache `{}` is unreadable: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to record model to `{}`: {reason}", path.display())]
    Record { path: PathBuf, reason: String },

    #[error("failed to write `{}`: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown node feature type `{0}` (expected adjacency, embedding, content or identity)")]
    UnknownFeature(String),

    #[error("node feature type `embedding` needs an embedding file")]
    MissingEmbeddingFile,

    #[error("unknown model type `{0}` (expected GCN, GraphSage, GAT or GIN)")]
    UnknownModel(String),

    #[error("unknown optimizer `{0}` (expected adam, sgd, rmsprop or adagrad)")]
    UnknownOptimizer(String),

    #[error("unknown scheduler `{0}` (expected none, step or cos)")]
    UnknownScheduler(String),

    #[error("dropout must lie in [0, 1], got {0}")]
    InvalidDropout(f64),

    #[error("dataset `{}` has no nodes", .0.display())]
    EmptyGraph(PathBuf),
}

impl GnnError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GnnError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GnnError>;
