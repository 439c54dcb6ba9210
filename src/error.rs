// Error taxonomy shared by every component

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source file could not be parsed. The indexer absorbs this and omits the file.
    #[error("skipped {path}: {reason}")]
    ParseSkipped { path: String, reason: String },

    /// Impact was requested for a path with no node in the dependency graph.
    #[error("target not indexed: {target}")]
    TargetNotIndexed { target: String },

    /// A persisted cache artifact was unreadable. The cache absorbs this as a miss.
    #[error("corrupt cache artifact {path}: {reason}")]
    CacheReadCorrupt { path: PathBuf, reason: String },

    /// The graph engine failed or produced output that could not be parsed.
    #[error("dependency graph engine failed: {message}")]
    ExternalEngine { message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Self::ExternalEngine {
            message: message.into(),
        }
    }

    /// Whether the component that raised this error is expected to absorb it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ParseSkipped { .. } | Self::CacheReadCorrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let skipped = Error::ParseSkipped {
            path: "src/a.ts".to_string(),
            reason: "syntax error".to_string(),
        };
        assert!(skipped.is_recoverable());

        let missing = Error::TargetNotIndexed {
            target: "src/b.ts".to_string(),
        };
        assert!(!missing.is_recoverable());
        assert_eq!(missing.to_string(), "target not indexed: src/b.ts");
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = Error::io(
            "/tmp/project",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/tmp/project"));
        assert!(!err.is_recoverable());
    }
}
