//! Error handling types for repo-compose operations

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Main error type for repo-compose operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration parsing error: {message}")]
    ConfigParse { message: String },

    #[error("rename entry is not valid at {path}")]
    RenameInvalid { path: String },

    #[error("git clone error for {url}@{reference}: {message}")]
    GitClone {
        url: String,
        reference: String,
        message: String,
    },

    #[error("git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    #[error("maximum recursion depth reached")]
    DepthExceeded,

    #[error("file not found in snapshot: {name}")]
    FileNotFound { name: String },

    #[error("template error in {name}: {message}")]
    Template { name: String, message: String },

    #[error("write error for {path}: {message}")]
    Write { path: String, message: String },

    #[error("repository root not found: {message}")]
    RepoRoot { message: String },

    #[error("background task failed: {message}")]
    Task { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("semver parsing error: {0}")]
    Semver(#[from] semver::Error),

    #[error("{0}")]
    Aggregate(ErrorList),
}

impl Error {
    /// Combine a list of errors into one.
    ///
    /// A single error is returned as-is; multiple errors become an
    /// `Aggregate` that preserves every underlying failure.
    pub fn aggregate(mut errors: Vec<Error>) -> Error {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Error::Aggregate(ErrorList(errors))
        }
    }

    /// Flattened view of the underlying failures.
    pub fn failures(&self) -> Vec<&Error> {
        match self {
            Error::Aggregate(list) => list.0.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }
}

/// A list of accumulated errors from a fan-out operation.
#[derive(Debug)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  * {}", err)?;
        }
        Ok(())
    }
}

/// Thread-safe error accumulator shared across parallel tasks.
///
/// Fan-out phases (upstream cloning, output writing) push failures here
/// instead of failing fast, so every parallel error survives to the final
/// report.
#[derive(Clone, Default)]
pub struct ErrorSink {
    errors: Arc<Mutex<Vec<Error>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, err: Error) {
        self.errors.lock().expect("error sink poisoned").push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().expect("error sink poisoned").is_empty()
    }

    /// Drain the sink into a `Result`: `Ok(())` when nothing was pushed,
    /// otherwise the combined error.
    pub fn into_result(self) -> Result<()> {
        let errors = {
            let mut guard = self.errors.lock().expect("error sink poisoned");
            std::mem::take(&mut *guard)
        };
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::aggregate(errors))
        }
    }
}

/// Result type alias for repo-compose operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_single_error_passes_through() {
        let err = Error::aggregate(vec![Error::DepthExceeded]);
        assert!(matches!(err, Error::DepthExceeded));
    }

    #[test]
    fn test_aggregate_multiple_errors() {
        let err = Error::aggregate(vec![
            Error::DepthExceeded,
            Error::FileNotFound {
                name: "missing.txt".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("2 errors occurred"));
        assert!(text.contains("maximum recursion depth reached"));
        assert!(text.contains("missing.txt"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_sink_empty_is_ok() {
        let sink = ErrorSink::new();
        assert!(sink.is_empty());
        assert!(sink.into_result().is_ok());
    }

    #[test]
    fn test_sink_collects_across_clones() {
        let sink = ErrorSink::new();
        let other = sink.clone();
        other.push(Error::DepthExceeded);
        sink.push(Error::FileNotFound {
            name: "a".to_string(),
        });
        let err = sink.into_result().unwrap_err();
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_failures_flattens_nested_aggregates() {
        let inner = Error::aggregate(vec![
            Error::DepthExceeded,
            Error::FileNotFound {
                name: "b".to_string(),
            },
        ]);
        let outer = Error::aggregate(vec![inner, Error::DepthExceeded]);
        assert_eq!(outer.failures().len(), 3);
    }
}
