//! Error types for locality discovery and domain trees
//!
//! Every fallible operation in the crate returns [`LocalityError`]. Callers
//! that only care about the broad failure class can use
//! [`LocalityError::kind`].

use crate::unit::UnitId;
use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of a [`LocalityError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown tag, host, module or unit
    NotFound,
    /// Malformed tag, null tree, empty filter set
    InvalidArgument,
    /// Structural invariant broken
    Inconsistent,
    /// Allocation failure while materializing nodes
    ResourceExhausted,
    /// Collective exchange failed
    Collective,
    /// File access or decoding failure
    Io,
}

/// Main error type for locality operations
#[derive(Error, Debug)]
pub enum LocalityError {
    /// No domain carries the requested tag
    #[error("Domain not found: '{0}'")]
    TagNotFound(String),

    /// Hostname is not part of the host topology
    #[error("Host not found: '{0}'")]
    HostNotFound(String),

    /// Unit id is not part of the unit locality map
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// Index-based lookup past the end of a collection
    #[error("{what} index {index} out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    /// Malformed domain tag
    #[error("Invalid domain tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// Domain tag exceeds the configured maximum length
    #[error("Domain tag '{tag}' exceeds maximum length of {max} characters")]
    TagTooLong { tag: String, max: usize },

    /// Operation on a destructed or never-built tree
    #[error("Domain tree is empty")]
    EmptyTree,

    /// Filter called without any tags
    #[error("Filter requires at least one domain tag")]
    EmptyFilter,

    /// Any other rejected argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Structural invariant violation
    #[error("Inconsistent domain '{tag}': {message}")]
    Inconsistent { tag: String, message: String },

    /// Allocation failure
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Team collective failed
    #[error("Collective exchange failed: {0}")]
    Collective(String),

    /// I/O error with path context
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<LocalityError>,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LocalityError>,
    },
}

impl LocalityError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid tag error
    pub fn invalid_tag(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Create an invariant violation error
    pub fn inconsistent(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inconsistent {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Create an index out of range error
    pub fn out_of_range(what: &'static str, index: usize, count: usize) -> Self {
        Self::IndexOutOfRange { what, index, count }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Broad failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TagNotFound(_)
            | Self::HostNotFound(_)
            | Self::UnitNotFound(_)
            | Self::IndexOutOfRange { .. } => ErrorKind::NotFound,
            Self::InvalidTag { .. }
            | Self::TagTooLong { .. }
            | Self::EmptyTree
            | Self::EmptyFilter
            | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Inconsistent { .. } => ErrorKind::Inconsistent,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::Collective(_) => ErrorKind::Collective,
            Self::Io { .. } | Self::Json(_) => ErrorKind::Io,
            Self::MultipleErrors { errors, .. } => errors
                .first()
                .map(|e| e.kind())
                .unwrap_or(ErrorKind::InvalidArgument),
            Self::WithContext { source, .. } => source.kind(),
        }
    }

    /// Check if this error can be degraded instead of aborting a build
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Collective(_) | Self::Io { .. } | Self::Json(_) => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// Result type alias for locality operations
pub type Result<T> = std::result::Result<T, LocalityError>;

impl From<std::collections::TryReserveError> for LocalityError {
    fn from(err: std::collections::TryReserveError) -> Self {
        LocalityError::ResourceExhausted(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| LocalityError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(LocalityError::MultipleErrors { count, errors }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(LocalityError::TagNotFound(".0".into()).kind(), ErrorKind::NotFound);
        assert_eq!(LocalityError::out_of_range("node", 3, 2).kind(), ErrorKind::NotFound);
        assert_eq!(LocalityError::EmptyFilter.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            LocalityError::TagTooLong { tag: ".0".into(), max: 1 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(LocalityError::inconsistent(".", "x").kind(), ErrorKind::Inconsistent);
    }

    #[test]
    fn test_context_preserves_kind() {
        let err = LocalityError::HostNotFound("n1".into()).with_context("building node domains");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("building node domains"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(LocalityError::Collective("peer hung up".into()).is_recoverable());
        assert!(!LocalityError::EmptyTree.is_recoverable());
    }

    #[test]
    fn test_try_reserve_maps_to_resource_exhausted() {
        let mut v: Vec<u64> = Vec::new();
        let err: LocalityError = v.try_reserve(usize::MAX).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_collect_errors() {
        let results: Vec<Result<i32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(collect_errors(results).unwrap(), vec![1, 2, 3]);

        let results: Vec<Result<i32>> = vec![
            Ok(1),
            Err(LocalityError::EmptyTree),
            Err(LocalityError::EmptyFilter),
        ];
        match collect_errors(results) {
            Err(LocalityError::MultipleErrors { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
