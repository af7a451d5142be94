// In: src/error.rs

//! This module defines the single, unified error type for the entire bytesub library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Every fallible operation in the pipeline returns `Result<T, PipelineError>`. A
//! caller forwards the first failure verbatim; nothing is retried. The runner turns
//! the final error into a single category line via [`PipelineError::category`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of the pipeline an I/O failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    FailedToRead,
    FailedToWrite,
}

impl fmt::Display for IoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoFailure::FailedToRead => write!(f, "failed to read"),
            IoFailure::FailedToWrite => write!(f, "failed to write"),
        }
    }
}

/// Which file artifact could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Input,
    Output,
}

impl fmt::Display for StreamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSide::Input => write!(f, "input"),
            StreamSide::Output => write!(f, "output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    // =========================================================================
    // === Configuration Errors
    // =========================================================================
    /// A configuration artifact is missing or unreadable.
    #[error("Cannot read config '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed key-value, pipeline descriptor, or substitution table syntax.
    #[error("Grammar error: {0}")]
    Grammar(String),

    /// Well-formed but invalid value (bad buffer size, missing file, broken table).
    #[error("Semantic error: {0}")]
    Semantic(String),

    // =========================================================================
    // === Construction & Runtime Errors
    // =========================================================================
    #[error("Failed to construct pipeline: {0}")]
    FailedPipelineConstruction(String),

    #[error("Cannot open {side} stream '{path}': {source}")]
    InvalidStream {
        side: StreamSide,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error ({kind}) in stage '{stage}': {source}")]
    Io {
        kind: IoFailure,
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal contract violation between stages (this is a bug, not user input).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// The user-facing category of a failure. One label per category is printed by
/// the binary; the full error text only goes to the diagnostics log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ConfigRead,
    Grammar,
    Semantic,
    FailedPipelineConstruction,
    InvalidInputStream,
    InvalidOutputStream,
    FailedToRead,
    FailedToWrite,
    InvalidArgument,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigRead => "config read error",
            ErrorCategory::Grammar => "grammar error",
            ErrorCategory::Semantic => "semantic error",
            ErrorCategory::FailedPipelineConstruction => "failed to construct a pipeline",
            ErrorCategory::InvalidInputStream => "invalid input stream",
            ErrorCategory::InvalidOutputStream => "invalid output stream",
            ErrorCategory::FailedToRead => "reading error",
            ErrorCategory::FailedToWrite => "writing error",
            ErrorCategory::InvalidArgument => "invalid argument",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::ConfigRead { .. } => ErrorCategory::ConfigRead,
            PipelineError::Grammar(_) => ErrorCategory::Grammar,
            PipelineError::Semantic(_) => ErrorCategory::Semantic,
            PipelineError::FailedPipelineConstruction(_) => {
                ErrorCategory::FailedPipelineConstruction
            }
            PipelineError::InvalidStream { side, .. } => match side {
                StreamSide::Input => ErrorCategory::InvalidInputStream,
                StreamSide::Output => ErrorCategory::InvalidOutputStream,
            },
            PipelineError::Io { kind, .. } => match kind {
                IoFailure::FailedToRead => ErrorCategory::FailedToRead,
                IoFailure::FailedToWrite => ErrorCategory::FailedToWrite,
            },
            PipelineError::InvalidArgument(_) => ErrorCategory::InvalidArgument,
        }
    }

    pub(crate) fn read_failure(stage: &str, source: std::io::Error) -> Self {
        PipelineError::Io {
            kind: IoFailure::FailedToRead,
            stage: stage.to_string(),
            source,
        }
    }

    pub(crate) fn write_failure(stage: &str, source: std::io::Error) -> Self {
        PipelineError::Io {
            kind: IoFailure::FailedToWrite,
            stage: stage.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_for_stream_sides() {
        let err = PipelineError::InvalidStream {
            side: StreamSide::Output,
            path: PathBuf::from("/nope/out.bin"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.category(), ErrorCategory::InvalidOutputStream);
        assert_eq!(err.category().label(), "invalid output stream");
    }

    #[test]
    fn test_semantic_label_is_stable() {
        let err = PipelineError::Semantic("broken closure".into());
        assert_eq!(err.category().to_string(), "semantic error");
        assert!(err.to_string().contains("broken closure"));
    }

    #[test]
    fn test_io_failure_keeps_source() {
        use std::error::Error;
        let err = PipelineError::write_failure(
            "file_writer",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(err.category(), ErrorCategory::FailedToWrite);
        assert!(err.source().is_some());
    }
}
