//! Metadata lookup errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while looking up source metadata.
///
/// All variants are `Clone` so failures can be cached per translation unit.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetadataError {
    /// The symbol or declaration is absent from the parsed source
    #[error("metadata of {what} not found")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// The construct cannot be represented yet (e.g. nested closures)
    #[error("metadata of {what} is not supported")]
    Unsupported {
        /// What was looked up
        what: String,
    },

    /// The source unit failed to parse
    #[error("failed to parse {}:{line}: {message}", .path.display())]
    ParseFailure {
        /// Source file
        path: PathBuf,
        /// Line of the failure
        line: u32,
        /// Parser message
        message: String,
    },

    /// The source unit could not be read
    #[error("failed to read {}: {message}", .path.display())]
    Io {
        /// Source file or directory
        path: PathBuf,
        /// Underlying I/O error message
        message: String,
    },
}

impl MetadataError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        MetadataError::NotFound { what: what.into() }
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        MetadataError::Unsupported { what: what.into() }
    }

    /// Whether this is a `NotFound` error
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound { .. })
    }

    /// Whether this is an `Unsupported` error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MetadataError::Unsupported { .. })
    }
}

/// Lexical or structural failure inside one source unit.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line of the failure
    pub line: u32,
    /// Description
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}
