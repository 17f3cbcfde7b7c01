//! Shape extraction errors

use thiserror::Error;

/// Errors raised by the runtime type table.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// TypeId not allocated by this table
    #[error("Unknown type id: {id}")]
    UnknownType {
        /// Raw type id
        id: u32,
    },

    /// `define` called on an unnamed type
    #[error("Type {name} is not a declared named type")]
    NotNamed {
        /// Rendered type
        name: String,
    },

    /// `define` called twice for the same named type
    #[error("Type {name} is already defined")]
    AlreadyDefined {
        /// Qualified type name
        name: String,
    },

    /// Method attached with a non-function type
    #[error("Method {method} of {owner} must have a function type, got {found}")]
    NotAFunction {
        /// Receiver type
        owner: String,
        /// Method name
        method: String,
        /// Rendered type that was given
        found: String,
    },
}

/// Errors raised by the shape extractor.
///
/// Metadata failures never appear here: they degrade to positional names and
/// empty docs and are only logged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShapeError {
    /// Recursion guard tripped, or a placeholder survived resolution
    #[error("Internal invariant violation: {message}")]
    InternalInvariantViolation {
        /// What went wrong
        message: String,
    },

    /// A view was requested for a node of another variant
    #[error("Shape #{node} is {found}, expected {expected}")]
    KindMismatch {
        /// Node number
        node: u32,
        /// Requested variant
        expected: &'static str,
        /// Actual variant
        found: &'static str,
    },

    /// NodeId not allocated by this extractor
    #[error("Unknown shape node: #{node}")]
    UnknownNode {
        /// Node number
        node: u32,
    },

    /// Runtime type table error
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ShapeError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        ShapeError::InternalInvariantViolation {
            message: message.into(),
        }
    }
}
