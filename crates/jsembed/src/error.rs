//! Error types for the embedding layer
//!
//! Script failures and host-side precondition violations travel on two
//! separate channels. [`ScriptException`] carries the former and can be
//! caught by script; [`RuntimeError`] carries the latter and never reaches
//! script.

use crate::exception::ScriptException;
use crate::marshal::MarshalError;
use crate::value::JsType;

/// Result type for operations that may enter the engine
pub type Result<'c, T> = std::result::Result<T, Error<'c>>;

/// Violation of a precondition at the marshaling boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The requested variant does not match the value
    #[error("Invalid cast: expected {expected}, got {actual}")]
    InvalidCast {
        /// Variant that was requested
        expected: JsType,
        /// Variant the value actually has
        actual: JsType,
    },

    /// Text is longer than the engine can represent
    #[error("String too long: {len} code units (max {max})")]
    StringTooLong {
        /// Length of the rejected text
        len: usize,
        /// Engine limit
        max: usize,
    },

    /// An argument has the wrong shape (null, foreign context, bad text)
    #[error("Type error: {0}")]
    TypeError(String),
}

impl RuntimeError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        RuntimeError::TypeError(message.into())
    }

    pub(crate) fn invalid_cast(expected: JsType, actual: JsType) -> Self {
        RuntimeError::InvalidCast { expected, actual }
    }

    /// Stable numeric code for the C ABI. Zero is reserved for "no error".
    pub fn code(&self) -> u32 {
        match self {
            RuntimeError::InvalidCast { .. } => 1,
            RuntimeError::StringTooLong { .. } => 2,
            RuntimeError::TypeError(_) => 3,
        }
    }
}

/// Failure of an operation that entered the engine
#[derive(Debug, thiserror::Error)]
pub enum Error<'c> {
    /// Script raised (parse error, uncaught throw, throwing getter, ...)
    #[error("{0}")]
    Script(ScriptException<'c>),

    /// Host-side precondition violation
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Deep copy into host data failed
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The failure was already delivered to a registered handler
    #[error("error delivered to the registered handler")]
    Handled,
}

impl<'c> Error<'c> {
    /// The script exception, if this is one
    pub fn as_script(&self) -> Option<&ScriptException<'c>> {
        match self {
            Error::Script(exception) => Some(exception),
            _ => None,
        }
    }

    /// The runtime error, if this is one
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime(error) => Some(error),
            _ => None,
        }
    }
}

impl<'c> From<ScriptException<'c>> for Error<'c> {
    fn from(exception: ScriptException<'c>) -> Self {
        Error::Script(exception)
    }
}

/// Failure to bring up a context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Engine runtime could not be allocated
    #[error("Failed to allocate engine runtime")]
    RuntimeAllocation,

    /// Engine context could not be allocated
    #[error("Failed to allocate engine context")]
    ContextAllocation,

    /// A host class could not be registered with the runtime
    #[error("Failed to register engine class: {0}")]
    ClassRegistration(&'static str),
}
