//! Status kinds and the runtime error type

use keel_gc::GcError;
use thiserror::Error;

/// Every outcome the substrate and its consumers report through one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum StatusKind {
    /// No failure
    #[error("success")]
    Success,

    /// Storage could not be obtained (overflow, heap or stack limit)
    #[error("allocation failed")]
    AllocationFailed,

    /// Argument frame has the wrong number of values
    #[error("number of arguments invalid")]
    NumberOfArgumentsInvalid,

    /// Argument has the wrong tag or type
    #[error("argument type invalid")]
    ArgumentTypeInvalid,

    /// Argument has the right type but an unacceptable value
    #[error("argument value invalid")]
    ArgumentValueInvalid,

    /// Operation is invalid for the current state
    #[error("invalid state")]
    InvalidState,

    /// Named type, object or record does not exist
    #[error("not exists")]
    NotExists,

    /// A type with that name is already registered
    #[error("type exists")]
    TypeExists,

    /// Malformed encoding
    #[error("malformed encoding")]
    MalformedEncoding,

    /// Environment or OS failure
    #[error("environment failure")]
    Environment,

    /// Lexical error from a consumer front end
    #[error("lexical error")]
    Lexical,

    /// Syntax error from a consumer front end
    #[error("syntactic error")]
    Syntactic,

    /// Semantic error from a consumer front end
    #[error("semantic error")]
    Semantic,
}

impl StatusKind {
    /// True for [`StatusKind::Success`]
    pub fn is_success(self) -> bool {
        self == StatusKind::Success
    }
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

/// A failure carried out of a guarded region
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", detail(.message))]
pub struct Status {
    kind: StatusKind,
    message: Option<String>,
}

impl Status {
    /// Create a status with no message
    pub fn new(kind: StatusKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Create a status with a context message
    pub fn with_message(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// The status kind
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    /// The context message, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Allocation failure
    pub fn allocation_failed(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::AllocationFailed, message)
    }

    /// Wrong argument count
    pub fn argument_count(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::NumberOfArgumentsInvalid, message)
    }

    /// Wrong argument type
    pub fn argument_type(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::ArgumentTypeInvalid, message)
    }

    /// Unacceptable argument value
    pub fn argument_value(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::ArgumentValueInvalid, message)
    }

    /// Operation invalid for the current state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::InvalidState, message)
    }

    /// Missing type, object or record
    pub fn not_exists(message: impl Into<String>) -> Self {
        Self::with_message(StatusKind::NotExists, message)
    }

    /// Duplicate type name
    pub fn type_exists(name: &str) -> Self {
        Self::with_message(StatusKind::TypeExists, format!("type `{name}` is already registered"))
    }
}

impl From<StatusKind> for Status {
    fn from(kind: StatusKind) -> Self {
        Self::new(kind)
    }
}

impl From<GcError> for Status {
    fn from(err: GcError) -> Self {
        let kind = match err {
            GcError::StaleHandle(_) => StatusKind::NotExists,
            GcError::PinUnderflow(_) | GcError::PinOverflow(_) => StatusKind::InvalidState,
            GcError::HeapLimitExceeded { .. } | GcError::SlotsExhausted => {
                StatusKind::AllocationFailed
            }
        };
        Self::with_message(kind, err.to_string())
    }
}

/// Result type for runtime operations
pub type CoreResult<T> = std::result::Result<T, Status>;
