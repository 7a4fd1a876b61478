//! Error types for the triage pipeline

use crate::schema::FieldKind;

/// Result type alias using the triage Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced at the service boundary
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-fixable input problems
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The classifier refused the feature vector
    #[error("inference error ({fault}): {message}")]
    Inference {
        fault: InferenceFault,
        message: String,
    },

    /// Model artifact could not be loaded (startup only)
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Transient storage failure or timeout
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Data reached the store that it refused to accept or return
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an inference error for a vector the model rejected
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Inference {
            fault: InferenceFault::Rejected,
            message: msg.into(),
        }
    }

    /// Create an inference error for a builder/adapter schema mismatch
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::Inference {
            fault: InferenceFault::SchemaMismatch,
            message: msg.into(),
        }
    }

    /// Create an inference error for a model that broke its output contract
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Inference {
            fault: InferenceFault::Contract,
            message: msg.into(),
        }
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new store unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for this error class
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Inference { .. } => "inference_error",
            Self::ModelLoad(_) => "model_load_error",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Config(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Inference { fault, .. } => fault.is_client_fault(),
            _ => false,
        }
    }

    /// Whether retrying the whole call is safe and may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Origin of an inference failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceFault {
    /// The model refused values supplied by the caller (e.g. an unseen category)
    Rejected,
    /// The vector was built against a different schema than the adapter expects
    SchemaMismatch,
    /// The model returned output outside its declared contract
    Contract,
}

impl InferenceFault {
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for InferenceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rejected => "rejected",
            Self::SchemaMismatch => "schema mismatch",
            Self::Contract => "contract",
        };
        f.write_str(s)
    }
}

/// Input-shape and type problems found by the feature vector builder
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Every required field that is absent or null
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// A value that cannot be coerced to the field's declared kind
    #[error("field '{field}' expects {expected}, got {value}")]
    InvalidType {
        field: String,
        value: String,
        expected: FieldKind,
    },

    /// A numeric value outside the field's declared bounds
    #[error("field '{field}' value {value} is outside {}", describe_bounds(.min, .max))]
    OutOfRange {
        field: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// A category missing from the configured encoding table
    #[error("field '{field}' has unknown category '{value}'")]
    UnknownCategory { field: String, value: String },

    /// Keys that match no field (only when unknown fields are rejected)
    #[error("unexpected fields: {}", .0.join(", "))]
    UnexpectedFields(Vec<String>),

    /// The same field supplied under more than one key
    #[error("field '{field}' supplied more than once (keys: {})", .keys.join(", "))]
    DuplicateField { field: String, keys: Vec<String> },

    /// Positional payload with the wrong number of elements
    #[error("expected {expected} positional values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Payload that is neither an object nor an array
    #[error("unsupported payload: expected object or array, got {0}")]
    UnsupportedPayload(String),
}

impl ValidationError {
    /// Names of the offending fields, for client-facing responses
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::MissingFields(fields) | Self::UnexpectedFields(fields) => fields.clone(),
            Self::InvalidType { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::UnknownCategory { field, .. }
            | Self::DuplicateField { field, .. } => vec![field.clone()],
            Self::ArityMismatch { .. } | Self::UnsupportedPayload(_) => Vec::new(),
        }
    }
}

fn describe_bounds(min: &Option<f64>, max: &Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{min}, {max}]"),
        (Some(min), None) => format!("[{min}, +inf)"),
        (None, Some(max)) => format!("(-inf, {max}]"),
        (None, None) => "its bounds".to_string(),
    }
}
