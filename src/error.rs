use thiserror::Error;

/// Result type for a generation run.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// Errors that abort a generation run with no partial output.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// The document carries no path set at all
    #[error("document declares no path set")]
    MissingPaths,

    /// Neither a `swagger: 2.0` nor an `openapi: 3.x` document
    #[error("unsupported document dialect: {0}")]
    UnsupportedDialect(String),

    /// The document text could not be decoded into the detected dialect
    #[error("failed to decode {dialect} document: {source}")]
    Decode {
        dialect: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Router strategy name not recognised
    #[error("unknown router strategy '{0}' (expected one of: stdlib, chi, gorilla, echo)")]
    InvalidRouterStrategy(String),

    /// Strict mode and an enabled extension has nothing to generate for
    #[error("extension '{extension}' requires at least one operation")]
    NoOperations { extension: &'static str },
}

/// A failure scoped to one server extension. The pipeline reports it as a
/// critical issue and drops that extension's declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("operation '{operation}': parameter '{parameter}' cannot be bound: {reason}")]
    UnbindableParameter {
        operation: String,
        parameter: String,
        reason: String,
    },

    #[error("operation '{operation}': {reason}")]
    Unsupported { operation: String, reason: String },
}
