//! Error types for the MAAS network interface reconciler.
//!
//! The hierarchy follows the lifecycle of an operation: manifest and
//! identifier validation first, then identifier resolution, then the
//! remote call itself, and finally local state persistence.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciler.
#[derive(Debug, Error)]
pub enum NetifError {
    /// Manifest-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed input caught before any remote call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An identifier did not resolve to exactly one remote object.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// The remote inventory rejected a request or could not be reached.
    #[error("MAAS API error: {0}")]
    Maas(#[from] MaasError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The operation was cancelled between two remote calls.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Manifest-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A manifest value failed validation.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Two resources of the same kind share a key.
    #[error("Duplicate {resource_type} key: {key}")]
    DuplicateKey {
        /// Kind of resource (bridge, vlan, machine).
        resource_type: String,
        /// The duplicated key.
        key: String,
    },
}

/// Input rejected before any remote call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The composite import identifier is not `MACHINE:INTERFACE_ID`.
    #[error("unexpected format of ID ({id:?}), expected MACHINE:{expected}")]
    ImportIdFormat {
        /// The identifier as supplied.
        id: String,
        /// Name of the second component, e.g. `BRIDGE_ID`.
        expected: &'static str,
    },

    /// Fields that must not be set together (or must be set alone) were violated.
    #[error("exactly one of {fields} must be set")]
    ExactlyOneOf {
        /// Comma-separated list of the competing fields.
        fields: String,
    },

    /// A required field is missing or empty.
    #[error("field `{field}` is required")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// The stored interface identifier is not numeric.
    #[error("invalid interface id {id:?}")]
    InterfaceId {
        /// The offending identifier.
        id: String,
    },
}

/// Identifier resolution errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No remote object matched the identifier.
    #[error("{kind} ({identifier}) was not found")]
    NotFound {
        /// Kind of object looked up.
        kind: &'static str,
        /// The identifier as supplied.
        identifier: String,
    },

    /// More than one remote object matched the identifier.
    #[error("{kind} identifier ({identifier}) is ambiguous: matched {candidates}")]
    Ambiguous {
        /// Kind of object looked up.
        kind: &'static str,
        /// The identifier as supplied.
        identifier: String,
        /// Human-readable list of the matching candidates.
        candidates: String,
    },
}

/// MAAS API errors.
#[derive(Debug, Error)]
pub enum MaasError {
    /// Authentication failed.
    #[error("MAAS authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The API key is not in `consumer:token:secret` form.
    #[error("Malformed MAAS API key: expected consumer:token:secret")]
    MalformedApiKey,

    /// The requested object does not exist (HTTP 404).
    #[error("MAAS object not found: {resource}")]
    NotFound {
        /// Path of the missing object.
        resource: String,
    },

    /// API request failed.
    #[error("MAAS API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the API, verbatim.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with MAAS: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from MAAS API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// No resource with this key is tracked.
    #[error("No {kind} named '{key}' in state")]
    UnknownResource {
        /// Resource kind.
        kind: String,
        /// Resource key.
        key: String,
    },
}

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, NetifError>;

impl NetifError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the remote system reported the object as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Maas(MaasError::NotFound { .. }))
    }

    /// Returns true if a transport-level retry could succeed.
    ///
    /// Only the HTTP client consults this, and only for reads.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Maas(MaasError::NetworkError { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ResolveError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl MaasError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
