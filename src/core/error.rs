//! Unified error handling for the endpoint registry.
//!
//! All registry components report failures through [`RegistryError`], so
//! callers see one taxonomy regardless of which layer raised the problem.

use std::fmt;

/// Unified error types for the endpoint registry.
#[derive(Debug)]
pub enum RegistryError {
    /// Configuration-related errors (duplicate technical key, malformed
    /// config document). Rejected at entity-write time, before any route
    /// action.
    Configuration(String),

    /// Entity or config document failed validation.
    Validation(String),

    /// A rule install clashed with a rule owned by a different name.
    Conflict(String),

    /// One route install in a registration pass failed. Rules installed
    /// earlier in the same pass remain installed.
    PartialRegistration {
        app: String,
        installed: usize,
        reason: String,
    },

    /// A referenced application, service or route no longer exists.
    /// Expected on stale-client paths and reported as a client outcome.
    NotFound(String),

    /// A service method invocation failed.
    ServiceCall(String),

    /// Internal system errors.
    Internal(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            RegistryError::Validation(msg) => write!(f, "Validation error: {msg}"),
            RegistryError::Conflict(msg) => write!(f, "Rule conflict: {msg}"),
            RegistryError::PartialRegistration {
                app,
                installed,
                reason,
            } => write!(
                f,
                "Partial registration for application '{app}': {installed} rule(s) installed before failure: {reason}"
            ),
            RegistryError::NotFound(msg) => write!(f, "Not found: {msg}"),
            RegistryError::ServiceCall(msg) => write!(f, "Service call failed: {msg}"),
            RegistryError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Helper trait for adding context to errors.
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> RegistryResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> RegistryResult<T> {
        self.map_err(|e| RegistryError::Internal(format!("{context}: {e}")))
    }
}
