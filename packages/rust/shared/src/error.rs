//! Error types for SiteForge.
//!
//! Library crates use [`SiteForgeError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! Boundary errors (`Validation`, `NotFound`, `Authorization`) surface
//! synchronously to the caller. `Generation` errors raised mid-pipeline are
//! never returned to the original caller — they are captured in the persisted
//! `WebsiteVersion` row and observed by polling.

use std::path::PathBuf;

/// Top-level error type for all SiteForge operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteForgeError {
    /// Missing or ill-formed trigger/patch input.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Unknown property, website version, or section id.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Caller's organization does not own the property.
    #[error("authorization error: {message}")]
    Authorization { message: String },

    /// An orchestrated generation stage failed (timeout, malformed output,
    /// or the underlying completion service reporting an error).
    #[error("generation error: {0}")]
    Generation(String),

    /// A proposed patch batch violated a validation rule. The whole batch is
    /// rejected; `rule` names the violated rule and `op_index` the offending
    /// operation.
    #[error("patch validation failed at operation {op_index}: {rule}")]
    PatchValidation { rule: String, op_index: usize },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the CMS or the completion service.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteForgeError>;

impl SiteForgeError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create an authorization error from any displayable message.
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a patch-validation error naming the rule and operation index.
    pub fn patch_rule(rule: impl Into<String>, op_index: usize) -> Self {
        Self::PatchValidation {
            rule: rule.into(),
            op_index,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry could plausibly succeed. Only network-level failures
    /// qualify; malformed output and rule violations are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteForgeError::validation("propertyId is required");
        assert_eq!(err.to_string(), "validation error: propertyId is required");

        let err = SiteForgeError::patch_rule("unknown block_ref 'mega-hero'", 2);
        assert_eq!(
            err.to_string(),
            "patch validation failed at operation 2: unknown block_ref 'mega-hero'"
        );
    }

    #[test]
    fn only_network_errors_are_transient() {
        assert!(SiteForgeError::Network("connection reset".into()).is_transient());
        assert!(!SiteForgeError::Generation("missing pages key".into()).is_transient());
        assert!(!SiteForgeError::validation("bad input").is_transient());
    }
}
