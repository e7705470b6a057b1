//! Stable error descriptors for UI consumption.
//!
//! Errors that cross the store boundary carry a machine-readable code so a
//! consumer can branch on it without parsing display text.

/// Machine-readable code and retry hint for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Error descriptor suitable for rendering inline feedback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorDescriptor {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ErrorDescriptor {
    /// Build a descriptor from any [`ErrorCode`] implementor.
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { code: err.error_code(), message: err.to_string(), retryable: err.retryable() }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
