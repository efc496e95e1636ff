//! Shared primitives for all Rust crates in kome.

#![forbid(unsafe_code)]

mod digest;

use thiserror::Error;

pub use digest::ContentDigest;

/// Result type used across kome crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid startup configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Remote store or API unreachable or rejected the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
