//! Error types and error code constants for faultline.
//!
//! Most of the pipeline is deliberately infallible: extraction failures void a
//! single row, result-file problems void a single line, and process failures
//! degrade to "no predictions". The errors here cover the remaining cases where
//! a caller handed us something we cannot work with.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Configuration errors (subject file missing or malformed)
//! - `4`: I/O errors (cannot read inputs or write outputs)
//! - `10`: Internal errors (bugs, unexpected state)

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable exit codes for the command-line front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Subject configuration could not be loaded or validated.
    ConfigError = 3,
    /// Reading inputs or writing outputs failed.
    IoError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Core Error Type
// ============================================================================

/// Errors raised by the core data structures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A feature item was registered after extraction started.
    #[error("feature registry is frozen; cannot register '{name}'")]
    RegistryFrozen { name: String },

    /// Two feature items share a column name.
    #[error("duplicate feature item name '{name}'")]
    DuplicateFeature { name: String },

    /// A feature item name would corrupt the header line.
    #[error("invalid feature item name '{name}': {reason}")]
    InvalidFeatureName { name: String, reason: String },
}

impl From<&CoreError> for OutputErrorCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::RegistryFrozen { .. } => OutputErrorCode::InternalError,
            CoreError::DuplicateFeature { .. } | CoreError::InvalidFeatureName { .. } => {
                OutputErrorCode::InvalidArguments
            }
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
