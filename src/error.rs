//! Unified error type for the faultline front door.
//!
//! `FaultlineError` bridges subject, core and I/O errors into one type the CLI
//! renders as a JSON error response with a stable exit code. The predictor
//! itself never produces one: its failures are logged and degrade to an empty
//! result.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use faultline_core::error::{CoreError, OutputErrorCode};

use crate::subject::SubjectError;

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum FaultlineError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Subject configuration could not be used.
    #[error(transparent)]
    Subject(#[from] SubjectError),

    /// Core data-structure error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading an input or writing an output failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FaultlineError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        FaultlineError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        FaultlineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&FaultlineError> for OutputErrorCode {
    fn from(err: &FaultlineError) -> Self {
        match err {
            FaultlineError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            FaultlineError::Subject(_) => OutputErrorCode::ConfigError,
            FaultlineError::Core(core) => OutputErrorCode::from(core),
            FaultlineError::Io { .. } => OutputErrorCode::IoError,
        }
    }
}

/// Result type for front-door operations.
pub type FaultlineResult<T> = Result<T, FaultlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_follow_variant() {
        let cases = [
            (
                FaultlineError::invalid_args("no sites"),
                OutputErrorCode::InvalidArguments,
            ),
            (
                FaultlineError::from(SubjectError::UnknownVariable {
                    variable: "model".to_string(),
                }),
                OutputErrorCode::ConfigError,
            ),
            (
                FaultlineError::io(
                    Path::new("sites.json"),
                    io::Error::new(io::ErrorKind::NotFound, "gone"),
                ),
                OutputErrorCode::IoError,
            ),
            (
                FaultlineError::from(CoreError::RegistryFrozen {
                    name: "line".to_string(),
                }),
                OutputErrorCode::InternalError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(OutputErrorCode::from(&err), code, "{err}");
        }
    }

    #[test]
    fn io_error_message_names_the_path() {
        let err = FaultlineError::io(
            Path::new("out/chart_1.var.tsv"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("out/chart_1.var.tsv"));
    }

    #[test]
    fn subject_error_is_transparent() {
        let err = FaultlineError::from(SubjectError::UnknownVariable {
            variable: "model".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "unknown template variable 'model' in predict command"
        );
    }
}
