//! Error types for the fim library
//!
//! This module defines all error types that can occur while walking a tree,
//! persisting a baseline, or running the monitor loop. Per-file read problems
//! during a walk are *not* errors: they are collected as
//! [`WalkWarning`](crate::types::WalkWarning)s and the walk continues.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the fim library
pub type Result<T> = std::result::Result<T, FimError>;

/// Main error type for all fim operations
#[derive(Debug, Error)]
pub enum FimError {
    /// The monitored root is missing, not a directory, or unreadable
    #[error("Cannot access root {path:?}: {reason}")]
    IoAccess {
        /// Root path that could not be accessed
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// No baseline exists at the given location
    #[error("Baseline not found: {0:?}")]
    BaselineNotFound(PathBuf),

    /// A baseline exists but cannot be parsed or is missing required fields
    #[error("Baseline corrupt at {path:?}: {reason}")]
    BaselineCorrupt {
        /// Location of the baseline file
        path: PathBuf,
        /// Parse or validation failure
        reason: String,
    },

    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FimError {
    /// Create an access error for `path` with a custom reason
    pub fn io_access(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FimError::IoAccess {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt-baseline error with a custom reason
    pub fn baseline_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FimError::BaselineCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        FimError::Internal(msg.into())
    }

    /// Check if this error concerns the stored baseline
    pub fn is_baseline_error(&self) -> bool {
        matches!(
            self,
            FimError::BaselineNotFound(_) | FimError::BaselineCorrupt { .. }
        )
    }

    /// Check if this error must terminate a running monitor
    ///
    /// A failed walk or report write only costs one cycle; losing the
    /// baseline ends the loop.
    pub fn is_fatal_for_monitor(&self) -> bool {
        self.is_baseline_error() || matches!(self, FimError::InvalidConfiguration(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            FimError::BaselineNotFound(path) => {
                format!(
                    "No baseline at {:?}. Run 'fim <ROOT> init' first to record one.",
                    path
                )
            }
            FimError::BaselineCorrupt { path, reason } => {
                format!(
                    "Baseline {:?} is unreadable ({}). Re-create it with 'fim <ROOT> accept' \
                     once you trust the current state.",
                    path, reason
                )
            }
            FimError::IoAccess { path, reason } => {
                format!(
                    "Cannot read {:?}: {}. Check that it exists, is a directory and is readable.",
                    path, reason
                )
            }
            _ => self.to_string(),
        }
    }
}
