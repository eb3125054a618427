//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`PrismError`] covers all failure modes including:
//! - Shader variant compilation failures
//! - Settings document parse errors
//! - Structural invariant violations (descriptor / flag mismatches)
//! - Device collaborator failures
//!
//! # Recovery policy
//!
//! Compile and parse errors are recovered where they happen: the variant cache
//! stores a failure sentinel, settings loading falls back to the declared
//! default of the offending field. Only invariant violations are meant to be
//! surfaced loudly.
//!
//! ```rust,ignore
//! use prism::errors::{PrismError, Result};
//!
//! fn setup() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::renderer::pipeline::VariantKey;

/// A single shader variant failed to build.
///
/// Cached by the variant cache as a sentinel so that repeated lookups of the
/// same key do not trigger compilation storms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Shader compile failed for {key}: {message}")]
pub struct CompileError {
    /// Variant that failed.
    pub key: VariantKey,
    /// Compiler diagnostic.
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn new(key: VariantKey, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum PrismError {
    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader variant failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Shader source preamble template failed to render.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    // ========================================================================
    // Structural Errors
    // ========================================================================
    /// A descriptor or flag set broke a structural invariant
    /// (unregistered technique, flag outside the technique's legal mask).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The requested feature is not registered.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// A lifecycle transition was requested from the wrong state.
    #[error("Feature {feature} cannot {action} while {state:?}")]
    InvalidLifecycle {
        /// Feature short name
        feature: String,
        /// Requested transition
        action: &'static str,
        /// Current state
        state: crate::features::FeatureState,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings document field could not be parsed.
    #[error("Config parse error in [{section}] {field}: {message}")]
    ConfigParse {
        /// Settings section (feature short name)
        section: String,
        /// Offending field
        field: String,
        /// Parser diagnostic
        message: String,
    },

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // I/O & Device Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The device collaborator rejected a request.
    #[error("Device error: {0}")]
    Device(String),

    /// The background compile workers are gone.
    #[error("Shader worker pool error: {0}")]
    WorkerPool(String),
}

impl<T> From<flume::SendError<T>> for PrismError {
    fn from(err: flume::SendError<T>) -> Self {
        PrismError::WorkerPool(err.to_string())
    }
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;
