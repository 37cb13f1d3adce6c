//! Error types for mixing operations
//!
//! Configuration problems and shape disagreements are fatal and surface as
//! [`MixError`]. A region selector that cannot produce a sampling distribution
//! is not an error: it yields `None` and the mixer skips that item.

use std::fmt;

/// Result type alias for mixing operations
pub type MixResult<T> = Result<T, MixError>;

/// Error type for policy construction and batch mixing
#[derive(Debug, Clone, PartialEq)]
pub enum MixError {
    /// Requested augmentation variant does not exist
    UnknownStrategy {
        name: String,
        available: Vec<&'static str>,
    },

    /// Invalid configuration parameter
    InvalidConfiguration {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Array extents disagree (images vs labels vs saliency maps)
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Adaptive variant invoked without an error matrix
    MissingErrorMatrix { variant: String },

    /// Batch contents violate a numeric precondition
    InvalidInput { context: String, reason: String },
}

impl fmt::Display for MixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixError::UnknownStrategy { name, available } => {
                write!(
                    f,
                    "Unknown augmentation strategy '{}'; available: {}",
                    name,
                    available.join(", ")
                )
            }
            MixError::InvalidConfiguration {
                parameter,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid configuration for parameter '{}' with value '{}': {}",
                    parameter, value, reason
                )
            }
            MixError::ShapeMismatch {
                context,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Shape mismatch in {}: expected {:?}, got {:?}",
                    context, expected, got
                )
            }
            MixError::MissingErrorMatrix { variant } => {
                write!(
                    f,
                    "Variant '{}' selects partners from an error matrix, but none was supplied",
                    variant
                )
            }
            MixError::InvalidInput { context, reason } => {
                write!(f, "Invalid input in {}: {}", context, reason)
            }
        }
    }
}

impl std::error::Error for MixError {}

impl MixError {
    /// Create an unknown strategy error
    pub fn unknown_strategy(name: impl Into<String>, available: Vec<&'static str>) -> Self {
        MixError::UnknownStrategy {
            name: name.into(),
            available,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(
        parameter: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        MixError::InvalidConfiguration {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: &[usize],
        got: &[usize],
    ) -> Self {
        MixError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create a missing error matrix error
    pub fn missing_error_matrix(variant: impl Into<String>) -> Self {
        MixError::MissingErrorMatrix {
            variant: variant.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(context: impl Into<String>, reason: impl Into<String>) -> Self {
        MixError::InvalidInput {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error stems from configuration rather than batch contents
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MixError::UnknownStrategy { .. }
                | MixError::InvalidConfiguration { .. }
                | MixError::MissingErrorMatrix { .. }
        )
    }
}
