//! Binding error types.
//!
//! Malformed request data never surfaces here: it becomes a
//! [`FieldError`](crate::FieldError) inside a [`BindingResult`](crate::BindingResult).
//! The types in this module cover the hard failures only: descriptor
//! defects found at setup time, conversion rule failures (wrapped into
//! field errors by the binder), and cancellation of a pass.

use thiserror::Error;

use crate::descriptor::{ScalarType, SourceHint};

/// A defect in an object descriptor, detected by
/// [`Binder::prepare`](crate::Binder::prepare).
///
/// A descriptor that fails preparation never produces a
/// [`BindingSchema`](crate::BindingSchema), so it cannot be used at
/// request time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No conversion rule is registered for the field's target type.
    #[error("no conversion rule registered for {scalar} (field '{field}' of {target})")]
    NoConverter {
        /// Object type name.
        target: String,
        /// Field path.
        field: String,
        /// The unresolved target type.
        scalar: ScalarType,
    },

    /// A date/time field has no pattern and no global default exists.
    #[error("field '{field}' of {target} is a {scalar} field but declares no pattern")]
    MissingPattern {
        /// Object type name.
        target: String,
        /// Field path.
        field: String,
        /// The temporal target type.
        scalar: ScalarType,
    },

    /// The field's pattern cannot be compiled for its target type.
    #[error("invalid pattern '{pattern}' for field '{field}': {reason}")]
    InvalidPattern {
        /// Field path.
        field: String,
        /// The offending pattern.
        pattern: String,
        /// Why the pattern was rejected.
        reason: String,
    },

    /// The field's source hint cannot supply its target type.
    #[error("field '{field}' cannot be bound from source '{source_hint}'")]
    UnsupportedSource {
        /// Field path.
        field: String,
        /// The declared source hint.
        source_hint: SourceHint,
    },

    /// A collection declares another collection as its element type.
    #[error("field '{field}' of {target} is a collection of collections")]
    NestedCollection {
        /// Object type name.
        target: String,
        /// Field path.
        field: String,
    },

    /// Two fields share a name.
    #[error("duplicate field '{field}' in {target}")]
    DuplicateField {
        /// Object type name.
        target: String,
        /// The repeated field name.
        field: String,
    },

    /// A constraint refers to a field the descriptor does not declare.
    #[error("constraint '{rule}' refers to undeclared field '{field}' of {target}")]
    UnknownConstraintField {
        /// Object type name.
        target: String,
        /// The undeclared field name.
        field: String,
        /// Rule name of the constraint.
        rule: String,
    },
}

/// Failure reported by a conversion rule.
///
/// The binder turns this into a `TYPE_MISMATCH` field error; it never
/// propagates out of a binding pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    /// Creates a conversion error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates the standard "cannot convert" error for a target type.
    #[must_use]
    pub fn invalid(value: &str, scalar: &ScalarType) -> Self {
        Self::new(format!("cannot convert '{value}' to {scalar}"))
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a binding pass that did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    /// The supplied cancellation signal fired before the pass finished.
    #[error("binding of {target} cancelled before field '{field}'")]
    Cancelled {
        /// Object type name.
        target: String,
        /// The field about to be processed when cancellation was observed.
        field: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_converter_message() {
        let err = ConfigurationError::NoConverter {
            target: "Order".to_string(),
            field: "amount".to_string(),
            scalar: ScalarType::custom("money"),
        };

        let msg = err.to_string();
        assert!(msg.contains("money"));
        assert!(msg.contains("amount"));
        assert!(msg.contains("Order"));
    }

    #[test]
    fn test_missing_pattern_message() {
        let err = ConfigurationError::MissingPattern {
            target: "Person".to_string(),
            field: "dob".to_string(),
            scalar: ScalarType::Date,
        };

        assert_eq!(
            err.to_string(),
            "field 'dob' of Person is a date field but declares no pattern"
        );
    }

    #[test]
    fn test_conversion_error_invalid() {
        let err = ConversionError::invalid("abc", &ScalarType::Integer);
        assert_eq!(err.message(), "cannot convert 'abc' to integer");
    }

    #[test]
    fn test_cancelled_message() {
        let err = BindError::Cancelled {
            target: "Upload".to_string(),
            field: "files".to_string(),
        };
        assert!(err.to_string().contains("cancelled"));
        assert!(err.to_string().contains("files"));
    }
}
