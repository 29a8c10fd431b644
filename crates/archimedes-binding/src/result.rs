//! The binding/validation result accumulator.
//!
//! A [`BindingResult`] collects every [`FieldError`] of one pass in the
//! order they occurred. Errors are appended only by the binder and the
//! constraint evaluator; callers get read access.
//!
//! # Error codes
//!
//! | Code | Meaning | HTTP |
//! |---|---|---|
//! | `MISSING` | Required value absent | 400 |
//! | `TYPE_MISMATCH` | Value present but not convertible | 400 |
//! | `CONSTRAINT_VIOLATION` | Typed value breaks a rule | 422 |

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::constraint::OBJECT_FIELD;

/// Machine-readable kind of a field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A required value was absent.
    Missing,
    /// A present value could not be converted to the target type.
    TypeMismatch,
    /// A converted value failed a constraint.
    ConstraintViolation,
}

impl ErrorCode {
    /// Wire name of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
        }
    }

    /// Whether the code describes malformed input rather than a rule
    /// violation.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::Missing | Self::TypeMismatch)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path, e.g. `address.city` or `tags[2]`.
    pub field: String,
    /// Error kind.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// The offending raw or converted value, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_value: Option<String>,
    /// Name of the violated rule, for constraint violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl FieldError {
    /// A `MISSING` error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("'{field}' is required"),
            field,
            code: ErrorCode::Missing,
            rejected_value: None,
            rule: None,
        }
    }

    /// A `TYPE_MISMATCH` error.
    #[must_use]
    pub fn type_mismatch(
        field: impl Into<String>,
        message: impl Into<String>,
        rejected_value: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: ErrorCode::TypeMismatch,
            message: message.into(),
            rejected_value,
            rule: None,
        }
    }

    /// A `CONSTRAINT_VIOLATION` error.
    #[must_use]
    pub fn violation(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
        rejected_value: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: ErrorCode::ConstraintViolation,
            message: message.into(),
            rejected_value,
            rule: Some(rule.into()),
        }
    }

    /// Whether the error is recorded against the whole object.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.field == OBJECT_FIELD || self.field.ends_with(&format!(".{OBJECT_FIELD}"))
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.code, self.message)
    }
}

/// Ordered, append-only collection of the errors of one pass.
///
/// # Example
///
/// ```rust
/// use archimedes_binding::{BindingResult, ErrorCode};
///
/// let result = BindingResult::new("Order");
/// assert!(result.succeeded());
/// assert!(result.errors_for("sku").is_empty());
/// assert_eq!(result.status_code(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingResult {
    target: String,
    errors: Vec<FieldError>,
}

impl BindingResult {
    /// Creates an empty result for a target type.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            errors: Vec::new(),
        }
    }

    /// Name of the target type.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the pass recorded no errors.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors for exactly this field path, in order.
    #[must_use]
    pub fn errors_for(&self, field: &str) -> Vec<&FieldError> {
        self.errors.iter().filter(|e| e.field == field).collect()
    }

    /// Whether the field path has any error.
    #[must_use]
    pub fn has_field_errors(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// All errors in the order they were recorded.
    #[must_use]
    pub fn all_errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Errors recorded against whole objects.
    #[must_use]
    pub fn global_errors(&self) -> Vec<&FieldError> {
        self.errors.iter().filter(|e| e.is_global()).collect()
    }

    /// Number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Errors with the given code.
    pub fn errors_with_code(&self, code: ErrorCode) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.code == code)
    }

    /// HTTP status for rejecting the request, `None` on success.
    ///
    /// Malformed input maps to 400, rule violations alone to 422.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        if self.succeeded() {
            None
        } else if self.errors.iter().any(|e| e.code.is_input_error()) {
            Some(StatusCode::BAD_REQUEST)
        } else {
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        }
    }

    /// Serializable error envelope.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "target": self.target,
            "errors": self.errors,
        })
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    pub(crate) fn push(&mut self, error: FieldError) {
        tracing::trace!(
            target_type = %self.target,
            field = %error.field,
            code = %error.code,
            message = %error.message,
            "field error recorded"
        );
        self.errors.push(error);
    }
}

impl std::fmt::Display for BindingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} error(s)", self.target, self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BindingResult {
        let mut result = BindingResult::new("Order");
        result.push(FieldError::missing("sku"));
        result.push(FieldError::type_mismatch(
            "qty",
            "cannot convert 'x' to integer",
            Some("x".to_string()),
        ));
        result.push(FieldError::violation("note", "length", "too long", None));
        result.push(FieldError::violation(OBJECT_FIELD, "dates", "end before start", None));
        result
    }

    #[test]
    fn test_empty_result_succeeds() {
        let result = BindingResult::new("Order");
        assert!(result.succeeded());
        assert!(!result.has_errors());
        assert_eq!(result.status_code(), None);
    }

    #[test]
    fn test_accessors() {
        let result = sample();
        assert!(result.has_errors());
        assert_eq!(result.error_count(), 4);
        assert_eq!(result.errors_for("sku").len(), 1);
        assert_eq!(result.errors_for("sku")[0].code, ErrorCode::Missing);
        assert!(result.errors_for("other").is_empty());
        assert!(result.has_field_errors("qty"));
        assert_eq!(result.global_errors().len(), 1);
        assert_eq!(result.errors_with_code(ErrorCode::ConstraintViolation).count(), 2);
        assert_eq!(result.all_errors()[1].field, "qty");
    }

    #[test]
    fn test_status_code() {
        assert_eq!(sample().status_code(), Some(StatusCode::BAD_REQUEST));

        let mut rules_only = BindingResult::new("Order");
        rules_only.push(FieldError::violation("note", "length", "too long", None));
        assert_eq!(
            rules_only.status_code(),
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        );
    }

    #[test]
    fn test_serialized_envelope() {
        let json = sample().to_json();
        assert_eq!(json["target"], "Order");
        assert_eq!(json["errors"][0]["code"], "MISSING");
        assert_eq!(json["errors"][1]["code"], "TYPE_MISMATCH");
        assert_eq!(json["errors"][1]["rejected_value"], "x");
        assert_eq!(json["errors"][2]["rule"], "length");
        assert!(json["errors"][0].get("rule").is_none());
    }

    #[test]
    fn test_nested_object_errors_are_global() {
        let error = FieldError::violation(format!("address.{OBJECT_FIELD}"), "r", "m", None);
        assert!(error.is_global());
        assert!(!FieldError::missing("address.city").is_global());
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.starts_with("Order: 4 error(s)"));
        assert!(text.contains("sku [MISSING]"));
    }
}
