//! Declarative constraints and their evaluator.
//!
//! Constraints are plain values attached to an [`ObjectDescriptor`] at
//! setup time. A [`Constraint`] targets one field and only ever sees a
//! successfully converted value; fields that kept their default or
//! failed conversion are skipped. An [`ObjectConstraint`] sees the whole
//! bound instance and reports under [`OBJECT_FIELD`].
//!
//! # Example
//!
//! ```rust
//! use archimedes_binding::{BoundObject, Constraint, Value};
//!
//! let rule = Constraint::length("name", 2, 10);
//! assert!(rule.check(&Value::Str("Ada".into())));
//! assert!(!rule.check(&Value::Str("A".into())));
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;

use crate::descriptor::{FieldType, ObjectDescriptor};
use crate::result::{BindingResult, FieldError};
use crate::value::{BoundObject, FieldState, Value};

/// Pseudo-field name under which object-level violations are reported.
///
/// Nested objects report under `<path>.$object`.
pub const OBJECT_FIELD: &str = "$object";

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type ObjectPredicate = Arc<dyn Fn(&BoundObject) -> bool + Send + Sync>;

/// A named rule over one field's converted value.
#[derive(Clone)]
pub struct Constraint {
    field: String,
    rule: String,
    message: String,
    predicate: Predicate,
}

impl Constraint {
    /// Creates a constraint from an arbitrary predicate.
    pub fn new<F>(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Text must contain a non-whitespace character.
    #[must_use]
    pub fn not_blank(field: impl Into<String>) -> Self {
        Self::new(field, "not_blank", "must not be blank", |value| match value {
            Value::Str(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        })
    }

    /// Text, collection or file must not be empty.
    #[must_use]
    pub fn not_empty(field: impl Into<String>) -> Self {
        Self::new(field, "not_empty", "must not be empty", |value| match value {
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::File(file) => !file.is_empty(),
            Value::Null => false,
            _ => true,
        })
    }

    /// Text must be an e-mail address. Empty text passes.
    #[must_use]
    pub fn email(field: impl Into<String>) -> Self {
        Self::new(
            field,
            "email",
            "must be a well-formed email address",
            |value| match value {
                Value::Str(s) if !s.is_empty() => {
                    email_regex().is_some_and(|re| re.is_match(s))
                }
                _ => true,
            },
        )
    }

    /// Whole text must match a regular expression.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `pattern` does not compile.
    pub fn matches(field: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        let message = format!("must match \"{pattern}\"");
        Ok(Self::new(field, "matches", message, move |value| {
            value.as_str().map_or(true, |s| re.is_match(s))
        }))
    }

    /// Number must be at least `min`.
    #[must_use]
    pub fn min(field: impl Into<String>, min: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let bound = min as f64;
        Self::new(
            field,
            "min",
            format!("must be greater than or equal to {min}"),
            move |value| value.as_f64().map_or(true, |n| n >= bound),
        )
    }

    /// Number must be at most `max`.
    #[must_use]
    pub fn max(field: impl Into<String>, max: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let bound = max as f64;
        Self::new(
            field,
            "max",
            format!("must be less than or equal to {max}"),
            move |value| value.as_f64().map_or(true, |n| n <= bound),
        )
    }

    /// Number must lie in `min..=max`.
    #[must_use]
    pub fn range(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(
            field,
            "range",
            format!("must be between {min} and {max}"),
            move |value| value.as_f64().map_or(true, |n| (min..=max).contains(&n)),
        )
    }

    /// Text length in characters must lie in `min..=max`.
    #[must_use]
    pub fn length(field: impl Into<String>, min: usize, max: usize) -> Self {
        Self::new(
            field,
            "length",
            format!("length must be between {min} and {max}"),
            move |value| {
                value
                    .as_str()
                    .map_or(true, |s| (min..=max).contains(&s.chars().count()))
            },
        )
    }

    /// Collection size must lie in `min..=max`.
    #[must_use]
    pub fn size(field: impl Into<String>, min: usize, max: usize) -> Self {
        Self::new(
            field,
            "size",
            format!("size must be between {min} and {max}"),
            move |value| value.as_list().map_or(true, |items| (min..=max).contains(&items.len())),
        )
    }

    /// Date or date-time must be before now (UTC).
    #[must_use]
    pub fn past(field: impl Into<String>) -> Self {
        Self::new(field, "past", "must be a past date", |value| {
            let now = Utc::now().naive_utc();
            match value {
                Value::Date(d) => *d < now.date(),
                Value::DateTime(dt) => *dt < now,
                _ => true,
            }
        })
    }

    /// Date or date-time must be after now (UTC).
    #[must_use]
    pub fn future(field: impl Into<String>) -> Self {
        Self::new(field, "future", "must be a future date", |value| {
            let now = Utc::now().naive_utc();
            match value {
                Value::Date(d) => *d > now.date(),
                Value::DateTime(dt) => *dt > now,
                _ => true,
            }
        })
    }

    /// Uploaded file must not exceed `max_bytes`.
    #[must_use]
    pub fn max_file_size(field: impl Into<String>, max_bytes: u64) -> Self {
        Self::new(
            field,
            "max_file_size",
            format!("file must not exceed {max_bytes} bytes"),
            move |value| value.as_file().map_or(true, |f| f.size_bytes() <= max_bytes),
        )
    }

    /// Uploaded file's content type must be one of `allowed`.
    ///
    /// Entries may use a wildcard subtype, e.g. `image/*`.
    #[must_use]
    pub fn content_type(field: impl Into<String>, allowed: &[&str]) -> Self {
        let allowed: Vec<String> = allowed.iter().map(|a| a.to_ascii_lowercase()).collect();
        let message = format!("content type must be one of {}", allowed.join(", "));
        Self::new(field, "content_type", message, move |value| {
            let Some(file) = value.as_file() else {
                return true;
            };
            let Some(media) = file.mime() else {
                return false;
            };
            allowed.iter().any(|a| match a.strip_suffix("/*") {
                Some(top) => media.type_().as_str() == top,
                None => media.essence_str() == a,
            })
        })
    }

    /// Replaces the violation message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Target field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Rule name.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Violation message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Runs the predicate.
    #[must_use]
    pub fn check(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("field", &self.field)
            .field("rule", &self.rule)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A cross-field rule over the whole bound instance.
#[derive(Clone)]
pub struct ObjectConstraint {
    rule: String,
    message: String,
    predicate: ObjectPredicate,
}

impl ObjectConstraint {
    /// Creates an object-level constraint.
    pub fn new<F>(rule: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&BoundObject) -> bool + Send + Sync + 'static,
    {
        Self {
            rule: rule.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Rule name.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Violation message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Runs the predicate.
    #[must_use]
    pub fn check(&self, instance: &BoundObject) -> bool {
        (self.predicate)(instance)
    }
}

impl fmt::Debug for ObjectConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectConstraint")
            .field("rule", &self.rule)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Evaluates the constraints of `descriptor` against `instance`.
///
/// Fields are visited in declaration order; each bound field runs its
/// constraints in declaration order, nested objects are evaluated in
/// place, and object-level constraints run last.
pub(crate) fn evaluate(
    instance: &BoundObject,
    descriptor: &ObjectDescriptor,
    prefix: &str,
    result: &mut BindingResult,
) {
    for field in descriptor.fields() {
        let name = field.name();
        let path = qualify(prefix, name);
        let Some(value) = instance.get(name) else {
            continue;
        };

        if instance.state(name) == Some(FieldState::Bound) {
            for constraint in descriptor.constraints().iter().filter(|c| c.field == name) {
                if !constraint.check(value) {
                    result.push(FieldError::violation(
                        path.clone(),
                        constraint.rule.clone(),
                        constraint.message.clone(),
                        rejected_value(value),
                    ));
                }
            }
        }

        match (field.field_type(), value) {
            (FieldType::Object(nested), Value::Object(object)) => {
                evaluate(object, nested, &path, result);
            }
            (FieldType::Collection(element), Value::List(items)) => {
                if let FieldType::Object(nested) = element.as_ref() {
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Object(object) = item {
                            evaluate(object, nested, &format!("{path}[{i}]"), result);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for constraint in descriptor.object_constraints() {
        if !constraint.check(instance) {
            result.push(FieldError::violation(
                qualify(prefix, OBJECT_FIELD),
                constraint.rule.clone(),
                constraint.message.clone(),
                None,
            ));
        }
    }
}

pub(crate) fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn rejected_value(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Date(d) => Some(d.to_string()),
        Value::DateTime(dt) => Some(dt.to_string()),
        Value::Time(t) => Some(t.to_string()),
        Value::Uuid(u) => Some(u.to_string()),
        Value::File(file) => file.original_filename().map(str::to_string),
        Value::Null | Value::Object(_) | Value::List(_) => None,
    }
}
