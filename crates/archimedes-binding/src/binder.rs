//! The object binder.
//!
//! A [`Binder`] owns the converter registry and the global defaults. It
//! turns an [`ObjectDescriptor`] into a [`BindingSchema`] once, at setup
//! time, rejecting descriptors that could not be bound. Request time
//! operations take only a prepared schema:
//!
//! ```rust
//! use archimedes_binding::{Binder, Constraint, FieldDescriptor, ObjectDescriptor, RequestView};
//! use http::Uri;
//!
//! let binder = Binder::new();
//! let schema = binder
//!     .prepare(
//!         &ObjectDescriptor::builder("Search")
//!             .field(FieldDescriptor::string("q").required())
//!             .field(FieldDescriptor::integer("limit"))
//!             .constraint(Constraint::max("limit", 100))
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let request = RequestView::builder()
//!     .uri(Uri::from_static("/search?q=rust&limit=500"))
//!     .build();
//! let (search, result) = binder.bind_and_validate(&request, &schema);
//!
//! assert_eq!(search.get("q").and_then(|v| v.as_str()), Some("rust"));
//! assert_eq!(result.errors_for("limit").len(), 1);
//! ```
//!
//! Binding never fails on malformed input: every problem becomes a
//! [`FieldError`] in the returned [`BindingResult`]. Only the cancellable
//! variants can return an error, [`BindError::Cancelled`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constraint::{self, qualify, OBJECT_FIELD};
use crate::convert::{check_pattern, ConverterRegistry};
use crate::descriptor::{FieldDescriptor, FieldType, ObjectDescriptor, ScalarType, SourceHint};
use crate::error::{BindError, ConfigurationError};
use crate::extract::{lookup_key, RawPayload, RawValue, SourceExtractor};
use crate::multipart::MultipartFilePart;
use crate::request::NormalizedRequest;
use crate::result::{BindingResult, FieldError};
use crate::value::{BoundObject, FieldState, Value};

/// Default cap on collection elements.
pub const DEFAULT_MAX_COLLECTION_ELEMENTS: usize = 1000;

/// Default cap on multipart text parts (64 KiB).
pub const DEFAULT_MAX_TEXT_PART_BYTES: u64 = 64 * 1024;

/// Global defaults applied to fields that do not set their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDefaults {
    /// Pattern for date fields without one.
    pub date_pattern: Option<String>,
    /// Pattern for date-time fields without one.
    pub date_time_pattern: Option<String>,
    /// Pattern for time fields without one.
    pub time_pattern: Option<String>,
    /// Pattern for numeric fields without one.
    pub number_pattern: Option<String>,
    /// Maximum elements bound into one collection.
    pub max_collection_elements: usize,
    /// Maximum accepted upload size, if limited.
    pub max_file_size_bytes: Option<u64>,
    /// Maximum size of a multipart part read as text.
    pub max_text_part_bytes: u64,
}

impl Default for BindingDefaults {
    fn default() -> Self {
        Self {
            date_pattern: None,
            date_time_pattern: None,
            time_pattern: None,
            number_pattern: None,
            max_collection_elements: DEFAULT_MAX_COLLECTION_ELEMENTS,
            max_file_size_bytes: None,
            max_text_part_bytes: DEFAULT_MAX_TEXT_PART_BYTES,
        }
    }
}

impl BindingDefaults {
    /// Sets the default date pattern.
    #[must_use]
    pub fn with_date_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.date_pattern = Some(pattern.into());
        self
    }

    /// Sets the default date-time pattern.
    #[must_use]
    pub fn with_date_time_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.date_time_pattern = Some(pattern.into());
        self
    }

    /// Sets the default time pattern.
    #[must_use]
    pub fn with_time_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.time_pattern = Some(pattern.into());
        self
    }

    /// Sets the default number pattern.
    #[must_use]
    pub fn with_number_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.number_pattern = Some(pattern.into());
        self
    }

    /// Sets the collection element cap.
    #[must_use]
    pub fn with_max_collection_elements(mut self, max: usize) -> Self {
        self.max_collection_elements = max;
        self
    }

    /// Sets the upload size limit.
    #[must_use]
    pub fn with_max_file_size_bytes(mut self, max: u64) -> Self {
        self.max_file_size_bytes = Some(max);
        self
    }

    /// Default pattern for a scalar type.
    #[must_use]
    pub fn pattern_for(&self, scalar: &ScalarType) -> Option<&str> {
        match scalar {
            ScalarType::Date => self.date_pattern.as_deref(),
            ScalarType::DateTime => self.date_time_pattern.as_deref(),
            ScalarType::Time => self.time_pattern.as_deref(),
            ScalarType::Integer | ScalarType::Float => self.number_pattern.as_deref(),
            _ => None,
        }
    }
}

/// A descriptor that passed preparation.
///
/// Effective patterns are resolved into every field, so binding never
/// consults the global defaults again.
#[derive(Debug, Clone)]
pub struct BindingSchema {
    descriptor: Arc<ObjectDescriptor>,
    registry: Arc<ConverterRegistry>,
    defaults: BindingDefaults,
}

impl BindingSchema {
    /// The prepared descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ObjectDescriptor {
        &self.descriptor
    }

    /// Target type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.descriptor.type_name()
    }

    /// Limits in effect for this schema.
    #[must_use]
    pub fn defaults(&self) -> &BindingDefaults {
        &self.defaults
    }
}

/// Binds requests into objects and validates them.
#[derive(Debug, Clone)]
pub struct Binder {
    registry: Arc<ConverterRegistry>,
    defaults: BindingDefaults,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder {
    /// A binder with the built-in converters and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(ConverterRegistry::with_builtins())
    }

    /// A binder over a custom registry.
    #[must_use]
    pub fn with_registry(registry: ConverterRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            defaults: BindingDefaults::default(),
        }
    }

    /// Replaces the global defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: BindingDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// The converter registry.
    #[must_use]
    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// The global defaults.
    #[must_use]
    pub fn defaults(&self) -> &BindingDefaults {
        &self.defaults
    }

    /// Checks a descriptor and resolves its effective patterns.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found: a field type with
    /// no conversion rule, a date/time field with no pattern, a pattern
    /// the type cannot use, a file field bound from a non-multipart
    /// source, a duplicate field, or a constraint on an undeclared field.
    pub fn prepare(&self, descriptor: &ObjectDescriptor) -> Result<BindingSchema, ConfigurationError> {
        match self.prepare_object(descriptor, "") {
            Ok(prepared) => {
                debug!(
                    target_type = %descriptor.type_name(),
                    fields = prepared.fields().len(),
                    "binding schema prepared"
                );
                Ok(BindingSchema {
                    descriptor: Arc::new(prepared),
                    registry: Arc::clone(&self.registry),
                    defaults: self.defaults.clone(),
                })
            }
            Err(e) => {
                warn!(target_type = %descriptor.type_name(), error = %e, "descriptor rejected");
                Err(e)
            }
        }
    }

    /// Binds a request into a new instance.
    ///
    /// Never fails: absent, malformed and unreadable values are recorded
    /// in the returned result.
    pub fn bind<R>(&self, request: &R, schema: &BindingSchema) -> (BoundObject, BindingResult)
    where
        R: NormalizedRequest + ?Sized,
    {
        match run(request, schema, None) {
            Ok(bound) => bound,
            // unreachable without a token
            Err(_) => (
                BoundObject::with_defaults(&schema.descriptor),
                BindingResult::new(schema.type_name()),
            ),
        }
    }

    /// Like [`bind`](Self::bind), checking `cancel` before collection and
    /// file fields.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Cancelled`] if the token fires during the
    /// pass. The partial instance is dropped, closing any file streams.
    pub fn bind_cancellable<R>(
        &self,
        request: &R,
        schema: &BindingSchema,
        cancel: &CancellationToken,
    ) -> Result<(BoundObject, BindingResult), BindError>
    where
        R: NormalizedRequest + ?Sized,
    {
        run(request, schema, Some(cancel))
    }

    /// Runs the schema's constraints against a bound instance, extending
    /// `result`.
    #[must_use]
    pub fn validate(
        &self,
        instance: &BoundObject,
        schema: &BindingSchema,
        mut result: BindingResult,
    ) -> BindingResult {
        constraint::evaluate(instance, &schema.descriptor, "", &mut result);
        debug!(
            target_type = %schema.type_name(),
            errors = result.error_count(),
            "validation finished"
        );
        result
    }

    /// Binds then validates.
    pub fn bind_and_validate<R>(
        &self,
        request: &R,
        schema: &BindingSchema,
    ) -> (BoundObject, BindingResult)
    where
        R: NormalizedRequest + ?Sized,
    {
        let (instance, result) = self.bind(request, schema);
        let result = self.validate(&instance, schema, result);
        (instance, result)
    }

    /// Binds then validates, honouring a cancellation signal.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Cancelled`] if the token fires before
    /// validation starts.
    pub fn bind_and_validate_cancellable<R>(
        &self,
        request: &R,
        schema: &BindingSchema,
        cancel: &CancellationToken,
    ) -> Result<(BoundObject, BindingResult), BindError>
    where
        R: NormalizedRequest + ?Sized,
    {
        let (instance, result) = self.bind_cancellable(request, schema, cancel)?;
        if cancel.is_cancelled() {
            return Err(cancelled(schema.type_name(), OBJECT_FIELD));
        }
        let result = self.validate(&instance, schema, result);
        Ok((instance, result))
    }

    fn prepare_object(
        &self,
        descriptor: &ObjectDescriptor,
        prefix: &str,
    ) -> Result<ObjectDescriptor, ConfigurationError> {
        let target = descriptor.type_name();
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(descriptor.fields().len());

        for field in descriptor.fields() {
            let path = qualify(prefix, field.name());
            if !seen.insert(field.name()) {
                return Err(ConfigurationError::DuplicateField {
                    target: target.to_string(),
                    field: path,
                });
            }
            fields.push(self.prepare_field(target, field, &path, false)?);
        }

        if let Some(constraint) = descriptor
            .constraints()
            .iter()
            .find(|c| !seen.contains(c.field()))
        {
            return Err(ConfigurationError::UnknownConstraintField {
                target: target.to_string(),
                field: qualify(prefix, constraint.field()),
                rule: constraint.rule().to_string(),
            });
        }

        Ok(descriptor.with_fields(fields))
    }

    fn prepare_field(
        &self,
        target: &str,
        field: &FieldDescriptor,
        path: &str,
        in_collection: bool,
    ) -> Result<FieldDescriptor, ConfigurationError> {
        match field.field_type() {
            FieldType::Scalar(scalar) => self.prepare_scalar(target, field, scalar, path),
            FieldType::File => match field.source() {
                SourceHint::Any | SourceHint::Multipart => Ok(field.clone()),
                source_hint => Err(ConfigurationError::UnsupportedSource {
                    field: path.to_string(),
                    source_hint,
                }),
            },
            FieldType::Object(nested) => {
                let prepared = self.prepare_object(nested, path)?;
                Ok(field.as_element(FieldType::Object(Arc::new(prepared))))
            }
            FieldType::Collection(_) if in_collection => Err(ConfigurationError::NestedCollection {
                target: target.to_string(),
                field: path.to_string(),
            }),
            FieldType::Collection(element) => {
                let element = self.prepare_field(
                    target,
                    &field.as_element(element.as_ref().clone()),
                    path,
                    true,
                )?;
                let element_type = element.field_type().clone();
                Ok(element.as_element(FieldType::Collection(Box::new(element_type))))
            }
        }
    }

    fn prepare_scalar(
        &self,
        target: &str,
        field: &FieldDescriptor,
        scalar: &ScalarType,
        path: &str,
    ) -> Result<FieldDescriptor, ConfigurationError> {
        let pattern = field
            .conversion_pattern()
            .or_else(|| self.defaults.pattern_for(scalar))
            .map(str::to_string);

        if self.registry.resolve(scalar, pattern.as_deref()).is_none() {
            return Err(ConfigurationError::NoConverter {
                target: target.to_string(),
                field: path.to_string(),
                scalar: scalar.clone(),
            });
        }

        match &pattern {
            None if scalar.is_temporal() => {
                return Err(ConfigurationError::MissingPattern {
                    target: target.to_string(),
                    field: path.to_string(),
                    scalar: scalar.clone(),
                });
            }
            // a rule registered for exactly this pattern owns its syntax
            Some(p) if !self.registry.has_exact(scalar, Some(p)) => {
                check_pattern(scalar, p).map_err(|reason| ConfigurationError::InvalidPattern {
                    field: path.to_string(),
                    pattern: p.clone(),
                    reason,
                })?;
            }
            _ => {}
        }

        Ok(field.with_effective_pattern(pattern))
    }
}

/// Outcome of binding one value.
enum Outcome {
    Absent,
    Bound(Value),
    Failed,
    /// Some elements of a collection failed; the rest are kept.
    Partial(Value),
}

impl Outcome {
    fn into_slot(self, default: Value) -> (Value, FieldState) {
        match self {
            Self::Absent => (default, FieldState::Default),
            Self::Bound(value) => (value, FieldState::Bound),
            Self::Failed => (default, FieldState::Failed),
            Self::Partial(value) => (value, FieldState::Failed),
        }
    }
}

fn run<R>(
    request: &R,
    schema: &BindingSchema,
    cancel: Option<&CancellationToken>,
) -> Result<(BoundObject, BindingResult), BindError>
where
    R: NormalizedRequest + ?Sized,
{
    let target = schema.type_name();
    debug!(target_type = %target, fields = schema.descriptor.fields().len(), "binding started");

    let mut pass = Pass {
        extractor: SourceExtractor::new(request, schema.defaults.max_text_part_bytes),
        registry: &schema.registry,
        defaults: &schema.defaults,
        cancel,
        target,
        result: BindingResult::new(target),
    };
    let instance = pass.bind_object(&schema.descriptor, "")?;

    if let Some(reason) = pass.extractor.body_error() {
        let error = FieldError::type_mismatch(OBJECT_FIELD, reason, None);
        pass.result.push(error);
    }

    debug!(target_type = %target, errors = pass.result.error_count(), "binding finished");
    Ok((instance, pass.result))
}

fn cancelled(target: &str, field: &str) -> BindError {
    BindError::Cancelled {
        target: target.to_string(),
        field: field.to_string(),
    }
}

/// State of one binding pass.
struct Pass<'a, 'r, R: ?Sized> {
    extractor: SourceExtractor<'r, R>,
    registry: &'a ConverterRegistry,
    defaults: &'a BindingDefaults,
    cancel: Option<&'a CancellationToken>,
    target: &'a str,
    result: BindingResult,
}

impl<R: NormalizedRequest + ?Sized> Pass<'_, '_, R> {
    fn checkpoint(&self, path: &str) -> Result<(), BindError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => {
                debug!(target_type = %self.target, field = %path, "binding cancelled");
                Err(cancelled(self.target, path))
            }
            _ => Ok(()),
        }
    }

    fn bind_object(
        &mut self,
        descriptor: &ObjectDescriptor,
        prefix: &str,
    ) -> Result<BoundObject, BindError> {
        let mut instance = BoundObject::with_defaults(descriptor);

        for field in descriptor.fields() {
            let path = qualify(prefix, field.name());
            let outcome = match field.field_type() {
                FieldType::Scalar(scalar) => {
                    let raw = self.extractor.extract(&path, field);
                    self.bind_scalar(&raw, field, scalar, &path, field.is_required())
                }
                FieldType::File => {
                    self.checkpoint(&path)?;
                    self.bind_file(field, &path)
                }
                FieldType::Object(nested) => self.bind_nested(field, nested, &path)?,
                FieldType::Collection(element) => {
                    self.checkpoint(&path)?;
                    self.bind_collection(field, element, &path)?
                }
            };

            let (value, state) = outcome.into_slot(Value::default_for(field.field_type()));
            instance.assign(field.name(), value, state);
        }

        Ok(instance)
    }

    fn bind_scalar(
        &mut self,
        raw: &RawValue,
        field: &FieldDescriptor,
        scalar: &ScalarType,
        path: &str,
        required: bool,
    ) -> Outcome {
        // blank text only counts as a value for string targets
        let absent = !raw.is_present() || (*scalar != ScalarType::String && raw.is_blank_text());
        if absent {
            if required {
                self.result.push(FieldError::missing(path));
            }
            return Outcome::Absent;
        }

        if let Some(RawPayload::Unreadable(reason)) = raw.payload() {
            self.result
                .push(FieldError::type_mismatch(path, reason.clone(), None));
            return Outcome::Failed;
        }

        let Some(rule) = self.registry.resolve(scalar, field.conversion_pattern()) else {
            self.result.push(FieldError::type_mismatch(
                path,
                format!("no conversion rule for {scalar}"),
                raw.text().map(str::to_string),
            ));
            return Outcome::Failed;
        };

        match rule(raw, field) {
            Ok(value) => Outcome::Bound(value),
            Err(e) => {
                self.result.push(FieldError::type_mismatch(
                    path,
                    e.message(),
                    raw.text().map(str::to_string),
                ));
                Outcome::Failed
            }
        }
    }

    fn bind_file(&mut self, field: &FieldDescriptor, path: &str) -> Outcome {
        let key = lookup_key(path, field);
        match self.extractor.extract_file(&key) {
            Some(file) if !file.is_empty() => self.accept_file(file, path),
            // a zero-byte upload is treated as no upload
            _ => {
                if field.is_required() {
                    self.result.push(FieldError::missing(path));
                }
                Outcome::Absent
            }
        }
    }

    fn accept_file(&mut self, file: MultipartFilePart, path: &str) -> Outcome {
        match self.defaults.max_file_size_bytes {
            Some(max) if file.size_bytes() > max => {
                self.result.push(FieldError::type_mismatch(
                    path,
                    format!("file of {} bytes exceeds the {max} byte limit", file.size_bytes()),
                    file.original_filename().map(str::to_string),
                ));
                Outcome::Failed
            }
            // the declared size may understate the stream, so reads stay capped
            Some(max) => Outcome::Bound(Value::File(file.with_size_limit(max))),
            None => Outcome::Bound(Value::File(file)),
        }
    }

    fn bind_nested(
        &mut self,
        field: &FieldDescriptor,
        nested: &ObjectDescriptor,
        path: &str,
    ) -> Result<Outcome, BindError> {
        let outer = std::mem::replace(&mut self.result, BindingResult::new(self.target));
        let bound = self.bind_object(nested, path);
        let inner = std::mem::replace(&mut self.result, outer);
        let object = bound?;

        let present = object
            .field_names()
            .any(|name| object.state(name) != Some(FieldState::Default));
        if present {
            self.result.absorb(inner);
            return Ok(Outcome::Bound(Value::Object(object)));
        }

        // an entirely absent nested object reports once, at its own path
        if field.is_required() {
            self.result.push(FieldError::missing(path));
        }
        Ok(Outcome::Absent)
    }

    fn bind_collection(
        &mut self,
        field: &FieldDescriptor,
        element: &FieldType,
        path: &str,
    ) -> Result<Outcome, BindError> {
        let limit = self.defaults.max_collection_elements;
        let element_field = field.as_element(element.clone());

        let (items, failed, overflow) = match element {
            FieldType::Scalar(scalar) => self.scalar_elements(&element_field, scalar, path, limit),
            FieldType::File => self.file_elements(&element_field, path, limit),
            FieldType::Object(nested) => self.object_elements(&element_field, nested, path, limit)?,
            // rejected by prepare
            FieldType::Collection(_) => (Vec::new(), false, false),
        };

        if overflow {
            self.result.push(FieldError::type_mismatch(
                path,
                format!("more than {limit} elements"),
                None,
            ));
        }

        if items.is_empty() && !failed && !overflow {
            if field.is_required() {
                self.result.push(FieldError::missing(path));
            }
            return Ok(Outcome::Absent);
        }

        if failed || overflow {
            return Ok(Outcome::Partial(Value::List(items)));
        }
        Ok(Outcome::Bound(Value::List(items)))
    }

    fn scalar_elements(
        &mut self,
        element: &FieldDescriptor,
        scalar: &ScalarType,
        path: &str,
        limit: usize,
    ) -> (Vec<Value>, bool, bool) {
        let raws = self.extractor.extract_all(path, element, limit.saturating_add(1));
        let overflow = raws.len() > limit;
        let mut failed = false;

        let items = raws
            .iter()
            .take(limit)
            .filter_map(|raw| {
                match self.bind_scalar(raw, element, scalar, raw.field_name(), false) {
                    Outcome::Bound(value) | Outcome::Partial(value) => Some(value),
                    Outcome::Failed => {
                        failed = true;
                        Some(Value::default_for(element.field_type()))
                    }
                    // blank occurrences are dropped by the extractor
                    Outcome::Absent => None,
                }
            })
            .collect();
        (items, failed, overflow)
    }

    fn file_elements(
        &mut self,
        element: &FieldDescriptor,
        path: &str,
        limit: usize,
    ) -> (Vec<Value>, bool, bool) {
        let key = lookup_key(path, element);
        let mut items = Vec::new();
        let mut failed = false;

        while let Some(file) = self.extractor.extract_file(&key) {
            if items.len() == limit {
                return (items, failed, true);
            }
            if file.is_empty() {
                continue;
            }
            let element_path = format!("{path}[{}]", items.len());
            match self.accept_file(file, &element_path) {
                Outcome::Bound(value) => items.push(value),
                _ => {
                    failed = true;
                    items.push(Value::Null);
                }
            }
        }
        (items, failed, false)
    }

    fn object_elements(
        &mut self,
        element: &FieldDescriptor,
        nested: &ObjectDescriptor,
        path: &str,
        limit: usize,
    ) -> Result<(Vec<Value>, bool, bool), BindError> {
        let key = lookup_key(path, element);
        let count = match element.source() {
            SourceHint::Body => self.extractor.body_array_len(&key).unwrap_or(0),
            _ => (0..=limit)
                .take_while(|i| self.element_present(nested, &format!("{path}[{i}]")))
                .count(),
        };

        let mut items = Vec::with_capacity(count.min(limit));
        for i in 0..count.min(limit) {
            let element_path = format!("{path}[{i}]");
            self.checkpoint(&element_path)?;
            items.push(Value::Object(self.bind_object(nested, &element_path)?));
        }
        Ok((items, false, count > limit))
    }

    /// Whether any non-multipart scalar of `nested` has a value at `prefix`.
    fn element_present(&self, nested: &ObjectDescriptor, prefix: &str) -> bool {
        nested.fields().iter().any(|field| {
            let path = qualify(prefix, field.name());
            match field.field_type() {
                FieldType::Scalar(_) if field.source() != SourceHint::Multipart => {
                    self.extractor.extract(&path, field).is_present()
                }
                FieldType::Object(inner) => self.element_present(inner, &path),
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::multipart::{MultipartError, MultipartPart};
    use crate::request::RequestView;
    use crate::result::ErrorCode;
    use bytes::Bytes;
    use chrono::NaiveDate;
    use http::Uri;
    use std::io::Cursor;

    fn request(uri: &'static str) -> RequestView {
        RequestView::builder().uri(Uri::from_static(uri)).build()
    }

    fn codes(result: &BindingResult) -> Vec<(String, ErrorCode)> {
        result
            .all_errors()
            .iter()
            .map(|e| (e.field.clone(), e.code))
            .collect()
    }

    #[test]
    fn test_prepare_rejects_missing_converter() {
        let descriptor = ObjectDescriptor::builder("Order")
            .field(FieldDescriptor::new("amount", ScalarType::custom("money")))
            .build();

        let err = Binder::new().prepare(&descriptor).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoConverter { ref field, .. } if field == "amount"));
    }

    #[test]
    fn test_prepare_rejects_date_without_pattern() {
        let descriptor = ObjectDescriptor::builder("Person")
            .field(FieldDescriptor::date("dob"))
            .build();

        let err = Binder::new().prepare(&descriptor).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingPattern { .. }));

        let binder = Binder::new().with_defaults(BindingDefaults::default().with_date_pattern("yyyy-MM-dd"));
        let schema = binder.prepare(&descriptor).unwrap();
        assert_eq!(
            schema.descriptor().field("dob").and_then(FieldDescriptor::conversion_pattern),
            Some("yyyy-MM-dd")
        );
    }

    #[test]
    fn test_prepare_rejects_bad_patterns() {
        let binder = Binder::new();

        let descriptor = ObjectDescriptor::builder("Event")
            .field(FieldDescriptor::date("on").pattern("yyyy-QQ"))
            .build();
        assert!(matches!(
            binder.prepare(&descriptor),
            Err(ConfigurationError::InvalidPattern { .. })
        ));

        let descriptor = ObjectDescriptor::builder("Event")
            .field(FieldDescriptor::date("on").pattern("HH:mm"))
            .build();
        assert!(matches!(
            binder.prepare(&descriptor),
            Err(ConfigurationError::InvalidPattern { .. })
        ));

        let descriptor = ObjectDescriptor::builder("Stats")
            .field(FieldDescriptor::integer("count").pattern("#%"))
            .build();
        assert!(matches!(
            binder.prepare(&descriptor),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_prepare_rejects_structural_defects() {
        let binder = Binder::new();

        let duplicate = ObjectDescriptor::builder("T")
            .field(FieldDescriptor::string("a"))
            .field(FieldDescriptor::integer("a"))
            .build();
        assert!(matches!(
            binder.prepare(&duplicate),
            Err(ConfigurationError::DuplicateField { .. })
        ));

        let header_file = ObjectDescriptor::builder("T")
            .field(FieldDescriptor::file("doc").from(SourceHint::Header))
            .build();
        assert!(matches!(
            binder.prepare(&header_file),
            Err(ConfigurationError::UnsupportedSource { .. })
        ));

        let unknown = ObjectDescriptor::builder("T")
            .field(FieldDescriptor::string("a"))
            .constraint(Constraint::not_blank("b"))
            .build();
        assert!(matches!(
            binder.prepare(&unknown),
            Err(ConfigurationError::UnknownConstraintField { .. })
        ));

        let nested_list = ObjectDescriptor::builder("T")
            .field(FieldDescriptor::new(
                "grid",
                FieldType::Collection(Box::new(FieldType::Collection(Box::new(
                    ScalarType::Integer.into(),
                )))),
            ))
            .build();
        assert!(matches!(
            binder.prepare(&nested_list),
            Err(ConfigurationError::NestedCollection { .. })
        ));
    }

    #[test]
    fn test_prepare_checks_nested_objects() {
        let inner = ObjectDescriptor::builder("Inner")
            .field(FieldDescriptor::time("at"))
            .build_shared();
        let outer = ObjectDescriptor::builder("Outer")
            .field(FieldDescriptor::nested("inner", inner))
            .build();

        let err = Binder::new().prepare(&outer).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingPattern { ref field, .. } if field == "inner.at"));
    }

    #[test]
    fn test_bind_scalars() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Filter")
                    .field(FieldDescriptor::string("name"))
                    .field(FieldDescriptor::integer("page"))
                    .field(FieldDescriptor::boolean("active"))
                    .field(FieldDescriptor::float("ratio"))
                    .field(FieldDescriptor::date("since").pattern("dd/MM/yyyy"))
                    .build(),
            )
            .unwrap();

        let req = request("/?name=Ada&page=3&active=TRUE&ratio=0.25&since=20%2F01%2F2026");
        let (filter, result) = binder.bind(&req, &schema);

        assert!(result.succeeded(), "{result}");
        assert_eq!(filter.get("name").and_then(Value::as_str), Some("Ada"));
        assert_eq!(filter.get("page").and_then(Value::as_i64), Some(3));
        assert_eq!(filter.get("active").and_then(Value::as_bool), Some(true));
        assert_eq!(filter.get("ratio").and_then(Value::as_f64), Some(0.25));
        assert_eq!(
            filter.get("since").and_then(Value::as_date),
            NaiveDate::from_ymd_opt(2026, 1, 20)
        );
    }

    #[test]
    fn test_missing_and_defaults() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Filter")
                    .field(FieldDescriptor::string("q").required())
                    .field(FieldDescriptor::integer("page"))
                    .field(FieldDescriptor::integer("size").required())
                    .build(),
            )
            .unwrap();

        let (filter, result) = binder.bind(&request("/?size=+"), &schema);

        assert_eq!(
            codes(&result),
            [
                ("q".to_string(), ErrorCode::Missing),
                ("size".to_string(), ErrorCode::Missing)
            ]
        );
        assert_eq!(filter.get("page").and_then(Value::as_i64), Some(0));
        assert_eq!(filter.state("page"), Some(FieldState::Default));
    }

    #[test]
    fn test_type_mismatch_keeps_default() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Filter")
                    .field(FieldDescriptor::integer("page"))
                    .constraint(Constraint::min("page", 1))
                    .build(),
            )
            .unwrap();

        let (filter, result) = binder.bind_and_validate(&request("/?page=two"), &schema);

        assert_eq!(codes(&result), [("page".to_string(), ErrorCode::TypeMismatch)]);
        assert_eq!(result.all_errors()[0].rejected_value.as_deref(), Some("two"));
        assert_eq!(filter.get("page").and_then(Value::as_i64), Some(0));
        assert_eq!(filter.state("page"), Some(FieldState::Failed));
    }

    #[test]
    fn test_nested_object_paths() {
        let address = ObjectDescriptor::builder("Address")
            .field(FieldDescriptor::string("city").required())
            .field(FieldDescriptor::integer("zip"))
            .build_shared();
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Customer")
                    .field(FieldDescriptor::nested("address", Arc::clone(&address)))
                    .field(FieldDescriptor::nested("billing", address).required())
                    .build(),
            )
            .unwrap();

        let (customer, result) = binder.bind(&request("/?address.zip=abc"), &schema);

        assert_eq!(
            codes(&result),
            [
                ("address.city".to_string(), ErrorCode::Missing),
                ("address.zip".to_string(), ErrorCode::TypeMismatch),
                ("billing".to_string(), ErrorCode::Missing),
            ]
        );
        assert!(customer.get("address").and_then(Value::as_object).is_some());
    }

    #[test]
    fn test_optional_absent_nested_object_is_silent() {
        let address = ObjectDescriptor::builder("Address")
            .field(FieldDescriptor::string("city").required())
            .build_shared();
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Customer")
                    .field(FieldDescriptor::nested("address", address))
                    .build(),
            )
            .unwrap();

        let (customer, result) = binder.bind(&request("/"), &schema);
        assert!(result.succeeded());
        assert_eq!(customer.state("address"), Some(FieldState::Default));
    }

    #[test]
    fn test_collection_element_errors_are_indexed() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Batch")
                    .field(FieldDescriptor::collection("ids", ScalarType::Integer))
                    .build(),
            )
            .unwrap();

        let (batch, result) = binder.bind(&request("/?ids=1&ids=bad&ids=3"), &schema);

        assert_eq!(codes(&result), [("ids[1]".to_string(), ErrorCode::TypeMismatch)]);
        let ids: Vec<Option<i64>> = batch
            .get("ids")
            .and_then(Value::as_list)
            .unwrap()
            .iter()
            .map(Value::as_i64)
            .collect();
        assert_eq!(ids, [Some(1), Some(0), Some(3)]);
        assert_eq!(batch.state("ids"), Some(FieldState::Failed));
    }

    #[test]
    fn test_blank_collection_elements_are_not_values() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Batch")
                    .field(FieldDescriptor::collection("ids", ScalarType::Integer).required())
                    .build(),
            )
            .unwrap();

        let (batch, result) = binder.bind(&request("/?ids="), &schema);
        assert_eq!(codes(&result), [("ids".to_string(), ErrorCode::Missing)]);
        assert_eq!(batch.state("ids"), Some(FieldState::Default));

        let (batch, result) = binder.bind(&request("/?ids=&ids=4&ids=x"), &schema);
        assert_eq!(codes(&result), [("ids[1]".to_string(), ErrorCode::TypeMismatch)]);
        let ids: Vec<Option<i64>> = batch
            .get("ids")
            .and_then(Value::as_list)
            .unwrap()
            .iter()
            .map(Value::as_i64)
            .collect();
        assert_eq!(ids, [Some(4), Some(0)]);
    }

    #[test]
    fn test_collection_limit() {
        let binder = Binder::new()
            .with_defaults(BindingDefaults::default().with_max_collection_elements(2));
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Batch")
                    .field(FieldDescriptor::collection("ids", ScalarType::Integer))
                    .build(),
            )
            .unwrap();

        let (batch, result) = binder.bind(&request("/?ids=1&ids=2&ids=3"), &schema);
        assert_eq!(codes(&result), [("ids".to_string(), ErrorCode::TypeMismatch)]);
        assert_eq!(batch.get("ids").and_then(Value::as_list).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_collection_of_objects_from_query() {
        let item = ObjectDescriptor::builder("Item")
            .field(FieldDescriptor::string("sku").required())
            .field(FieldDescriptor::integer("qty"))
            .build_shared();
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Order")
                    .field(FieldDescriptor::collection("items", FieldType::Object(item)).required())
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .query("items[0].sku", "A")
            .query("items[0].qty", "2")
            .query("items[1].qty", "x")
            .build();
        let (order, result) = binder.bind(&req, &schema);

        assert_eq!(
            codes(&result),
            [
                ("items[1].sku".to_string(), ErrorCode::Missing),
                ("items[1].qty".to_string(), ErrorCode::TypeMismatch),
            ]
        );
        assert_eq!(order.lookup("items[0].qty").and_then(Value::as_i64), Some(2));

        let (_, result) = binder.bind(&request("/"), &schema);
        assert_eq!(codes(&result), [("items".to_string(), ErrorCode::Missing)]);
    }

    #[test]
    fn test_object_collection_stops_at_first_index_gap() {
        let item = ObjectDescriptor::builder("Item")
            .field(FieldDescriptor::string("sku"))
            .build_shared();
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Order")
                    .field(FieldDescriptor::collection("items", FieldType::Object(item)))
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .query("items[0].sku", "A")
            .query("items[2].sku", "C")
            .build();
        let (order, result) = binder.bind(&req, &schema);

        assert!(result.succeeded());
        assert_eq!(order.get("items").and_then(Value::as_list).map(<[Value]>::len), Some(1));
        assert!(order.lookup("items[1].sku").is_none());
    }

    #[test]
    fn test_body_sources() {
        let item = ObjectDescriptor::builder("Item")
            .field(FieldDescriptor::string("sku").from(SourceHint::Body))
            .build_shared();
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Order")
                    .field(FieldDescriptor::string("customer").from(SourceHint::Body))
                    .field(
                        FieldDescriptor::collection("items", FieldType::Object(item))
                            .from(SourceHint::Body),
                    )
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .json_body(&serde_json::json!({
                "customer": "ada",
                "items": [{"sku": "A"}, {"sku": "B"}]
            }))
            .build();
        let (order, result) = binder.bind(&req, &schema);
        assert!(result.succeeded(), "{result}");
        assert_eq!(order.get("customer").and_then(Value::as_str), Some("ada"));
        assert_eq!(order.lookup("items[1].sku").and_then(Value::as_str), Some("B"));

        let broken = RequestView::builder()
            .body("application/json", "{\"customer\": ")
            .build();
        let (_, result) = binder.bind(&broken, &schema);
        assert_eq!(codes(&result), [(OBJECT_FIELD.to_string(), ErrorCode::TypeMismatch)]);
    }

    #[test]
    fn test_file_fields() {
        let binder = Binder::new().with_defaults(BindingDefaults::default().with_max_file_size_bytes(4));
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Upload")
                    .field(FieldDescriptor::file("avatar").required())
                    .field(FieldDescriptor::file("banner"))
                    .field(FieldDescriptor::file("resume").required())
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .multipart_part(MultipartPart::from_bytes("avatar", Bytes::new()).filename("empty.png"))
            .multipart_part(MultipartPart::from_bytes("banner", Bytes::from_static(b"12345")))
            .multipart_part(MultipartPart::from_bytes("resume", Bytes::from_static(b"cv")))
            .build();
        let (mut upload, result) = binder.bind(&req, &schema);

        assert_eq!(
            codes(&result),
            [
                ("avatar".to_string(), ErrorCode::Missing),
                ("banner".to_string(), ErrorCode::TypeMismatch),
            ]
        );
        let resume = upload.take("resume");
        let mut resume = match resume {
            Some(Value::File(file)) => file,
            other => panic!("expected file, got {other:?}"),
        };
        assert_eq!(resume.bytes().unwrap().as_ref(), b"cv");
    }

    #[test]
    fn test_streamed_parts_checked_against_actual_size() {
        let defaults = BindingDefaults {
            max_text_part_bytes: 16,
            ..BindingDefaults::default().with_max_file_size_bytes(4)
        };
        let binder = Binder::new().with_defaults(defaults);
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Upload")
                    .field(FieldDescriptor::string("note").from(SourceHint::Multipart))
                    .field(FieldDescriptor::file("doc"))
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .multipart_part(MultipartPart::from_reader(
                "note",
                1,
                Cursor::new(vec![b'n'; 10_000]),
            ))
            .multipart_part(MultipartPart::from_reader("doc", 2, Cursor::new(vec![b'd'; 100])))
            .build();
        let (mut upload, result) = binder.bind(&req, &schema);

        assert_eq!(codes(&result), [("note".to_string(), ErrorCode::TypeMismatch)]);
        assert_eq!(upload.state("note"), Some(FieldState::Failed));

        let mut doc = match upload.take("doc") {
            Some(Value::File(file)) => file,
            other => panic!("expected file, got {other:?}"),
        };
        assert_eq!(doc.size_limit(), Some(4));
        assert!(matches!(
            doc.bytes(),
            Err(MultipartError::LimitExceeded { limit: 4, .. })
        ));
    }

    #[test]
    fn test_file_collection() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Gallery")
                    .field(FieldDescriptor::collection("photos", FieldType::File))
                    .build(),
            )
            .unwrap();

        let req = RequestView::builder()
            .multipart_part(MultipartPart::from_bytes("photos", Bytes::from_static(b"a")))
            .multipart_part(MultipartPart::from_bytes("photos", Bytes::new()))
            .multipart_part(MultipartPart::from_bytes("photos", Bytes::from_static(b"bb")))
            .build();
        let (gallery, result) = binder.bind(&req, &schema);

        assert!(result.succeeded());
        let sizes: Vec<u64> = gallery
            .get("photos")
            .and_then(Value::as_list)
            .unwrap()
            .iter()
            .filter_map(Value::as_file)
            .map(MultipartFilePart::size_bytes)
            .collect();
        assert_eq!(sizes, [1, 2]);
    }

    #[test]
    fn test_cancellation() {
        let binder = Binder::new();
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Batch")
                    .field(FieldDescriptor::string("name"))
                    .field(FieldDescriptor::collection("ids", ScalarType::Integer))
                    .build(),
            )
            .unwrap();
        let req = request("/?name=x&ids=1");

        let token = CancellationToken::new();
        assert!(binder.bind_cancellable(&req, &schema, &token).is_ok());

        token.cancel();
        let err = binder
            .bind_and_validate_cancellable(&req, &schema, &token)
            .unwrap_err();
        assert_eq!(
            err,
            BindError::Cancelled {
                target: "Batch".to_string(),
                field: "ids".to_string()
            }
        );
    }

    #[test]
    fn test_custom_converter() {
        let mut registry = ConverterRegistry::with_builtins();
        registry.register(ScalarType::custom("cents"), None, |raw, _| {
            let text = raw.text().unwrap_or_default();
            let (units, cents) = text.split_once('.').unwrap_or((text, "0"));
            match (units.parse::<i64>(), cents.parse::<i64>()) {
                (Ok(u), Ok(c)) => Ok(Value::Int(u * 100 + c)),
                _ => Err(crate::error::ConversionError::new("not an amount")),
            }
        });
        let binder = Binder::with_registry(registry);
        let schema = binder
            .prepare(
                &ObjectDescriptor::builder("Payment")
                    .field(FieldDescriptor::new("amount", ScalarType::custom("cents")))
                    .build(),
            )
            .unwrap();

        let (payment, result) = binder.bind(&request("/?amount=12.34"), &schema);
        assert!(result.succeeded());
        assert_eq!(payment.get("amount").and_then(Value::as_i64), Some(1234));
    }
}
