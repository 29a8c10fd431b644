//! Field and object descriptors.
//!
//! Descriptors are the declarative half of the engine: they say which
//! fields an object has, where each one comes from, what it converts to,
//! and which constraints apply. They are built once at setup time and
//! handed to [`Binder::prepare`](crate::Binder::prepare), which checks
//! them and produces an immutable [`BindingSchema`](crate::BindingSchema).
//!
//! # Example
//!
//! ```rust
//! use archimedes_binding::{Constraint, FieldDescriptor, ObjectDescriptor, SourceHint};
//!
//! let descriptor = ObjectDescriptor::builder("Registration")
//!     .field(FieldDescriptor::string("full_name").required())
//!     .field(FieldDescriptor::string("email").required())
//!     .field(FieldDescriptor::date("dob").pattern("yyyy-MM-dd"))
//!     .field(FieldDescriptor::string("api_version").from(SourceHint::Header).key("x-api-version"))
//!     .constraint(Constraint::not_blank("full_name"))
//!     .constraint(Constraint::email("email"))
//!     .build();
//!
//! assert_eq!(descriptor.type_name(), "Registration");
//! assert_eq!(descriptor.fields().len(), 4);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::constraint::{Constraint, ObjectConstraint};

/// Where a field's raw value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceHint {
    /// URL query string parameters.
    Query,
    /// Path variables captured by the router.
    Path,
    /// Request headers.
    Header,
    /// Cookies from the `Cookie` header.
    Cookie,
    /// The request body (JSON or form-encoded).
    Body,
    /// A named part of a multipart request.
    Multipart,
    /// Path, then query, then header, then cookie; first present wins.
    #[default]
    Any,
}

impl fmt::Display for SourceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Path => write!(f, "path"),
            Self::Header => write!(f, "header"),
            Self::Cookie => write!(f, "cookie"),
            Self::Body => write!(f, "body"),
            Self::Multipart => write!(f, "multipart"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Scalar target types understood by the converter registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Text, passed through unchanged.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// `true`/`false`/`1`/`0`, case-insensitive.
    Boolean,
    /// Calendar date, parsed against an explicit pattern.
    Date,
    /// Date and time without offset, parsed against an explicit pattern.
    DateTime,
    /// Time of day, parsed against an explicit pattern.
    Time,
    /// RFC 4122 UUID.
    Uuid,
    /// Application-defined type; needs a registered rule.
    Custom(Cow<'static, str>),
}

impl ScalarType {
    /// Creates a custom scalar type tag.
    #[must_use]
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Custom(name.into())
    }

    /// Returns `true` for the pattern-driven temporal types.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Returns `true` for the numeric types.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "date-time"),
            Self::Time => write!(f, "time"),
            Self::Uuid => write!(f, "uuid"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Semantic type of a declared field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// A single converted value.
    Scalar(ScalarType),
    /// An uploaded file from a multipart request.
    File,
    /// A nested object bound with a field-name prefix.
    Object(Arc<ObjectDescriptor>),
    /// An ordered sequence of elements of the inner type.
    Collection(Box<FieldType>),
}

impl FieldType {
    /// Returns the scalar type, if this is a scalar field.
    #[must_use]
    pub fn scalar(&self) -> Option<&ScalarType> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }
}

impl From<ScalarType> for FieldType {
    fn from(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }
}

/// Declaration of one field of a target object.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    source: SourceHint,
    key: Option<String>,
    pattern: Option<String>,
    required: bool,
}

impl FieldDescriptor {
    /// Creates an optional field bound from any source.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            source: SourceHint::Any,
            key: None,
            pattern: None,
            required: false,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::String)
    }

    /// An integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Integer)
    }

    /// A floating-point field.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Float)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Boolean)
    }

    /// A date field. Needs a pattern, either here or as a global default.
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Date)
    }

    /// A date-time field. Needs a pattern, either here or as a global default.
    #[must_use]
    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::DateTime)
    }

    /// A time-of-day field. Needs a pattern, either here or as a global default.
    #[must_use]
    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Time)
    }

    /// A UUID field.
    #[must_use]
    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Uuid)
    }

    /// An uploaded file field.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::File)
    }

    /// A nested object field.
    #[must_use]
    pub fn nested(name: impl Into<String>, descriptor: Arc<ObjectDescriptor>) -> Self {
        Self::new(name, FieldType::Object(descriptor))
    }

    /// A collection field with the given element type.
    #[must_use]
    pub fn collection(name: impl Into<String>, element: impl Into<FieldType>) -> Self {
        Self::new(name, FieldType::Collection(Box::new(element.into())))
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts the field to one source.
    #[must_use]
    pub fn from(mut self, source: SourceHint) -> Self {
        self.source = source;
        self
    }

    /// Reads the field from a differently named source key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the conversion pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used to look the field up in its source.
    #[must_use]
    pub fn source_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    /// Target type.
    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Source hint.
    #[must_use]
    pub fn source(&self) -> SourceHint {
        self.source
    }

    /// Conversion pattern, if any.
    #[must_use]
    pub fn conversion_pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Whether absence is an error.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn with_effective_pattern(&self, pattern: Option<String>) -> Self {
        let mut prepared = self.clone();
        prepared.pattern = pattern;
        prepared
    }

    pub(crate) fn as_element(&self, field_type: FieldType) -> Self {
        let mut element = self.clone();
        element.field_type = field_type;
        element
    }
}

/// Declaration of a target object type: its fields and constraints.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    type_name: String,
    fields: Vec<FieldDescriptor>,
    constraints: Vec<Constraint>,
    object_constraints: Vec<ObjectConstraint>,
}

impl ObjectDescriptor {
    /// Starts building a descriptor for the named type.
    #[must_use]
    pub fn builder(type_name: impl Into<String>) -> ObjectDescriptorBuilder {
        ObjectDescriptorBuilder::new(type_name)
    }

    /// Type name reported in binding results.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks a field up by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field-level constraints in declaration order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Object-level constraints in declaration order.
    #[must_use]
    pub fn object_constraints(&self) -> &[ObjectConstraint] {
        &self.object_constraints
    }

    pub(crate) fn with_fields(&self, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            type_name: self.type_name.clone(),
            fields,
            constraints: self.constraints.clone(),
            object_constraints: self.object_constraints.clone(),
        }
    }
}

/// Builder for [`ObjectDescriptor`].
#[derive(Debug)]
pub struct ObjectDescriptorBuilder {
    type_name: String,
    fields: Vec<FieldDescriptor>,
    constraints: Vec<Constraint>,
    object_constraints: Vec<ObjectConstraint>,
}

impl ObjectDescriptorBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            constraints: Vec::new(),
            object_constraints: Vec::new(),
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Attaches a field-level constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Attaches an object-level (cross-field) constraint.
    #[must_use]
    pub fn object_constraint(mut self, constraint: ObjectConstraint) -> Self {
        self.object_constraints.push(constraint);
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> ObjectDescriptor {
        ObjectDescriptor {
            type_name: self.type_name,
            fields: self.fields,
            constraints: self.constraints,
            object_constraints: self.object_constraints,
        }
    }

    /// Finishes the descriptor behind an [`Arc`], ready for nesting.
    #[must_use]
    pub fn build_shared(self) -> Arc<ObjectDescriptor> {
        Arc::new(self.build())
    }
}
