//! Bound values and the bound object instance.
//!
//! A [`BoundObject`] is the request-scoped instance produced by the
//! binder. It keeps one slot per declared field, in declaration order,
//! and records for each slot whether a value was bound, the field kept
//! its default, or conversion failed.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::descriptor::{FieldType, ObjectDescriptor, ScalarType};
use crate::multipart::MultipartFilePart;

/// A converted field value.
#[derive(Debug)]
pub enum Value {
    /// No value: absent optional fields without a zero value.
    Null,
    /// Text.
    Str(String),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time.
    DateTime(NaiveDateTime),
    /// Time of day.
    Time(NaiveTime),
    /// UUID.
    Uuid(Uuid),
    /// Uploaded file.
    File(MultipartFilePart),
    /// Nested object.
    Object(BoundObject),
    /// Collection.
    List(Vec<Value>),
}

impl Value {
    /// Zero/default value for a field type.
    ///
    /// Text defaults to `""`, numbers to zero, booleans to `false`,
    /// collections to empty and nested objects to an object of defaults.
    /// Types with no natural zero (dates, UUIDs, files, custom types)
    /// default to [`Value::Null`].
    #[must_use]
    pub fn default_for(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Scalar(ScalarType::String) => Self::Str(String::new()),
            FieldType::Scalar(ScalarType::Integer) => Self::Int(0),
            FieldType::Scalar(ScalarType::Float) => Self::Float(0.0),
            FieldType::Scalar(ScalarType::Boolean) => Self::Bool(false),
            FieldType::Scalar(_) | FieldType::File => Self::Null,
            FieldType::Object(descriptor) => Self::Object(BoundObject::with_defaults(descriptor)),
            FieldType::Collection(_) => Self::List(Vec::new()),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float value; integers widen.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Date value.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Date-time value.
    #[must_use]
    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Time value.
    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// File part.
    #[must_use]
    pub fn as_file(&self) -> Option<&MultipartFilePart> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    /// Mutable file part, needed to read its stream.
    pub fn as_file_mut(&mut self) -> Option<&mut MultipartFilePart> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    /// Nested object.
    #[must_use]
    pub fn as_object(&self) -> Option<&BoundObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Collection elements.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// JSON rendering. Dates use ISO 8601; files render their metadata.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Str(s) => Json::String(s.clone()),
            Self::Int(n) => Json::from(*n),
            Self::Float(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::Bool(b) => Json::Bool(*b),
            Self::Date(d) => Json::String(d.to_string()),
            Self::DateTime(dt) => Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Time(t) => Json::String(t.to_string()),
            Self::Uuid(u) => Json::String(u.to_string()),
            Self::File(f) => serde_json::json!({
                "original_filename": f.original_filename(),
                "content_type": f.content_type(),
                "size_bytes": f.size_bytes(),
            }),
            Self::Object(o) => o.to_json(),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

/// Binding state of one field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// The field holds its type's default; nothing was bound.
    Default,
    /// A value was converted and assigned.
    Bound,
    /// Conversion failed; the field holds its default.
    Failed,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    state: FieldState,
}

/// A request-scoped bound instance.
///
/// # Example
///
/// ```rust
/// use archimedes_binding::{BoundObject, FieldState, Value};
///
/// let mut obj = BoundObject::new("Point");
/// obj.set("x", Value::Int(3));
///
/// assert_eq!(obj.get("x").and_then(Value::as_i64), Some(3));
/// assert_eq!(obj.state("x"), Some(FieldState::Bound));
/// assert!(obj.get("y").is_none());
/// ```
#[derive(Debug)]
pub struct BoundObject {
    type_name: String,
    slots: IndexMap<String, Slot>,
}

impl BoundObject {
    /// Creates an empty instance.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            slots: IndexMap::new(),
        }
    }

    /// Creates an instance with every declared field at its default.
    #[must_use]
    pub fn with_defaults(descriptor: &ObjectDescriptor) -> Self {
        let slots = descriptor
            .fields()
            .iter()
            .map(|field| {
                (
                    field.name().to_string(),
                    Slot {
                        value: Value::default_for(field.field_type()),
                        state: FieldState::Default,
                    },
                )
            })
            .collect();

        Self {
            type_name: descriptor.type_name().to_string(),
            slots,
        }
    }

    /// Type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    /// Mutable value of a field.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.slots.get_mut(name).map(|slot| &mut slot.value)
    }

    /// Binding state of a field.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<FieldState> {
        self.slots.get(name).map(|slot| slot.state)
    }

    /// Whether the field was successfully bound.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.state(name) == Some(FieldState::Bound)
    }

    /// Assigns a value and marks the field bound.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(
            name.into(),
            Slot {
                value,
                state: FieldState::Bound,
            },
        );
    }

    /// Moves a value out, leaving [`Value::Null`] behind.
    ///
    /// Used to take ownership of file parts.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.slots
            .get_mut(name)
            .map(|slot| std::mem::replace(&mut slot.value, Value::Null))
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the object has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Looks a value up by dotted/indexed path, e.g. `items[1].sku`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path_segments(path);
        let (first, first_index) = segments.next()?;
        let mut current = index_into(self.get(first)?, first_index)?;

        for (name, index) in segments {
            let value = current.as_object()?.get(name)?;
            current = index_into(value, index)?;
        }
        Some(current)
    }

    pub(crate) fn assign(&mut self, name: &str, value: Value, state: FieldState) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.value = value;
            slot.state = state;
        }
    }

    /// JSON rendering of all fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Deserializes the bound values into an application type.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the values do not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

/// Splits `a.b[2].c` into `("a", None), ("b", Some(2)), ("c", None)`.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = (&str, Option<usize>)> {
    path.split('.').map(|segment| match segment.split_once('[') {
        Some((name, rest)) => (name, rest.strip_suffix(']').and_then(|i| i.parse().ok())),
        None => (segment, None),
    })
}

fn index_into(value: &Value, index: Option<usize>) -> Option<&Value> {
    match index {
        Some(i) => value.as_list()?.get(i),
        None => Some(value),
    }
}
