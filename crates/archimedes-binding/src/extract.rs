//! Source extraction.
//!
//! The [`SourceExtractor`] reads raw values for one field from a
//! [`NormalizedRequest`]. A missing value is a [`RawValue`] with no
//! payload, never an error: whether absence matters is decided by the
//! binder against the field's `required` flag.
//!
//! With [`SourceHint::Any`] the sources are searched in the fixed order
//! of [`ANY_SOURCE_ORDER`]: path variables, query parameters, headers,
//! cookies. The body and multipart parts are only read for fields that
//! name them explicitly.

use std::cell::OnceCell;

use bytes::Bytes;

use crate::descriptor::{FieldDescriptor, FieldType, ScalarType, SourceHint};
use crate::multipart::MultipartFilePart;
use crate::request::NormalizedRequest;
use crate::value::path_segments;

/// Concrete source a raw value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Path variable.
    Path,
    /// Query parameter.
    Query,
    /// Header.
    Header,
    /// Cookie.
    Cookie,
    /// Request body.
    Body,
    /// Multipart part.
    Multipart,
}

/// Search order for [`SourceHint::Any`]. First present source wins.
pub const ANY_SOURCE_ORDER: [SourceKind; 4] = [
    SourceKind::Path,
    SourceKind::Query,
    SourceKind::Header,
    SourceKind::Cookie,
];

/// Payload of a raw value.
#[derive(Debug)]
pub enum RawPayload {
    /// Decoded text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// A file part with its lazily read stream.
    File(MultipartFilePart),
    /// A value that was present but could not be read, with the reason.
    Unreadable(String),
}

impl RawPayload {
    fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

/// One raw value as read from the request, before conversion.
#[derive(Debug)]
pub struct RawValue {
    field_name: String,
    source: Option<SourceKind>,
    payload: Option<RawPayload>,
}

impl RawValue {
    /// An absent value.
    #[must_use]
    pub fn absent(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            source: None,
            payload: None,
        }
    }

    /// A present value read from `source`.
    #[must_use]
    pub fn present(field_name: impl Into<String>, source: SourceKind, payload: RawPayload) -> Self {
        Self {
            field_name: field_name.into(),
            source: Some(source),
            payload: Some(payload),
        }
    }

    /// A present text value with no particular source.
    #[must_use]
    pub fn from_text(field_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            source: None,
            payload: Some(RawPayload::Text(text.into())),
        }
    }

    /// Field path the value was read for.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Source the value came from.
    #[must_use]
    pub fn source(&self) -> Option<SourceKind> {
        self.source
    }

    /// Whether a value was found.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.payload.is_some()
    }

    /// Payload, if present.
    #[must_use]
    pub fn payload(&self) -> Option<&RawPayload> {
        self.payload.as_ref()
    }

    /// Whether the value is present but holds only whitespace text.
    #[must_use]
    pub fn is_blank_text(&self) -> bool {
        self.payload.as_ref().is_some_and(RawPayload::is_blank_text)
    }

    /// Payload as text. Byte payloads are returned if they are UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self.payload.as_ref()? {
            RawPayload::Text(s) => Some(s),
            RawPayload::Bytes(b) => std::str::from_utf8(b).ok(),
            RawPayload::File(_) | RawPayload::Unreadable(_) => None,
        }
    }

    /// Takes the payload out, leaving the value absent.
    pub fn take_payload(&mut self) -> Option<RawPayload> {
        self.payload.take()
    }
}

/// The decoded request body.
#[derive(Debug)]
enum BodyFields {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Empty,
    Malformed(String),
}

/// Reads raw values for fields from one request.
///
/// Request-scoped: the body is decoded at most once, on first use.
pub struct SourceExtractor<'r, R: ?Sized> {
    request: &'r R,
    max_text_part_bytes: u64,
    body: OnceCell<BodyFields>,
}

impl<'r, R: NormalizedRequest + ?Sized> SourceExtractor<'r, R> {
    /// Creates an extractor over `request`.
    #[must_use]
    pub fn new(request: &'r R, max_text_part_bytes: u64) -> Self {
        Self {
            request,
            max_text_part_bytes,
            body: OnceCell::new(),
        }
    }

    /// Extracts one scalar value for `field` at `path`.
    ///
    /// `path` is the fully qualified name (`address.city`, `tags[2]`); for
    /// top-level fields with a key override the override is used instead.
    pub fn extract(&self, path: &str, field: &FieldDescriptor) -> RawValue {
        let key = lookup_key(path, field);
        let found = match field.source() {
            SourceHint::Any => ANY_SOURCE_ORDER
                .iter()
                .find_map(|&source| self.scalar_from(source, &key)),
            SourceHint::Path => self.scalar_from(SourceKind::Path, &key),
            SourceHint::Query => self.scalar_from(SourceKind::Query, &key),
            SourceHint::Header => self.scalar_from(SourceKind::Header, &key),
            SourceHint::Cookie => self.scalar_from(SourceKind::Cookie, &key),
            SourceHint::Body => self.scalar_from(SourceKind::Body, &key),
            SourceHint::Multipart => self.text_part(&key),
        };

        match found {
            Some((source, payload)) => RawValue::present(path, source, payload),
            None => RawValue::absent(path),
        }
    }

    /// Extracts every occurrence of a collection field, in order.
    ///
    /// Occurrences are, by source: repeated query/form keys, comma-separated
    /// header values, JSON array elements, or repeated multipart parts.
    /// When a source has no plain occurrences, indexed keys
    /// (`name[0]`, `name[1]`, ...) are tried until the first gap.
    /// Blank occurrences are skipped unless the element is a string.
    /// At most `limit` occurrences are returned.
    pub fn extract_all(&self, path: &str, field: &FieldDescriptor, limit: usize) -> Vec<RawValue> {
        let key = lookup_key(path, field);
        let sources: &[SourceKind] = match field.source() {
            SourceHint::Any => &ANY_SOURCE_ORDER,
            SourceHint::Path => &[SourceKind::Path],
            SourceHint::Query => &[SourceKind::Query],
            SourceHint::Header => &[SourceKind::Header],
            SourceHint::Cookie => &[SourceKind::Cookie],
            SourceHint::Body => &[SourceKind::Body],
            SourceHint::Multipart => &[SourceKind::Multipart],
        };

        let keep_blank = !matches!(
            field.field_type(),
            FieldType::Scalar(scalar) if *scalar != ScalarType::String
        );

        for &source in sources {
            let mut payloads = self.all_from(source, &key, limit);
            if payloads.is_empty() && source != SourceKind::Multipart {
                payloads = (0..limit)
                    .map_while(|i| self.scalar_from(source, &format!("{key}[{i}]")))
                    .map(|(_, payload)| payload)
                    .collect();
            }
            if !keep_blank {
                payloads.retain(|payload| !payload.is_blank_text());
            }
            if !payloads.is_empty() {
                return payloads
                    .into_iter()
                    .take(limit)
                    .enumerate()
                    .map(|(i, payload)| RawValue::present(format!("{path}[{i}]"), source, payload))
                    .collect();
            }
        }
        Vec::new()
    }

    /// Number of elements of a JSON body array at `path`, if the body is
    /// JSON and holds an array there.
    pub fn body_array_len(&self, path: &str) -> Option<usize> {
        match self.body_fields() {
            BodyFields::Json(json) => json_lookup(json, path)?.as_array().map(Vec::len),
            _ => None,
        }
    }

    /// Takes the file part for `name` from the request.
    pub fn extract_file(&self, name: &str) -> Option<MultipartFilePart> {
        extract_file(self.request, name)
    }

    /// Decoding failure of the body, if the body was read and is malformed.
    pub fn body_error(&self) -> Option<&str> {
        match self.body.get() {
            Some(BodyFields::Malformed(reason)) => Some(reason),
            _ => None,
        }
    }

    fn scalar_from(&self, source: SourceKind, key: &str) -> Option<(SourceKind, RawPayload)> {
        let text = match source {
            SourceKind::Path => self.request.path_variable(key).map(str::to_string),
            SourceKind::Query => self.request.query_param(key).map(str::to_string),
            SourceKind::Header => self.request.header(key).map(str::to_string),
            SourceKind::Cookie => self.request.cookie(key).map(str::to_string),
            SourceKind::Body => self.body_scalar(key),
            SourceKind::Multipart => return self.text_part(key),
        }?;
        Some((source, RawPayload::Text(text)))
    }

    fn text_part(&self, key: &str) -> Option<(SourceKind, RawPayload)> {
        let mut part = extract_file(self.request, key)?;
        let payload = match part.read_text(self.max_text_part_bytes) {
            Ok(text) => RawPayload::Text(text),
            Err(reason) => RawPayload::Unreadable(reason),
        };
        Some((SourceKind::Multipart, payload))
    }

    fn all_from(&self, source: SourceKind, key: &str, limit: usize) -> Vec<RawPayload> {
        let texts = match source {
            SourceKind::Query => owned(self.request.query_params(key)),
            SourceKind::Header => self
                .request
                .header_values(key)
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            SourceKind::Body => self.body_all(key),
            SourceKind::Multipart => {
                return std::iter::from_fn(|| self.text_part(key))
                    .take(limit)
                    .map(|(_, payload)| payload)
                    .collect();
            }
            SourceKind::Path | SourceKind::Cookie => {
                return self
                    .scalar_from(source, key)
                    .map(|(_, payload)| payload)
                    .into_iter()
                    .collect();
            }
        };
        texts.into_iter().map(RawPayload::Text).collect()
    }

    fn body_fields(&self) -> &BodyFields {
        self.body.get_or_init(|| decode_body(self.request))
    }

    fn body_scalar(&self, key: &str) -> Option<String> {
        match self.body_fields() {
            BodyFields::Json(json) => json_lookup(json, key).and_then(json_text),
            BodyFields::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            BodyFields::Empty | BodyFields::Malformed(_) => None,
        }
    }

    fn body_all(&self, key: &str) -> Vec<String> {
        match self.body_fields() {
            BodyFields::Json(json) => match json_lookup(json, key) {
                Some(serde_json::Value::Array(items)) => {
                    items.iter().map(|item| json_text(item).unwrap_or_default()).collect()
                }
                Some(other) => json_text(other).into_iter().collect(),
                None => Vec::new(),
            },
            BodyFields::Form(pairs) => pairs
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect(),
            BodyFields::Empty | BodyFields::Malformed(_) => Vec::new(),
        }
    }
}

/// Takes the file part named `name` out of a request.
///
/// Returns `None` when the request has no such part. Metadata is available
/// on the returned part without reading its stream.
pub fn extract_file<R: NormalizedRequest + ?Sized>(
    request: &R,
    name: &str,
) -> Option<MultipartFilePart> {
    request
        .take_multipart_part(name)
        .map(MultipartFilePart::from_part)
}

/// Source key for `field` at `path`.
pub(crate) fn lookup_key(path: &str, field: &FieldDescriptor) -> String {
    // a key override replaces the last path segment
    match path.rsplit_once('.') {
        Some((prefix, _)) => format!("{prefix}.{}", field.source_key()),
        None if path.ends_with(']') => path.to_string(),
        None => field.source_key().to_string(),
    }
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}

fn decode_body<R: NormalizedRequest + ?Sized>(request: &R) -> BodyFields {
    let Some(body) = request.body().filter(|b| !b.is_empty()) else {
        return BodyFields::Empty;
    };
    let Some(media) = request
        .content_type()
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
    else {
        return BodyFields::Malformed("request body has no usable content type".to_string());
    };

    let is_json = media.subtype() == mime::JSON || media.suffix() == Some(mime::JSON);
    if is_json {
        return serde_json::from_slice(body)
            .map(BodyFields::Json)
            .unwrap_or_else(|e| BodyFields::Malformed(format!("invalid JSON body: {e}")));
    }
    if media.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
        return serde_urlencoded::from_bytes(body)
            .map(BodyFields::Form)
            .unwrap_or_else(|e| BodyFields::Malformed(format!("invalid form body: {e}")));
    }
    BodyFields::Malformed(format!("unsupported body content type '{media}'"))
}

/// Resolves a dotted/indexed path inside a JSON document.
fn json_lookup<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path_segments(path).try_fold(json, |current, (name, index)| {
        let value = current.as_object()?.get(name)?;
        match index {
            Some(i) => value.as_array()?.get(i),
            None => Some(value),
        }
    })
}

/// Text form of a JSON scalar. `null` is absent; arrays and objects are
/// passed on serialized so that conversion reports the mismatch.
fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
