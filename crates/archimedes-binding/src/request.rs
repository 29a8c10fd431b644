//! The normalized request view consumed by the binder.
//!
//! Routing and transport hand the engine a [`NormalizedRequest`]: keyed
//! access to already-decoded query parameters, path variables, headers,
//! cookies, the raw body and multipart parts. [`RequestView`] is the
//! stock implementation built from `http` types.

use std::collections::HashMap;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Uri};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::multipart::MultipartPart;

/// Path variables stored inline for the common case.
const INLINE_PATH_VARIABLES: usize = 4;

/// Read access to one request's decoded inputs.
///
/// Implementors must not perform any wire-format parsing on behalf of the
/// binder beyond what is needed to answer these lookups.
pub trait NormalizedRequest {
    /// All values of a query parameter, in order of appearance.
    fn query_params(&self, name: &str) -> Vec<&str>;

    /// First value of a query parameter.
    fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params(name).into_iter().next()
    }

    /// A path variable captured by the router.
    fn path_variable(&self, name: &str) -> Option<&str>;

    /// All values of a header.
    fn header_values(&self, name: &str) -> Vec<&str>;

    /// First value of a header.
    fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    /// A cookie value.
    fn cookie(&self, name: &str) -> Option<&str>;

    /// The request's `Content-Type`.
    fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// The raw body, if any.
    fn body(&self) -> Option<&Bytes>;

    /// Removes and returns the first multipart part with this name.
    ///
    /// Parts are handed out once; the caller owns the returned stream.
    fn take_multipart_part(&self, name: &str) -> Option<MultipartPart>;
}

/// A [`NormalizedRequest`] over `http` types.
///
/// # Example
///
/// ```rust
/// use archimedes_binding::{NormalizedRequest, RequestView};
/// use http::Uri;
///
/// let request = RequestView::builder()
///     .uri(Uri::from_static("/users/42?tag=a&tag=b"))
///     .path_variable("id", "42")
///     .header("cookie", "session=abc; theme=dark")
///     .build();
///
/// assert_eq!(request.path_variable("id"), Some("42"));
/// assert_eq!(request.query_params("tag"), vec!["a", "b"]);
/// assert_eq!(request.cookie("theme"), Some("dark"));
/// ```
#[derive(Debug, Default)]
pub struct RequestView {
    query: Vec<(String, String)>,
    path_variables: SmallVec<[(String, String); INLINE_PATH_VARIABLES]>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Option<Bytes>,
    parts: Mutex<Vec<MultipartPart>>,
}

impl RequestView {
    /// Starts building a request view.
    #[must_use]
    pub fn builder() -> RequestViewBuilder {
        RequestViewBuilder::new()
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Number of multipart parts not yet taken.
    #[must_use]
    pub fn remaining_parts(&self) -> usize {
        self.parts.lock().len()
    }
}

impl NormalizedRequest for RequestView {
    fn query_params(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    fn take_multipart_part(&self, name: &str) -> Option<MultipartPart> {
        let mut parts = self.parts.lock();
        let index = parts.iter().position(|p| p.name() == name)?;
        Some(parts.remove(index))
    }
}

/// Parses a `Cookie` header value into name/value pairs.
fn parse_cookies(header_value: &str, into: &mut HashMap<String, String>) {
    for cookie in header_value.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            let value = value.trim().trim_matches('"');
            into.insert(name.trim().to_string(), value.to_string());
        }
    }
}

/// Builder for [`RequestView`].
#[derive(Debug, Default)]
pub struct RequestViewBuilder {
    view: RequestView,
    parts: Vec<MultipartPart>,
}

impl RequestViewBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes query parameters from the URI's query string.
    ///
    /// A query string that is not valid URL encoding contributes no
    /// parameters.
    #[must_use]
    pub fn uri(mut self, uri: Uri) -> Self {
        if let Some(query) = uri.query() {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(query).unwrap_or_default();
            self.view.query.extend(pairs);
        }
        self
    }

    /// Adds a decoded query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view.query.push((name.into(), value.into()));
        self
    }

    /// Adds a path variable.
    #[must_use]
    pub fn path_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view.path_variables.push((name.into(), value.into()));
        self
    }

    /// Replaces the header map.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.view.headers = headers;
        self
    }

    /// Appends a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.view.headers.append(name, value);
        }
        self
    }

    /// Adds a cookie directly.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view.cookies.insert(name.into(), value.into());
        self
    }

    /// Sets the body and its content type.
    #[must_use]
    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.view.body = Some(body.into());
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json_body(self, value: &serde_json::Value) -> Self {
        self.body(mime::APPLICATION_JSON.as_ref(), value.to_string())
    }

    /// Sets a form-encoded body.
    #[must_use]
    pub fn form_body(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = serde_urlencoded::to_string(pairs).unwrap_or_default();
        self.body(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref(), encoded)
    }

    /// Adds a decoded multipart part.
    #[must_use]
    pub fn multipart_part(mut self, part: MultipartPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Builds the view, parsing any `Cookie` headers.
    #[must_use]
    pub fn build(mut self) -> RequestView {
        let cookie_headers: Vec<String> = self
            .view
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        for value in &cookie_headers {
            parse_cookies(value, &mut self.view.cookies);
        }

        self.view.parts = Mutex::new(self.parts);
        self.view
    }
}
