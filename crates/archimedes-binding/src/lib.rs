//! # Archimedes Binding
//!
//! Request data binding and validation for the Archimedes HTTP framework.
//!
//! This crate turns the untyped inputs of a request (query parameters, path
//! variables, headers, cookies, bodies and multipart uploads) into typed,
//! validated objects before a handler runs. Binding is driven by data, not
//! by derive macros: each target type is declared once as an
//! [`ObjectDescriptor`] and checked at setup time.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`ConverterRegistry`] | Maps (type, pattern) to a conversion rule |
//! | [`SourceExtractor`] | Reads raw values from a [`NormalizedRequest`] |
//! | [`Binder`] | Extracts and converts every declared field |
//! | [`Constraint`] / [`ObjectConstraint`] | Declarative validation rules |
//! | [`BindingResult`] | Ordered, field-addressable error report |
//! | [`MultipartFilePart`] | Upload metadata plus a single-use byte stream |
//!
//! ## Example
//!
//! ```rust
//! use archimedes_binding::{
//!     Binder, Constraint, ErrorCode, FieldDescriptor, ObjectDescriptor, RequestView,
//! };
//!
//! let binder = Binder::new();
//! let schema = binder
//!     .prepare(
//!         &ObjectDescriptor::builder("Registration")
//!             .field(FieldDescriptor::string("full_name").required())
//!             .field(FieldDescriptor::string("email").required())
//!             .field(FieldDescriptor::date("dob").pattern("yyyy-MM-dd"))
//!             .constraint(Constraint::not_blank("full_name"))
//!             .constraint(Constraint::email("email"))
//!             .build(),
//!     )
//!     .expect("descriptor is valid");
//!
//! let request = RequestView::builder()
//!     .query("full_name", "")
//!     .query("email", "not-an-email")
//!     .query("dob", "2026-01-20")
//!     .build();
//!
//! let (registration, result) = binder.bind_and_validate(&request, &schema);
//!
//! assert!(result.has_errors());
//! assert_eq!(result.errors_for("email")[0].code, ErrorCode::ConstraintViolation);
//! assert!(result.errors_for("dob").is_empty());
//! assert!(registration.get("dob").and_then(|v| v.as_date()).is_some());
//! ```
//!
//! ## Error Handling
//!
//! Malformed request data never produces an `Err`: it is reported as a
//! [`FieldError`] with code `MISSING`, `TYPE_MISMATCH` or
//! `CONSTRAINT_VIOLATION`. Hard failures are limited to descriptor defects
//! ([`ConfigurationError`], returned by [`Binder::prepare`]), misuse of a
//! file stream ([`MultipartError`]) and cancellation ([`BindError`]).

#![doc(html_root_url = "https://docs.rs/archimedes-binding/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
mod constraint;
mod convert;
mod descriptor;
mod error;
mod extract;
mod multipart;
mod request;
mod result;
mod value;

pub use binder::{
    Binder, BindingDefaults, BindingSchema, DEFAULT_MAX_COLLECTION_ELEMENTS,
    DEFAULT_MAX_TEXT_PART_BYTES,
};
pub use constraint::{Constraint, ObjectConstraint, OBJECT_FIELD};
pub use convert::{check_pattern, compile_temporal_pattern, ConversionRule, ConverterRegistry};
pub use descriptor::{
    FieldDescriptor, FieldType, ObjectDescriptor, ObjectDescriptorBuilder, ScalarType, SourceHint,
};
pub use error::{BindError, ConfigurationError, ConversionError};
pub use extract::{
    extract_file, RawPayload, RawValue, SourceExtractor, SourceKind, ANY_SOURCE_ORDER,
};
pub use multipart::{MultipartError, MultipartFilePart, MultipartPart};
pub use request::{NormalizedRequest, RequestView, RequestViewBuilder};
pub use result::{BindingResult, ErrorCode, FieldError};
pub use value::{BoundObject, FieldState, Value};

// Re-export the cancellation signal accepted by the cancellable passes
pub use tokio_util::sync::CancellationToken;
