//! Integration tests for file uploads.
//!
//! Streams are tracked with a drop flag so each test can assert that the
//! underlying source was closed, whatever path the pass took.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use archimedes_binding::{
    Binder, BindingDefaults, CancellationToken, Constraint, ErrorCode, FieldDescriptor,
    MultipartError, MultipartPart, ObjectDescriptor, RequestView, SourceHint, Value,
};

struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn tracked_part(name: &str, data: &[u8]) -> (MultipartPart, Arc<AtomicBool>) {
    let closed = Arc::new(AtomicBool::new(false));
    let reader = TrackedReader {
        inner: Cursor::new(data.to_vec()),
        closed: Arc::clone(&closed),
    };
    let part = MultipartPart::from_reader(name, data.len() as u64, reader)
        .filename("upload.txt")
        .content_type("text/plain");
    (part, closed)
}

fn upload_descriptor() -> ObjectDescriptor {
    ObjectDescriptor::builder("Upload")
        .field(FieldDescriptor::string("title").required().from(SourceHint::Multipart))
        .field(FieldDescriptor::integer("pages").from(SourceHint::Multipart))
        .field(FieldDescriptor::file("document").required())
        .constraint(Constraint::content_type("document", &["text/*"]))
        .build()
}

#[test]
fn test_zero_size_required_upload_is_missing() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, closed) = tracked_part("document", b"");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Report"))
        .multipart_part(part)
        .build();
    let (upload, result) = binder.bind_and_validate(&request, &schema);

    let errors = result.errors_for("document");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::Missing);
    assert!(upload.get("document").is_some_and(Value::is_null));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_metadata_then_single_read() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, closed) = tracked_part("document", b"hello world");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Greeting"))
        .multipart_part(MultipartPart::from_bytes("pages", "1"))
        .multipart_part(part)
        .build();
    let (mut upload, result) = binder.bind_and_validate(&request, &schema);
    assert!(result.succeeded(), "{result}");
    assert_eq!(upload.get("title").and_then(Value::as_str), Some("Greeting"));
    assert_eq!(upload.get("pages").and_then(Value::as_i64), Some(1));

    let file = upload
        .get_mut("document")
        .and_then(Value::as_file_mut)
        .unwrap();
    assert_eq!(file.size_bytes(), 11);
    assert_eq!(file.original_filename(), Some("upload.txt"));
    assert!(!closed.load(Ordering::SeqCst));

    let mut sink = Vec::new();
    assert_eq!(file.transfer_to(&mut sink).unwrap(), 11);
    assert_eq!(sink, b"hello world");
    assert!(closed.load(Ordering::SeqCst));

    let second = file.bytes();
    assert!(matches!(
        second,
        Err(MultipartError::StreamAlreadyConsumed { ref field }) if field == "document"
    ));
    assert!(file.is_consumed());
}

#[test]
fn test_make_rereadable_allows_repeated_reads() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, _closed) = tracked_part("document", b"abc");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Letters"))
        .multipart_part(part)
        .build();
    let (mut upload, _) = binder.bind(&request, &schema);

    let file = upload
        .get_mut("document")
        .and_then(Value::as_file_mut)
        .unwrap();
    file.make_rereadable().unwrap();
    assert_eq!(file.bytes().unwrap().as_ref(), b"abc");
    assert_eq!(file.bytes().unwrap().as_ref(), b"abc");
    assert!(!file.is_consumed());
}

#[test]
fn test_stream_closed_when_other_fields_fail() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, closed) = tracked_part("document", b"content");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("pages", "many"))
        .multipart_part(part)
        .build();
    let (upload, result) = binder.bind_and_validate(&request, &schema);

    assert_eq!(result.errors_for("title")[0].code, ErrorCode::Missing);
    assert_eq!(result.errors_for("pages")[0].code, ErrorCode::TypeMismatch);
    assert!(!closed.load(Ordering::SeqCst));

    // the handler rejects the request without touching the upload
    drop(upload);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_oversized_upload_is_rejected_unread() {
    let binder =
        Binder::new().with_defaults(BindingDefaults::default().with_max_file_size_bytes(4));
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, closed) = tracked_part("document", b"far too large");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Big"))
        .multipart_part(part)
        .build();
    let (upload, result) = binder.bind_and_validate(&request, &schema);

    let errors = result.errors_for("document");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::TypeMismatch);
    assert_eq!(errors[0].rejected_value.as_deref(), Some("upload.txt"));
    assert!(upload.get("document").is_some_and(Value::is_null));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_content_type_constraint() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Image"))
        .multipart_part(
            MultipartPart::from_bytes("document", "GIF89a")
                .filename("cat.gif")
                .content_type("image/gif"),
        )
        .build();
    let (_, result) = binder.bind_and_validate(&request, &schema);

    let errors = result.errors_for("document");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule.as_deref(), Some("content_type"));
}

#[test]
fn test_cancellation_closes_streams() {
    let binder = Binder::new();
    let schema = binder.prepare(&upload_descriptor()).unwrap();

    let (part, closed) = tracked_part("document", b"content");
    let request = RequestView::builder()
        .multipart_part(MultipartPart::from_bytes("title", "Cancelled"))
        .multipart_part(part)
        .build();

    let token = CancellationToken::new();
    token.cancel();
    let outcome = binder.bind_and_validate_cancellable(&request, &schema, &token);
    assert!(outcome.is_err());

    // the part never left the request; dropping the request closes it
    assert_eq!(request.remaining_parts(), 1);
    drop(request);
    assert!(closed.load(Ordering::SeqCst));
}
