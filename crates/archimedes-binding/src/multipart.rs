//! Multipart file parts.
//!
//! The engine does not parse `multipart/form-data` itself. The transport
//! hands over already-decoded [`MultipartPart`]s (name, metadata and a
//! byte source) through the request view, and the binder turns the part
//! for a file field into a [`MultipartFilePart`].
//!
//! # Single consumption
//!
//! A file part's byte stream can be read exactly once. A second attempt
//! fails with [`MultipartError::StreamAlreadyConsumed`] instead of
//! returning empty data:
//!
//! ```rust
//! use archimedes_binding::{MultipartError, MultipartFilePart, MultipartPart};
//! use bytes::Bytes;
//!
//! let part = MultipartPart::from_bytes("avatar", Bytes::from_static(b"PNG"))
//!     .filename("me.png")
//!     .content_type("image/png");
//! let mut file = MultipartFilePart::from_part(part);
//!
//! assert_eq!(file.size_bytes(), 3);
//! assert_eq!(file.bytes().unwrap().as_ref(), b"PNG");
//! assert!(matches!(
//!     file.bytes(),
//!     Err(MultipartError::StreamAlreadyConsumed { .. })
//! ));
//! ```
//!
//! Call [`MultipartFilePart::make_rereadable`] before the first read to
//! buffer the content and allow any number of reads.
//!
//! # Resource lifetime
//!
//! The byte source is owned by the part. Dropping the part (or the bound
//! object holding it) drops the source, which closes any underlying
//! file or socket handle on every exit path.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use bytes::Bytes;
use thiserror::Error;

/// Upper bound on the buffer reserved from a part's declared size.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Error raised when reading a file part.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// The part's stream was already read.
    #[error("stream of multipart field '{field}' was already consumed")]
    StreamAlreadyConsumed {
        /// Field name of the part.
        field: String,
    },

    /// Reading the underlying stream failed.
    #[error("failed to read multipart field '{field}'")]
    Io {
        /// Field name of the part.
        field: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The content is larger than the part's size limit.
    #[error("multipart field '{field}' exceeds {limit} bytes")]
    LimitExceeded {
        /// Field name of the part.
        field: String,
        /// Limit in bytes.
        limit: u64,
    },
}

/// Byte source of a part.
enum PartSource {
    Buffered(Bytes),
    Stream(Box<dyn Read + Send>),
}

/// A decoded multipart part as delivered by the transport.
pub struct MultipartPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    size: u64,
    source: PartSource,
}

impl MultipartPart {
    /// A part whose content is already in memory.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            size: data.len() as u64,
            source: PartSource::Buffered(data),
        }
    }

    /// A part streamed from a reader whose total size is known up front.
    #[must_use]
    pub fn from_reader(
        name: impl Into<String>,
        size: u64,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            size,
            source: PartSource::Stream(Box::new(reader)),
        }
    }

    /// Sets the client-supplied filename.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the part's content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Part name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Debug for MultipartPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartPart")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

enum DataState {
    Unread(PartSource),
    Rereadable(Bytes),
    Consumed,
}

/// An uploaded file bound to a field.
///
/// Metadata ([`size_bytes`](Self::size_bytes),
/// [`content_type`](Self::content_type)) is available without touching
/// the content, so callers can reject large or unexpected uploads before
/// reading anything.
pub struct MultipartFilePart {
    field_name: String,
    original_filename: Option<String>,
    content_type: Option<String>,
    size_bytes: u64,
    max_bytes: Option<u64>,
    data: DataState,
}

impl MultipartFilePart {
    /// Wraps a transport part.
    #[must_use]
    pub fn from_part(part: MultipartPart) -> Self {
        Self {
            field_name: part.name,
            original_filename: part.filename,
            content_type: part.content_type,
            size_bytes: part.size,
            max_bytes: None,
            data: DataState::Unread(part.source),
        }
    }

    /// Caps how many bytes any read of the content may return.
    ///
    /// The declared size comes from the client, so a stream can carry
    /// more than it announced. Reads past `max` fail with
    /// [`MultipartError::LimitExceeded`] (or an `InvalidData` I/O error
    /// from [`open_stream`](Self::open_stream)).
    #[must_use]
    pub fn with_size_limit(mut self, max: u64) -> Self {
        self.max_bytes = Some(self.max_bytes.map_or(max, |current| current.min(max)));
        self
    }

    /// Size limit applied to reads, if any.
    #[must_use]
    pub fn size_limit(&self) -> Option<u64> {
        self.max_bytes
    }

    /// Field name the part was bound to.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Client-supplied filename.
    #[must_use]
    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    /// Declared content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Parsed content type, if it is a valid media type.
    #[must_use]
    pub fn mime(&self) -> Option<mime::Mime> {
        self.content_type.as_deref().and_then(|ct| ct.parse().ok())
    }

    /// Size in bytes, as declared by the transport.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Whether the part has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// File extension from the original filename.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.original_filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
    }

    /// Whether the stream has been read and cannot be read again.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self.data, DataState::Consumed)
    }

    /// Opens the content as a reader.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::StreamAlreadyConsumed`] if the stream was
    /// already opened and the part was not made re-readable.
    pub fn open_stream(&mut self) -> Result<Box<dyn Read + Send>, MultipartError> {
        match std::mem::replace(&mut self.data, DataState::Consumed) {
            DataState::Unread(PartSource::Stream(reader)) => match self.max_bytes {
                Some(limit) => Ok(Box::new(BoundedReader {
                    inner: reader,
                    remaining: limit,
                    limit,
                })),
                None => Ok(reader),
            },
            DataState::Unread(PartSource::Buffered(bytes)) => {
                self.check_len(bytes.len())?;
                Ok(Box::new(Cursor::new(bytes)))
            }
            DataState::Rereadable(bytes) => {
                self.data = DataState::Rereadable(bytes.clone());
                Ok(Box::new(Cursor::new(bytes)))
            }
            DataState::Consumed => Err(self.already_consumed()),
        }
    }

    /// Reads the whole content into memory.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::StreamAlreadyConsumed`] on a second read
    /// of a single-use part, [`MultipartError::LimitExceeded`] if the
    /// content is over the size limit, or [`MultipartError::Io`] if
    /// reading fails.
    pub fn bytes(&mut self) -> Result<Bytes, MultipartError> {
        match std::mem::replace(&mut self.data, DataState::Consumed) {
            DataState::Unread(source) => self.drain(source),
            DataState::Rereadable(bytes) => {
                self.data = DataState::Rereadable(bytes.clone());
                Ok(bytes)
            }
            DataState::Consumed => Err(self.already_consumed()),
        }
    }

    /// Copies the content into `writer`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Same conditions as [`bytes`](Self::bytes).
    pub fn transfer_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> Result<u64, MultipartError> {
        let mut reader = self.open_stream()?;
        io::copy(&mut reader, writer).map_err(|source| MultipartError::Io {
            field: self.field_name.clone(),
            source,
        })
    }

    /// Buffers the content so it can be read any number of times.
    ///
    /// # Errors
    ///
    /// Fails if the stream was already consumed or cannot be read.
    pub fn make_rereadable(&mut self) -> Result<(), MultipartError> {
        match std::mem::replace(&mut self.data, DataState::Consumed) {
            DataState::Unread(source) => {
                let bytes = self.drain(source)?;
                self.data = DataState::Rereadable(bytes);
                Ok(())
            }
            DataState::Rereadable(bytes) => {
                self.data = DataState::Rereadable(bytes);
                Ok(())
            }
            DataState::Consumed => Err(self.already_consumed()),
        }
    }

    /// Reads the content as UTF-8 text, at most `limit` bytes.
    pub(crate) fn read_text(&mut self, limit: u64) -> Result<String, String> {
        if self.size_bytes > limit {
            return Err(format!("part exceeds {limit} bytes"));
        }
        self.max_bytes = Some(self.max_bytes.map_or(limit, |current| current.min(limit)));
        let bytes = self.bytes().map_err(|e| match e {
            MultipartError::LimitExceeded { limit, .. } => format!("part exceeds {limit} bytes"),
            other => other.to_string(),
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| "part is not valid UTF-8".to_string())
    }

    fn drain(&self, source: PartSource) -> Result<Bytes, MultipartError> {
        match source {
            PartSource::Buffered(bytes) => {
                self.check_len(bytes.len())?;
                Ok(bytes)
            }
            PartSource::Stream(reader) => {
                let capacity = usize::try_from(self.size_bytes)
                    .unwrap_or(MAX_PREALLOCATION)
                    .min(MAX_PREALLOCATION);
                let mut buf = Vec::with_capacity(capacity);
                // one byte past the limit is enough to detect an overrun
                let ceiling = self.max_bytes.map_or(u64::MAX, |max| max.saturating_add(1));
                reader
                    .take(ceiling)
                    .read_to_end(&mut buf)
                    .map_err(|source| MultipartError::Io {
                        field: self.field_name.clone(),
                        source,
                    })?;
                self.check_len(buf.len())?;
                Ok(Bytes::from(buf))
            }
        }
    }

    fn check_len(&self, len: usize) -> Result<(), MultipartError> {
        match self.max_bytes {
            Some(limit) if len as u64 > limit => Err(MultipartError::LimitExceeded {
                field: self.field_name.clone(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn already_consumed(&self) -> MultipartError {
        MultipartError::StreamAlreadyConsumed {
            field: self.field_name.clone(),
        }
    }
}

/// Reader that fails once the wrapped stream yields more than `limit` bytes.
struct BoundedReader {
    inner: Box<dyn Read + Send>,
    remaining: u64,
    limit: u64,
}

impl Read for BoundedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("content exceeds {} bytes", self.limit),
                )),
            };
        }
        let window = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..window])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl fmt::Debug for MultipartFilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartFilePart")
            .field("field_name", &self.field_name)
            .field("original_filename", &self.original_filename)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.size_bytes)
            .field("size_limit", &self.max_bytes)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
