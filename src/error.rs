//! Centralized error handling for evframe.
//!
//! Every failure in the library is reported through [`FrameError`]. The
//! taxonomy follows the layers of the crate:
//!
//! - **Codec errors** ([`FrameError::Codec`]): malformed or truncated bytes,
//!   schema versions newer than the running build, checksum mismatches.
//!   Always fatal to the decode in progress; nothing is ever guessed or
//!   zero-filled.
//! - **Registry errors** ([`FrameError::Registry`]): unknown type keys met
//!   during a polymorphic load, duplicate or conflicting registrations.
//!   These indicate a writer/reader build mismatch.
//! - **Contract violations** ([`FrameError::DuplicateKey`],
//!   [`FrameError::BlobDropped`], ...): programmer errors against the frame
//!   store.
//! - **I/O errors** ([`FrameError::Io`]).
//!
//! A lookup that finds nothing is *not* an error: typed access returns
//! `Ok(None)` so that "absent" stays distinguishable from "present but
//! empty".
//!
//! ## Usage
//!
//! ```rust
//! use evframe::{FrameError, Result};
//!
//! fn check(result: Result<()>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(FrameError::Codec { source, .. }) => eprintln!("corrupt input: {source}"),
//!         Err(e) => eprintln!("other failure: {e}"),
//!     }
//! }
//! # check(Ok(()));
//! ```

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// A specialized `Result` type for evframe operations.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Failures raised while turning bytes into values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a complete value could be read.
    #[error("read past end of input: needed {needed} bytes, {remaining} remaining")]
    ReadPastEnd {
        /// Bytes the decoder tried to consume.
        needed: u64,
        /// Bytes left in the input.
        remaining: u64,
    },

    /// A record was written by a newer schema than this build understands.
    #[error("type '{type_key}' stored with version {found}, this build supports up to {supported}")]
    FutureVersion {
        /// The type key of the record.
        type_key: String,
        /// Version found in the record.
        found: u32,
        /// Highest version compiled into this build.
        supported: u32,
    },

    /// The stored checksum does not match the record content.
    #[error("checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch {
        /// Checksum found on the wire.
        stored: u64,
        /// Checksum computed over the received bytes.
        computed: u64,
    },

    /// A signature (magic bytes) did not match.
    #[error("bad signature: expected {expected:?}, found {found:?}")]
    BadSignature {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Bytes actually read.
        found: [u8; 4],
    },

    /// The container format version is not supported.
    #[error("unsupported format version {0}")]
    UnsupportedFormat(u32),

    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,

    /// A wide-character unit was not a valid Unicode scalar value.
    #[error("invalid character code {0:#x}")]
    InvalidChar(u32),

    /// A length does not fit the host's address space.
    #[error("length {0} exceeds addressable size")]
    LengthOverflow(u64),

    /// A stream code byte is not one of the known streams.
    #[error("unknown stream code {0:#04x}")]
    UnknownStream(u8),

    /// An enum discriminant or similar tag was out of range.
    #[error("invalid value {value} for {what}")]
    InvalidTag {
        /// What was being decoded.
        what: &'static str,
        /// The offending value.
        value: u64,
    },

    /// A back-reference points to a tracking id that was never assigned.
    #[error("back-reference to unknown tracking id {0}")]
    DanglingReference(u64),

    /// A back-reference targets an object whose own load has not finished.
    #[error("back-reference to tracking id {0} while it is still being loaded")]
    UnfinishedReference(u64),

    /// A back-link was saved before any owning reference to its target.
    #[error("back-link to '{0}' precedes every owning reference to its target")]
    UnanchoredLink(String),

    /// A reference resolved to an object of an unexpected type.
    #[error("expected an object convertible to '{expected}', found '{found}'")]
    TypeMismatch {
        /// The requested type.
        expected: String,
        /// The type key actually stored.
        found: String,
    },

    /// A decoded payload violates its own structural invariants.
    #[error("malformed payload for '{type_key}': {reason}")]
    Malformed {
        /// The type key being decoded.
        type_key: String,
        /// What was wrong.
        reason: String,
    },

    /// The compression filter failed.
    #[error("compression filter failure: {0}")]
    Compression(String),
}

/// Failures of the type registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A type key was met that no registration covers.
    #[error("type '{0}' is not registered")]
    Unregistered(String),

    /// The same type key was registered twice.
    #[error("type key '{0}' registered more than once")]
    Duplicate(String),

    /// Two different Rust types claim the same cast edge.
    #[error("conflicting conversion from '{from}' to '{to}'")]
    ConflictingCast {
        /// Source type name.
        from: String,
        /// Target type name.
        to: String,
    },

    /// A view was registered for an input type that is not registered.
    #[error("view '{view}' consumes unregistered type '{input}'")]
    UnregisteredViewInput {
        /// The view name.
        view: &'static str,
        /// The input type key.
        input: &'static str,
    },
}

/// The master error enum covering all failure domains in evframe.
///
/// This type is `Clone`; I/O errors are wrapped in `Arc` for that purpose.
#[derive(Error, Debug, Clone)]
pub enum FrameError {
    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Malformed, truncated, corrupt or too-new encoded data.
    #[error("codec error{}: {source}", context_suffix(.context))]
    Codec {
        /// The underlying codec failure.
        #[source]
        source: CodecError,
        /// The frame key or type being decoded, when known.
        context: Option<String>,
    },

    /// Type registry failure.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// `put` on a name that is already occupied.
    #[error("key '{0}' already exists in frame")]
    DuplicateKey(String),

    /// A key name that the frame does not accept.
    #[error("invalid key name '{0}'")]
    InvalidKey(String),

    /// Decode requested on a slot whose encoded bytes were discarded.
    #[error("key '{0}' was never decoded and its blob has been dropped")]
    BlobDropped(String),

    /// A key that must exist for the operation does not.
    #[error("key '{0}' not found in frame")]
    MissingKey(String),

    /// A derived view's stored shape does not match its source.
    #[error("view '{view}' is inconsistent with source '{source_key}': {reason}")]
    InconsistentView {
        /// The view type.
        view: &'static str,
        /// The frame key of the source.
        source_key: String,
        /// What did not match.
        reason: String,
    },

    /// Derived-view resolution recursed past its depth limit.
    #[error("view resolution for '{0}' exceeded the recursion limit")]
    ResolutionCycle(String),

    /// A sidecar index or option set could not be (de)serialized with
    /// bincode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A position beyond the end of a frame file or index.
    #[error("frame position {position} out of range (have {available})")]
    OutOfRange {
        /// Requested position.
        position: usize,
        /// Number of frames available.
        available: usize,
    },

    /// Logic error inside the library. Should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(c) => format!(" in '{c}'"),
        None => String::new(),
    }
}

impl FrameError {
    /// Attaches the name of the key or type being processed to a codec error.
    ///
    /// Errors that already carry a context, and non-codec errors, are
    /// returned unchanged.
    pub fn in_context(self, what: impl Into<String>) -> Self {
        match self {
            Self::Codec {
                source,
                context: None,
            } => Self::Codec {
                source,
                context: Some(what.into()),
            },
            other => other,
        }
    }

    /// Returns the codec error, if this is one.
    pub fn as_codec(&self) -> Option<&CodecError> {
        match self {
            Self::Codec { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True for truncated input.
    pub fn is_read_past_end(&self) -> bool {
        matches!(self.as_codec(), Some(CodecError::ReadPastEnd { .. }))
    }
}

impl From<CodecError> for FrameError {
    fn from(source: CodecError) -> Self {
        Self::Codec {
            source,
            context: None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return CodecError::ReadPastEnd {
                needed: 1,
                remaining: 0,
            }
            .into();
        }
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_context_is_attached_once() {
        let err: FrameError = CodecError::InvalidUtf8.into();
        let err = err.in_context("pulses").in_context("outer");
        assert_eq!(
            err.to_string(),
            "codec error in 'pulses': invalid UTF-8 in string payload"
        );
    }

    #[test]
    fn unexpected_eof_maps_to_read_past_end() {
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        assert!(FrameError::from(io).is_read_past_end());
    }
}
