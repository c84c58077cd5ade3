//! Configuration types for writing, reading and sequencing frame files.
//!
//! Every option struct has sensible defaults and deserializes with missing
//! fields filled in, so it can be embedded in a host application's own
//! configuration file.

use crate::compression::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

/// Options for [`FrameWriter`](crate::file::FrameWriter), usually set
/// through [`FrameWriter::builder`](crate::file::FrameWriter::builder).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Filter applied around the whole file.
    pub compression: Compression,
    /// Also write keys inherited from other streams.
    pub include_mixed: bool,
    /// Parse every record back right after encoding it.
    pub verify_on_write: bool,
}

/// Options for [`FrameReader`](crate::file::FrameReader) and
/// [`FrameFile`](crate::file::FrameFile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Check each record's checksum.
    pub verify_checksums: bool,
    /// Keys that are dropped while reading, never stored in the frame.
    pub skip_keys: BTreeSet<String>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            skip_keys: BTreeSet::new(),
        }
    }
}

impl ReaderOptions {
    /// Adds a key to drop while reading.
    pub fn skip_key(mut self, key: impl Into<String>) -> Self {
        self.skip_keys.insert(key.into());
        self
    }

    /// Enables or disables checksum verification.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

/// Options for [`FrameMixer`](crate::frame::FrameMixer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerOptions {
    /// A newly cached stream invalidates every stream cached after it.
    pub track_order: bool,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self { track_order: true }
    }
}

/// Options for [`FrameSequence`](crate::file::FrameSequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Maximum number of mixed frames kept in memory.
    pub cache_capacity: NonZeroUsize,
    /// How parent frames are chosen.
    pub mixing: MixerOptions,
    /// How records are read.
    pub reader: ReaderOptions,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            cache_capacity: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
            mixing: MixerOptions::default(),
            reader: ReaderOptions::default(),
        }
    }
}

impl SequenceOptions {
    /// Create a new builder.
    pub fn builder() -> SequenceOptionsBuilder {
        SequenceOptionsBuilder::default()
    }
}

/// Builder for [`SequenceOptions`].
#[derive(Debug, Clone, Default)]
pub struct SequenceOptionsBuilder {
    options: SequenceOptions,
}

impl SequenceOptionsBuilder {
    /// Set the cache capacity.
    pub fn cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.options.cache_capacity = capacity;
        self
    }

    /// Set whether the mixer tracks stream order.
    pub fn track_order(mut self, track: bool) -> Self {
        self.options.mixing.track_order = track;
        self
    }

    /// Set the reader options.
    pub fn reader(mut self, reader: ReaderOptions) -> Self {
        self.options.reader = reader;
        self
    }

    /// Build the options.
    pub fn build(self) -> SequenceOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_survive_bincode() {
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(SequenceOptions::default(), config).unwrap();
        let (back, _): (SequenceOptions, usize) =
            bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(back, SequenceOptions::default());
        assert!(back.reader.verify_checksums);
        assert!(back.mixing.track_order);
    }

    #[test]
    fn builders_set_fields() {
        let seq = SequenceOptions::builder()
            .cache_capacity(NonZeroUsize::new(3).unwrap())
            .track_order(false)
            .reader(ReaderOptions::default().skip_key("big"))
            .build();
        assert_eq!(seq.cache_capacity.get(), 3);
        assert!(!seq.mixing.track_order);
        assert!(seq.reader.skip_keys.contains("big"));
    }
}
