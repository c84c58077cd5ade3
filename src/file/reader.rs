use crate::archive::TypeRegistry;
use crate::compression::{Compression, DecompressedReader};
use crate::config::ReaderOptions;
use crate::error::Result;
use crate::format::{self, RECORD_HEADER_SIZE};
use crate::frame::{Frame, Stream};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// One record as found in the stream, not yet turned into a frame.
#[derive(Debug, Clone)]
pub struct RecordBytes {
    /// Position of the record in the file.
    pub sequence: u64,
    /// Offset in the uncompressed stream.
    pub offset: u64,
    /// The record's stream.
    pub stream: Stream,
    /// The whole record.
    pub bytes: Vec<u8>,
}

/// Reads frames one after another from a byte stream.
///
/// Frames come back exactly as stored: every key starts encoded and no
/// mixing is applied (see [`FrameMixer`](crate::frame::FrameMixer)).
/// Iteration stops after the first error.
#[derive(Debug)]
pub struct FrameReader<R: Read> {
    src: DecompressedReader<R>,
    registry: Arc<TypeRegistry>,
    options: ReaderOptions,
    offset: u64,
    sequence: u64,
    failed: bool,
}

impl FrameReader<File> {
    /// Opens a frame file.
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::new(File::open(path)?, registry)
    }
}

impl<R: Read> FrameReader<R> {
    /// Reads with default options.
    pub fn new(src: R, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::with_options(src, registry, ReaderOptions::default())
    }

    /// Reads with explicit options.
    pub fn with_options(
        src: R,
        registry: Arc<TypeRegistry>,
        options: ReaderOptions,
    ) -> Result<Self> {
        if !options.verify_checksums {
            tracing::warn!("frame checksum verification disabled");
        }
        Ok(Self {
            src: DecompressedReader::new(src)?,
            registry,
            options,
            offset: 0,
            sequence: 0,
            failed: false,
        })
    }

    /// The filter detected on the input.
    pub fn compression(&self) -> Compression {
        self.src.compression()
    }

    /// Frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.sequence
    }

    /// Offset of the next record in the uncompressed stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next record without decoding it.
    ///
    /// `Ok(None)` at a clean end of input; a read-past-end error if the
    /// input stops inside a record.
    pub fn next_record(&mut self) -> Result<Option<RecordBytes>> {
        let Some(bytes) = format::read_record_bytes(&mut self.src)? else {
            return Ok(None);
        };
        // The header was fully read, so the stream code byte is present.
        let stream = Stream::from_code(bytes[RECORD_HEADER_SIZE - 1])?;
        let record = RecordBytes {
            sequence: self.sequence,
            offset: self.offset,
            stream,
            bytes,
        };
        self.offset += record.bytes.len() as u64;
        self.sequence += 1;
        Ok(Some(record))
    }

    /// Reads and parses the next frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(record) = self.next_record()? else {
            return Ok(None);
        };
        let (frame, _) = Frame::from_bytes(&record.bytes, Arc::clone(&self.registry), &self.options)
            .map_err(|e| e.in_context(format!("frame {}", record.sequence)))?;
        tracing::debug!(
            sequence = record.sequence,
            stream = %frame.stream(),
            keys = frame.len(),
            "read frame"
        );
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
