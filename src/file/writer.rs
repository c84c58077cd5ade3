use crate::compression::{Compression, CompressedWriter};
use crate::config::WriterOptions;
use crate::error::{FrameError, Result};
use crate::format;
use crate::frame::Frame;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Appends frames to a frame file.
///
/// Offsets reported by [`FrameWriter::write`] are positions in the
/// uncompressed record stream, the same coordinates a
/// [`FrameIndex`](super::FrameIndex) uses.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    sink: CompressedWriter<W>,
    options: WriterOptions,
    offset: u64,
    frames: u64,
}

/// Builder for [`FrameWriter`].
#[derive(Debug, Clone, Default)]
pub struct FrameWriterBuilder {
    options: WriterOptions,
}

impl FrameWriterBuilder {
    /// Set the compression filter.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.options.compression = compression;
        self
    }

    /// Also write keys a frame inherited from other streams.
    pub fn include_mixed(mut self, include: bool) -> Self {
        self.options.include_mixed = include;
        self
    }

    /// Parse every record back right after encoding it.
    pub fn verify_on_write(mut self, verify: bool) -> Self {
        self.options.verify_on_write = verify;
        self
    }

    /// Use a complete set of options.
    pub fn options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    /// Create a writer over `sink`.
    pub fn build<W: Write>(self, sink: W) -> Result<FrameWriter<W>> {
        FrameWriter::new(sink, self.options)
    }

    /// Create (truncate) a file and write to it.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<FrameWriter<BufWriter<File>>> {
        let file = File::create(path)?;
        FrameWriter::new(BufWriter::new(file), self.options)
    }
}

impl FrameWriter<BufWriter<File>> {
    /// Create a new builder.
    pub fn builder() -> FrameWriterBuilder {
        FrameWriterBuilder::default()
    }

    /// Creates (truncates) a file with default options.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().create(path)
    }
}

impl<W: Write> FrameWriter<W> {
    /// Wraps `sink`.
    pub fn new(sink: W, options: WriterOptions) -> Result<Self> {
        Ok(Self {
            sink: CompressedWriter::new(sink, options.compression)?,
            options,
            offset: 0,
            frames: 0,
        })
    }

    /// The options in effect.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Encodes and appends one frame. Returns the offset it starts at.
    pub fn write(&mut self, frame: &Frame) -> Result<u64> {
        let record = frame.to_record(self.options.include_mixed)?;
        if self.options.verify_on_write {
            let (parsed, used) = format::decode_record(&record, true)?;
            if used != record.len() || parsed.stream != frame.stream() {
                return Err(FrameError::Internal(format!(
                    "frame record {} did not parse back",
                    self.frames
                )));
            }
        }
        self.write_record(&record)
    }

    /// Appends an already encoded record verbatim.
    pub fn write_record(&mut self, record: &[u8]) -> Result<u64> {
        let start = self.offset;
        self.sink.write_all(record)?;
        self.offset += record.len() as u64;
        self.frames += 1;
        tracing::trace!(offset = start, len = record.len(), "wrote frame record");
        Ok(start)
    }

    /// Bytes written so far, before compression.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Flushes everything and returns the underlying sink.
    pub fn finish(self) -> Result<W> {
        tracing::debug!(frames = self.frames, bytes = self.offset, "finished frame file");
        self.sink.finish()
    }
}
