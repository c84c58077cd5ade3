//! Transparent compression filter for frame files.
//!
//! A frame file is either a plain concatenation of frame records or that
//! same byte stream wrapped in an LZ4 frame. Readers tell the two apart from
//! the leading magic bytes, so nothing about the compression is recorded in
//! the frame records themselves.

use crate::error::{CodecError, FrameError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read, Write};

/// Magic bytes opening an LZ4 frame.
pub const LZ4_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

/// The filter applied around a frame file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Records are written as they are.
    #[default]
    None,
    /// The whole stream is one LZ4 frame (feature `lz4_flex`).
    Lz4,
}

impl Compression {
    /// Identifies the filter from the first bytes of a file.
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&LZ4_MAGIC) {
            Compression::Lz4
        } else {
            Compression::None
        }
    }

    /// True if this build can read and write the filter.
    pub fn is_available(self) -> bool {
        match self {
            Compression::None => true,
            Compression::Lz4 => cfg!(feature = "lz4_flex"),
        }
    }

    /// Short name for reports.
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
        }
    }
}

#[cfg_attr(feature = "lz4_flex", allow(dead_code))]
fn unavailable(compression: Compression) -> FrameError {
    CodecError::Compression(format!(
        "{} support is not compiled into this build",
        compression.name()
    ))
    .into()
}

/// A sink with the selected filter applied.
pub enum CompressedWriter<W: Write> {
    /// No filter.
    Plain(W),
    /// LZ4 frame encoder.
    #[cfg(feature = "lz4_flex")]
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    /// Wraps `sink` in the given filter.
    pub fn new(sink: W, compression: Compression) -> Result<Self> {
        match compression {
            Compression::None => Ok(Self::Plain(sink)),
            #[cfg(feature = "lz4_flex")]
            Compression::Lz4 => Ok(Self::Lz4(lz4_flex::frame::FrameEncoder::new(sink))),
            #[cfg(not(feature = "lz4_flex"))]
            Compression::Lz4 => Err(unavailable(compression)),
        }
    }

    /// Which filter is applied.
    pub fn compression(&self) -> Compression {
        match self {
            Self::Plain(_) => Compression::None,
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(_) => Compression::Lz4,
        }
    }

    /// Flushes the filter's trailer and returns the underlying sink.
    pub fn finish(self) -> Result<W> {
        match self {
            Self::Plain(mut sink) => {
                sink.flush()?;
                Ok(sink)
            }
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(encoder) => {
                let mut sink = encoder
                    .finish()
                    .map_err(|e| FrameError::from(CodecError::Compression(e.to_string())))?;
                sink.flush()?;
                Ok(sink)
            }
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(sink) => sink.write(buf),
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(sink) => sink.flush(),
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(encoder) => encoder.flush(),
        }
    }
}

impl<W: Write> std::fmt::Debug for CompressedWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompressedWriter")
            .field(&self.compression())
            .finish()
    }
}

/// A source with its filter detected and removed.
pub enum DecompressedReader<R: Read> {
    /// No filter.
    Plain(BufReader<R>),
    /// LZ4 frame decoder.
    #[cfg(feature = "lz4_flex")]
    Lz4(lz4_flex::frame::FrameDecoder<BufReader<R>>),
}

impl<R: Read> DecompressedReader<R> {
    /// Peeks at the first bytes of `src` and installs the matching filter.
    pub fn new(src: R) -> Result<Self> {
        let mut buffered = BufReader::new(src);
        let compression = Compression::detect(buffered.fill_buf()?);
        match compression {
            Compression::None => Ok(Self::Plain(buffered)),
            #[cfg(feature = "lz4_flex")]
            Compression::Lz4 => Ok(Self::Lz4(lz4_flex::frame::FrameDecoder::new(buffered))),
            #[cfg(not(feature = "lz4_flex"))]
            Compression::Lz4 => Err(unavailable(compression)),
        }
    }

    /// Which filter was detected.
    pub fn compression(&self) -> Compression {
        match self {
            Self::Plain(_) => Compression::None,
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(_) => Compression::Lz4,
        }
    }
}

impl<R: Read> Read for DecompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(src) => src.read(buf),
            #[cfg(feature = "lz4_flex")]
            Self::Lz4(decoder) => decoder.read(buf),
        }
    }
}

impl<R: Read> std::fmt::Debug for DecompressedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DecompressedReader")
            .field(&self.compression())
            .finish()
    }
}

/// Removes the filter from an in-memory file.
///
/// Plain input is borrowed as is.
pub fn decompress_all(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    match Compression::detect(bytes) {
        Compression::None => Ok(Cow::Borrowed(bytes)),
        #[cfg(feature = "lz4_flex")]
        Compression::Lz4 => {
            let mut out = Vec::with_capacity(bytes.len() * 2);
            lz4_flex::frame::FrameDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| FrameError::from(CodecError::Compression(e.to_string())))?;
            Ok(Cow::Owned(out))
        }
        #[cfg(not(feature = "lz4_flex"))]
        Compression::Lz4 => Err(unavailable(Compression::Lz4)),
    }
}
