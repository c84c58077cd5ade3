//! Frame files.
//!
//! A frame file is a concatenation of frame records (see [`crate::format`]),
//! optionally wrapped in a compression filter. [`FrameWriter`] and
//! [`FrameReader`] stream frames in order; [`FrameFile`] and
//! [`FrameSequence`] index a whole file for random access.
//!
//! ```rust
//! use evframe::file::{FrameReader, FrameWriter};
//! use evframe::payload::I32Value;
//! use evframe::{Frame, Stream, TypeRegistry};
//! use std::sync::Arc;
//!
//! # fn main() -> evframe::Result<()> {
//! let registry = Arc::new(TypeRegistry::standard()?);
//! let mut writer = FrameWriter::builder().build(Vec::new())?;
//! let mut frame = Frame::new(Stream::DAQ, Arc::clone(&registry));
//! frame.put("trigger", I32Value(7))?;
//! writer.write(&frame)?;
//! let bytes = writer.finish()?;
//!
//! let mut reader = FrameReader::new(&bytes[..], registry)?;
//! let back = reader.next_frame()?.expect("one frame");
//! assert_eq!(back.get::<I32Value>("trigger")?.map(|v| v.0), Some(7));
//! assert!(reader.next_frame()?.is_none());
//! # Ok(())
//! # }
//! ```

mod index;
mod reader;
mod sequence;
mod writer;

pub use index::{FrameIndex, IndexEntry};
pub use reader::{FrameReader, RecordBytes};
pub use sequence::{FrameFile, FrameSequence};
pub use writer::{FrameWriter, FrameWriterBuilder};
