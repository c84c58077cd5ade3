use crate::error::{FrameError, Result};
use crate::format;
use crate::frame::{CacheOrder, Stream};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Location of one frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Position of the frame in the file, starting at 0.
    pub sequence: u64,
    /// Byte offset of the record in the uncompressed stream.
    pub offset: u64,
    /// Record length in bytes.
    pub length: u64,
    /// The frame's stream.
    pub stream: Stream,
}

impl IndexEntry {
    /// Byte range of the record.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.length) as usize
    }
}

/// Offsets of every frame in a file, built by one forward scan.
///
/// A file that ends inside a record still indexes: the complete records
/// before it are listed and [`FrameIndex::truncated_at`] names the offset
/// of the partial one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameIndex {
    entries: Vec<IndexEntry>,
    truncated_at: Option<u64>,
}

impl FrameIndex {
    /// Indexes an uncompressed record stream held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut index = FrameIndex::default();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match format::scan_record(&bytes[offset..]) {
                Ok((stream, length)) => {
                    index.push(offset as u64, length as u64, stream);
                    offset += length;
                }
                Err(e) if e.is_read_past_end() => {
                    tracing::warn!(offset, frames = index.len(), "frame file ends inside a record");
                    index.truncated_at = Some(offset as u64);
                    break;
                }
                Err(e) => return Err(e.in_context(format!("frame {}", index.len()))),
            }
        }
        tracing::debug!(frames = index.len(), bytes = offset, "indexed frame records");
        Ok(index)
    }

    /// Indexes a record stream read from `src`, which must already be
    /// decompressed.
    pub fn scan<R: Read>(src: &mut R) -> Result<Self> {
        let mut index = FrameIndex::default();
        let mut offset = 0u64;
        loop {
            match format::read_record_bytes(src) {
                Ok(Some(bytes)) => {
                    let (stream, length) = format::scan_record(&bytes)?;
                    index.push(offset, length as u64, stream);
                    offset += length as u64;
                }
                Ok(None) => break,
                Err(e) if e.is_read_past_end() => {
                    tracing::warn!(
                        offset,
                        frames = index.len(),
                        "frame stream ends inside a record"
                    );
                    index.truncated_at = Some(offset);
                    break;
                }
                Err(e) => return Err(e.in_context(format!("frame {}", index.len()))),
            }
        }
        Ok(index)
    }

    fn push(&mut self, offset: u64, length: u64, stream: Stream) {
        let sequence = self.entries.len() as u64;
        self.entries.push(IndexEntry {
            sequence,
            offset,
            length,
            stream,
        });
    }

    /// Number of complete frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no complete frame was found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The entry at `position`.
    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// Offset of a trailing partial record, if the scan met one.
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Positions of every frame on `stream`.
    pub fn positions_of(&self, stream: Stream) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.stream == stream)
            .map(|(i, _)| i)
            .collect()
    }

    /// The last frame of `stream` strictly before `position`.
    pub fn latest_before(&self, position: usize, stream: Stream) -> Option<usize> {
        let end = position.min(self.entries.len());
        self.entries[..end].iter().rposition(|e| e.stream == stream)
    }

    /// For every frame, the frames it inherits keys from when the file is
    /// read in order, most recently cached first.
    ///
    /// This is what a [`FrameMixer`](crate::frame::FrameMixer) would do,
    /// computed from stream tags alone.
    pub fn parents_table(&self, track_order: bool) -> Vec<Vec<usize>> {
        let mut cache = CacheOrder::new(track_order);
        let mut table = Vec::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            cache.supersede(entry.stream);
            let parents = if entry.stream.mixes() {
                cache
                    .iter()
                    .rev()
                    .filter(|(s, _)| *s != entry.stream)
                    .map(|(_, p)| *p)
                    .collect()
            } else {
                Vec::new()
            };
            table.push(parents);
            cache.insert(entry.stream, position);
        }
        table
    }

    /// Writes the index with bincode.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        bincode::serde::encode_into_std_write(self, sink, bincode::config::standard())
            .map_err(|e| FrameError::Serialization(e.to_string()))?;
        Ok(())
    }

    /// Reads an index written by [`FrameIndex::write_to`].
    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        bincode::serde::decode_from_std_read(src, bincode::config::standard())
            .map_err(|e| FrameError::Serialization(e.to_string()))
    }

    /// Saves the index as a sidecar file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut sink = BufWriter::new(File::create(path)?);
        self.write_to(&mut sink)?;
        sink.flush()?;
        Ok(())
    }

    /// Loads a sidecar file written by [`FrameIndex::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(&mut BufReader::new(File::open(path)?))
    }
}
