//! Tools for inspecting the physical structure of frame files.
//! Useful for checking what a file holds without decoding any payload.

use crate::error::{CodecError, Result};
use crate::file::FrameFile;
use crate::format;
use crate::frame::Stream;
use serde::Serialize;
use std::path::Path;

/// A structural report of a frame file.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    /// Total size of the file on disk.
    pub file_size: u64,
    /// Compression filter name.
    pub compression: String,
    /// Number of complete frames.
    pub frame_count: usize,
    /// Offset of a trailing partial record, if any.
    pub truncated_at: Option<u64>,
    /// One entry per complete frame.
    pub frames: Vec<FrameInfo>,
}

/// Layout of a single frame record.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Position in the file.
    pub sequence: u64,
    /// The frame's stream.
    pub stream: Stream,
    /// Offset in the uncompressed stream.
    pub offset: u64,
    /// Record length.
    pub length: u64,
    /// Whether the stored checksum matches.
    pub checksum_ok: bool,
    /// Keys in stored order.
    pub keys: Vec<KeyInfo>,
}

/// One key of a frame record.
#[derive(Debug, Serialize)]
pub struct KeyInfo {
    /// Frame key.
    pub name: String,
    /// Registered type key.
    pub type_name: String,
    /// Encoded size.
    pub blob_size: usize,
}

/// The frame file inspector.
#[derive(Debug)]
pub struct FrameInspector;

impl FrameInspector {
    /// Opens and analyzes a file.
    pub fn inspect_path<P: AsRef<Path>>(path: P) -> Result<ScanReport> {
        Self::inspect(&FrameFile::open(path)?)
    }

    /// Analyzes an opened file.
    ///
    /// A checksum mismatch is reported, not raised; structural damage is
    /// an error.
    pub fn inspect(file: &FrameFile) -> Result<ScanReport> {
        let mut frames = Vec::with_capacity(file.len());
        for entry in file.index().entries() {
            let bytes = file.record(entry.sequence as usize)?;
            let (record, checksum_ok) = match format::decode_record(bytes, true) {
                Ok((record, _)) => (record, true),
                Err(e) if matches!(e.as_codec(), Some(CodecError::ChecksumMismatch { .. })) => {
                    tracing::warn!(sequence = entry.sequence, "frame checksum mismatch");
                    (format::decode_record(bytes, false)?.0, false)
                }
                Err(e) => return Err(e.in_context(format!("frame {}", entry.sequence))),
            };
            frames.push(FrameInfo {
                sequence: entry.sequence,
                stream: record.stream,
                offset: entry.offset,
                length: entry.length,
                checksum_ok,
                keys: record
                    .entries
                    .into_iter()
                    .map(|e| KeyInfo {
                        blob_size: e.blob.len(),
                        name: e.name,
                        type_name: e.type_name,
                    })
                    .collect(),
            });
        }

        Ok(ScanReport {
            file_size: file.file_size(),
            compression: file.compression().name().to_string(),
            frame_count: frames.len(),
            truncated_at: file.index().truncated_at(),
            frames,
        })
    }
}

impl std::fmt::Display for ScanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== FRAME FILE REPORT ===")?;
        writeln!(f, "File Size:    {}", self.file_size)?;
        writeln!(f, "Compression:  {}", self.compression)?;
        writeln!(f, "Frames:       {}", self.frame_count)?;
        if let Some(offset) = self.truncated_at {
            writeln!(f, "Truncated at: {offset}")?;
        }
        writeln!(f, "\n[FRAMES]")?;
        for (i, frame) in self.frames.iter().enumerate() {
            frame.fmt_tree(f, i + 1 == self.frames.len())?;
        }
        Ok(())
    }
}

impl FrameInfo {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, is_last: bool) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let damaged = if self.checksum_ok { "" } else { " [CHECKSUM MISMATCH]" };
        writeln!(
            f,
            "{connector}#{} {} @ {} | Size: {}b | Keys: {}{damaged}",
            self.sequence,
            self.stream,
            self.offset,
            self.length,
            self.keys.len()
        )?;
        for (i, key) in self.keys.iter().enumerate() {
            let connector = if i + 1 == self.keys.len() { "└── " } else { "├── " };
            writeln!(
                f,
                "{child_prefix}{connector}'{}' {} ({}b)",
                key.name, key.type_name, key.blob_size
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TypeRegistry;
    use crate::file::FrameWriter;
    use crate::frame::Frame;
    use crate::payload::{F64Value, StringValue};
    use std::sync::Arc;

    #[test]
    fn report_lists_frames_and_keys() {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let mut writer = FrameWriter::builder().build(Vec::new()).unwrap();
        let mut geo = Frame::new(Stream::Geometry, Arc::clone(&registry));
        geo.put("detector", StringValue("deep core".into())).unwrap();
        writer.write(&geo).unwrap();
        let mut physics = Frame::new(Stream::Physics, registry);
        physics.put("energy", F64Value(3.5)).unwrap();
        writer.write(&physics).unwrap();
        let mut bytes = writer.finish().unwrap();

        let last = bytes.len() - format::CHECKSUM_SIZE - 1;
        bytes[last] ^= 0xff;
        let report = FrameInspector::inspect(&FrameFile::from_bytes(bytes).unwrap()).unwrap();
        assert_eq!(report.frame_count, 2);
        assert!(report.frames[0].checksum_ok);
        assert!(!report.frames[1].checksum_ok);
        assert_eq!(report.frames[1].keys[0].type_name, "F64Value");

        let text = report.to_string();
        assert!(text.contains("'detector' StringValue"));
        assert!(text.contains("CHECKSUM MISMATCH"));
    }
}
