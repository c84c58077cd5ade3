//! Defines the physical binary layout of frame records and standalone
//! archives.
//!
//! # Frame record
//! A frame file is a plain concatenation of records, one per frame:
//!
//! `[ "[ef]" ] [ u32 format version ] [ stream code ] [ key count ]
//!  { [ name ] [ type name ] [ blob ] }* [ u64 checksum ]`
//!
//! Counts and lengths use the narrow-with-escape encoding of
//! [`crate::codec`]. The checksum is xxHash64 (seed 0) over every byte that
//! precedes it. Blobs are object records produced by
//! [`archive::encode_object`](crate::archive::encode_object) and are kept
//! opaque here; a reader can list a frame's keys without decoding any of
//! them.

use crate::codec::varint::COUNT_ESCAPE;
use crate::codec::{Decoder, Encoder};
use crate::error::{CodecError, Result};
use crate::frame::Stream;
use std::hash::Hasher;
use std::io::{self, Read};
use std::sync::Arc;
use twox_hash::XxHash64;

/// Magic bytes opening every frame record.
pub const FRAME_MAGIC: [u8; 4] = *b"[ef]";

/// Frame record layout version written by this build.
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes opening a standalone archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"EFAR";

/// Standalone archive layout version written by this build.
pub const ARCHIVE_VERSION: u32 = 1;

/// Magic(4) + Version(4) + Stream(1).
pub const RECORD_HEADER_SIZE: usize = 9;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 8;

/// One key of a frame record, still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Frame key.
    pub name: String,
    /// Registered type key of the stored object.
    pub type_name: String,
    /// The encoded object record.
    pub blob: Arc<[u8]>,
}

/// A frame record split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// The frame's stream.
    pub stream: Stream,
    /// Keys in stored order.
    pub entries: Vec<RecordEntry>,
}

/// Computes the record checksum.
pub fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Serializes a record from `(name, type name, blob)` triples.
pub fn encode_record<'a, I>(stream: Stream, entries: I) -> Vec<u8>
where
    I: ExactSizeIterator<Item = (&'a str, &'a str, &'a [u8])>,
{
    let mut enc = Encoder::new();
    enc.put_raw(&FRAME_MAGIC);
    enc.put(FORMAT_VERSION);
    enc.put(stream.code());
    enc.put_count(entries.len() as u64);
    for (name, type_name, blob) in entries {
        enc.put_str(name);
        enc.put_str(type_name);
        enc.put_bytes(blob);
    }
    let sum = checksum(enc.as_bytes());
    enc.put(sum);
    enc.into_bytes()
}

/// Parses one record from the front of `bytes`.
///
/// Returns the record and the number of bytes it occupied. With `verify`
/// unset the checksum is skipped but still consumed.
pub fn decode_record(bytes: &[u8], verify: bool) -> Result<(RawRecord, usize)> {
    let mut dec = Decoder::new(bytes);
    let stream = read_header(&mut dec)?;
    let count = dec.get_len(3)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let name = dec.get_str()?;
        let type_name = dec.get_str()?;
        let blob: Arc<[u8]> = Arc::from(dec.get_bytes()?);
        entries.push(RecordEntry {
            name,
            type_name,
            blob,
        });
    }

    let body_len = dec.position();
    let stored = dec.get::<u64>()?;
    if verify {
        let computed = checksum(&bytes[..body_len]);
        if computed != stored {
            return Err(CodecError::ChecksumMismatch { stored, computed }.into());
        }
    }
    tracing::trace!(%stream, keys = entries.len(), len = dec.position(), "decoded frame record");
    Ok((RawRecord { stream, entries }, dec.position()))
}

/// Walks one record at the front of `bytes` without copying anything.
///
/// Returns the record's stream and length.
pub fn scan_record(bytes: &[u8]) -> Result<(Stream, usize)> {
    let mut dec = Decoder::new(bytes);
    let stream = read_header(&mut dec)?;
    let count = dec.get_len(3)?;
    for _ in 0..count {
        dec.get_bytes()?;
        dec.get_bytes()?;
        dec.get_bytes()?;
    }
    dec.take(CHECKSUM_SIZE)?;
    Ok((stream, dec.position()))
}

fn read_header(dec: &mut Decoder<'_>) -> Result<Stream> {
    let magic = dec.take(FRAME_MAGIC.len())?;
    if magic != FRAME_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(CodecError::BadSignature {
            expected: FRAME_MAGIC,
            found,
        }
        .into());
    }
    let version = dec.get::<u32>()?;
    if version > FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat(version).into());
    }
    Stream::from_code(dec.get::<u8>()?)
}

/// Reads the bytes of one whole record from a byte stream.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte
/// of a record, and a read-past-end error when it ends anywhere inside one.
/// Only the record structure is walked; nothing is decoded.
pub fn read_record_bytes<R: Read>(src: &mut R) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::with_capacity(256);

    let mut first = [0u8; 1];
    loop {
        match src.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.push(first[0]);
    pull(src, &mut buf, RECORD_HEADER_SIZE - 1)?;

    let count = pull_count(src, &mut buf)?;
    for _ in 0..count {
        for _ in 0..3 {
            let len = pull_count(src, &mut buf)?;
            let len = usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
            pull(src, &mut buf, len)?;
        }
    }
    pull(src, &mut buf, CHECKSUM_SIZE)?;
    Ok(Some(buf))
}

fn pull<R: Read>(src: &mut R, buf: &mut Vec<u8>, n: usize) -> Result<()> {
    let start = buf.len();
    let got = src.by_ref().take(n as u64).read_to_end(buf)?;
    if got < n {
        buf.truncate(start);
        return Err(CodecError::ReadPastEnd {
            needed: n as u64,
            remaining: got as u64,
        }
        .into());
    }
    Ok(())
}

fn pull_count<R: Read>(src: &mut R, buf: &mut Vec<u8>) -> Result<u64> {
    let start = buf.len();
    pull(src, buf, 4)?;
    let mut dec = Decoder::new(&buf[start..]);
    let narrow = dec.get::<u32>()?;
    if narrow != COUNT_ESCAPE {
        return Ok(u64::from(narrow));
    }
    let start = buf.len();
    pull(src, buf, 8)?;
    Decoder::new(&buf[start..]).get::<u64>()
}
