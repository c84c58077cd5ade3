//! Narrow-with-escape integer encoding.
//!
//! Versions are written as one byte and sizes as four. A value at or above
//! the narrow width's maximum is written as that maximum (the escape
//! sentinel) followed by the full 64-bit value. Decoders only read the
//! extension after seeing the sentinel.

/// Escape sentinel for one-byte schema versions.
pub const VERSION_ESCAPE: u8 = u8::MAX;

/// Escape sentinel for four-byte collection counts.
pub const COUNT_ESCAPE: u32 = u32::MAX;

/// Number of bytes a version occupies on the wire.
pub fn version_len(version: u32) -> usize {
    if version < u32::from(VERSION_ESCAPE) { 1 } else { 9 }
}

/// Number of bytes a count occupies on the wire.
pub fn count_len(count: u64) -> usize {
    if count < u64::from(COUNT_ESCAPE) { 4 } else { 12 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};

    #[test]
    fn version_boundary() {
        for (value, width) in [(0u32, 1), (254, 1), (255, 9), (256, 9), (u32::MAX, 9)] {
            let mut enc = Encoder::new();
            enc.put_version(value);
            assert_eq!(enc.len(), width, "width of version {value}");
            assert_eq!(version_len(value), width);
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.get_version().unwrap(), value);
            assert!(dec.is_empty());
        }
    }

    #[test]
    fn count_boundary() {
        let max = u64::from(u32::MAX);
        for (value, width) in [(0u64, 4), (max - 1, 4), (max, 12), (max + 1, 12), (u64::MAX, 12)] {
            let mut enc = Encoder::new();
            enc.put_count(value);
            assert_eq!(enc.len(), width, "width of count {value}");
            assert_eq!(count_len(value), width);
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.get_count().unwrap(), value);
        }
    }

    #[test]
    fn sentinel_without_extension_is_truncation() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut dec = Decoder::new(&bytes);
        let err = dec.get_count().unwrap_err();
        assert!(err.is_read_past_end());
    }
}
