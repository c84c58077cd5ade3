use super::endian::{Endian, ImageFn, Primitive};
use super::varint::{COUNT_ESCAPE, VERSION_ESCAPE};
use crate::error::{CodecError, Result};

/// Reads primitives back out of the canonical wire form.
///
/// Every read either returns a complete value or fails with
/// [`CodecError::ReadPastEnd`]; nothing is ever partially filled.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    host: Endian,
    image: ImageFn,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder for the running machine.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_host(data, Endian::native())
    }

    /// Creates a decoder that behaves as a host of the given byte order.
    pub fn with_host(data: &'a [u8], host: Endian) -> Self {
        Self {
            data,
            pos: 0,
            host,
            image: host.image_fn(),
        }
    }

    /// The host order this decoder models.
    pub fn host(&self) -> Endian {
        self.host
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::ReadPastEnd {
                needed: n as u64,
                remaining: remaining as u64,
            }
            .into());
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    /// Reads a fixed-width value.
    pub fn get<P: Primitive>(&mut self) -> Result<P> {
        let raw = self.take(P::WIDTH)?;
        let mut image = P::Bytes::default();
        image.as_mut().copy_from_slice(raw);
        (self.image)(image.as_mut(), P::SWAP);
        Ok(P::from_image(image))
    }

    /// Reads a boolean. Any non-zero byte is `true`.
    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get::<u8>()? != 0)
    }

    /// Reads a schema version written by [`Encoder::put_version`](super::Encoder::put_version).
    pub fn get_version(&mut self) -> Result<u32> {
        let narrow: u8 = self.get()?;
        if narrow != VERSION_ESCAPE {
            return Ok(u32::from(narrow));
        }
        let wide: u64 = self.get()?;
        u32::try_from(wide).map_err(|_| {
            CodecError::InvalidTag {
                what: "schema version",
                value: wide,
            }
            .into()
        })
    }

    /// Reads a count written by [`Encoder::put_count`](super::Encoder::put_count).
    pub fn get_count(&mut self) -> Result<u64> {
        let narrow: u32 = self.get()?;
        if narrow != COUNT_ESCAPE {
            return Ok(u64::from(narrow));
        }
        self.get()
    }

    /// Reads a count that must address memory, checking it against the
    /// remaining input at `min_item_size` bytes per item.
    pub fn get_len(&mut self, min_item_size: usize) -> Result<usize> {
        let count = self.get_count()?;
        let len = usize::try_from(count).map_err(|_| CodecError::LengthOverflow(count))?;
        let needed = len.saturating_mul(min_item_size);
        if needed > self.remaining() {
            return Err(CodecError::ReadPastEnd {
                needed: needed as u64,
                remaining: self.remaining() as u64,
            }
            .into());
        }
        Ok(len)
    }

    /// Reads a length-prefixed byte run without copying.
    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_len(1)?;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8.into())
    }

    /// Reads a wide string of 4-byte code units.
    pub fn get_wide(&mut self) -> Result<String> {
        let len = self.get_len(4)?;
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            let unit: u32 = self.get()?;
            out.push(char::from_u32(unit).ok_or(CodecError::InvalidChar(unit))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoder;

    #[test]
    fn truncated_value_is_an_error() {
        let mut dec = Decoder::new(&[1, 2, 3]);
        let err = dec.get::<u32>().unwrap_err();
        assert!(err.is_read_past_end());
        // Nothing consumed on failure.
        assert_eq!(dec.position(), 0);
    }

    #[test]
    fn bool_is_truthy() {
        let mut dec = Decoder::new(&[0, 1, 7]);
        assert!(!dec.get_bool().unwrap());
        assert!(dec.get_bool().unwrap());
        assert!(dec.get_bool().unwrap());
    }

    #[test]
    fn oversized_length_prefix_does_not_allocate() {
        let mut enc = Encoder::new();
        enc.put_count(1 << 40);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(dec.get_bytes().unwrap_err().is_read_past_end());
    }

    #[test]
    fn wide_strings_survive_foreign_hosts() {
        let mut enc = Encoder::with_host(Endian::Big);
        enc.put_wide("Δt ≥ 0");
        let bytes = enc.into_bytes();

        let mut native = Encoder::with_host(Endian::Little);
        native.put_wide("Δt ≥ 0");
        assert_eq!(bytes, native.into_bytes());

        let mut dec = Decoder::with_host(&bytes, Endian::Big);
        assert_eq!(dec.get_wide().unwrap(), "Δt ≥ 0");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut enc = Encoder::new();
        enc.put_bytes(&[0xC3, 0x28]);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.get_str().unwrap_err().as_codec(),
            Some(CodecError::InvalidUtf8)
        ));
    }
}
