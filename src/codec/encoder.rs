use super::endian::{Endian, ImageFn, Primitive};
use super::varint::{COUNT_ESCAPE, VERSION_ESCAPE};

/// Writes primitives into the canonical wire form.
///
/// The encoder knows nothing about objects; it only lays down bytes.
#[derive(Debug, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
    host: Endian,
    image: ImageFn,
}

impl Encoder {
    /// Creates an encoder for the running machine.
    pub fn new() -> Self {
        Self::with_host(Endian::native())
    }

    /// Creates an encoder that behaves as a host of the given byte order.
    pub fn with_host(host: Endian) -> Self {
        Self {
            buf: Vec::new(),
            host,
            image: host.image_fn(),
        }
    }

    /// The host order this encoder models.
    pub fn host(&self) -> Endian {
        self.host
    }

    /// Writes a fixed-width value.
    pub fn put<P: Primitive>(&mut self, value: P) {
        let mut image = value.to_image();
        (self.image)(image.as_mut(), P::SWAP);
        self.buf.extend_from_slice(image.as_ref());
    }

    /// Writes a boolean as a single byte.
    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Writes a schema version: one byte, escaped to a full `u64` when it
    /// does not fit below the sentinel.
    pub fn put_version(&mut self, version: u32) {
        match u8::try_from(version) {
            Ok(narrow) if narrow < VERSION_ESCAPE => self.put(narrow),
            _ => {
                self.put(VERSION_ESCAPE);
                self.put(u64::from(version));
            }
        }
    }

    /// Writes a collection size or length: four bytes, escaped to a full
    /// `u64` when it does not fit below the sentinel.
    pub fn put_count(&mut self, count: u64) {
        match u32::try_from(count) {
            Ok(narrow) if narrow < COUNT_ESCAPE => self.put(narrow),
            _ => {
                self.put(COUNT_ESCAPE);
                self.put(count);
            }
        }
    }

    /// Writes a length-prefixed byte run.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_count(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes bytes with no prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Writes a wide string as 4-byte code units, each swapped like any
    /// other fixed-width value.
    pub fn put_wide(&mut self, s: &str) {
        self.put_count(s.chars().count() as u64);
        for c in s.chars() {
            self.put(u32::from(c));
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Read access to the output.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the encoder, returning the output.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
