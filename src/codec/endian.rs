//! Byte-order model and fixed-width swap routines.
//!
//! The wire form is little-endian. Each [`Primitive`] names the swap routine
//! for its width at compile time. Whether that routine runs at all is
//! decided once, when an [`Encoder`](super::Encoder) or
//! [`Decoder`](super::Decoder) is built, by comparing the modelled host
//! order with the machine's own order and with [`Endian::CANONICAL`].

/// Byte order of a (real or simulated) host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// The order used on the wire.
    pub const CANONICAL: Endian = Endian::Little;

    /// The order of the machine running this code.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// The routine moving a value's image between the running machine and
    /// the wire for a host of this order.
    ///
    /// A value is laid out in native order, re-ordered into this host's
    /// memory order and then into wire order. The two steps cancel when
    /// exactly one of them swaps, so the result is either the width's swap
    /// routine or nothing.
    pub fn image_fn(self) -> ImageFn {
        let to_host = self != Self::native();
        let to_wire = self != Self::CANONICAL;
        if to_host == to_wire { keep } else { apply }
    }
}

impl Default for Endian {
    fn default() -> Self {
        Self::native()
    }
}

/// In-place reversal of one fixed-width value.
pub type SwapFn = fn(&mut [u8]);

/// Applies (or skips) a width's [`SwapFn`] to a value image.
pub type ImageFn = fn(&mut [u8], SwapFn);

fn keep(_: &mut [u8], _: SwapFn) {}

fn apply(bytes: &mut [u8], swap: SwapFn) {
    swap(bytes);
}

/// Single bytes have no order.
pub fn swap8(_: &mut [u8]) {}

/// Swaps a 2-byte value in place.
pub fn swap16(bytes: &mut [u8]) {
    bytes.swap(0, 1);
}

/// Swaps a 4-byte value in place.
pub fn swap32(bytes: &mut [u8]) {
    bytes.swap(0, 3);
    bytes.swap(1, 2);
}

/// Swaps an 8-byte value in place.
pub fn swap64(bytes: &mut [u8]) {
    bytes.swap(0, 7);
    bytes.swap(1, 6);
    bytes.swap(2, 5);
    bytes.swap(3, 4);
}

/// A fixed-width value with a defined in-memory layout.
///
/// Implementing this trait is all a new fixed-width type needs: its width,
/// the swap routine for that width and its native memory image.
pub trait Primitive: Copy + Sized + 'static {
    /// Width in bytes.
    const WIDTH: usize;
    /// Reverses the image of one value.
    const SWAP: SwapFn;
    /// Byte array of exactly [`Self::WIDTH`] bytes.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// The value's memory image on the running machine.
    fn to_image(self) -> Self::Bytes;

    /// Rebuilds a value from its memory image on the running machine.
    fn from_image(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty => $n:expr, $swap:path);* $(;)?) => {
        $(
            impl Primitive for $t {
                const WIDTH: usize = $n;
                const SWAP: SwapFn = $swap;
                type Bytes = [u8; $n];

                fn to_image(self) -> Self::Bytes {
                    self.to_ne_bytes()
                }

                fn from_image(bytes: Self::Bytes) -> Self {
                    <$t>::from_ne_bytes(bytes)
                }
            }
        )*
    };
}

impl_primitive!(
    u8 => 1, swap8; i8 => 1, swap8;
    u16 => 2, swap16; i16 => 2, swap16;
    u32 => 4, swap32; i32 => 4, swap32; f32 => 4, swap32;
    u64 => 8, swap64; i64 => 8, swap64; f64 => 8, swap64;
);
