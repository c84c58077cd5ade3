//! The portable primitive codec.
//!
//! Turns fixed-width numbers, booleans, counts, versions, strings and byte
//! runs into a canonical little-endian wire form that is identical on every
//! host. It has no notion of objects, identity or polymorphism; those live in
//! [`crate::archive`].
//!
//! | Value | Wire form |
//! |---|---|
//! | fixed-width int/float | `WIDTH` bytes, little-endian |
//! | `bool` | 1 byte; decoded as `byte != 0` |
//! | version | 1 byte, or `0xFF` + `u64` |
//! | count / length | 4 bytes, or `0xFFFF_FFFF` + `u64` |
//! | string / bytes | count + raw bytes |
//! | wide string | count + 4-byte code units |

pub mod decoder;
pub mod encoder;
pub mod endian;
pub mod varint;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use endian::{Endian, Primitive};
