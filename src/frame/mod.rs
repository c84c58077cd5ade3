//! The frame store.
//!
//! A [`Frame`] maps names to slots. A slot holds a decoded, shared object
//! or the encoded bytes it came from; decoding happens on first typed
//! access and is cached. Every key remembers the [`Stream`] it entered the
//! lineage on, which is what [`FrameMixer`] and [`Frame::advance`] use to
//! forward keys between frames of a sequence.

mod mixer;
mod slot;
mod store;
mod stream;

pub use mixer::{CacheOrder, FrameMixer};
pub use slot::SlotState;
pub use store::{DropPolicy, Frame};
pub use stream::Stream;
