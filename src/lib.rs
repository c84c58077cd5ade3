//! # evframe
//!
//! An event-frame store with a portable, versioned binary format.
//!
//! ## Overview
//!
//! Event-processing pipelines pass *frames* from stage to stage: named bags
//! of heterogeneous, shared objects tagged with the *stream* they belong to
//! (geometry, calibration, detector status, readout, physics, ...). evframe
//! provides the three layers such a pipeline rests on:
//!
//! *   **Portable codec:** fixed-width little-endian primitives with a
//!     narrow-with-escape encoding for counts, identical on every host.
//! *   **Object-graph serializer:** polymorphic objects carry a registered
//!     type key and a schema version; objects shared through `Arc` are
//!     written once and re-linked on load, and [`archive::BackLink`]s close
//!     cycles. Loading a record that is newer than the running build is an
//!     error, never a guess.
//! *   **Frame store with derived views:** values read from disk stay
//!     encoded until first typed access. Typed access that misses falls back
//!     to an ordered chain of transforms that synthesize the requested type
//!     from what is stored (a pulse mask yields the masked pulses).
//!
//! ## File Format
//!
//! A frame file is a concatenation of frame records, optionally wrapped in
//! one LZ4 frame:
//! ```text
//! [ "[ef]" ][ version ][ stream ][ count ] { [ name ][ type ][ blob ] }* [ xxHash64 ]
//! ```
//! See [`format`] for details. Readers detect the compression filter from
//! the leading bytes and report truncation inside a record as an error.
//!
//! ## Core Concepts
//!
//! ### Registry
//!
//! A [`TypeRegistry`] maps type keys to loaders, records which types
//! convert to which interfaces, and holds the derived-view chain. It is
//! built explicitly at startup, usually with [`TypeRegistry::standard`],
//! and shared by every frame.
//!
//! ### Frames and Streams
//!
//! A [`Frame`] keeps keys in insertion order and remembers the [`Stream`]
//! each key came from. [`frame::FrameMixer`] forwards the keys of the latest
//! geometry, calibration, status and readout frames into every following
//! frame, so a physics frame can read the geometry without it being stored
//! again.
//!
//! ### Files
//!
//! [`file::FrameWriter`] and [`file::FrameReader`] stream frames in order;
//! [`file::FrameSequence`] memory-maps a file and serves mixed frames by
//! position through a bounded cache.
//!
//! ## Usage
//!
//! ```rust
//! use evframe::payload::{ChannelKey, Pulse, PulseSeriesMap};
//! use evframe::views::PulseMask;
//! use evframe::{Frame, Stream, TypeRegistry};
//! use std::sync::Arc;
//!
//! # fn main() -> evframe::Result<()> {
//! let registry = Arc::new(TypeRegistry::standard()?);
//! let mut frame = Frame::new(Stream::Physics, registry);
//!
//! let key = ChannelKey::new(36, 20, 0);
//! let pulses = PulseSeriesMap::from_iter([(
//!     key,
//!     vec![
//!         Pulse { time: 10.0, charge: 0.3, ..Default::default() },
//!         Pulse { time: 12.0, charge: 2.1, ..Default::default() },
//!     ],
//! )]);
//! frame.put("pulses", pulses)?;
//!
//! let bright = PulseMask::from_predicate(&frame, "pulses", |_, p| p.charge > 1.0)?;
//! frame.put("bright", bright)?;
//!
//! let selected = frame.get::<PulseSeriesMap>("bright")?.expect("source present");
//! assert_eq!(selected.pulse_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ### Defining a Payload
//!
//! ```rust
//! use evframe::{Archivable, Frame, Stream, TypeRegistry};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default, Archivable)]
//! #[archive(key = "TrackFit", version = 1)]
//! struct TrackFit {
//!     zenith: f64,
//!     azimuth: f64,
//!     #[archive(since = 1)]
//!     ndof: u32,
//! }
//!
//! # fn main() -> evframe::Result<()> {
//! let mut registry = TypeRegistry::standard()?;
//! registry.register::<TrackFit>()?;
//! let mut frame = Frame::new(Stream::Physics, Arc::new(registry));
//! frame.put("fit", TrackFit { zenith: 1.2, azimuth: 0.4, ndof: 3 })?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory map in
//!   [`file::FrameFile::open`].
//! * **No Panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints).
//! * **Comprehensive Errors:** all failures are a [`FrameError`]; a key
//!   that is simply absent is `Ok(None)`.
//! * **Logging:** the library emits `tracing` events and never installs a
//!   subscriber.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// The derive macro refers to this crate by name, including from inside it.
extern crate self as evframe;

// --- PUBLIC API MODULES ---
pub mod archive;
pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod file;
pub mod format;
pub mod frame;
pub mod inspector;
pub mod payload;
pub mod views;

// --- RE-EXPORTS ---

pub use archive::{Archivable, TypeRegistry};
pub use config::{MixerOptions, ReaderOptions, SequenceOptions, WriterOptions};
pub use error::{FrameError, Result};
pub use frame::{Frame, Stream};

// Re-export the derive macro so it is accessible as `evframe::Archivable`
pub use evframe_derive::Archivable;
