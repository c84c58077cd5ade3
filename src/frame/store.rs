use super::Stream;
use super::slot::{Slot, SlotState};
use crate::archive::{Archivable, FrameObject, TypeRegistry};
use crate::config::ReaderOptions;
use crate::error::{CodecError, FrameError, Result};
use crate::format::{self, RawRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Nesting limit for derived views that look up other keys.
const MAX_VIEW_DEPTH: u32 = 32;

/// What [`Frame::drop_blobs`] does with slots that were never decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Decode every pending slot first so nothing is lost.
    #[default]
    DecodeFirst,
    /// Discard pending slots' bytes; later typed access to them fails with
    /// [`FrameError::BlobDropped`].
    Discard,
}

/// A named bag of event data tagged with a stream.
///
/// Keys keep insertion order. A key holds either a live object or the
/// encoded bytes it was read from; the first typed access decodes and
/// caches. Typed access that does not match the stored type falls back to
/// the registry's derived views.
///
/// ```rust
/// use evframe::{Frame, Stream, TypeRegistry};
/// use evframe::payload::F64Value;
/// use std::sync::Arc;
///
/// # fn main() -> evframe::Result<()> {
/// let registry = Arc::new(TypeRegistry::standard()?);
/// let mut frame = Frame::new(Stream::Physics, registry);
/// frame.put("energy", F64Value(12.5))?;
///
/// let energy = frame.get::<F64Value>("energy")?.expect("stored above");
/// assert_eq!(energy.0, 12.5);
/// assert!(frame.get::<F64Value>("missing")?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct Frame {
    stream: Stream,
    slots: IndexMap<String, Slot>,
    skip: BTreeSet<String>,
    registry: Arc<TypeRegistry>,
    depth: AtomicU32,
}

struct DepthGuard<'a>(&'a AtomicU32);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn check_key(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(FrameError::InvalidKey(name.to_string()));
    }
    Ok(())
}

impl Frame {
    /// Creates an empty frame.
    pub fn new(stream: Stream, registry: Arc<TypeRegistry>) -> Self {
        Self {
            stream,
            slots: IndexMap::new(),
            skip: BTreeSet::new(),
            registry,
            depth: AtomicU32::new(0),
        }
    }

    /// The frame's stream.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// The registry used for decoding and views.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Stores a value under `name` on the frame's own stream.
    ///
    /// # Errors
    /// [`FrameError::DuplicateKey`] if the name is taken,
    /// [`FrameError::InvalidKey`] for empty or whitespace-bearing names and
    /// a registry error if the type is not registered.
    pub fn put<T: Archivable>(&mut self, name: &str, value: T) -> Result<()> {
        self.put_object_on(name, Arc::new(value), self.stream)
    }

    /// Stores a value with an explicit provenance stream.
    pub fn put_on_stream<T: Archivable>(
        &mut self,
        name: &str,
        value: T,
        stream: Stream,
    ) -> Result<()> {
        self.put_object_on(name, Arc::new(value), stream)
    }

    /// Stores an already shared value; the frame holds another handle to it.
    pub fn put_shared<T: Archivable>(&mut self, name: &str, value: Arc<T>) -> Result<()> {
        self.put_object_on(name, value, self.stream)
    }

    /// Stores a type-erased object.
    pub fn put_object(&mut self, name: &str, value: Arc<dyn FrameObject>) -> Result<()> {
        self.put_object_on(name, value, self.stream)
    }

    fn put_object_on(
        &mut self,
        name: &str,
        value: Arc<dyn FrameObject>,
        stream: Stream,
    ) -> Result<()> {
        check_key(name)?;
        self.registry.require(value.type_key())?;
        if self.slots.contains_key(name) {
            return Err(FrameError::DuplicateKey(name.to_string()));
        }
        self.slots.insert(name.to_string(), Slot::decoded(value, stream));
        Ok(())
    }

    /// Stores a value, replacing whatever `name` held. The key keeps its
    /// position if it existed.
    pub fn replace<T: Archivable>(&mut self, name: &str, value: T) -> Result<()> {
        check_key(name)?;
        let value: Arc<dyn FrameObject> = Arc::new(value);
        self.registry.require(value.type_key())?;
        self.slots
            .insert(name.to_string(), Slot::decoded(value, self.stream));
        Ok(())
    }

    /// Typed access.
    ///
    /// Returns the stored object if it is a `T` or registered as convertible
    /// to `T`, otherwise the result of the first derived view from the
    /// stored type to `T`. `Ok(None)` means nothing is stored under `name`
    /// or nothing could be synthesized.
    pub fn get<T: ?Sized + 'static>(&self, name: &str) -> Result<Option<Arc<T>>> {
        let Some(slot) = self.slots.get(name) else {
            return Ok(None);
        };
        let obj = slot.decode(name, &self.registry)?;
        if let Some(value) = self.registry.cast::<T>(&obj) {
            return Ok(Some(value));
        }

        let depth = self.depth.fetch_add(1, Ordering::Relaxed);
        let _guard = DepthGuard(&self.depth);
        if depth >= MAX_VIEW_DEPTH {
            return Err(FrameError::ResolutionCycle(name.to_string()));
        }
        self.registry.resolver().resolve::<T>(name, &obj, self)
    }

    /// Untyped access to the stored object; never consults views.
    pub fn get_object(&self, name: &str) -> Result<Option<Arc<dyn FrameObject>>> {
        self.slots
            .get(name)
            .map(|slot| slot.decode(name, &self.registry))
            .transpose()
    }

    /// True if [`Frame::get`] would return a value.
    ///
    /// A slot whose stored type converts to `T` answers without decoding.
    /// Only a view lookup forces the decode of its source. Like `get`, a
    /// slot whose blob was discarded before decoding fails with
    /// [`FrameError::BlobDropped`].
    pub fn has<T: ?Sized + 'static>(&self, name: &str) -> Result<bool> {
        let Some(slot) = self.slots.get(name) else {
            return Ok(false);
        };
        if slot.state() == SlotState::Dropped {
            return Err(FrameError::BlobDropped(name.to_string()));
        }
        let target = TypeId::of::<T>();
        if self.registry.is_convertible(slot.type_name(), target) {
            return Ok(true);
        }
        let input = match self.registry.entry(slot.type_name()) {
            Some(entry) => entry.type_id(),
            None => return Ok(false),
        };
        if !self.registry.resolver().produces(input, target) {
            return Ok(false);
        }
        Ok(self.get::<T>(name)?.is_some())
    }

    /// True if anything is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Removes a key. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        self.skip.remove(name);
        self.slots.shift_remove(name).is_some()
    }

    /// Moves a value to a new name at the same position.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        check_key(to)?;
        if self.slots.contains_key(to) {
            return Err(FrameError::DuplicateKey(to.to_string()));
        }
        let (index, _, slot) = self
            .slots
            .shift_remove_full(from)
            .ok_or_else(|| FrameError::MissingKey(from.to_string()))?;
        self.slots.shift_insert(index, to.to_string(), slot);
        if self.skip.remove(from) {
            self.skip.insert(to.to_string());
        }
        Ok(())
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the frame holds no keys.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The registered type key of the value under `name`, available without
    /// decoding.
    pub fn type_name(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(Slot::type_name)
    }

    /// The stream `name` entered the frame lineage on.
    pub fn stream_of(&self, name: &str) -> Option<Stream> {
        self.slots.get(name).map(Slot::stream)
    }

    /// Size of the encoded bytes still held for `name`.
    pub fn blob_size(&self, name: &str) -> Option<usize> {
        self.slots.get(name).and_then(Slot::blob_len)
    }

    /// Whether `name` is decoded, encoded or dropped.
    pub fn state(&self, name: &str) -> Option<SlotState> {
        self.slots.get(name).map(Slot::state)
    }

    /// Releases every held blob. Returns the number of bytes released.
    ///
    /// After this the frame can only be written by re-encoding its live
    /// objects.
    pub fn drop_blobs(&mut self, policy: DropPolicy) -> Result<usize> {
        let mut released = 0;
        let mut lost = Vec::new();
        for (name, slot) in self.slots.iter_mut() {
            let Some(len) = slot.blob_len() else {
                continue;
            };
            if slot.state() == SlotState::Encoded {
                match policy {
                    DropPolicy::DecodeFirst => {
                        slot.decode(name, &self.registry)?;
                    }
                    DropPolicy::Discard => lost.push(name.clone()),
                }
            }
            *slot = slot.without_blob();
            released += len;
        }
        if !lost.is_empty() {
            tracing::warn!(keys = ?lost, "dropped blobs that were never decoded");
        }
        Ok(released)
    }

    /// Excludes `name` from serialization. Returns false if it is unknown.
    pub fn skip(&mut self, name: &str) -> bool {
        if !self.slots.contains_key(name) {
            return false;
        }
        self.skip.insert(name.to_string())
    }

    /// Includes `name` in serialization again.
    pub fn unskip(&mut self, name: &str) -> bool {
        self.skip.remove(name)
    }

    /// True if `name` is excluded from serialization.
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip.contains(name)
    }

    /// Drops every key that did not originate on the frame's own stream.
    pub fn purge(&mut self) {
        let own = self.stream;
        self.retain(|slot| slot.stream() == own);
    }

    /// Drops every key that originated on `stream`.
    pub fn purge_stream(&mut self, stream: Stream) {
        self.retain(|slot| slot.stream() != stream);
    }

    fn retain(&mut self, mut keep: impl FnMut(&Slot) -> bool) {
        let skip = &mut self.skip;
        self.slots.retain(|name, slot| {
            let kept = keep(slot);
            if !kept {
                skip.remove(name);
            }
            kept
        });
    }

    /// A shallow copy of this frame continuing on `stream`.
    ///
    /// Keys are shared, not copied. Keys that a frame of `stream` replaces,
    /// keys of transient (Physics) frames and keys of streams that never mix
    /// are left behind.
    pub fn advance(&self, stream: Stream) -> Frame {
        let mut next = Frame::new(stream, Arc::clone(&self.registry));
        for (name, slot) in &self.slots {
            let from = slot.stream();
            if from == stream || !from.is_cacheable() {
                continue;
            }
            next.slots.insert(name.clone(), slot.clone());
            if self.skip.contains(name) {
                next.skip.insert(name.clone());
            }
        }
        tracing::debug!(from = %self.stream, to = %stream, kept = next.len(), "advanced frame");
        next
    }

    /// Shallow-copies every key of `other` that this frame does not hold.
    /// Returns the number of keys added.
    pub fn merge_from(&mut self, other: &Frame) -> usize {
        let mut added = 0;
        for (name, slot) in &other.slots {
            if !self.slots.contains_key(name) {
                self.slots.insert(name.clone(), slot.clone());
                added += 1;
            }
        }
        added
    }

    /// Like [`Frame::merge_from`], taking only `other`'s own-stream keys.
    pub(crate) fn inherit_from(&mut self, parent: &Frame) -> usize {
        let mut added = 0;
        for (name, slot) in &parent.slots {
            if slot.stream() == parent.stream && !self.slots.contains_key(name) {
                self.slots.insert(name.clone(), slot.clone());
                added += 1;
            }
        }
        added
    }

    /// Encodes the frame as one frame record.
    ///
    /// Skipped keys are never written. Keys inherited from other streams
    /// are written only with `include_mixed`.
    pub fn to_record(&self, include_mixed: bool) -> Result<Vec<u8>> {
        let mut parts: Vec<(&str, &str, Arc<[u8]>)> = Vec::with_capacity(self.slots.len());
        for (name, slot) in &self.slots {
            if self.skip.contains(name) || (!include_mixed && slot.stream() != self.stream) {
                continue;
            }
            parts.push((name.as_str(), slot.type_name(), slot.encode(name, &self.registry)?));
        }
        Ok(format::encode_record(
            self.stream,
            parts.iter().map(|(n, t, b)| (*n, *t, &b[..])),
        ))
    }

    /// Builds a frame from a parsed record. Every key starts encoded.
    ///
    /// # Errors
    /// A malformed-record codec error if a name occurs twice in the record,
    /// whether or not it is skipped.
    pub fn from_record(
        record: RawRecord,
        registry: Arc<TypeRegistry>,
        options: &ReaderOptions,
    ) -> Result<Self> {
        let duplicate = {
            let mut seen = HashSet::with_capacity(record.entries.len());
            record.entries.iter().find(|e| !seen.insert(e.name.as_str())).cloned()
        };
        if let Some(dup) = duplicate {
            let reason = format!("key '{}' occurs more than once in one frame record", dup.name);
            return Err(FrameError::from(CodecError::Malformed {
                type_key: dup.type_name,
                reason,
            })
            .in_context(dup.name));
        }

        let mut frame = Frame::new(record.stream, registry);
        for entry in record.entries {
            if options.skip_keys.contains(&entry.name) {
                continue;
            }
            let slot = Slot::encoded(entry.type_name, entry.blob, record.stream);
            frame.slots.insert(entry.name, slot);
        }
        Ok(frame)
    }

    /// Parses and builds a frame from the front of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed.
    pub fn from_bytes(
        bytes: &[u8],
        registry: Arc<TypeRegistry>,
        options: &ReaderOptions,
    ) -> Result<(Self, usize)> {
        let (record, used) = format::decode_record(bytes, options.verify_checksums)?;
        Ok((Self::from_record(record, registry, options)?, used))
    }
}

impl Clone for Frame {
    /// Shallow copy: slots are shared with the original.
    fn clone(&self) -> Self {
        Self {
            stream: self.stream,
            slots: self.slots.clone(),
            skip: self.skip.clone(),
            registry: Arc::clone(&self.registry),
            depth: AtomicU32::new(0),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("stream", &self.stream)
            .field("slots", &self.slots)
            .field("skip", &self.skip)
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[ Frame ({}) ]", self.stream)?;
        for (name, slot) in &self.slots {
            let state = match slot.state() {
                SlotState::Decoded => "decoded".to_string(),
                SlotState::Encoded => format!("{} bytes", slot.blob_len().unwrap_or(0)),
                SlotState::Dropped => "dropped".to_string(),
            };
            let marker = if self.skip.contains(name) { " (skipped)" } else { "" };
            writeln!(
                f,
                "  '{name}' [{}] => {} ({state}){marker}",
                slot.stream(),
                slot.type_name()
            )?;
        }
        Ok(())
    }
}
