use super::object::{Archivable, FrameObject, identity};
use super::persist::Persist;
use super::registry::TypeRegistry;
use crate::codec::{Encoder, Endian};
use crate::error::{CodecError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Save side of the object-graph serializer.
///
/// Each object record is `[type key][version][tracking][payload]`. The
/// tracking field is `0` for untracked types, `id << 1` the first time a
/// tracked object is written and `id << 1 | 1` for every later reference to
/// the same object, in which case no payload follows.
pub struct OutputArchive<'r> {
    enc: Encoder,
    registry: &'r TypeRegistry,
    tracking: HashMap<usize, u64>,
    // Holds every tracked object until the archive is done so that an
    // address cannot be reused by a different object mid-archive.
    pinned: Vec<Arc<dyn FrameObject>>,
}

impl<'r> OutputArchive<'r> {
    /// Creates an archive writing for the running machine.
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_host(registry, Endian::native())
    }

    /// Creates an archive that behaves as a host of the given byte order.
    pub fn with_host(registry: &'r TypeRegistry, host: Endian) -> Self {
        Self {
            enc: Encoder::with_host(host),
            registry,
            tracking: HashMap::new(),
            pinned: Vec::new(),
        }
    }

    /// The registry this archive resolves type keys against.
    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Direct access to the primitive encoder.
    pub fn encoder(&mut self) -> &mut Encoder {
        &mut self.enc
    }

    /// Writes a field value.
    pub fn write<T: Persist + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.save(self)
    }

    /// Writes a shared object of a known concrete type.
    pub fn write_shared<T: Archivable>(&mut self, obj: &Arc<T>) -> Result<()> {
        let erased: Arc<dyn FrameObject> = obj.clone();
        self.write_object(&erased)
    }

    /// Writes a shared, possibly polymorphic object.
    ///
    /// A tracked object already written to this archive is emitted as a
    /// back-reference.
    pub fn write_object(&mut self, obj: &Arc<dyn FrameObject>) -> Result<()> {
        let key = obj.type_key();
        self.registry.require(key)?;

        self.enc.put_str(key);
        self.enc.put_version(obj.schema_version());

        if !obj.is_tracked() {
            self.enc.put_count(0);
            return obj.save_payload(self).map_err(|e| e.in_context(key));
        }

        let address = identity(obj);
        if let Some(&id) = self.tracking.get(&address) {
            tracing::trace!(key, id, "back-reference");
            self.enc.put_count(id << 1 | 1);
            return Ok(());
        }

        let id = self.tracking.len() as u64 + 1;
        self.tracking.insert(address, id);
        self.pinned.push(Arc::clone(obj));
        self.enc.put_count(id << 1);
        obj.save_payload(self).map_err(|e| e.in_context(key))
    }

    /// Writes an optional object; `None` is an empty type key.
    pub fn write_optional(&mut self, obj: Option<&Arc<dyn FrameObject>>) -> Result<()> {
        match obj {
            Some(obj) => self.write_object(obj),
            None => {
                self.enc.put_str("");
                Ok(())
            }
        }
    }

    /// Writes a non-owning link as a back-reference.
    ///
    /// The target must already have been reached through an owning
    /// reference in this archive, or be one of the objects whose payload is
    /// being written. `None` is written as an unset link.
    ///
    /// # Errors
    /// [`CodecError::UnanchoredLink`] if the target has no tracking id yet.
    pub fn write_link(&mut self, target: Option<&Arc<dyn FrameObject>>) -> Result<()> {
        let Some(obj) = target else {
            self.enc.put_str("");
            return Ok(());
        };
        let key = obj.type_key();
        let id = if obj.is_tracked() {
            self.tracking.get(&identity(obj)).copied()
        } else {
            None
        };
        let Some(id) = id else {
            return Err(CodecError::UnanchoredLink(key.to_string()).into());
        };

        self.registry.require(key)?;
        self.enc.put_str(key);
        self.enc.put_version(obj.schema_version());
        self.enc.put_count(id << 1 | 1);
        tracing::trace!(key, id, "back-link");
        Ok(())
    }

    /// Number of distinct tracked objects written so far.
    pub fn tracked_count(&self) -> usize {
        self.tracking.len()
    }

    /// Consumes the archive, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.enc.into_bytes()
    }
}

impl std::fmt::Debug for OutputArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputArchive")
            .field("bytes", &self.enc.len())
            .field("tracked", &self.tracking.len())
            .field("pinned", &self.pinned.len())
            .finish()
    }
}
