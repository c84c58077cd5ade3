use super::link::BackLink;
use super::object::FrameObject;
use super::persist::Persist;
use super::registry::TypeRegistry;
use crate::codec::{Decoder, Endian};
use crate::error::{CodecError, Result};
use std::any::type_name;
use std::sync::Arc;

/// Arena cell for one tracking id.
enum ArenaSlot {
    /// Allocated; the object's own payload is still being read.
    Loading,
    Ready(Arc<dyn FrameObject>),
}

/// What an object reference on the wire resolved to.
enum Reference {
    Null,
    Object(Arc<dyn FrameObject>),
    /// A back-reference to an object whose load has not finished (a cycle).
    Pending(u64),
}

/// Load side of the object-graph serializer.
///
/// Tracking ids index an arena of loaded objects; a back-reference re-links
/// to the arena entry instead of constructing a new instance. Back-links that
/// close a cycle are recorded and patched in [`InputArchive::finish`], once
/// the whole record has been read.
pub struct InputArchive<'a> {
    dec: Decoder<'a>,
    registry: &'a TypeRegistry,
    arena: Vec<ArenaSlot>,
    pending: Vec<(u64, BackLink)>,
}

impl<'a> InputArchive<'a> {
    /// Creates an archive reading on the running machine.
    pub fn new(data: &'a [u8], registry: &'a TypeRegistry) -> Self {
        Self::with_host(data, registry, Endian::native())
    }

    /// Creates an archive that behaves as a host of the given byte order.
    pub fn with_host(data: &'a [u8], registry: &'a TypeRegistry, host: Endian) -> Self {
        Self {
            dec: Decoder::with_host(data, host),
            registry,
            arena: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The registry used for polymorphic loads.
    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Direct access to the primitive decoder.
    pub fn decoder(&mut self) -> &mut Decoder<'a> {
        &mut self.dec
    }

    /// Reads a field value.
    pub fn read<T: Persist>(&mut self) -> Result<T> {
        T::load(self)
    }

    fn read_reference(&mut self, link: bool) -> Result<Reference> {
        let key = self.dec.get_str()?;
        if key.is_empty() {
            return Ok(Reference::Null);
        }
        let version = self.dec.get_version()?;
        let registry = self.registry;
        let entry = registry.require(&key)?;
        if version > entry.version() {
            return Err(CodecError::FutureVersion {
                type_key: key,
                found: version,
                supported: entry.version(),
            }
            .into());
        }
        let loader = entry.loader();

        let tracking = self.dec.get_count()?;
        if link && tracking & 1 == 0 {
            return Err(CodecError::Malformed {
                type_key: key,
                reason: "back-link carries an object instead of a back-reference".into(),
            }
            .into());
        }
        if tracking == 0 {
            let obj = loader(self, version).map_err(|e| e.in_context(&key))?;
            return Ok(Reference::Object(obj));
        }

        let id = tracking >> 1;
        if id == 0 {
            return Err(CodecError::DanglingReference(0).into());
        }
        let index = usize::try_from(id - 1).map_err(|_| CodecError::DanglingReference(id))?;

        if tracking & 1 == 1 {
            return match self.arena.get(index) {
                None => Err(CodecError::DanglingReference(id).into()),
                Some(ArenaSlot::Loading) => Ok(Reference::Pending(id)),
                Some(ArenaSlot::Ready(obj)) if obj.type_key() != key => {
                    Err(CodecError::TypeMismatch {
                        expected: key,
                        found: obj.type_key().to_string(),
                    }
                    .into())
                }
                Some(ArenaSlot::Ready(obj)) => Ok(Reference::Object(Arc::clone(obj))),
            };
        }

        if index != self.arena.len() {
            return Err(CodecError::Malformed {
                type_key: key,
                reason: format!(
                    "tracking id {id} out of sequence (expected {})",
                    self.arena.len() + 1
                ),
            }
            .into());
        }
        self.arena.push(ArenaSlot::Loading);
        let obj = loader(self, version).map_err(|e| e.in_context(&key))?;
        self.arena[index] = ArenaSlot::Ready(Arc::clone(&obj));
        Ok(Reference::Object(obj))
    }

    /// Reads a shared, possibly polymorphic object.
    pub fn read_object(&mut self) -> Result<Arc<dyn FrameObject>> {
        match self.read_reference(false)? {
            Reference::Object(obj) => Ok(obj),
            Reference::Pending(id) => Err(CodecError::UnfinishedReference(id).into()),
            Reference::Null => Err(CodecError::Malformed {
                type_key: String::new(),
                reason: "null where an object was required".into(),
            }
            .into()),
        }
    }

    /// Reads an optional object.
    pub fn read_optional(&mut self) -> Result<Option<Arc<dyn FrameObject>>> {
        match self.read_reference(false)? {
            Reference::Object(obj) => Ok(Some(obj)),
            Reference::Null => Ok(None),
            Reference::Pending(id) => Err(CodecError::UnfinishedReference(id).into()),
        }
    }

    /// Reads a shared object and converts it to `T` through the registry.
    ///
    /// `T` may be the concrete type or any interface it is registered as
    /// convertible to.
    pub fn read_shared<T: ?Sized + 'static>(&mut self) -> Result<Arc<T>> {
        let obj = self.read_object()?;
        self.registry.cast::<T>(&obj).ok_or_else(|| {
            CodecError::TypeMismatch {
                expected: type_name::<T>().to_string(),
                found: obj.type_key().to_string(),
            }
            .into()
        })
    }

    /// Reads a weak back-link written by
    /// [`OutputArchive::write_link`](super::OutputArchive::write_link). A
    /// link to an object that is still being loaded is patched when the
    /// archive finishes.
    pub fn read_link(&mut self) -> Result<BackLink> {
        match self.read_reference(true)? {
            Reference::Null => Ok(BackLink::empty()),
            Reference::Object(obj) => Ok(BackLink::to(&obj)),
            Reference::Pending(id) => {
                let link = BackLink::empty();
                self.pending.push((id, link.clone()));
                Ok(link)
            }
        }
    }

    /// Number of tracked objects loaded so far.
    pub fn tracked_count(&self) -> usize {
        self.arena.len()
    }

    /// Resolves outstanding back-links and checks that the input was fully
    /// consumed.
    pub fn finish(self) -> Result<()> {
        for (id, link) in &self.pending {
            let slot = usize::try_from(id - 1).ok().and_then(|i| self.arena.get(i));
            match slot {
                Some(ArenaSlot::Ready(obj)) => {
                    link.set(obj);
                }
                _ => return Err(CodecError::DanglingReference(*id).into()),
            }
        }
        if !self.dec.is_empty() {
            return Err(CodecError::Malformed {
                type_key: String::new(),
                reason: format!("{} trailing bytes after object", self.dec.remaining()),
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for InputArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputArchive")
            .field("position", &self.dec.position())
            .field("remaining", &self.dec.remaining())
            .field("tracked", &self.arena.len())
            .field("pending_links", &self.pending.len())
            .finish()
    }
}
