//! The object-graph serializer.
//!
//! Builds on the primitive [`codec`](crate::codec) to write whole object
//! graphs: polymorphic objects are prefixed with their registered type key
//! and schema version, objects shared through `Arc` are written once and
//! re-linked on load, and [`BackLink`]s close cycles without ownership
//! cycles.
//!
//! ```rust
//! use evframe::archive::{self, TypeRegistry};
//! use evframe::payload::F64Value;
//! use std::sync::Arc;
//!
//! # fn main() -> evframe::Result<()> {
//! let registry = TypeRegistry::standard()?;
//! let value = Arc::new(F64Value(2.5));
//! let bytes = archive::to_bytes(&registry, &value)?;
//! let back: Arc<F64Value> = archive::from_bytes(&registry, &bytes)?;
//! assert_eq!(back.0, 2.5);
//! # Ok(())
//! # }
//! ```

mod input;
mod link;
mod object;
mod output;
mod persist;
mod registry;

pub use input::InputArchive;
pub use link::BackLink;
pub use object::{Archivable, FrameObject};
pub use output::OutputArchive;
pub use persist::{Persist, WideString};
pub use registry::{TypeEntry, TypeRegistry};

pub(crate) use object::identity;

use crate::codec::Decoder;
use crate::error::{CodecError, Result};
use crate::format::{ARCHIVE_MAGIC, ARCHIVE_VERSION};
use std::any::type_name;
use std::sync::Arc;

/// Encodes one object graph rooted at `obj`, without a container header.
pub fn encode_object(registry: &TypeRegistry, obj: &Arc<dyn FrameObject>) -> Result<Vec<u8>> {
    let mut ar = OutputArchive::new(registry);
    ar.write_object(obj)?;
    Ok(ar.into_bytes())
}

/// Decodes one object graph written by [`encode_object`].
///
/// The whole input must be consumed.
pub fn decode_object(registry: &TypeRegistry, bytes: &[u8]) -> Result<Arc<dyn FrameObject>> {
    let mut ar = InputArchive::new(bytes, registry);
    let obj = ar.read_object()?;
    ar.finish()?;
    Ok(obj)
}

/// Writes a standalone archive: a short header followed by one object graph.
pub fn to_bytes<T: Archivable>(registry: &TypeRegistry, root: &Arc<T>) -> Result<Vec<u8>> {
    let mut ar = OutputArchive::new(registry);
    ar.encoder().put_raw(&ARCHIVE_MAGIC);
    ar.encoder().put(ARCHIVE_VERSION);
    ar.write_shared(root)?;
    Ok(ar.into_bytes())
}

/// Reads a standalone archive written by [`to_bytes`].
///
/// `T` may be the stored concrete type or any interface it converts to.
pub fn from_bytes<T: ?Sized + 'static>(registry: &TypeRegistry, bytes: &[u8]) -> Result<Arc<T>> {
    let mut header = Decoder::new(bytes);
    let magic = header.take(ARCHIVE_MAGIC.len())?;
    if magic != ARCHIVE_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(CodecError::BadSignature {
            expected: ARCHIVE_MAGIC,
            found,
        }
        .into());
    }
    let version = header.get::<u32>()?;
    if version > ARCHIVE_VERSION {
        return Err(CodecError::UnsupportedFormat(version).into());
    }

    let mut ar = InputArchive::new(&bytes[header.position()..], registry);
    let root = ar.read_object()?;
    ar.finish()?;
    registry.cast::<T>(&root).ok_or_else(|| {
        CodecError::TypeMismatch {
            expected: type_name::<T>().to_string(),
            found: root.type_key().to_string(),
        }
        .into()
    })
}
