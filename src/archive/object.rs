//! The save/load contract every payload type implements.

use super::input::InputArchive;
use super::output::OutputArchive;
use crate::error::Result;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// A concrete type that can be stored in a frame and written to an archive.
///
/// The type key is the stable on-disk name of the type and must never
/// change once data has been written with it. `VERSION` is the schema
/// version this build writes; `load` receives the version found in the
/// record and must accept every version up to and including `VERSION`.
///
/// Most types derive this with `#[derive(Archivable)]`.
pub trait Archivable: Debug + Send + Sync + Sized + 'static {
    /// Stable type key written on the wire.
    const TYPE_KEY: &'static str;

    /// Current schema version.
    const VERSION: u32 = 0;

    /// Whether instances are deduplicated within one archive.
    const TRACKED: bool = true;

    /// Writes the payload (everything after the record header).
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()>;

    /// Reads a payload written under schema `version`.
    fn load(ar: &mut InputArchive<'_>, version: u32) -> Result<Self>;
}

/// Object-safe view of an [`Archivable`] value.
///
/// Frames hold their decoded values as `Arc<dyn FrameObject>`. Polymorphic
/// base interfaces are expressed as traits with `FrameObject` as a
/// supertrait and registered with
/// [`TypeRegistry::register_cast`](super::TypeRegistry::register_cast).
pub trait FrameObject: Any + Debug + Send + Sync {
    /// The stable type key.
    fn type_key(&self) -> &'static str;

    /// The schema version this build writes for the type.
    fn schema_version(&self) -> u32;

    /// Whether instances are deduplicated within one archive.
    fn is_tracked(&self) -> bool;

    /// Writes the payload.
    fn save_payload(&self, ar: &mut OutputArchive<'_>) -> Result<()>;

    /// Access to the concrete value.
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared handle into a type-erased one.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Converts a shared handle to any interface into the common handle.
    fn into_object(self: Arc<Self>) -> Arc<dyn FrameObject>;
}

impl<T: Archivable> FrameObject for T {
    fn type_key(&self) -> &'static str {
        T::TYPE_KEY
    }

    fn schema_version(&self) -> u32 {
        T::VERSION
    }

    fn is_tracked(&self) -> bool {
        T::TRACKED
    }

    fn save_payload(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        self.save(ar)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_object(self: Arc<Self>) -> Arc<dyn FrameObject> {
        self
    }
}

/// Address-based identity of a shared object, used by the pointer table.
pub(crate) fn identity(obj: &Arc<dyn FrameObject>) -> usize {
    Arc::as_ptr(obj).cast::<()>() as usize
}
