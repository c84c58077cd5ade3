use super::input::InputArchive;
use super::object::{Archivable, FrameObject};
use super::output::OutputArchive;
use super::persist::Persist;
use crate::error::Result;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// A non-owning reference to another object in the same graph.
///
/// Back-links are how cyclic structures are expressed (a child pointing at
/// its parent) without a reference-count cycle. A link read from an archive
/// while its target is still being loaded stays unset until the enclosing
/// [`InputArchive::finish`] runs; clones share the same cell and see the
/// update.
#[derive(Clone, Default)]
pub struct BackLink {
    cell: Arc<OnceLock<Weak<dyn FrameObject>>>,
}

impl BackLink {
    /// A link that points nowhere.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A link to an existing object.
    pub fn to(target: &Arc<dyn FrameObject>) -> Self {
        let link = Self::empty();
        link.set(target);
        link
    }

    /// A link to an existing object of a concrete type.
    pub fn to_shared<T: Archivable>(target: &Arc<T>) -> Self {
        let erased: Arc<dyn FrameObject> = target.clone();
        Self::to(&erased)
    }

    /// True once the link has a target, even if that target has since been
    /// dropped.
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The target, if it is set and still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn FrameObject>> {
        self.cell.get().and_then(Weak::upgrade)
    }

    /// The target as a concrete type.
    pub fn get<T: Archivable>(&self) -> Option<Arc<T>> {
        self.upgrade()?.into_any().downcast::<T>().ok()
    }

    /// Points an unset link, and every clone of it, at `target`.
    ///
    /// Returns `false` and leaves the link unchanged if it was already set.
    pub fn set(&self, target: &Arc<dyn FrameObject>) -> bool {
        self.cell.set(Arc::downgrade(target)).is_ok()
    }
}

impl fmt::Debug for BackLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(target) => write!(f, "BackLink(-> {})", target.type_key()),
            None if self.is_set() => f.write_str("BackLink(dead)"),
            None => f.write_str("BackLink(unset)"),
        }
    }
}

impl Persist for BackLink {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write_link(self.upgrade().as_ref())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.read_link()
    }
}
