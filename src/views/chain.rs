use crate::archive::{Archivable, FrameObject, TypeRegistry};
use crate::error::{RegistryError, Result};
use crate::frame::Frame;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// A strategy that synthesizes a value of one type from a stored object of
/// another.
pub trait Transform: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Concrete type of the stored object this transform consumes.
    fn input(&self) -> TypeId;

    /// Type of the value it produces.
    fn output(&self) -> TypeId;

    /// Produces the value, boxed as an `Arc<Output>`.
    ///
    /// `Ok(None)` means a dependency the transform needs is absent from the
    /// frame; no partial result is ever returned.
    fn apply(
        &self,
        source: &Arc<dyn FrameObject>,
        frame: &Frame,
    ) -> Result<Option<Box<dyn Any + Send + Sync>>>;
}

/// Signature of a view function: the stored object and the frame it was
/// found in.
pub type ViewFn<I, O> = fn(&I, &Frame) -> Result<Option<O>>;

struct FnTransform<I, O> {
    name: &'static str,
    view: ViewFn<I, O>,
}

impl<I: Archivable, O: Send + Sync + 'static> Transform for FnTransform<I, O> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn input(&self) -> TypeId {
        TypeId::of::<I>()
    }

    fn output(&self) -> TypeId {
        TypeId::of::<O>()
    }

    fn apply(
        &self,
        source: &Arc<dyn FrameObject>,
        frame: &Frame,
    ) -> Result<Option<Box<dyn Any + Send + Sync>>> {
        let Some(input) = source.as_any().downcast_ref::<I>() else {
            return Ok(None);
        };
        let produced = (self.view)(input, frame)?;
        Ok(produced.map(|value| Box::new(Arc::new(value)) as Box<dyn Any + Send + Sync>))
    }
}

/// The ordered chain of derived-view transforms.
///
/// On a typed-lookup miss the frame asks the resolver for a transform whose
/// input is the stored object's concrete type and whose output is the
/// requested type. The first such transform in registration order decides
/// the outcome, even if it reports a missing dependency.
#[derive(Default)]
pub struct Resolver {
    chain: Vec<Box<dyn Transform>>,
}

impl Resolver {
    /// Appends a transform at the lowest priority.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.chain.push(transform);
    }

    /// Number of transforms in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// True if no transform is registered.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Transform names in priority order.
    pub fn names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|t| t.name()).collect()
    }

    fn first_match(&self, input: TypeId, output: TypeId) -> Option<&dyn Transform> {
        self.chain
            .iter()
            .map(Box::as_ref)
            .find(|t| t.input() == input && t.output() == output)
    }

    /// True if some transform turns `input` into `output`.
    pub fn produces(&self, input: TypeId, output: TypeId) -> bool {
        self.first_match(input, output).is_some()
    }

    /// Runs the first transform from the stored object's type to `T`.
    pub(crate) fn resolve<T: ?Sized + 'static>(
        &self,
        name: &str,
        source: &Arc<dyn FrameObject>,
        frame: &Frame,
    ) -> Result<Option<Arc<T>>> {
        let input = source.as_any().type_id();
        let Some(transform) = self.first_match(input, TypeId::of::<T>()) else {
            return Ok(None);
        };

        tracing::debug!(
            key = name,
            view = transform.name(),
            stored = source.type_key(),
            requested = type_name::<T>(),
            "resolving derived view"
        );
        let Some(produced) = transform.apply(source, frame)? else {
            tracing::debug!(key = name, view = transform.name(), "view dependency absent");
            return Ok(None);
        };
        Ok(produced.downcast::<Arc<T>>().ok().map(|boxed| *boxed))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl TypeRegistry {
    /// Appends a derived view from stored type `I` to requested type `O`.
    ///
    /// Views are tried in the order they are registered.
    ///
    /// # Errors
    /// [`RegistryError::UnregisteredViewInput`] if `I` is not registered.
    pub fn register_view<I, O>(&mut self, name: &'static str, view: ViewFn<I, O>) -> Result<()>
    where
        I: Archivable,
        O: Send + Sync + 'static,
    {
        if self.entry_for(TypeId::of::<I>()).is_none() {
            return Err(RegistryError::UnregisteredViewInput {
                view: name,
                input: I::TYPE_KEY,
            }
            .into());
        }
        tracing::trace!(view = name, input = I::TYPE_KEY, "registered view");
        self.resolver_mut().push(Box::new(FnTransform { name, view }));
        Ok(())
    }
}
