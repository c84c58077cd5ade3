//! The type registry: stable keys, versions, factories and convertibility.
//!
//! A registry is an explicit value built once at startup and shared (usually
//! through an `Arc`) by archives and frames. Registration is a sequence of
//! plain calls; nothing registers itself behind the caller's back.

use super::input::InputArchive;
use super::object::{Archivable, FrameObject};
use crate::error::{RegistryError, Result};
use crate::views::Resolver;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Loader = fn(&mut InputArchive<'_>, u32) -> Result<Arc<dyn FrameObject>>;
type Seed = fn(Arc<dyn FrameObject>) -> Option<Box<dyn Any + Send + Sync>>;
type Caster =
    Arc<dyn Fn(Box<dyn Any + Send + Sync>) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Everything the registry knows about one concrete type.
#[derive(Clone)]
pub struct TypeEntry {
    key: &'static str,
    version: u32,
    tracked: bool,
    type_id: TypeId,
    rust_name: &'static str,
    loader: Loader,
    seed: Seed,
}

impl TypeEntry {
    /// The stable type key.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The schema version this build writes.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether instances are deduplicated within one archive.
    pub fn tracked(&self) -> bool {
        self.tracked
    }

    /// The Rust type id of the concrete type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name, for diagnostics.
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub(crate) fn loader(&self) -> Loader {
        self.loader
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("tracked", &self.tracked)
            .field("rust_name", &self.rust_name)
            .finish()
    }
}

struct CastEdge {
    caster: Caster,
    explicit: bool,
}

fn load_erased<T: Archivable>(
    ar: &mut InputArchive<'_>,
    version: u32,
) -> Result<Arc<dyn FrameObject>> {
    Ok(Arc::new(T::load(ar, version)?))
}

fn seed_erased<T: Archivable>(obj: Arc<dyn FrameObject>) -> Option<Box<dyn Any + Send + Sync>> {
    let concrete: Arc<T> = obj.into_any().downcast::<T>().ok()?;
    Some(Box::new(concrete))
}

fn compose(first: Caster, second: Caster) -> Caster {
    Arc::new(move |boxed: Box<dyn Any + Send + Sync>| second(first(boxed)?))
}

/// Registry of serializable types and the conversions between them.
pub struct TypeRegistry {
    entries: HashMap<&'static str, TypeEntry>,
    by_type: HashMap<TypeId, &'static str>,
    labels: HashMap<TypeId, String>,
    casts: HashMap<(TypeId, TypeId), CastEdge>,
    resolver: Resolver,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_type: HashMap::new(),
            labels: HashMap::new(),
            casts: HashMap::new(),
            resolver: Resolver::default(),
        }
    }

    /// Creates a registry holding the bundled payload types and the standard
    /// derived-view chain.
    pub fn standard() -> Result<Self> {
        let mut registry = Self::new();
        crate::payload::register_standard(&mut registry)?;
        Ok(registry)
    }

    /// Registers a concrete type under its type key.
    ///
    /// # Errors
    /// [`RegistryError::Duplicate`] if the key is already taken.
    pub fn register<T: Archivable>(&mut self) -> Result<()> {
        if self.entries.contains_key(T::TYPE_KEY) {
            return Err(RegistryError::Duplicate(T::TYPE_KEY.to_string()).into());
        }
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.by_type.get(&type_id) {
            let key = format!("{} (as '{existing}')", T::TYPE_KEY);
            return Err(RegistryError::Duplicate(key).into());
        }

        self.entries.insert(
            T::TYPE_KEY,
            TypeEntry {
                key: T::TYPE_KEY,
                version: T::VERSION,
                tracked: T::TRACKED,
                type_id,
                rust_name: type_name::<T>(),
                loader: load_erased::<T>,
                seed: seed_erased::<T>,
            },
        );
        self.by_type.insert(type_id, T::TYPE_KEY);
        self.labels.insert(type_id, T::TYPE_KEY.to_string());

        let identity: Caster = Arc::new(|boxed: Box<dyn Any + Send + Sync>| Some(boxed));
        self.casts.insert(
            (type_id, type_id),
            CastEdge {
                caster: identity,
                explicit: true,
            },
        );
        tracing::trace!(key = T::TYPE_KEY, version = T::VERSION, "registered type");
        Ok(())
    }

    /// Registers a conversion from `From` to `To` and every conversion that
    /// follows from it transitively.
    ///
    /// `From` is usually a concrete registered type and `To` a base
    /// interface (`dyn Trait`); chains such as `MostDerived -> Derived ->
    /// Base` are closed automatically.
    ///
    /// # Errors
    /// [`RegistryError::ConflictingCast`] if the same pair was already
    /// registered explicitly.
    pub fn register_cast<From, To>(&mut self, cast: fn(Arc<From>) -> Arc<To>) -> Result<()>
    where
        From: ?Sized + Send + Sync + 'static,
        To: ?Sized + Send + Sync + 'static,
    {
        let pair = (TypeId::of::<From>(), TypeId::of::<To>());
        if self.casts.get(&pair).is_some_and(|edge| edge.explicit) {
            return Err(RegistryError::ConflictingCast {
                from: type_name::<From>().to_string(),
                to: type_name::<To>().to_string(),
            }
            .into());
        }
        self.labels
            .entry(pair.0)
            .or_insert_with(|| type_name::<From>().to_string());
        self.labels
            .entry(pair.1)
            .or_insert_with(|| type_name::<To>().to_string());

        let caster: Caster = Arc::new(move |boxed: Box<dyn Any + Send + Sync>| {
            let source = boxed.downcast::<Arc<From>>().ok()?;
            let target: Box<dyn Any + Send + Sync> = Box::new(cast(*source));
            Some(target)
        });
        self.casts.insert(
            pair,
            CastEdge {
                caster,
                explicit: true,
            },
        );
        self.close_casts();
        Ok(())
    }

    /// Adds every composite edge `a -> c` for which `a -> b -> c` exists.
    fn close_casts(&mut self) {
        loop {
            let mut added: Vec<((TypeId, TypeId), Caster)> = Vec::new();
            for (&(a, b), first) in &self.casts {
                if a == b {
                    continue;
                }
                for (&(c, d), second) in &self.casts {
                    if c != b || c == d || a == d {
                        continue;
                    }
                    let pair = (a, d);
                    if self.casts.contains_key(&pair) || added.iter().any(|(p, _)| *p == pair) {
                        continue;
                    }
                    added.push((pair, compose(first.caster.clone(), second.caster.clone())));
                }
            }
            if added.is_empty() {
                return;
            }
            for (pair, caster) in added {
                self.casts.insert(
                    pair,
                    CastEdge {
                        caster,
                        explicit: false,
                    },
                );
            }
        }
    }

    /// Converts a decoded object into a handle of type `T`, if the object's
    /// concrete type is `T` or registered as convertible to it.
    pub fn cast<T: ?Sized + 'static>(&self, obj: &Arc<dyn FrameObject>) -> Option<Arc<T>> {
        let concrete = obj.as_any().type_id();
        let edge = self.casts.get(&(concrete, TypeId::of::<T>()))?;
        let key = self.by_type.get(&concrete)?;
        let seed = (self.entries.get(key)?.seed)(Arc::clone(obj))?;
        let converted = (edge.caster)(seed)?;
        converted.downcast::<Arc<T>>().ok().map(|boxed| *boxed)
    }

    /// True if values stored under `key` can be handed out as `target`
    /// without any derived view.
    pub fn is_convertible(&self, key: &str, target: TypeId) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| self.casts.contains_key(&(entry.type_id, target)))
    }

    /// Looks up a type by key.
    pub fn entry(&self, key: &str) -> Option<&TypeEntry> {
        self.entries.get(key)
    }

    /// Looks up a type by key, failing for unknown keys.
    pub fn require(&self, key: &str) -> std::result::Result<&TypeEntry, RegistryError> {
        self.entries
            .get(key)
            .ok_or_else(|| RegistryError::Unregistered(key.to_string()))
    }

    /// Looks up a type by its Rust type id.
    pub fn entry_for(&self, type_id: TypeId) -> Option<&TypeEntry> {
        self.by_type.get(&type_id).and_then(|key| self.entries.get(key))
    }

    /// True if the key is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Names of every type or interface `key` converts to, sorted.
    pub fn ancestors(&self, key: &str) -> Vec<String> {
        let Some(entry) = self.entries.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .casts
            .keys()
            .filter(|(from, to)| *from == entry.type_id && from != to)
            .filter_map(|(_, to)| self.labels.get(to).cloned())
            .collect();
        out.sort();
        out
    }

    /// The derived-view chain consulted on typed-lookup misses.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    /// Human-readable name for a type id known to the registry.
    pub(crate) fn label(&self, type_id: TypeId) -> String {
        self.labels
            .get(&type_id)
            .cloned()
            .unwrap_or_else(|| format!("{type_id:?}"))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.keys())
            .field("casts", &self.casts.len())
            .field("views", &self.resolver)
            .finish()
    }
}
