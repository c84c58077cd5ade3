#![allow(missing_docs)]

use evframe::archive::{self, BackLink, FrameObject, InputArchive, OutputArchive, TypeRegistry};
use evframe::codec::Endian;
use evframe::error::{CodecError, RegistryError};
use evframe::payload::{BoolValue, F64Value};
use evframe::{Archivable, FrameError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default, Archivable)]
#[archive(key = "Leaf")]
struct Leaf {
    label: String,
    weight: f64,
}

#[derive(Debug, Archivable)]
#[archive(key = "Branch")]
struct Branch {
    leaf: Arc<Leaf>,
}

// Two branches over one leaf: the classic diamond.
#[derive(Debug, Archivable)]
#[archive(key = "Tree")]
struct Tree {
    left: Arc<Branch>,
    right: Arc<Branch>,
    direct: Arc<Leaf>,
}

#[derive(Debug, Archivable)]
#[archive(key = "Flags")]
struct Flags {
    first: Arc<BoolValue>,
    second: Arc<BoolValue>,
}

#[derive(Debug, Archivable)]
#[archive(key = "Parent")]
struct Parent {
    name: String,
    child: Arc<Child>,
}

#[derive(Debug, Archivable)]
#[archive(key = "Child")]
struct Child {
    parent: BackLink,
}

/// A mutable cell; interior mutability is the owner's business, the archive
/// only sees the value at save time.
#[derive(Debug, Default)]
struct Counter(Mutex<i64>);

impl Archivable for Counter {
    const TYPE_KEY: &'static str = "Counter";

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write(&*self.0.lock())
    }

    fn load(ar: &mut InputArchive<'_>, _version: u32) -> Result<Self> {
        Ok(Self(Mutex::new(ar.read()?)))
    }
}

#[derive(Debug, Archivable)]
#[archive(key = "CounterPair")]
struct CounterPair {
    a: Arc<Counter>,
    b: Arc<Counter>,
}

fn registry() -> TypeRegistry {
    let mut reg = TypeRegistry::standard().unwrap();
    reg.register::<Leaf>().unwrap();
    reg.register::<Branch>().unwrap();
    reg.register::<Tree>().unwrap();
    reg.register::<Flags>().unwrap();
    reg.register::<Parent>().unwrap();
    reg.register::<Child>().unwrap();
    reg.register::<Counter>().unwrap();
    reg.register::<CounterPair>().unwrap();
    reg
}

#[test]
fn diamond_is_written_once_and_relinked() -> Result<()> {
    let reg = registry();
    let leaf = Arc::new(Leaf {
        label: "dom".into(),
        weight: 0.5,
    });
    let tree = Arc::new(Tree {
        left: Arc::new(Branch { leaf: leaf.clone() }),
        right: Arc::new(Branch { leaf: leaf.clone() }),
        direct: leaf,
    });

    let bytes = archive::to_bytes(&reg, &tree)?;
    // The leaf label appears exactly once in the output.
    let hits = bytes.windows(3).filter(|w| *w == b"dom").count();
    assert_eq!(hits, 1);

    let back: Arc<Tree> = archive::from_bytes(&reg, &bytes)?;
    assert!(Arc::ptr_eq(&back.left.leaf, &back.right.leaf));
    assert!(Arc::ptr_eq(&back.left.leaf, &back.direct));
    assert!(!Arc::ptr_eq(&back.left, &back.right));
    assert_eq!(back.direct.weight, 0.5);
    Ok(())
}

#[test]
fn shared_branch_stays_shared() -> Result<()> {
    let reg = registry();
    let branch = Arc::new(Branch {
        leaf: Arc::new(Leaf::default()),
    });
    let tree = Arc::new(Tree {
        left: branch.clone(),
        right: branch.clone(),
        direct: branch.leaf.clone(),
    });
    let back: Arc<Tree> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &tree)?)?;
    assert!(Arc::ptr_eq(&back.left, &back.right));
    Ok(())
}

#[test]
fn untracked_values_are_duplicated() -> Result<()> {
    let reg = registry();
    let flag = Arc::new(BoolValue(true));
    let flags = Arc::new(Flags {
        first: flag.clone(),
        second: flag,
    });
    let back: Arc<Flags> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &flags)?)?;
    assert!(back.first.0 && back.second.0);
    assert!(!Arc::ptr_eq(&back.first, &back.second));
    Ok(())
}

#[test]
fn back_links_close_cycles() -> Result<()> {
    let reg = registry();
    let child = Arc::new(Child {
        parent: BackLink::empty(),
    });
    let parent = Arc::new(Parent {
        name: "string 21".into(),
        child: child.clone(),
    });
    let erased: Arc<dyn FrameObject> = parent.clone();
    assert!(child.parent.set(&erased));
    assert!(!child.parent.set(&erased));
    drop(erased);

    let bytes = archive::to_bytes(&reg, &parent)?;
    let back: Arc<Parent> = archive::from_bytes(&reg, &bytes)?;
    let linked = back.child.parent.get::<Parent>().expect("link resolved after load");
    assert!(Arc::ptr_eq(&linked, &back));
    assert_eq!(linked.name, "string 21");

    // The link is weak: dropping the parent leaves it dead, not leaked.
    let child = back.child.clone();
    drop((back, linked));
    assert!(child.parent.is_set());
    assert!(child.parent.upgrade().is_none());
    Ok(())
}

#[test]
fn saving_from_the_child_side_is_refused() -> Result<()> {
    let reg = registry();
    let child = Arc::new(Child {
        parent: BackLink::empty(),
    });
    let parent = Arc::new(Parent {
        name: "string 86".into(),
        child: child.clone(),
    });
    let erased: Arc<dyn FrameObject> = parent.clone();
    child.parent.set(&erased);

    // The only route to the parent is the weak link, so no loader could
    // give it an owner.
    let err = archive::to_bytes(&reg, &child).unwrap_err();
    assert!(
        matches!(
            err,
            FrameError::Codec { source: CodecError::UnanchoredLink(ref key), .. } if key == "Parent"
        ),
        "unexpected error: {err}"
    );

    // The same graph saved from its owner round-trips.
    let back: Arc<Parent> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &parent)?)?;
    assert!(Arc::ptr_eq(&back.child.parent.get::<Parent>().unwrap(), &back));
    Ok(())
}

#[test]
fn unset_and_dead_links_load_unset() -> Result<()> {
    let reg = registry();
    let orphan = Arc::new(Child {
        parent: BackLink::empty(),
    });
    let back: Arc<Child> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &orphan)?)?;
    assert!(!back.parent.is_set());

    let dead = Arc::new(Child {
        parent: BackLink::to_shared(&Arc::new(Leaf::default())),
    });
    assert!(dead.parent.is_set() && dead.parent.upgrade().is_none());
    let back: Arc<Child> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &dead)?)?;
    assert!(!back.parent.is_set());
    Ok(())
}

#[test]
fn link_holding_a_whole_object_is_malformed() -> Result<()> {
    let reg = registry();
    let mut ar = OutputArchive::new(&reg);
    ar.encoder().put_str("Child");
    ar.encoder().put_version(0);
    ar.encoder().put_count(1 << 1);
    let leaf: Arc<dyn FrameObject> = Arc::new(Leaf::default());
    ar.write_object(&leaf)?;
    let bytes = ar.into_bytes();

    let err = archive::decode_object(&reg, &bytes).unwrap_err();
    assert!(
        matches!(
            err.as_codec(),
            Some(CodecError::Malformed { type_key, .. }) if type_key == "Leaf"
        ),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn mutation_is_visible_through_both_handles() -> Result<()> {
    let reg = registry();
    let shared = Arc::new(Counter(Mutex::new(7)));
    let pair = Arc::new(CounterPair {
        a: shared.clone(),
        b: shared,
    });
    let back: Arc<CounterPair> = archive::from_bytes(&reg, &archive::to_bytes(&reg, &pair)?)?;
    assert_eq!(*back.b.0.lock(), 7);
    *back.a.0.lock() += 5;
    assert_eq!(*back.b.0.lock(), 12);
    Ok(())
}

#[test]
fn decoding_twice_gives_equal_independent_graphs() -> Result<()> {
    let reg = registry();
    let leaf = Arc::new(Leaf {
        label: "x".into(),
        weight: 2.0,
    });
    let tree = Arc::new(Tree {
        left: Arc::new(Branch { leaf: leaf.clone() }),
        right: Arc::new(Branch { leaf: leaf.clone() }),
        direct: leaf,
    });
    let bytes = archive::to_bytes(&reg, &tree)?;
    let first: Arc<Tree> = archive::from_bytes(&reg, &bytes)?;
    let second: Arc<Tree> = archive::from_bytes(&reg, &bytes)?;
    assert!(!Arc::ptr_eq(&first.direct, &second.direct));
    assert_eq!(archive::to_bytes(&reg, &first)?, bytes);
    assert_eq!(archive::to_bytes(&reg, &second)?, bytes);
    Ok(())
}

#[test]
fn graphs_are_identical_across_hosts() -> Result<()> {
    let reg = registry();
    let leaf = Arc::new(Leaf {
        label: "portable".into(),
        weight: -1.25,
    });
    let branch = Arc::new(Branch { leaf });

    let mut little = OutputArchive::with_host(&reg, Endian::Little);
    little.write_shared(&branch)?;
    let mut big = OutputArchive::with_host(&reg, Endian::Big);
    big.write_shared(&branch)?;
    let bytes = little.into_bytes();
    assert_eq!(bytes, big.into_bytes());

    let mut input = InputArchive::with_host(&bytes, &reg, Endian::Big);
    let back = input.read_shared::<Branch>()?;
    input.finish()?;
    assert_eq!(back.leaf.weight, -1.25);
    assert_eq!(back.leaf.label, "portable");
    Ok(())
}

#[test]
fn unregistered_type_fails_the_load() {
    let full = registry();
    let bytes = archive::to_bytes(&full, &Arc::new(Leaf::default())).unwrap();

    let bare = TypeRegistry::standard().unwrap();
    let err = archive::from_bytes::<Leaf>(&bare, &bytes).unwrap_err();
    assert!(matches!(
        err,
        FrameError::Registry(RegistryError::Unregistered(ref key)) if key == "Leaf"
    ));
}

#[test]
fn unregistered_type_fails_the_save() {
    let bare = TypeRegistry::new();
    let err = archive::to_bytes(&bare, &Arc::new(F64Value(1.0))).unwrap_err();
    assert!(matches!(err, FrameError::Registry(RegistryError::Unregistered(_))));
}

mod old {
    use super::*;

    #[derive(Debug, Archivable)]
    #[archive(key = "Fit")]
    pub struct Fit {
        pub zenith: f64,
    }
}

mod new {
    use super::*;

    #[derive(Debug, Archivable)]
    #[archive(key = "Fit", version = 2)]
    pub struct Fit {
        pub zenith: f64,
        #[archive(since = 1)]
        pub ndof: u32,
        #[archive(since = 2)]
        pub converged: bool,
        #[archive(skip)]
        pub scratch: Vec<f64>,
    }
}

fn fit_registry<T: Archivable>() -> TypeRegistry {
    let mut reg = TypeRegistry::new();
    reg.register::<T>().unwrap();
    reg
}

#[test]
fn fields_added_later_load_as_defaults() -> Result<()> {
    let old_reg = fit_registry::<old::Fit>();
    let new_reg = fit_registry::<new::Fit>();

    let bytes = archive::to_bytes(&old_reg, &Arc::new(old::Fit { zenith: 0.7 }))?;
    let fit: Arc<new::Fit> = archive::from_bytes(&new_reg, &bytes)?;
    assert_eq!(fit.zenith, 0.7);
    assert_eq!(fit.ndof, 0);
    assert!(!fit.converged);

    let current = Arc::new(new::Fit {
        zenith: 1.1,
        ndof: 4,
        converged: true,
        scratch: vec![1.0, 2.0],
    });
    let bytes = archive::to_bytes(&new_reg, &current)?;
    let fit: Arc<new::Fit> = archive::from_bytes(&new_reg, &bytes)?;
    assert_eq!((fit.ndof, fit.converged), (4, true));
    assert!(fit.scratch.is_empty());
    Ok(())
}

#[test]
fn newer_records_are_refused() {
    let old_reg = fit_registry::<old::Fit>();
    let new_reg = fit_registry::<new::Fit>();
    let current = Arc::new(new::Fit {
        zenith: 1.1,
        ndof: 4,
        converged: true,
        scratch: Vec::new(),
    });
    let bytes = archive::to_bytes(&new_reg, &current).unwrap();

    let err = archive::from_bytes::<old::Fit>(&old_reg, &bytes).unwrap_err();
    match err.as_codec() {
        Some(CodecError::FutureVersion {
            type_key,
            found,
            supported,
        }) => {
            assert_eq!(type_key, "Fit");
            assert_eq!((*found, *supported), (2, 0));
        }
        other => panic!("expected a future-version error, got {other:?}"),
    }
}

#[test]
fn every_truncation_is_an_error() {
    let reg = registry();
    let leaf = Arc::new(Leaf {
        label: "cut".into(),
        weight: 3.0,
    });
    let tree = Arc::new(Tree {
        left: Arc::new(Branch { leaf: leaf.clone() }),
        right: Arc::new(Branch { leaf: leaf.clone() }),
        direct: leaf,
    });
    let bytes = archive::to_bytes(&reg, &tree).unwrap();
    for cut in 0..bytes.len() {
        let result = archive::from_bytes::<Tree>(&reg, &bytes[..cut]);
        assert!(result.is_err(), "prefix of {cut} bytes decoded");
    }
}
