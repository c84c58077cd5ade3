//! Field-level save/load for values that are not frame objects themselves.

use super::input::InputArchive;
use super::object::{Archivable, FrameObject};
use super::output::OutputArchive;
use crate::error::{CodecError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A value that can appear as a field inside an object's payload.
///
/// Plain values are written inline. `Arc`-held objects go through the
/// object-graph machinery, so sharing and back-references survive.
pub trait Persist: Sized {
    /// Writes the value.
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()>;

    /// Reads the value.
    fn load(ar: &mut InputArchive<'_>) -> Result<Self>;
}

macro_rules! persist_primitive {
    ($($t:ty),* $(,)?) => {
        $(
            impl Persist for $t {
                fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
                    ar.encoder().put(*self);
                    Ok(())
                }

                fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
                    ar.decoder().get::<$t>()
                }
            }
        )*
    };
}

persist_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Persist for usize {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put(*self as u64);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let wide = ar.decoder().get::<u64>()?;
        usize::try_from(wide).map_err(|_| CodecError::LengthOverflow(wide).into())
    }
}

impl Persist for bool {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_bool(*self);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.decoder().get_bool()
    }
}

impl Persist for char {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put(*self as u32);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let code = ar.decoder().get::<u32>()?;
        char::from_u32(code).ok_or_else(|| CodecError::InvalidChar(code).into())
    }
}

impl Persist for String {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_str(self);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.decoder().get_str()
    }
}

/// A string stored as fixed 4-byte code units instead of UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WideString(pub String);

impl Persist for WideString {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_wide(&self.0);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.decoder().get_wide().map(WideString)
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_count(self.len() as u64);
        self.iter().try_for_each(|item| item.save(ar))
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let len = ar.decoder().get_len(1)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::load(ar)?);
        }
        Ok(out)
    }
}

impl<T: Persist> Persist for Option<T> {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_bool(self.is_some());
        match self {
            Some(value) => value.save(ar),
            None => Ok(()),
        }
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        if ar.decoder().get_bool()? {
            Ok(Some(T::load(ar)?))
        } else {
            Ok(None)
        }
    }
}

impl<K: Persist + Ord, V: Persist> Persist for BTreeMap<K, V> {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_count(self.len() as u64);
        for (key, value) in self {
            key.save(ar)?;
            value.save(ar)?;
        }
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let len = ar.decoder().get_len(2)?;
        let mut out = BTreeMap::new();
        for _ in 0..len {
            let key = K::load(ar)?;
            let value = V::load(ar)?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

impl<A: Persist, B: Persist> Persist for (A, B) {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        self.0.save(ar)?;
        self.1.save(ar)
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        Ok((A::load(ar)?, B::load(ar)?))
    }
}

impl<A: Persist, B: Persist, C: Persist> Persist for (A, B, C) {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        self.0.save(ar)?;
        self.1.save(ar)?;
        self.2.save(ar)
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        Ok((A::load(ar)?, B::load(ar)?, C::load(ar)?))
    }
}

impl<T: Archivable> Persist for Arc<T> {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write_shared(self)
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.read_shared::<T>()
    }
}

impl Persist for Arc<dyn FrameObject> {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write_object(self)
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        ar.read_object()
    }
}
