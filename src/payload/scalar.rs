use crate::Archivable;
use std::collections::BTreeMap;

/// A single floating-point value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Archivable)]
pub struct F64Value(pub f64);

/// A single integer value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archivable)]
pub struct I32Value(pub i32);

/// A single flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archivable)]
#[archive(untracked)]
pub struct BoolValue(pub bool);

/// A single string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archivable)]
pub struct StringValue(pub String);

/// A small named table of numbers, e.g. fit parameters.
#[derive(Debug, Clone, Default, PartialEq, Archivable)]
pub struct F64Map(pub BTreeMap<String, f64>);

impl F64Map {
    /// The value stored for `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for F64Map {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
