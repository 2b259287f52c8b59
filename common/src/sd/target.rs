use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::common::labels::{hash_labels, parse_labels, write_labels};
use crate::error::{Error, Result};

pub const ADDRESS_LABEL: &str = "__address__";
pub const HOST_ADDRESS_LABEL: &str = "__host_address__";
pub const JOB_LABEL: &str = "job";
pub const NAMESPACE_LABEL: &str = "namespace";
pub const POD_LABEL: &str = "pod";

/// A discovered endpoint, described only by its labels.
///
/// Labels are kept sorted by name, so two targets with the same labels
/// display, compare and fingerprint identically regardless of how they
/// were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(BTreeMap<String, String>);

impl Target {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets a label and returns the value it replaced.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Copies every label of `other` into this target, overwriting on conflict.
    pub fn merge(&mut self, other: Target) {
        self.0.extend(other.0);
    }

    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hash_labels(&mut hasher, &self.0);
        hasher.digest()
    }
}

/// Order-sensitive fingerprint of a whole target list.
pub fn fingerprint_targets(targets: &[Target]) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.update(&(targets.len() as u64).to_le_bytes());
    for target in targets {
        hasher.update(&(target.len() as u64).to_le_bytes());
        hash_labels(&mut hasher, &target.0);
    }
    hasher.digest()
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_labels(f, &self.0)
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut target = Target::new();
        for label in parse_labels(s)? {
            if target.contains(&label.name) {
                return Err(Error::InvalidLabels(format!("duplicate label {:?} in {:?}", label.name, s)));
            }
            target.set(label.name, label.value);
        }
        Ok(target)
    }
}

impl<K, V> FromIterator<(K, V)> for Target
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Target {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }
}

impl IntoIterator for Target {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Target {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
