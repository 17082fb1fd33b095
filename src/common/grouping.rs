use std::collections::BTreeMap;

use super::types::{EntityId, Reading};

/// Anything carrying a single numeric observation.
pub trait Observation {
    fn value(&self) -> f64;
}

impl Observation for Reading {
    fn value(&self) -> f64 {
        self.value
    }
}

/// A reading tagged with the entity (crop, bed) it belongs to.
///
/// Sources that merge several entities into one collection, such as the
/// irrigation logs of every crop in a cycle, hand these out so the caller
/// can bucket by entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedReading {
    pub entity_id: EntityId,
    pub reading: Reading,
}

impl Observation for TaggedReading {
    fn value(&self) -> f64 {
        self.reading.value
    }
}

/// Partition observation values by key.
///
/// Uses a BTreeMap so iteration order is the key order regardless of input
/// order. Every observation is kept; duplicates are not merged.
pub fn group_values<T, K, F>(items: &[T], key_of: F) -> BTreeMap<K, Vec<f64>>
where
    T: Observation,
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for item in items {
        groups.entry(key_of(item)).or_default().push(item.value());
    }
    groups
}
