// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
`MeasurementKey` identifies a signal inside one subscriber session, and
[`KeyRegistry`] assigns the cheap integer `runtime_id` handle used for
reverse lookup.

The upstream source keeps this registry process-global; per spec.md §9 it is
scoped to one session here instead, so two independent `Subscriber`s never
observe each other's `runtime_id` assignments.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use uuid::Uuid;

/// Identity of a signal inside a session. Two keys with equal `signal_id`
/// but different `(source, id)` are distinct: they come from different
/// publisher namespaces.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementKey {
    /// Globally unique identity of the signal.
    pub signal_id: Uuid,
    /// Publisher-assigned namespace the point id is scoped to.
    pub source: String,
    /// Publisher-assigned numeric id, scoped to `source`.
    pub id: u64,
    /// Process-wide-within-session monotonic handle for this `(source, id)`.
    pub runtime_id: u32,
}

impl MeasurementKey {
    fn new(signal_id: Uuid, source: String, id: u64, runtime_id: u32) -> Self {
        Self {
            signal_id,
            source,
            id,
            runtime_id,
        }
    }
}

/// Assigns a session-scoped, monotonically increasing `runtime_id` the first
/// time a `(source, id)` pair is seen, and returns the same id on every
/// subsequent lookup for that pair.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    next_id: AtomicU32,
    by_source_id: HashMap<(String, u64), u32>,
}

impl KeyRegistry {
    /// Creates an empty, session-scoped registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up or assigns a `MeasurementKey` for `(signal_id, source, id)`.
    /// The same `(source, id)` pair always yields the same `runtime_id`
    /// within this registry, regardless of `signal_id`.
    pub fn resolve(&mut self, signal_id: Uuid, source: &str, id: u64) -> MeasurementKey {
        let runtime_id = *self
            .by_source_id
            .entry((source.to_owned(), id))
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        MeasurementKey::new(signal_id, source.to_owned(), id, runtime_id)
    }

    /// Number of distinct `(source, id)` pairs resolved so far.
    pub fn len(&self) -> usize {
        self.by_source_id.len()
    }

    /// Returns `true` when no keys have been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.by_source_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_id_yields_same_runtime_id() {
        let mut registry = KeyRegistry::new();
        let a = registry.resolve(Uuid::new_v4(), "PPA", 7);
        let b = registry.resolve(Uuid::new_v4(), "PPA", 7);
        assert_eq!(a.runtime_id, b.runtime_id);
        assert_ne!(a.signal_id, b.signal_id);
    }

    #[test]
    fn distinct_source_id_pairs_yield_distinct_runtime_ids() {
        let mut registry = KeyRegistry::new();
        let a = registry.resolve(Uuid::new_v4(), "PPA", 7);
        let b = registry.resolve(Uuid::new_v4(), "PPB", 7);
        assert_ne!(a.runtime_id, b.runtime_id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn equal_signal_id_different_namespace_are_distinct_keys() {
        let mut registry = KeyRegistry::new();
        let signal_id = Uuid::new_v4();
        let a = registry.resolve(signal_id, "PPA", 1);
        let b = registry.resolve(signal_id, "PPB", 1);
        assert_ne!(a, b);
    }
}
