// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Bidirectional map between a 16-bit runtime signal index and a
[`MeasurementKey`], plus its binary (de)serializer.

The cache is always rebuilt wholesale from an `UpdateSignalIndexCache`
response; it is never mutated in place while a subscription is active.
*/

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::{Result, SttpError};
use crate::frame::{
    read_guid, read_len_string, read_u32, read_u64, write_guid, write_len_string, write_u32,
    write_u64,
};
use crate::measurement_key::MeasurementKey;

/// Sentinel returned by [`SignalIndexCache::signal_index`] when a key has no
/// assigned index in this cache. A real cache can therefore hold at most
/// `u16::MAX` (65 535) distinct signals.
pub const UNMAPPED_INDEX: u16 = u16::MAX;

/// One entry in the forward map: a runtime signal index paired with the key
/// it resolves to.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Entry {
    signal_index: u16,
    key: MeasurementKey,
}

/// A dual-slot signal index cache rebuilt wholesale on every publisher push.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalIndexCache {
    /// Identifier of the subscription this cache belongs to.
    pub subscriber_id: Uuid,
    reference: HashMap<u16, MeasurementKey>,
    /// Signal ids the publisher refused to authorize for this subscriber.
    pub unauthorized: Vec<Uuid>,
    reverse: HashMap<u32, u16>,
}

impl SignalIndexCache {
    /// Creates an empty cache for `subscriber_id`.
    pub fn new(subscriber_id: Uuid) -> Self {
        Self {
            subscriber_id,
            reference: HashMap::new(),
            unauthorized: Vec::new(),
            reverse: HashMap::new(),
        }
    }

    /// Inserts or replaces the mapping for `signal_index`, maintaining the
    /// reverse `runtime_id -> signal_index` map.
    pub fn insert(&mut self, signal_index: u16, key: MeasurementKey) {
        self.reverse.insert(key.runtime_id, signal_index);
        self.reference.insert(signal_index, key);
    }

    /// Looks up the [`MeasurementKey`] for a wire-level signal index.
    pub fn key(&self, signal_index: u16) -> Option<&MeasurementKey> {
        self.reference.get(&signal_index)
    }

    /// Returns the 16-bit signal index for `key`'s `runtime_id`, or
    /// [`UNMAPPED_INDEX`] when the key is not present in this cache — this
    /// never faults.
    pub fn signal_index(&self, key: &MeasurementKey) -> u16 {
        self.reverse
            .get(&key.runtime_id)
            .copied()
            .unwrap_or(UNMAPPED_INDEX)
    }

    /// Number of signals mapped by this cache.
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    /// Returns `true` when the cache has no mapped signals.
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Computed length in bytes of the serialized form. Snapshots
    /// `unauthorized` once so the length can never drift from what
    /// [`SignalIndexCache::serialize`] actually writes, even if the caller
    /// mutates `unauthorized` between the two calls.
    pub fn binary_length(&self) -> usize {
        let mut len = 4 + 16 + 4 + 4; // totalByteSize + subscriberID + referenceCount + unauthorizedCount
        for key in self.reference.values() {
            len += 4 + 16 + 4 + key.source.len() + 8;
        }
        len += 16 * self.unauthorized.len();
        len
    }

    /// Serializes the cache to its wire form (§4.2).
    pub fn serialize(&self) -> Vec<u8> {
        // Snapshot unauthorized once up front (spec.md §9: the source's
        // BinaryLength ignores a TOCTOU race on this list; we avoid it by
        // deriving both the length and the bytes from one borrow).
        let unauthorized = &self.unauthorized;
        let total_len = self.binary_length();

        let mut buf = Vec::with_capacity(total_len);
        write_u32(&mut buf, total_len as u32);
        write_guid(&mut buf, &self.subscriber_id);
        write_u32(&mut buf, self.reference.len() as u32);

        let mut entries: Vec<_> = self.reference.iter().collect();
        entries.sort_by_key(|(index, _)| **index);
        for (signal_index, key) in entries {
            write_u32(&mut buf, *signal_index as u32);
            write_guid(&mut buf, &key.signal_id);
            write_len_string(&mut buf, &key.source);
            write_u64(&mut buf, key.id);
        }

        write_u32(&mut buf, unauthorized.len() as u32);
        for signal_id in unauthorized {
            write_guid(&mut buf, signal_id);
        }

        debug_assert_eq!(buf.len(), total_len);
        buf
    }

    /// Parses a cache from its wire form (§4.2), clearing and rebuilding both
    /// the forward and reverse maps from scratch.
    pub fn parse(buffer: &[u8], next_runtime_id: &mut dyn FnMut(&str, u64) -> u32) -> Result<Self> {
        let mut offset = 0usize;
        let _total_len = read_u32(buffer, offset)? as usize;
        offset += 4;
        let subscriber_id = read_guid(buffer, offset)?;
        offset += 16;

        let reference_count = read_u32(buffer, offset)? as usize;
        offset += 4;

        let mut reference = HashMap::with_capacity(reference_count);
        let mut reverse = HashMap::with_capacity(reference_count);
        for _ in 0..reference_count {
            let signal_index = read_u32(buffer, offset)? as u16;
            offset += 4;
            let signal_id = read_guid(buffer, offset)?;
            offset += 16;
            let (source, next_offset) = read_len_string(buffer, offset)?;
            offset = next_offset;
            let id = read_u64(buffer, offset)?;
            offset += 8;

            let runtime_id = next_runtime_id(&source, id);
            let key = MeasurementKey {
                signal_id,
                source,
                id,
                runtime_id,
            };
            reverse.insert(runtime_id, signal_index);
            reference.insert(signal_index, key);
        }

        let unauthorized_count = read_u32(buffer, offset)? as usize;
        offset += 4;
        let mut unauthorized = Vec::with_capacity(unauthorized_count);
        for _ in 0..unauthorized_count {
            unauthorized.push(read_guid(buffer, offset)?);
            offset += 16;
        }

        Ok(Self {
            subscriber_id,
            reference,
            unauthorized,
            reverse,
        })
    }
}
