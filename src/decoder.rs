// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Compact-format measurement decoder (§4.3): a flag byte, a 16-bit signal
index, an optional timestamp delta, optional state flags, and a 32-bit
big-endian float, repeated until the payload is exhausted.
*/

use bitflags::bitflags;

use crate::errors::{RateLimiter, Result, SttpError};
use crate::frame::{read_f32, read_u16, read_u32};
use crate::measurement::{Measurement, StateFlags, Ticks};
use crate::signal_index_cache::SignalIndexCache;

bitflags! {
    /// Bits of the per-measurement compact-format flag byte.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    struct CompactFlags: u8 {
        /// Timestamp delta field is present; absent means "use the data
        /// packet's own timestamp", which this decoder does not carry, so
        /// absence here resolves to the base time with a zero delta.
        const TIME_INCLUDED   = 0x01;
        /// A 32-bit state-flags field follows the timestamp delta.
        const STATE_INCLUDED  = 0x02;
        /// Selects base_times[1] instead of base_times[0] for this value.
        const BASE_TIME_INDEX = 0x04;
        /// Value is discarded (filtered) at the source; still decoded.
        const DISCARDED_VALUE = 0x08;
    }
}

/// Resolves compact-format signal indices against one active
/// [`SignalIndexCache`] and a pair of base-time offsets (§3, §4.3).
pub struct CompactDecoder {
    /// Whether `UseMillisecondResolution` was negotiated: timestamp deltas
    /// are milliseconds (scaled by 10 000 to ticks) rather than raw ticks.
    pub use_millisecond_resolution: bool,
    unknown_index_limiter: RateLimiter,
}

impl CompactDecoder {
    /// Creates a decoder for a negotiated `use_millisecond_resolution` mode.
    pub fn new(use_millisecond_resolution: bool) -> Self {
        Self {
            use_millisecond_resolution,
            unknown_index_limiter: RateLimiter::default(),
        }
    }

    /// Decodes every measurement in `payload`, resolving signal indices
    /// through `cache` and timestamp deltas through `base_times`. A signal
    /// index absent from `cache` drops that single measurement and emits a
    /// rate-limited warning rather than failing the whole packet (§8).
    pub fn decode(
        &self,
        payload: &[u8],
        cache: &SignalIndexCache,
        base_times: [i64; 2],
    ) -> Result<Vec<Measurement>> {
        let mut measurements = Vec::new();
        let mut offset = 0usize;

        while offset < payload.len() {
            let flag_byte = payload[offset];
            offset += 1;
            let flags = CompactFlags::from_bits_retain(flag_byte);

            let signal_index = read_u16(payload, offset)?;
            offset += 2;

            let delta: i64 = if flags.contains(CompactFlags::TIME_INCLUDED) {
                let raw = read_u32(payload, offset)? as i64;
                offset += 4;
                if self.use_millisecond_resolution {
                    raw * 10_000
                } else {
                    raw
                }
            } else {
                0
            };

            let state_flags = if flags.contains(CompactFlags::STATE_INCLUDED) {
                let raw = read_u32(payload, offset)?;
                offset += 4;
                StateFlags::from_bits_retain(raw)
            } else if flags.contains(CompactFlags::DISCARDED_VALUE) {
                StateFlags::DISCARDED_VALUE
            } else {
                StateFlags::empty()
            };

            let value = read_f32(payload, offset)? as f64;
            offset += 4;

            let key = match cache.key(signal_index) {
                Some(key) => key,
                None => {
                    if self.unknown_index_limiter.allow() {
                        log::warn!("dropping measurement with unknown signal index {signal_index}");
                    }
                    continue;
                }
            };

            let base_index = usize::from(flags.contains(CompactFlags::BASE_TIME_INDEX));
            let timestamp = resolve_timestamp(base_times[base_index], delta);

            measurements.push(Measurement::new(key.signal_id, value, timestamp, state_flags));
        }

        Ok(measurements)
    }
}

fn resolve_timestamp(base: i64, delta: i64) -> Ticks {
    base.saturating_add(delta) as Ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement_key::KeyRegistry;
    use uuid::Uuid;

    fn cache_with_one_signal() -> (SignalIndexCache, Uuid) {
        let mut registry = KeyRegistry::new();
        let mut cache = SignalIndexCache::new(Uuid::new_v4());
        let key = registry.resolve(Uuid::new_v4(), "PPA", 1);
        let signal_id = key.signal_id;
        cache.insert(0, key);
        (cache, signal_id)
    }

    fn encode_measurement(flags: CompactFlags, index: u16, delta: Option<u32>, state: Option<u32>, value: f32) -> Vec<u8> {
        let mut buf = vec![flags.bits()];
        buf.extend_from_slice(&index.to_be_bytes());
        if let Some(d) = delta {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        if let Some(s) = state {
            buf.extend_from_slice(&s.to_be_bytes());
        }
        buf.extend_from_slice(&value.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_scenario_3_from_spec() {
        let (cache, signal_id) = cache_with_one_signal();
        let payload = encode_measurement(
            CompactFlags::TIME_INCLUDED | CompactFlags::BASE_TIME_INDEX,
            0,
            Some(0x000F_4240),
            None,
            50.0,
        );
        assert_eq!(payload.len(), 11);
        let decoder = CompactDecoder::new(true);
        let base_times = [0i64, 638_200_000_000_000_000i64];
        let measurements = decoder.decode(&payload, &cache, base_times).unwrap();
        assert_eq!(measurements.len(), 1);
        let m = &measurements[0];
        assert_eq!(m.signal_id, signal_id);
        assert_eq!(m.value, 50.0);
        assert_eq!(m.timestamp, (638_200_000_000_000_000i64 + 1_000_000 * 10_000) as u64);
    }

    #[test]
    fn raw_ticks_mode_does_not_scale_delta() {
        let (cache, _) = cache_with_one_signal();
        let payload = encode_measurement(CompactFlags::TIME_INCLUDED, 0, Some(42), None, 1.5);
        let decoder = CompactDecoder::new(false);
        let measurements = decoder.decode(&payload, &cache, [100, 0]).unwrap();
        assert_eq!(measurements[0].timestamp, 142);
    }

    #[test]
    fn missing_time_included_falls_back_to_base_with_zero_delta() {
        let (cache, _) = cache_with_one_signal();
        let payload = encode_measurement(CompactFlags::empty(), 0, None, None, 1.0);
        let decoder = CompactDecoder::new(false);
        let measurements = decoder.decode(&payload, &cache, [7, 0]).unwrap();
        assert_eq!(measurements[0].timestamp, 7);
    }

    #[test]
    fn unknown_signal_index_is_dropped_not_a_failure() {
        let cache = SignalIndexCache::new(Uuid::new_v4());
        let payload = encode_measurement(CompactFlags::empty(), 999, None, None, 1.0);
        let decoder = CompactDecoder::new(false);
        let measurements = decoder.decode(&payload, &cache, [0, 0]).unwrap();
        assert!(measurements.is_empty());
    }

    #[test]
    fn state_flags_round_trip_through_decode() {
        let (cache, _) = cache_with_one_signal();
        let payload = encode_measurement(
            CompactFlags::STATE_INCLUDED,
            0,
            None,
            Some(StateFlags::ALARM_HIGH.bits()),
            9.0,
        );
        let decoder = CompactDecoder::new(false);
        let measurements = decoder.decode(&payload, &cache, [0, 0]).unwrap();
        assert!(measurements[0].flags.contains(StateFlags::ALARM_HIGH));
    }
}
