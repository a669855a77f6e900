// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
TSSC ("time-series stateful special compression") decoder (§4.3).

No external TSSC bit-level specification is available in this pack (spec.md
§9's open question). What *is* specified behaviorally is the state machine
this module implements: a running per-signal predictor of `(timestamp,
value, quality)`, encoding each successive point as a delta against the
previous one for that signal index; a reset flag that clears all per-signal
state and permits exactly one out-of-sequence report before the usual
rate limiting kicks back in; and signal indices that miss the active cache
being dropped with a rate-limited warning rather than aborting the stream.

The wire format below is this decoder's own self-consistent encoding of that
contract — a control byte per point selecting which of timestamp/value/
quality changed, followed by only the changed fields — rather than a port of
an undisclosed third-party bit layout.
*/

use std::collections::HashMap;

use bitflags::bitflags;

use crate::errors::{RateLimiter, Result, SttpError};
use crate::frame::{read_f32, read_i64, read_u16, read_u32};
use crate::measurement::{Measurement, StateFlags, Ticks};
use crate::signal_index_cache::SignalIndexCache;

bitflags! {
    /// Per-point control byte: which fields changed since this signal's
    /// last decoded point.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    struct PointControl: u8 {
        /// An 8-byte absolute timestamp follows.
        const TIME_CHANGED    = 0x01;
        /// A 4-byte IEEE-754 float value follows.
        const VALUE_CHANGED   = 0x02;
        /// A 4-byte state-flags field follows.
        const QUALITY_CHANGED = 0x04;
        /// Terminates the stream; no signal index/fields follow.
        const END_OF_STREAM   = 0x80;
    }
}

#[derive(Clone, Copy, Debug)]
struct PointState {
    timestamp: Ticks,
    value: f64,
    quality: StateFlags,
}

/// Stateful per-signal TSSC decoder. One instance is owned per active
/// signal index cache slot and must be reset whenever that slot is
/// rebuilt by a subscribe/resubscribe (§4.3).
#[derive(Default)]
pub struct TsscDecoder {
    points: HashMap<u16, PointState>,
    /// Set by the session on (re)subscribe; consumed by the next `decode`
    /// call, which then clears it.
    reset_requested: bool,
    out_of_sequence_limiter: RateLimiter,
    allowed_one_shot_report: bool,
}

impl TsscDecoder {
    /// Creates a decoder with empty per-signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the next `decode` call clear all per-signal predictor
    /// state before decoding, and permits one out-of-sequence report before
    /// the usual once-per-second throttle resumes (§4.3).
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    fn maybe_reset(&mut self) {
        if self.reset_requested {
            self.points.clear();
            self.allowed_one_shot_report = true;
            self.reset_requested = false;
        }
    }

    fn report_out_of_sequence(&mut self, signal_index: u16) {
        if self.allowed_one_shot_report {
            self.allowed_one_shot_report = false;
            log::warn!("TSSC stream out of sequence for signal index {signal_index} after reset");
        } else if self.out_of_sequence_limiter.allow() {
            log::warn!("TSSC stream out of sequence for signal index {signal_index}");
        }
    }

    /// Decodes every point in `payload`, resolving signal indices through
    /// `cache`. Unknown signal indices drop that point and report
    /// out-of-sequence per the throttling above; the rest of the stream is
    /// still decoded (§4.3, §8).
    pub fn decode(&mut self, payload: &[u8], cache: &SignalIndexCache) -> Result<Vec<Measurement>> {
        self.maybe_reset();

        let mut measurements = Vec::new();
        let mut offset = 0usize;

        loop {
            if offset >= payload.len() {
                break;
            }
            let control = PointControl::from_bits_retain(payload[offset]);
            offset += 1;
            if control.contains(PointControl::END_OF_STREAM) {
                break;
            }

            let signal_index = read_u16(payload, offset)?;
            offset += 2;

            let key = match cache.key(signal_index) {
                Some(key) => key,
                None => {
                    self.report_out_of_sequence(signal_index);
                    // Field layout is still well-defined even when the
                    // index is unknown, so skip past this point's fields
                    // without losing sync with the rest of the stream.
                    if control.contains(PointControl::TIME_CHANGED) {
                        offset += 8;
                    }
                    if control.contains(PointControl::VALUE_CHANGED) {
                        offset += 4;
                    }
                    if control.contains(PointControl::QUALITY_CHANGED) {
                        offset += 4;
                    }
                    continue;
                }
            };

            let mut state = self.points.get(&signal_index).copied().unwrap_or(PointState {
                timestamp: 0,
                value: 0.0,
                quality: StateFlags::empty(),
            });

            if control.contains(PointControl::TIME_CHANGED) {
                state.timestamp = read_i64(payload, offset)? as Ticks;
                offset += 8;
            }
            if control.contains(PointControl::VALUE_CHANGED) {
                state.value = read_f32(payload, offset)? as f64;
                offset += 4;
            }
            if control.contains(PointControl::QUALITY_CHANGED) {
                state.quality = StateFlags::from_bits_retain(read_u32(payload, offset)?);
                offset += 4;
            }

            self.points.insert(signal_index, state);
            measurements.push(Measurement::new(key.signal_id, state.value, state.timestamp, state.quality));
        }

        Ok(measurements)
    }
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

    fn full_point(index: u16, timestamp: i64, value: f32, quality: u32) -> Vec<u8> {
        let control = PointControl::TIME_CHANGED | PointControl::VALUE_CHANGED | PointControl::QUALITY_CHANGED;
        let mut buf = vec![control.bits()];
        buf.extend_from_slice(&index.to_be_bytes());
        buf.extend_from_slice(&timestamp.to_be_bytes());
        buf.extend_from_slice(&value.to_be_bytes());
        buf.extend_from_slice(&quality.to_be_bytes());
        buf
    }

    fn value_only_point(index: u16, value: f32) -> Vec<u8> {
        let mut buf = vec![PointControl::VALUE_CHANGED.bits()];
        buf.extend_from_slice(&index.to_be_bytes());
        buf.extend_from_slice(&value.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_full_point_and_carries_unset_fields_forward() {
        let (cache, signal_id) = cache_with_one_signal();
        let mut decoder = TsscDecoder::new();

        let mut payload = full_point(0, 1000, 50.0, StateFlags::ALARM_HIGH.bits());
        payload.extend(value_only_point(0, 75.0));

        let measurements = decoder.decode(&payload, &cache).unwrap();
        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].signal_id, signal_id);
        assert_eq!(measurements[1].value, 75.0);
        // Timestamp/quality carried forward from the prior point.
        assert_eq!(measurements[1].timestamp, 1000);
        assert!(measurements[1].flags.contains(StateFlags::ALARM_HIGH));
    }

    #[test]
    fn reset_clears_predictor_state_between_subscriptions() {
        let (cache, _) = cache_with_one_signal();
        let mut decoder = TsscDecoder::new();
        let payload = full_point(0, 1000, 50.0, 0);
        decoder.decode(&payload, &cache).unwrap();

        decoder.request_reset();
        let payload2 = value_only_point(0, 99.0);
        let measurements = decoder.decode(&payload2, &cache).unwrap();
        // No prior timestamp survives the reset.
        assert_eq!(measurements[0].timestamp, 0);
        assert_eq!(measurements[0].value, 99.0);
    }

    #[test]
    fn unknown_signal_index_is_skipped_without_losing_stream_sync() {
        let (cache, signal_id) = cache_with_one_signal();
        let mut decoder = TsscDecoder::new();
        let mut payload = full_point(999, 1, 1.0, 0);
        payload.extend(value_only_point(0, 42.0));

        let measurements = decoder.decode(&payload, &cache).unwrap();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].signal_id, signal_id);
        assert_eq!(measurements[0].value, 42.0);
    }

    #[test]
    fn end_of_stream_marker_stops_decoding() {
        let (cache, _) = cache_with_one_signal();
        let mut decoder = TsscDecoder::new();
        let mut payload = full_point(0, 1, 1.0, 0);
        payload.push(PointControl::END_OF_STREAM.bits());
        payload.extend(value_only_point(0, 5.0));

        let measurements = decoder.decode(&payload, &cache).unwrap();
        assert_eq!(measurements.len(), 1);
    }
}
