// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
The decoded measurement value type and its state-flags bit field.
*/

use bitflags::bitflags;
use uuid::Uuid;

/// Ticks are 100-nanosecond units since `0001-01-01T00:00:00Z`, the epoch
/// used throughout STTP timestamps.
pub type Ticks = u64;

bitflags! {
    /// Per-measurement state flags (32 bits). Reserved bits are preserved on
    /// passthrough and never interpreted.
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct StateFlags: u32 {
        /// Measurement value quality is bad.
        const DATA_RANGE              = 0x0000_0001;
        /// Measurement value is outside the expected range.
        const DATA_QUALITY            = 0x0000_0002;
        /// Measurement value failed a quality check at the source.
        const DATA_SUSPECT            = 0x0000_0004;
        /// An alarm condition is active for this value.
        const ALARM_HIGH              = 0x0000_0008;
        /// An alarm condition is active for this value (low).
        const ALARM_LOW               = 0x0000_0010;
        /// The warning-high threshold has been exceeded.
        const WARNING_HIGH            = 0x0000_0020;
        /// The warning-low threshold has been exceeded.
        const WARNING_LOW             = 0x0000_0040;
        /// The value failed a flatline (no-change) detector.
        const FLATLINE_ALARM          = 0x0000_0080;
        /// The value was produced by a comparison alarm.
        const COMPARISON_ALARM        = 0x0000_0100;
        /// The value was produced by a rate-of-change alarm.
        const ROC_ALARM               = 0x0000_0200;
        /// The value failed a received-as-bad receiver check.
        const RECEIVED_AS_BAD         = 0x0000_0400;
        /// The value is a calculated value, not a direct measurement.
        const CALCULATED_VALUE        = 0x0000_0800;
        /// The value failed calculation.
        const CALCULATION_ERROR       = 0x0000_1000;
        /// The value warns of a calculation warning condition.
        const CALCULATION_WARNING     = 0x0000_2000;
        /// The value has been reserved quality flagged.
        const RESERVED_QUALITY_FLAG   = 0x0000_4000;
        /// Timestamp quality is bad.
        const BAD_TIME                = 0x0001_0000;
        /// Timestamp quality is suspect.
        const SUSPECT_TIME            = 0x0002_0000;
        /// Timestamp is from a source that has lost time synchronization.
        const LATE_TIME_ALARM         = 0x0004_0000;
        /// Timestamp indicates a future value relative to this subscriber.
        const FUTURE_TIME_ALARM       = 0x0008_0000;
        /// Timestamp is up-sampled relative to the source rate.
        const UP_SAMPLED              = 0x0010_0000;
        /// Timestamp is down-sampled relative to the source rate.
        const DOWN_SAMPLED            = 0x0020_0000;
        /// Value was discarded during processing (e.g. resampling).
        const DISCARDED_VALUE         = 0x0040_0000;
        /// Value reflects a reserved time flag.
        const RESERVED_TIME_FLAG      = 0x0080_0000;
        /// User-defined flag 1.
        const USER_DEFINED_FLAG1      = 0x1000_0000;
        /// User-defined flag 2.
        const USER_DEFINED_FLAG2      = 0x2000_0000;
        /// User-defined flag 3.
        const USER_DEFINED_FLAG3      = 0x4000_0000;
        /// System error or warning occurred while producing this value.
        const SYSTEM_ERROR            = 0x8000_0000;
    }
}

/// A single decoded, timestamped measurement value. Immutable once decoded.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// Identity of the signal this value belongs to.
    pub signal_id: Uuid,
    /// Decoded floating-point value.
    pub value: f64,
    /// Resolved absolute timestamp, in ticks since `0001-01-01T00:00:00Z`.
    pub timestamp: Ticks,
    /// State flags accompanying the value.
    pub flags: StateFlags,
}

impl Measurement {
    /// Builds a new measurement from its decoded fields.
    pub fn new(signal_id: Uuid, value: f64, timestamp: Ticks, flags: StateFlags) -> Self {
        Self {
            signal_id,
            value,
            timestamp,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_flags_preserve_unknown_bits_on_passthrough() {
        let raw = 0xFFFF_FFFFu32;
        let flags = StateFlags::from_bits_retain(raw);
        assert_eq!(flags.bits(), raw);
    }

    #[test]
    fn measurement_carries_fields_verbatim() {
        let id = Uuid::new_v4();
        let m = Measurement::new(id, 50.0, 1234, StateFlags::DATA_SUSPECT);
        assert_eq!(m.signal_id, id);
        assert_eq!(m.value, 50.0);
        assert_eq!(m.timestamp, 1234);
        assert!(m.flags.contains(StateFlags::DATA_SUSPECT));
    }
}
