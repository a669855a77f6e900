// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
`SubscriptionInfo` (§3) and the semicolon-delimited `key=value` connection
string the `Subscribe` command carries as its payload (§4.4).
*/

use std::fmt::Write as _;

use crate::errors::{Result, SttpError};

/// Assembly (build/version) metadata nested into the connection string as
/// `assemblyInfo=source=…;version=…;updatedOn=…` (§4.4).
#[derive(Clone, Debug)]
pub struct AssemblyInfo {
    /// Name of the subscribing application.
    pub source: String,
    /// Version string of the subscribing application.
    pub version: String,
    /// Build/release date string, in whatever format the application uses.
    pub updated_on: String,
}

impl Default for AssemblyInfo {
    fn default() -> Self {
        Self {
            source: "sttp-rs".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            updated_on: String::new(),
        }
    }
}

/// Requested UDP data-channel parameters, encoded as the nested
/// `dataChannel={localport=N}` parameter when `enabled` is true.
#[derive(Clone, Debug, Default)]
pub struct UdpDataChannel {
    /// Whether a UDP data channel is requested at all.
    pub enabled: bool,
    /// Local UDP port to bind.
    pub local_port: u16,
    /// Local interface to bind to; empty means "same as the TCP local
    /// address" (§4.5).
    pub interface: String,
}

/// Input to `Session::subscribe` (§3). Validated and encoded into the
/// `Subscribe` command's connection string.
#[derive(Clone, Debug)]
pub struct SubscriptionInfo {
    /// Filter expression forwarded opaquely to the publisher (§1).
    pub filter_expression: String,
    /// Requests the publisher throttle the stream to `publish_interval`.
    pub throttled: bool,
    /// Requested publish interval, in seconds, when `throttled` is set.
    pub publish_interval: f64,
    /// Requested UDP data channel.
    pub udp_data_channel: UdpDataChannel,
    /// Whether data packets should include a per-measurement timestamp.
    pub include_time: bool,
    /// Whether timestamp deltas are milliseconds (scaled to ticks) rather
    /// than raw ticks.
    pub use_millisecond_resolution: bool,
    /// Requests the publisher drop NaN-valued measurements.
    pub request_nan_value_filter: bool,
    /// Historical replay start-time constraint string, publisher-defined
    /// format; empty for a live (non-historical) subscription.
    pub start_time_constraint: String,
    /// Historical replay stop-time constraint string.
    pub stop_time_constraint: String,
    /// Free-form time constraint parameters string.
    pub time_constraint_parameters: String,
    /// Requested publisher-side processing interval, in milliseconds;
    /// negative means "use the publisher's default".
    pub processing_interval: i32,
    /// Verbatim-appended extra connection-string parameters.
    pub extra_connection_string_parameters: String,
    /// Build metadata advertised to the publisher.
    pub assembly_info: AssemblyInfo,
}

impl Default for SubscriptionInfo {
    fn default() -> Self {
        Self {
            filter_expression: String::new(),
            throttled: false,
            publish_interval: 1.0,
            udp_data_channel: UdpDataChannel::default(),
            include_time: true,
            use_millisecond_resolution: false,
            request_nan_value_filter: false,
            start_time_constraint: String::new(),
            stop_time_constraint: String::new(),
            time_constraint_parameters: String::new(),
            processing_interval: -1,
            extra_connection_string_parameters: String::new(),
            assembly_info: AssemblyInfo::default(),
        }
    }
}

impl SubscriptionInfo {
    /// Validates the requested UDP interface, if any, and the filter
    /// expression is non-empty when this is not a historical constraint-only
    /// request. Returns [`SttpError::Configuration`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        if self.udp_data_channel.enabled && self.udp_data_channel.local_port == 0 {
            return Err(SttpError::Configuration(
                "UDP data channel requested with local_port 0".into(),
            ));
        }
        if !self.udp_data_channel.interface.is_empty()
            && self.udp_data_channel.interface.parse::<std::net::IpAddr>().is_err()
        {
            return Err(SttpError::Configuration(format!(
                "invalid UDP interface address: {}",
                self.udp_data_channel.interface
            )));
        }
        Ok(())
    }

    /// Builds the `key=value;…` connection string carried as the
    /// `Subscribe` command's payload (§4.4). Keys present unconditionally:
    /// `throttled`, `publishInterval` (six-decimal fixed), `includeTime`,
    /// `processingInterval`, `useMillisecondResolution`,
    /// `requestNaNValueFilter`, `assemblyInfo`. Conditional keys:
    /// `filterExpression`, `dataChannel`, `startTimeConstraint`,
    /// `stopTimeConstraint`, `timeConstraintParameters`. The extra
    /// parameters string, if any, is appended verbatim.
    pub fn to_connection_string(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "throttled={};", self.throttled);
        let _ = write!(out, "publishInterval={:.6};", self.publish_interval);
        let _ = write!(out, "includeTime={};", self.include_time);
        let _ = write!(out, "processingInterval={};", self.processing_interval);
        let _ = write!(
            out,
            "useMillisecondResolution={};",
            self.use_millisecond_resolution
        );
        let _ = write!(
            out,
            "requestNaNValueFilter={};",
            self.request_nan_value_filter
        );
        let _ = write!(
            out,
            "assemblyInfo={{source={};version={};updatedOn={}}};",
            self.assembly_info.source, self.assembly_info.version, self.assembly_info.updated_on
        );

        if !self.filter_expression.is_empty() {
            let _ = write!(out, "filterExpression={{{}}};", self.filter_expression);
        }
        if self.udp_data_channel.enabled {
            let _ = write!(
                out,
                "dataChannel={{localport={}}};",
                self.udp_data_channel.local_port
            );
        }
        if !self.start_time_constraint.is_empty() {
            let _ = write!(out, "startTimeConstraint={};", self.start_time_constraint);
        }
        if !self.stop_time_constraint.is_empty() {
            let _ = write!(out, "stopTimeConstraint={};", self.stop_time_constraint);
        }
        if !self.time_constraint_parameters.is_empty() {
            let _ = write!(
                out,
                "timeConstraintParameters={};",
                self.time_constraint_parameters
            );
        }
        if !self.extra_connection_string_parameters.is_empty() {
            out.push_str(&self.extra_connection_string_parameters);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_carries_mandatory_keys() {
        let info = SubscriptionInfo::default();
        let s = info.to_connection_string();
        for key in [
            "throttled=",
            "publishInterval=",
            "includeTime=",
            "processingInterval=",
            "useMillisecondResolution=",
            "requestNaNValueFilter=",
            "assemblyInfo=",
        ] {
            assert!(s.contains(key), "missing {key} in {s}");
        }
    }

    #[test]
    fn conditional_keys_are_omitted_when_unset() {
        let info = SubscriptionInfo::default();
        let s = info.to_connection_string();
        assert!(!s.contains("filterExpression="));
        assert!(!s.contains("dataChannel="));
        assert!(!s.contains("startTimeConstraint="));
    }

    #[test]
    fn filter_expression_and_data_channel_appear_when_set() {
        let mut info = SubscriptionInfo {
            filter_expression: "FILTER ActiveMeasurements WHERE SignalType='FREQ'".into(),
            ..Default::default()
        };
        info.udp_data_channel.enabled = true;
        info.udp_data_channel.local_port = 9191;
        let s = info.to_connection_string();
        assert!(s.contains("filterExpression={FILTER ActiveMeasurements"));
        assert!(s.contains("dataChannel={localport=9191}"));
    }

    #[test]
    fn extra_parameters_are_appended_verbatim() {
        let info = SubscriptionInfo {
            extra_connection_string_parameters: "customKey=customValue".into(),
            ..Default::default()
        };
        assert!(info.to_connection_string().ends_with("customKey=customValue"));
    }

    #[test]
    fn udp_channel_without_a_port_fails_validation() {
        let mut info = SubscriptionInfo::default();
        info.udp_data_channel.enabled = true;
        assert!(matches!(info.validate(), Err(SttpError::Configuration(_))));
    }

    #[test]
    fn invalid_udp_interface_fails_validation() {
        let mut info = SubscriptionInfo::default();
        info.udp_data_channel.interface = "not-an-ip".into();
        assert!(matches!(info.validate(), Err(SttpError::Configuration(_))));
    }
}
