// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
`Config`: the plain-value-holder external collaborator spec.md §1 names as
out of scope for protocol logic. It only carries the knobs enumerated in
§6's "Configuration inputs" list; no connection or session state lives here.
*/

/// Subscriber-wide configuration. Defaults match §6.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Protocol version to negotiate via `DefineOperationalModes`.
    pub version: u8,
    /// Requests the publisher compress measurement payload data.
    pub compress_payload_data: bool,
    /// Requests the publisher compress metadata.
    pub compress_metadata: bool,
    /// Requests the publisher compress the signal index cache.
    pub compress_signal_index_cache: bool,
    /// Publisher-side metadata filter string, forwarded opaquely.
    pub metadata_filters: String,
    /// Maximum reconnect attempts; negative means infinite (§4.6, §8).
    pub max_retries: i32,
    /// Base reconnect delay, in seconds.
    pub retry_interval: f64,
    /// Reconnect delay ceiling, in seconds.
    pub max_retry_interval: f64,
    /// Whether to automatically reconnect after a transport error.
    pub auto_reconnect: bool,
    /// Whether to automatically request metadata after connecting.
    pub auto_request_metadata: bool,
    /// Whether to automatically re-subscribe after a reconnect.
    pub auto_subscribe: bool,
    /// Maximum buffered command-frame size before a malformed length is
    /// treated as a fatal protocol error (§4.5), in bytes.
    pub max_frame_size: usize,
    /// Wraps the TCP command channel in TLS (requires the `tls` feature).
    /// Ignored, with a warning, when the feature is not compiled in.
    pub use_tls: bool,
    /// How often the command reader polls its socket for cancellation
    /// between blocking reads (§4.6, §5).
    pub read_poll_interval: std::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: crate::commands::OperationalModeWord::CURRENT_VERSION,
            compress_payload_data: true,
            compress_metadata: true,
            compress_signal_index_cache: true,
            metadata_filters: String::new(),
            max_retries: -1,
            retry_interval: 1.0,
            max_retry_interval: 30.0,
            auto_reconnect: true,
            auto_request_metadata: true,
            auto_subscribe: true,
            max_frame_size: 100 * 1024 * 1024,
            use_tls: false,
            read_poll_interval: std::time::Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let config = Config::default();
        assert_eq!(config.version, 2);
        assert!(config.compress_payload_data);
        assert!(config.compress_metadata);
        assert!(config.compress_signal_index_cache);
        assert_eq!(config.max_retries, -1);
        assert_eq!(config.retry_interval, 1.0);
        assert_eq!(config.max_retry_interval, 30.0);
        assert!(config.auto_reconnect);
        assert!(config.auto_request_metadata);
        assert!(config.auto_subscribe);
        assert_eq!(config.max_frame_size, 100 * 1024 * 1024);
    }
}
