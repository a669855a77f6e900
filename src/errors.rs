// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Error types/enumerations for the `sttp` crate.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Generic `sttp` crate error enumeration, grouped to mirror the error
/// taxonomy of the subscriber protocol: protocol framing faults, transport
/// faults, and configuration faults.
#[derive(Error, Debug)]
pub enum SttpError {
    /// A read would run past the end of the supplied buffer.
    #[error("buffer bounds exceeded: offset {offset} + length {length} > buffer size {size}")]
    Bounds {
        /// Offset the read started at.
        offset: usize,
        /// Number of bytes the read required.
        length: usize,
        /// Total size of the buffer.
        size: usize,
    },
    /// A data packet or response frame was shorter than its minimum valid size.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// An unrecognized response or command byte code was encountered.
    #[error("unrecognized code: {0:#04x}")]
    UnrecognizedCode(u8),
    /// A signal index referenced by a data packet is not present in the
    /// active signal index cache.
    #[error("signal index {0} not present in active cache")]
    UnknownSignalIndex(u16),
    /// The framed payload declared a length beyond the configured maximum.
    #[error("payload length {declared} exceeds maximum frame size {max}")]
    FrameTooLarge {
        /// Length declared by the frame header.
        declared: usize,
        /// Configured maximum frame size.
        max: usize,
    },
    /// A socket read or write failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The command channel or data channel is not connected.
    #[error("not connected")]
    NotConnected,
    /// A host/port or UDP interface string could not be parsed.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A requested character encoding other than UTF-8 was configured.
    #[error("unsupported encoding; only UTF-8 is supported")]
    UnsupportedEncoding,
    /// TLS handshake or configuration failure.
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
    /// A GUID field could not be parsed.
    #[error("invalid GUID bytes")]
    InvalidGuid,
    /// The publisher replied `Failed` to a command this crate sent.
    #[error("publisher rejected the request: {0}")]
    Rejected(String),
    /// No response arrived for a pending command within the allotted time.
    #[error("timed out waiting for a response: {0}")]
    Timeout(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SttpError>;

/// Rate limits a recurring warning to at most once per `period_secs`,
/// matching the "at most once per second" boundary behavior for dropped
/// out-of-sequence/out-of-bounds protocol conditions.
#[derive(Debug)]
pub struct RateLimiter {
    period_secs: u64,
    last_fired: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter that allows one firing per `period_secs` seconds.
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs,
            last_fired: AtomicU64::new(0),
        }
    }

    /// Returns `true` if the caller should emit the warning now, recording
    /// the firing time so subsequent calls within the period return `false`.
    pub fn allow(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let last = self.last_fired.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= self.period_secs {
            self.last_fired.store(now, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(1)
    }
}
