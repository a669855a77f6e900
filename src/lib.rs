// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(unstable_features, unused_import_braces, unreachable_pub)]
#![warn(rustdoc::unescaped_backticks)]
#![forbid(unsafe_code)]

mod callbacks;
mod commands;
mod config;
mod connector;
mod data_packet;
mod decoder;
mod errors;
mod frame;
mod measurement;
mod measurement_key;
mod reorder;
mod session;
mod signal_index_cache;
mod subscriber;
mod subscription;
mod transport;
mod tssc;

pub use crate::callbacks::{Callbacks, CallbacksBuilder};
pub use crate::commands::{
    encode_command, OperationalModeWord, OperationalModes, ResponseFrame, ServerCommand, ServerResponse,
};
pub use crate::config::Config;
pub use crate::connector::Connector;
pub use crate::data_packet::{DataPacket, DataPacketFlags};
pub use crate::decoder::CompactDecoder;
pub use crate::errors::{Result, SttpError};
pub use crate::measurement::{Measurement, StateFlags, Ticks};
pub use crate::measurement_key::{KeyRegistry, MeasurementKey};
pub use crate::reorder::ReorderBuffer;
pub use crate::session::{CipherKeySet, Session};
pub use crate::signal_index_cache::{SignalIndexCache, UNMAPPED_INDEX};
pub use crate::subscriber::Subscriber;
pub use crate::subscription::{AssemblyInfo, SubscriptionInfo, UdpDataChannel};
pub use crate::transport::{TcpChannel, UdpChannel};
#[cfg(feature = "tls")]
pub use crate::transport::TlsChannel;
pub use crate::tssc::TsscDecoder;

/// Standard imports for the most commonly used structures and traits in the
/// `sttp` crate.
pub mod prelude {
    pub use crate::callbacks::{Callbacks, CallbacksBuilder};
    pub use crate::config::Config;
    pub use crate::errors::{Result, SttpError};
    pub use crate::measurement::{Measurement, StateFlags, Ticks};
    pub use crate::subscriber::Subscriber;
    pub use crate::subscription::SubscriptionInfo;
}
