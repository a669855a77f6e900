// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Transport layer (§4.5): the mandatory TCP command channel and an optional
UDP data channel.
*/

mod tcp;
#[cfg(feature = "tls")]
mod tls;
mod udp;

pub use tcp::{parse_frame, TcpChannel};
#[cfg(feature = "tls")]
pub use tls::TlsChannel;
pub use udp::UdpChannel;
