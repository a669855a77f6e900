// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Optional UDP data channel (§4.5): one datagram is one complete data packet,
with no reassembly across datagrams. An empty requested interface resolves
to `INADDR_ANY` (§4.5).
*/

use std::net::UdpSocket;
use std::time::Duration;

use crate::errors::Result;

/// Maximum UDP datagram payload this crate will read in one call.
const MAX_DATAGRAM: usize = 65_507;

/// Owns the UDP socket used for the data channel.
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// Binds a UDP socket on `local_port` at `interface` (empty meaning
    /// `INADDR_ANY`), with a read timeout so the reader thread observes
    /// cancellation between reads.
    pub fn bind(interface: &str, local_port: u16, read_timeout: Option<Duration>) -> Result<Self> {
        let host = if interface.is_empty() { "0.0.0.0" } else { interface };
        let socket = UdpSocket::bind((host, local_port))?;
        socket.set_read_timeout(read_timeout)?;
        Ok(Self { socket })
    }

    /// Reads one complete datagram. Returns the number of bytes placed into
    /// `buf`; a datagram larger than `buf` is truncated by the OS socket
    /// layer, not by this function.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let (n, _src) = self.socket.recv_from(buf)?;
        Ok(n)
    }

    /// A buffer sized to hold the largest UDP datagram this channel will
    /// ever deliver.
    pub fn new_buffer() -> Vec<u8> {
        vec![0u8; MAX_DATAGRAM]
    }
}
