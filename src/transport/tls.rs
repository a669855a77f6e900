// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Optional TLS wrapper for the command channel (§4.5, §11). Kept as a
separate type from [`crate::transport::TcpChannel`] rather than making that
type generic over the stream: the framing logic is identical, only the
underlying `Read + Write` differs, and duplicating the thin wrapper keeps
the plaintext path free of a generic parameter and the `tls` feature gate.
*/

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};

use crate::commands::{encode_command, ResponseFrame};
use crate::errors::{Result, SttpError};
use crate::frame::read_u32;

fn handshake(
    result: std::result::Result<TlsStream<TcpStream>, native_tls::HandshakeError<TcpStream>>,
) -> Result<TlsStream<TcpStream>> {
    result.map_err(|e| match e {
        native_tls::HandshakeError::Failure(err) => SttpError::Tls(err),
        native_tls::HandshakeError::WouldBlock(_) => {
            SttpError::Configuration("TLS handshake did not complete on a blocking socket".into())
        }
    })
}

/// TLS-wrapped TCP command channel. Certificate trust policy is the
/// `ICertificateChecker` collaborator spec.md §1 places out of scope; this
/// type accepts a pre-built [`TlsConnector`] so callers supply their own
/// trust configuration rather than this crate inventing one.
///
/// A TLS record stream is one stateful handshake, unlike a plaintext TCP
/// socket's two independent directions: there is exactly one `TlsStream`
/// here, behind one mutex, rather than the reader/writer split
/// [`crate::transport::TcpChannel`] uses over a cloned raw socket — cloning
/// the underlying `TcpStream` and handshaking it a second time would open a
/// second, unsynchronized TLS session on top of the same bytes.
pub struct TlsChannel {
    stream: Mutex<TlsStream<TcpStream>>,
    max_frame_size: usize,
}

impl TlsChannel {
    /// Connects to `addr`, performs the TLS handshake for `domain` using
    /// `connector`, and enables `TCP_NODELAY` plus a read timeout so the
    /// reader thread can observe cancellation between reads (§4.6).
    pub fn connect(
        connector: &TlsConnector,
        domain: &str,
        addr: impl ToSocketAddrs,
        read_timeout: Option<Duration>,
        max_frame_size: usize,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        let tls = handshake(connector.connect(domain, stream))?;
        Ok(Self {
            stream: Mutex::new(tls),
            max_frame_size,
        })
    }

    /// Writes `uint8 code | uint32 length | payload` under the send mutex
    /// (§4.5).
    pub fn send_command(&self, code: u8, payload: &[u8]) -> Result<()> {
        self.send_raw(&encode_command(code, payload))
    }

    /// Writes an already-framed command under the send mutex.
    pub fn send_raw(&self, frame: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock().unwrap();
        stream.write_all(frame)?;
        stream.flush()?;
        Ok(())
    }

    /// Blocks until one complete response frame has been read, then parses
    /// and returns it (§4.5).
    pub fn read_frame(&self) -> Result<Vec<u8>> {
        let mut stream = self.stream.lock().unwrap();
        let mut header = [0u8; 6];
        stream.read_exact(&mut header)?;
        let length = read_u32(&header, 2)? as usize;
        if length > self.max_frame_size {
            return Err(SttpError::FrameTooLarge {
                declared: length,
                max: self.max_frame_size,
            });
        }
        let mut buf = Vec::with_capacity(6 + length);
        buf.extend_from_slice(&header);
        buf.resize(6 + length, 0);
        stream.read_exact(&mut buf[6..])?;
        Ok(buf)
    }

    /// Shuts down the underlying TCP socket, forcing any in-progress read
    /// to return an error so the reader thread can exit (§5).
    pub fn shutdown(&self) -> Result<()> {
        self.stream.lock().unwrap().get_ref().shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

/// Parses the next complete response frame out of `raw` (§8).
pub fn parse_frame(raw: &[u8]) -> Result<ResponseFrame<'_>> {
    ResponseFrame::parse(raw)
}
