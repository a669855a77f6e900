// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
TCP command channel (§4.5): one socket with `TCP_NODELAY`, a send path
serialized under a mutex, and a blocking frame reader that accumulates
bytes until a complete response frame is available.
*/

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use crate::commands::{encode_command, ResponseFrame};
use crate::errors::{Result, SttpError};
use crate::frame::read_u32;

/// Owns the TCP socket used for commands and responses. Reads and writes
/// are split across independent synchronization so a blocked write never
/// waits on the reader, and vice versa (§5).
pub struct TcpChannel {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    max_frame_size: usize,
}

impl TcpChannel {
    /// Connects to `addr`, enabling `TCP_NODELAY` and a read timeout so the
    /// reader thread can observe cancellation between reads (§4.6).
    pub fn connect(addr: impl ToSocketAddrs, read_timeout: Option<Duration>, max_frame_size: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: Mutex::new(stream),
            writer: Mutex::new(writer),
            max_frame_size,
        })
    }

    /// Wraps an already-connected stream (used by tests and by the TLS
    /// feature's handshake wrapper).
    pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: Mutex::new(stream),
            writer: Mutex::new(writer),
            max_frame_size,
        })
    }

    /// Writes `uint8 code | uint32 length | payload` under the send mutex
    /// (§4.5).
    pub fn send_command(&self, code: u8, payload: &[u8]) -> Result<()> {
        self.send_raw(&encode_command(code, payload))
    }

    /// Writes an already-framed command (e.g. one built by
    /// [`crate::session::Session::build_subscribe`]) under the send mutex.
    pub fn send_raw(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Blocks until one complete response frame has been read, then parses
    /// and returns it. A declared length beyond `max_frame_size` is a fatal
    /// protocol error (§4.5).
    pub fn read_frame(&self) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock().unwrap();
        let mut header = [0u8; 6];
        reader.read_exact(&mut header)?;
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
        reader.read_exact(&mut buf[6..])?;
        Ok(buf)
    }

    /// Shuts down both halves of the socket, forcing any in-progress read
    /// (blocking or timed-out) to return an error so the reader thread can
    /// exit (§5).
    pub fn shutdown(&self) -> Result<()> {
        self.reader.lock().unwrap().shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

/// Parses the next complete response frame out of `raw`, returning the
/// parsed view. Kept separate from `TcpChannel::read_frame` so the state
/// machine can be unit-tested against synthetic byte streams without a real
/// socket (§8).
pub fn parse_frame(raw: &[u8]) -> Result<ResponseFrame<'_>> {
    ResponseFrame::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn send_command_writes_framed_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8];
            socket.read_exact(&mut buf).unwrap();
            buf
        });

        let channel = TcpChannel::connect(addr, None, 1024).unwrap();
        channel.send_command(0x06, b"abc").unwrap();

        let received = handle.join().unwrap();
        assert_eq!(received[0], 0x06);
        assert_eq!(&received[1..5], &3u32.to_be_bytes());
        assert_eq!(&received[5..8], b"abc");
    }

    #[test]
    fn read_frame_accumulates_a_complete_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(&[0x80, 0x02]).unwrap();
            socket.write_all(&3u32.to_be_bytes()).unwrap();
            socket.write_all(b"xyz").unwrap();
        });

        let channel = TcpChannel::connect(addr, None, 1024).unwrap();
        let raw = channel.read_frame().unwrap();
        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.original_command, 0x02);
        assert_eq!(frame.payload, b"xyz");
        handle.join().unwrap();
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(&[0x80, 0x02]).unwrap();
            socket.write_all(&1_000_000u32.to_be_bytes()).unwrap();
        });

        let channel = TcpChannel::connect(addr, None, 10).unwrap();
        assert!(matches!(channel.read_frame(), Err(SttpError::FrameTooLarge { .. })));
        handle.join().unwrap();
    }
}
