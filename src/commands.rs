// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Command/response byte codes, the `OperationalModes` bit field, and the
command/response frame (en/de)coders (§4.4, §6).
*/

use bitflags::bitflags;

use crate::errors::{Result, SttpError};
use crate::frame::{read_u32, validate_parameters, write_u32};

/// Byte codes a subscriber sends on the TCP command channel (§6).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum ServerCommand {
    /// Never sent on the wire; represents the not-yet-connected state.
    Connect = 0x00,
    /// Requests a metadata refresh from the publisher.
    MetaDataRefresh = 0x01,
    /// Places or replaces a measurement subscription.
    Subscribe = 0x02,
    /// Cancels the current subscription.
    Unsubscribe = 0x03,
    /// Requests the publisher rotate UDP cipher keys.
    RotateCipherKeys = 0x04,
    /// Adjusts the publisher-side processing interval.
    UpdateProcessingInterval = 0x05,
    /// Negotiates operational modes; must be the first command sent.
    DefineOperationalModes = 0x06,
    /// Acknowledges a `Notify` response, echoing its payload.
    ConfirmNotification = 0x07,
    /// Acknowledges a `BufferBlock` response by sequence number.
    ConfirmBufferBlock = 0x08,
    /// Acknowledges an `UpdateBaseTimes` response.
    ConfirmUpdateBaseTimes = 0x09,
    /// Acknowledges an `UpdateSignalIndexCache` response.
    ConfirmSignalIndexCache = 0x0A,
    /// Requests the primary metadata schema.
    GetPrimaryMetadataSchema = 0x0B,
    /// Requests the signal selection schema.
    GetSignalSelectionSchema = 0x0C,
}

impl ServerCommand {
    /// The byte this command is encoded as on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Byte codes a publisher sends in a response frame (§6).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ServerResponse {
    /// The referenced command completed successfully.
    Succeeded,
    /// The referenced command failed; payload carries the reason string.
    Failed,
    /// A data packet envelope follows in the payload (§4.3).
    DataPacket,
    /// A new signal index cache for the inactive slot follows.
    UpdateSignalIndexCache,
    /// A new base-time pair follows.
    UpdateBaseTimes,
    /// New UDP cipher key/IV pairs follow.
    UpdateCipherKeys,
    /// The publisher's data start time, in ticks.
    DataStartTime,
    /// A historical/temporal query has finished processing.
    ProcessingComplete,
    /// An opaque sequenced binary blob follows.
    BufferBlock,
    /// An application-level notification string follows.
    Notify,
    /// The publisher's configuration changed; no payload.
    ConfigurationChanged,
    /// One of 16 user-defined response codes (0xE0..=0xEF).
    UserResponse(u8),
    /// Silent keep-alive; no reply expected.
    NoOp,
}

impl ServerResponse {
    /// Decodes a wire byte into a response code, or
    /// [`SttpError::UnrecognizedCode`] for anything not in §6's table.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0x80 => Self::Succeeded,
            0x81 => Self::Failed,
            0x82 => Self::DataPacket,
            0x83 => Self::UpdateSignalIndexCache,
            0x84 => Self::UpdateBaseTimes,
            0x85 => Self::UpdateCipherKeys,
            0x86 => Self::DataStartTime,
            0x87 => Self::ProcessingComplete,
            0x88 => Self::BufferBlock,
            0x89 => Self::Notify,
            0x8A => Self::ConfigurationChanged,
            0xE0..=0xEF => Self::UserResponse(code),
            0xFF => Self::NoOp,
            other => return Err(SttpError::UnrecognizedCode(other)),
        })
    }
}

bitflags! {
    /// Bits packed into the single `uint32` payload of `DefineOperationalModes`
    /// (§4.4). The low byte is the protocol version, not a flag bit, so it is
    /// masked in/out separately by [`OperationalModes::with_version`]/
    /// [`OperationalModes::version`].
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct OperationalModes: u32 {
        /// Legacy GZip metadata/cache compression.
        const COMPRESS_GZIP            = 0x0000_0020;
        /// TSSC payload compression. Only valid together with
        /// `COMPRESS_PAYLOAD_DATA` and only over the TCP command channel —
        /// never on UDP, which TSSC's statefulness cannot survive.
        const COMPRESS_TSSC            = 0x0000_0040;
        /// Receive externally-defined metadata (vendor extensions).
        const RECEIVE_EXTERNAL_METADATA = 0x0200_0000;
        /// Receive internally-defined metadata.
        const RECEIVE_INTERNAL_METADATA = 0x0400_0000;
        /// Compress measurement payload data.
        const COMPRESS_PAYLOAD_DATA    = 0x2000_0000;
        /// Compress the signal index cache.
        const COMPRESS_SIGNAL_INDEX_CACHE = 0x4000_0000;
        /// Compress metadata.
        const COMPRESS_METADATA        = 0x8000_0000;
    }
}

/// Encoding bits packed into bits 8-9 of the operational-modes word. UTF-8
/// (`0x200`) is the only value this crate supports (§4.4); anything else
/// fails negotiation with [`SttpError::UnsupportedEncoding`].
pub const ENCODING_UTF8: u32 = 0x0000_0200;
const ENCODING_MASK: u32 = 0x0000_0300;
/// Protocol version occupies the low 5 bits of the low byte; bits 5-6 of
/// that same byte are the legacy GZip/TSSC compression flags (§4.4), not
/// part of the version number.
const VERSION_MASK: u32 = 0x0000_001F;

/// Builds and reads the single `uint32` `DefineOperationalModes` payload.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct OperationalModeWord {
    /// Protocol version, packed into the low byte. Currently `2`.
    pub version: u8,
    /// Feature/compression bits.
    pub modes: OperationalModes,
}

impl OperationalModeWord {
    /// The protocol version this crate negotiates.
    pub const CURRENT_VERSION: u8 = 2;

    /// Packs `version` and `modes` into the wire `uint32`. TSSC is only
    /// asserted when `use_tcp_tssc` is true, enforcing the TCP-only,
    /// payload-compression-required rule in §4.4.
    pub fn pack(version: u8, mut modes: OperationalModes, use_tcp_tssc: bool) -> u32 {
        if !(use_tcp_tssc && modes.contains(OperationalModes::COMPRESS_PAYLOAD_DATA)) {
            modes.remove(OperationalModes::COMPRESS_TSSC);
        }
        (modes.bits() & !VERSION_MASK) | (version as u32) | ENCODING_UTF8
    }

    /// Unpacks a wire `uint32` into a mode word, rejecting any encoding
    /// other than UTF-8 (§4.4, §7).
    pub fn unpack(word: u32) -> Result<Self> {
        if word & ENCODING_MASK != ENCODING_UTF8 {
            return Err(SttpError::UnsupportedEncoding);
        }
        Ok(Self {
            version: (word & VERSION_MASK) as u8,
            modes: OperationalModes::from_bits_retain(word & !VERSION_MASK & !ENCODING_MASK),
        })
    }
}

/// Serializes a command frame: `uint8 code | uint32 length | payload` (§4.5).
pub fn encode_command(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.push(code);
    write_u32(&mut buf, payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

/// A parsed response frame: `uint8 code | uint8 originalCommand | uint32
/// length | payload` (§6).
#[derive(Debug)]
pub struct ResponseFrame<'a> {
    /// The response code, decoded per [`ServerResponse::from_code`].
    pub code: ServerResponse,
    /// The command byte this response answers.
    pub original_command: u8,
    /// Borrowed view of the payload, exactly `length` bytes long.
    pub payload: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    /// Parses one complete response frame out of `buffer`. Callers are
    /// responsible for having already accumulated a complete frame (§4.5);
    /// this function does not read across a short buffer.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < 6 {
            return Err(SttpError::MalformedFrame(format!(
                "response frame of {} bytes is shorter than the 6-byte header",
                buffer.len()
            )));
        }
        let code = ServerResponse::from_code(buffer[0])?;
        let original_command = buffer[1];
        let length = read_u32(buffer, 2)? as usize;
        validate_parameters(buffer, 6, length)?;
        Ok(Self {
            code,
            original_command,
            payload: &buffer[6..6 + length],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_command_frame_header() {
        let frame = encode_command(ServerCommand::Subscribe.code(), b"abc");
        assert_eq!(frame[0], 0x02);
        assert_eq!(&frame[1..5], &3u32.to_be_bytes());
        assert_eq!(&frame[5..], b"abc");
    }

    #[test]
    fn parses_response_frame() {
        let mut buf = vec![0x80, 0x02];
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"xyz");
        let frame = ResponseFrame::parse(&buf).unwrap();
        assert_eq!(frame.code, ServerResponse::Succeeded);
        assert_eq!(frame.original_command, 0x02);
        assert_eq!(frame.payload, b"xyz");
    }

    #[test]
    fn unrecognized_response_code_is_an_error() {
        assert!(matches!(ServerResponse::from_code(0x42), Err(SttpError::UnrecognizedCode(0x42))));
    }

    #[test]
    fn user_response_range_is_accepted() {
        assert!(matches!(ServerResponse::from_code(0xE5), Ok(ServerResponse::UserResponse(0xE5))));
    }

    #[test]
    fn pack_strips_tssc_off_udp_or_without_payload_compression() {
        let modes = OperationalModes::COMPRESS_TSSC | OperationalModes::COMPRESS_PAYLOAD_DATA;
        let udp = OperationalModeWord::pack(2, modes, false);
        let unpacked = OperationalModeWord::unpack(udp).unwrap();
        assert!(!unpacked.modes.contains(OperationalModes::COMPRESS_TSSC));

        let tcp = OperationalModeWord::pack(2, modes, true);
        let unpacked = OperationalModeWord::unpack(tcp).unwrap();
        assert!(unpacked.modes.contains(OperationalModes::COMPRESS_TSSC));
    }

    #[test]
    fn unpack_rejects_non_utf8_encoding() {
        let word = 0x0000_0002u32; // encoding bits zeroed out
        assert!(matches!(OperationalModeWord::unpack(word), Err(SttpError::UnsupportedEncoding)));
    }

    #[test]
    fn round_trips_version_byte() {
        let word = OperationalModeWord::pack(2, OperationalModes::empty(), false);
        let unpacked = OperationalModeWord::unpack(word).unwrap();
        assert_eq!(unpacked.version, 2);
    }
}
