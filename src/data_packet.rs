// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
The data-packet envelope carried inside every `DataPacket` (0x82) response:
a one-byte flag field, a big-endian length, and a compact or TSSC payload.
*/

use bitflags::bitflags;

use crate::errors::{Result, SttpError};
use crate::frame::{read_u32, validate_parameters};

bitflags! {
    /// Bits of the data-packet flag byte (§6).
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct DataPacketFlags: u8 {
        /// Legacy marker, always set on compact (uncompressed) packets.
        const COMPACT      = 0x02;
        /// Selects which of the two cipher key/IV slots decrypts the payload.
        const CIPHER_INDEX = 0x04;
        /// Payload is TSSC-compressed rather than compact.
        const COMPRESSED   = 0x08;
        /// Selects which of the two signal index caches resolves indices.
        const CACHE_INDEX  = 0x10;
    }
}

/// A parsed data-packet envelope: the flag byte plus a borrowed view of the
/// compact-or-TSSC payload that follows it.
#[derive(Debug)]
pub struct DataPacket<'a> {
    /// Flags describing how `payload` should be interpreted.
    pub flags: DataPacketFlags,
    /// Raw compact or TSSC bytes, exactly `payload_length` long.
    pub payload: &'a [u8],
}

impl<'a> DataPacket<'a> {
    /// Parses the envelope out of `buffer`. A buffer shorter than 5 bytes
    /// (the minimum flag + length header) is a protocol error (§8).
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < 5 {
            return Err(SttpError::MalformedFrame(format!(
                "data packet of {} bytes is shorter than the 5-byte envelope header",
                buffer.len()
            )));
        }
        let flags = DataPacketFlags::from_bits_retain(buffer[0]);
        let payload_length = read_u32(buffer, 1)? as usize;
        validate_parameters(buffer, 5, payload_length)?;
        Ok(Self {
            flags,
            payload: &buffer[5..5 + payload_length],
        })
    }

    /// `true` when the payload should be decoded with the TSSC decoder
    /// rather than the compact-format decoder.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(DataPacketFlags::COMPRESSED)
    }

    /// Index (0 or 1) of the signal index cache slot that resolves this
    /// packet's signal indices.
    pub fn cache_index(&self) -> usize {
        usize::from(self.flags.contains(DataPacketFlags::CACHE_INDEX))
    }

    /// Index (0 or 1) of the cipher key/IV slot that decrypts this packet,
    /// relevant only for encrypted UDP payloads.
    pub fn cipher_index(&self) -> usize {
        usize::from(self.flags.contains(DataPacketFlags::CIPHER_INDEX))
    }
}
