// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Big-endian primitive (de)serialization shared by every wire structure in this
crate: the command/response frame, the signal index cache, and the compact
measurement format all read and write through these functions.

GUIDs are encoded in RFC-4122 network byte order, not the Microsoft mixed-
endian layout some STTP peers historically used internally.
*/

use uuid::Uuid;

use crate::errors::{Result, SttpError};

/// Fails with [`SttpError::Bounds`] when a read of `length` bytes starting at
/// `offset` would run past the end of `buffer`.
pub fn validate_parameters(buffer: &[u8], offset: usize, length: usize) -> Result<()> {
    if offset.checked_add(length).map(|end| end > buffer.len()).unwrap_or(true) {
        return Err(SttpError::Bounds {
            offset,
            length,
            size: buffer.len(),
        });
    }
    Ok(())
}

/// Reads a big-endian `u16` at `offset`.
pub fn read_u16(buffer: &[u8], offset: usize) -> Result<u16> {
    validate_parameters(buffer, offset, 2)?;
    Ok(u16::from_be_bytes([buffer[offset], buffer[offset + 1]]))
}

/// Reads a big-endian `u32` at `offset`.
pub fn read_u32(buffer: &[u8], offset: usize) -> Result<u32> {
    validate_parameters(buffer, offset, 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    Ok(u32::from_be_bytes(bytes))
}

/// Reads a big-endian `u64` at `offset`.
pub fn read_u64(buffer: &[u8], offset: usize) -> Result<u64> {
    validate_parameters(buffer, offset, 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    Ok(u64::from_be_bytes(bytes))
}

/// Reads a big-endian `i64` at `offset`.
pub fn read_i64(buffer: &[u8], offset: usize) -> Result<i64> {
    Ok(read_u64(buffer, offset)? as i64)
}

/// Reads a big-endian IEEE-754 `f32` at `offset`.
pub fn read_f32(buffer: &[u8], offset: usize) -> Result<f32> {
    validate_parameters(buffer, offset, 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    Ok(f32::from_be_bytes(bytes))
}

/// Reads a 16-byte RFC-4122 GUID at `offset`, in network byte order.
pub fn read_guid(buffer: &[u8], offset: usize) -> Result<Uuid> {
    validate_parameters(buffer, offset, 16)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&buffer[offset..offset + 16]);
    Ok(Uuid::from_bytes(bytes))
}

/// Reads a 32-bit-length-prefixed UTF-8 string at `offset`, returning the
/// string and the offset just past it.
pub fn read_len_string(buffer: &[u8], offset: usize) -> Result<(String, usize)> {
    let len = read_u32(buffer, offset)? as usize;
    let start = offset + 4;
    validate_parameters(buffer, start, len)?;
    let s = std::str::from_utf8(&buffer[start..start + len])
        .map_err(|_| SttpError::MalformedFrame("string field is not valid UTF-8".into()))?
        .to_owned();
    Ok((s, start + len))
}

/// Reads a 32-bit-length-prefixed raw byte string at `offset` (no UTF-8
/// validation), returning the bytes and the offset just past them. Used for
/// binary fields such as cipher key/IV material that need not be text.
pub fn read_len_bytes(buffer: &[u8], offset: usize) -> Result<(Vec<u8>, usize)> {
    let len = read_u32(buffer, offset)? as usize;
    let start = offset + 4;
    validate_parameters(buffer, start, len)?;
    Ok((buffer[start..start + len].to_vec(), start + len))
}

/// Appends a 32-bit-length-prefixed raw byte string.
pub fn write_len_bytes(buffer: &mut Vec<u8>, value: &[u8]) {
    write_u32(buffer, value.len() as u32);
    buffer.extend_from_slice(value);
}

/// Appends a big-endian `u16`.
pub fn write_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `u32`.
pub fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `u64`.
pub fn write_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `i64`.
pub fn write_i64(buffer: &mut Vec<u8>, value: i64) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian IEEE-754 `f32`.
pub fn write_f32(buffer: &mut Vec<u8>, value: f32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Appends a 16-byte RFC-4122 GUID in network byte order.
pub fn write_guid(buffer: &mut Vec<u8>, value: &Uuid) {
    buffer.extend_from_slice(value.as_bytes());
}

/// Appends a 32-bit-length-prefixed UTF-8 string.
pub fn write_len_string(buffer: &mut Vec<u8>, value: &str) {
    write_u32(buffer, value.len() as u32);
    buffer.extend_from_slice(value.as_bytes());
}
