// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Session protocol state machine (§4.4): dispatches parsed response frames to
the signal index cache, base-time store, cipher keys, decoders, and
application callbacks, and decides what (if anything) to reply with on the
command channel.

This module owns no socket; `Subscriber` feeds it raw response frames read
from the transport and sends back whatever [`Session::dispatch`] returns.
That split is what makes the state machine testable against synthetic byte
streams without a real socket (§8).
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Sender, TrySendError};
use uuid::Uuid;

use crate::callbacks::Callbacks;
use crate::commands::{encode_command, OperationalModeWord, OperationalModes, ResponseFrame, ServerCommand, ServerResponse};
use crate::data_packet::DataPacket;
use crate::decoder::CompactDecoder;
use crate::errors::{Result, SttpError};
use crate::frame::{read_guid, read_i64, read_len_bytes, read_u32, read_u64, write_guid, write_u32};
use crate::measurement_key::KeyRegistry;
use crate::reorder::ReorderBuffer;
use crate::signal_index_cache::SignalIndexCache;
use crate::tssc::TsscDecoder;

/// Cipher key/IV pair for one of the two UDP cipher slots (§3, §4.4). The
/// wire cipher algorithm itself is not specified anywhere in this pack
/// (an open question, like TSSC's bit layout); rotation and slot-selection
/// are implemented per §4.4/§6, with the actual transform left as the
/// identity function until a concrete cipher is specified (see DESIGN.md).
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct CipherKeySet {
    /// Decryption key bytes.
    pub key: Vec<u8>,
    /// Initialization vector bytes.
    pub iv: Vec<u8>,
}

struct PendingRequest {
    reply: Sender<std::result::Result<Vec<u8>, String>>,
}

/// The gap-free default for the buffer-block reorder window before a
/// missing sequence number is skipped with a warning (§5).
const DEFAULT_REORDER_WINDOW: usize = 64;

/// Command/response state machine (§4.4). One `Session` is created per
/// connect and discarded on disconnect; caches and base times reset on
/// every fresh TCP connect (§7).
pub struct Session {
    callbacks: Arc<Callbacks>,
    caches: Mutex<[SignalIndexCache; 2]>,
    active_index: AtomicUsize,
    base_times: Mutex<[i64; 2]>,
    cipher_keys: Mutex<[CipherKeySet; 2]>,
    key_registry: Mutex<KeyRegistry>,
    compact_decoder: Mutex<CompactDecoder>,
    tssc_decoder: Mutex<TsscDecoder>,
    reorder: Mutex<ReorderBuffer>,
    pending: Mutex<HashMap<u8, PendingRequest>>,
}

impl Session {
    /// Creates a session for `subscriber_id`, negotiated with
    /// `use_millisecond_resolution` (§4.3).
    pub fn new(subscriber_id: Uuid, callbacks: Arc<Callbacks>, use_millisecond_resolution: bool) -> Self {
        Self {
            callbacks,
            caches: Mutex::new([
                SignalIndexCache::new(subscriber_id),
                SignalIndexCache::new(subscriber_id),
            ]),
            active_index: AtomicUsize::new(0),
            base_times: Mutex::new([0, 0]),
            cipher_keys: Mutex::new([CipherKeySet::default(), CipherKeySet::default()]),
            key_registry: Mutex::new(KeyRegistry::new()),
            compact_decoder: Mutex::new(CompactDecoder::new(use_millisecond_resolution)),
            tssc_decoder: Mutex::new(TsscDecoder::new()),
            reorder: Mutex::new(ReorderBuffer::new(DEFAULT_REORDER_WINDOW)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the `DefineOperationalModes` command frame, version and mode
    /// bits packed per §4.4. This must be the first frame sent after
    /// connect (§4.4).
    pub fn build_define_operational_modes(version: u8, modes: OperationalModes, use_tcp_tssc: bool) -> Vec<u8> {
        let word = OperationalModeWord::pack(version, modes, use_tcp_tssc);
        let mut payload = Vec::with_capacity(4);
        write_u32(&mut payload, word);
        encode_command(ServerCommand::DefineOperationalModes.code(), &payload)
    }

    /// Builds the `Subscribe` command frame: a 1-byte `DataPacketFlags`
    /// prefix, a 4-byte length, then the UTF-8 connection string (§4.4).
    pub fn build_subscribe(connection_string: &str) -> Vec<u8> {
        let string_bytes = connection_string.as_bytes();
        let mut payload = Vec::with_capacity(5 + string_bytes.len());
        payload.push(crate::data_packet::DataPacketFlags::COMPACT.bits());
        write_u32(&mut payload, string_bytes.len() as u32);
        payload.extend_from_slice(string_bytes);
        encode_command(ServerCommand::Subscribe.code(), &payload)
    }

    /// Builds an `Unsubscribe` command frame (no payload).
    pub fn build_unsubscribe() -> Vec<u8> {
        encode_command(ServerCommand::Unsubscribe.code(), &[])
    }

    /// Registers a one-shot waiter for the `Succeeded`/`Failed` response to
    /// `command`. Returns the receiving half; the caller blocks on it after
    /// sending the command frame.
    pub fn await_response(&self, command: u8) -> crossbeam_channel::Receiver<std::result::Result<Vec<u8>, String>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.pending.lock().unwrap().insert(command, PendingRequest { reply: tx });
        rx
    }

    /// Currently-active signal index cache slot (§3, §5).
    pub fn active_cache_index(&self) -> usize {
        self.active_index.load(Ordering::Acquire)
    }

    /// Clones the active signal index cache for inspection (e.g. by the
    /// `subscription_updated` callback's caller or by tests).
    pub fn active_cache(&self) -> SignalIndexCache {
        let index = self.active_cache_index();
        self.caches.lock().unwrap()[index].clone()
    }

    /// Requests the TSSC decoder reset its per-signal predictor state,
    /// e.g. on (re)subscribe (§4.3).
    pub fn request_tssc_reset(&self) {
        self.tssc_decoder.lock().unwrap().request_reset();
    }

    /// Dispatches one parsed response frame, returning the command frame to
    /// send back (if any) per §4.4's reply rules.
    pub fn dispatch(&self, frame: &ResponseFrame<'_>) -> Result<Option<Vec<u8>>> {
        match frame.code {
            ServerResponse::Succeeded => {
                self.resolve_pending(frame.original_command, Ok(frame.payload.to_vec()));
                Ok(None)
            }
            ServerResponse::Failed => {
                let reason = String::from_utf8_lossy(frame.payload).into_owned();
                self.resolve_pending(frame.original_command, Err(reason));
                Ok(None)
            }
            ServerResponse::DataPacket => {
                self.handle_data_packet(frame.payload)?;
                Ok(None)
            }
            ServerResponse::UpdateSignalIndexCache => {
                self.handle_update_signal_index_cache(frame.payload)
            }
            ServerResponse::UpdateBaseTimes => self.handle_update_base_times(frame.payload),
            ServerResponse::UpdateCipherKeys => {
                self.handle_update_cipher_keys(frame.payload)?;
                Ok(None)
            }
            ServerResponse::DataStartTime => {
                let ticks = read_u64(frame.payload, 0)?;
                self.callbacks.data_start_time(ticks);
                Ok(None)
            }
            ServerResponse::ProcessingComplete => {
                let message = String::from_utf8_lossy(frame.payload).into_owned();
                self.callbacks.processing_complete(message);
                Ok(None)
            }
            ServerResponse::BufferBlock => self.handle_buffer_block(frame.payload),
            ServerResponse::Notify => {
                let message = String::from_utf8_lossy(frame.payload).into_owned();
                self.callbacks.notification_received(message.clone());
                Ok(Some(encode_command(
                    ServerCommand::ConfirmNotification.code(),
                    message.as_bytes(),
                )))
            }
            ServerResponse::ConfigurationChanged => {
                self.callbacks.configuration_changed();
                Ok(None)
            }
            ServerResponse::UserResponse(code) => {
                log::debug!("ignoring user-defined response 0x{code:02X}");
                Ok(None)
            }
            ServerResponse::NoOp => Ok(None),
        }
    }

    /// Decodes a `DataPacket` envelope and delivers its measurements to the
    /// `new_measurements` callback (§4.3). Public so the UDP data-channel
    /// reader can feed it datagrams directly — they never arrive wrapped in
    /// a `ResponseFrame` the way TCP data packets do (§4.5).
    pub fn handle_data_packet(&self, payload: &[u8]) -> Result<()> {
        let packet = DataPacket::parse(payload)?;
        let cache_index = packet.cache_index();
        let measurements = {
            let caches = self.caches.lock().unwrap();
            let cache = &caches[cache_index];
            let base_times = *self.base_times.lock().unwrap();
            if packet.is_compressed() {
                self.tssc_decoder.lock().unwrap().decode(packet.payload, cache)?
            } else {
                self.compact_decoder.lock().unwrap().decode(packet.payload, cache, base_times)?
            }
        };
        if !measurements.is_empty() {
            self.callbacks.new_measurements(measurements);
        }
        Ok(())
    }

    /// Parses the pushed cache into the *inactive* slot, replies
    /// `ConfirmSignalIndexCache`, flips `active_index`, and requests a TSSC
    /// reset — the active slot is never mutated in place (§4.4, §5).
    fn handle_update_signal_index_cache(&self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        let active = self.active_cache_index();
        let inactive = 1 - active;

        let cache = {
            let mut registry = self.key_registry.lock().unwrap();
            SignalIndexCache::parse(payload, &mut |source, id| {
                registry.resolve(Uuid::nil(), source, id).runtime_id
            })?
        };

        {
            let mut caches = self.caches.lock().unwrap();
            caches[inactive] = cache.clone();
        }
        self.active_index.store(inactive, Ordering::Release);
        self.request_tssc_reset();
        self.callbacks.subscription_updated(cache);

        Ok(Some(encode_command(ServerCommand::ConfirmSignalIndexCache.code(), &[])))
    }

    /// Parses `(timeIndex, b0, b1)`, stores `[b0, b1]`, and replies
    /// `ConfirmUpdateBaseTimes` (§4.4).
    ///
    /// The wire `timeIndex` field is consumed only for logging: §4.3's
    /// per-measurement `BASE_TIME_INDEX` bit is what actually selects a
    /// slot out of `base_times` for any given decoded value (see
    /// `CompactDecoder::decode`), and that bit is unconditionally present
    /// on every measurement, so there is no case where a measurement needs
    /// a session-level fallback index. Tracking a separate "current"
    /// `timeIndex` would be dead state with nothing left to consult it
    /// (see DESIGN.md).
    fn handle_update_base_times(&self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        if payload.len() < 20 {
            return Err(SttpError::MalformedFrame(
                "UpdateBaseTimes payload shorter than 20 bytes".into(),
            ));
        }
        let time_index = read_u32(payload, 0)? as usize % 2;
        let b0 = read_i64(payload, 4)?;
        let b1 = read_i64(payload, 12)?;
        *self.base_times.lock().unwrap() = [b0, b1];
        log::debug!("base times rotated, publisher-reported time index now {time_index}");
        Ok(Some(encode_command(ServerCommand::ConfirmUpdateBaseTimes.code(), &[])))
    }

    /// Parses two `(key, iv)` pairs. No confirmation is sent; success is
    /// observed implicitly by the next data-packet decode (§4.4).
    fn handle_update_cipher_keys(&self, payload: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        let mut slots = [CipherKeySet::default(), CipherKeySet::default()];
        for slot in slots.iter_mut() {
            let (key, next) = read_len_bytes(payload, offset)?;
            offset = next;
            let (iv, next) = read_len_bytes(payload, offset)?;
            offset = next;
            *slot = CipherKeySet { key, iv };
        }
        *self.cipher_keys.lock().unwrap() = slots;
        Ok(())
    }

    /// Reassembles a `BufferBlock` payload (`uint32 sequenceNumber` followed
    /// by the blob) into sequence order, replying `ConfirmBufferBlock` with
    /// the sequence number that just arrived (§4.4).
    fn handle_buffer_block(&self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        if payload.len() < 4 {
            return Err(SttpError::MalformedFrame(
                "BufferBlock payload shorter than its 4-byte sequence number".into(),
            ));
        }
        let sequence_number = read_u32(payload, 0)?;
        let blob = payload[4..].to_vec();

        let delivered = self.reorder.lock().unwrap().accept(sequence_number, blob);
        if !delivered.is_empty() {
            self.callbacks.new_buffer_blocks(delivered);
        }

        let mut reply = Vec::with_capacity(4);
        write_u32(&mut reply, sequence_number);
        Ok(Some(encode_command(ServerCommand::ConfirmBufferBlock.code(), &reply)))
    }

    fn resolve_pending(&self, command: u8, result: std::result::Result<Vec<u8>, String>) {
        if let Some(pending) = self.pending.lock().unwrap().remove(&command) {
            if let Err(TrySendError::Full(_)) = pending.reply.try_send(result) {
                log::warn!("dropped response for command 0x{command:02X}: waiter already satisfied");
            }
        }
    }
}

/// Encodes a `subscriberID` into the payload of a command that needs one,
/// such as a custom handshake extension. Exposed for completeness with the
/// wire layout in §4.2; `Session` itself derives its active subscriber id
/// from the cache it was constructed with.
pub fn encode_subscriber_id(id: Uuid) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    write_guid(&mut buf, &id);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ServerCommand;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), Arc::new(Callbacks::builder().build()), true)
    }

    fn response_frame(code: u8, original_command: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![code, original_command];
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn subscribe_carries_flags_prefix_length_and_string() {
        let frame = Session::build_subscribe("throttled=False;");
        assert_eq!(frame[0], ServerCommand::Subscribe.code());
        let length = u32::from_be_bytes(frame[1..5].try_into().unwrap()) as usize;
        let payload = &frame[5..5 + length];
        assert_eq!(payload[0], crate::data_packet::DataPacketFlags::COMPACT.bits());
        let string_len = u32::from_be_bytes(payload[1..5].try_into().unwrap()) as usize;
        assert_eq!(&payload[5..5 + string_len], b"throttled=False;");
    }

    #[test]
    fn scenario_1_signal_index_cache_rotation_flips_active_and_confirms() {
        let session = session();
        let mut cache = SignalIndexCache::new(Uuid::new_v4());
        let mut registry = KeyRegistry::new();
        cache.insert(0, registry.resolve(Uuid::new_v4(), "PPA", 1));
        cache.insert(1, registry.resolve(Uuid::new_v4(), "PPA", 2));
        let bytes = cache.serialize();

        let raw = response_frame(0x83, 0x02, &bytes);
        let frame = ResponseFrame::parse(&raw).unwrap();
        let reply = session.dispatch(&frame).unwrap().unwrap();
        assert_eq!(reply[0], ServerCommand::ConfirmSignalIndexCache.code());
        assert_eq!(session.active_cache_index(), 1); // flipped from the initial active slot 0
        assert_eq!(session.active_cache().len(), 2);
    }

    #[test]
    fn scenario_2_update_base_times_confirms_and_stores() {
        let session = session();
        let mut payload = Vec::new();
        write_u32(&mut payload, 1);
        payload.extend_from_slice(&0i64.to_be_bytes());
        payload.extend_from_slice(&638_200_000_000_000_000i64.to_be_bytes());

        let raw = response_frame(0x84, 0x02, &payload);
        let frame = ResponseFrame::parse(&raw).unwrap();
        let reply = session.dispatch(&frame).unwrap().unwrap();
        assert_eq!(reply[0], ServerCommand::ConfirmUpdateBaseTimes.code());
        assert_eq!(*session.base_times.lock().unwrap(), [0, 638_200_000_000_000_000i64]);
    }

    #[test]
    fn scenario_4_notify_replies_with_same_payload() {
        let session = session();
        let raw = response_frame(0x89, 0x02, b"rebalance");
        let frame = ResponseFrame::parse(&raw).unwrap();
        let reply = session.dispatch(&frame).unwrap().unwrap();
        assert_eq!(reply[0], ServerCommand::ConfirmNotification.code());
        assert_eq!(&reply[5..], b"rebalance");
    }

    #[test]
    fn scenario_6_buffer_blocks_deliver_in_sequence_order() {
        let callbacks_order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let callbacks_order_clone = callbacks_order.clone();
        let callbacks = Callbacks::builder()
            .new_buffer_blocks(move |blocks| {
                callbacks_order_clone
                    .lock()
                    .unwrap()
                    .extend(blocks.into_iter().map(|(seq, _)| seq));
            })
            .build();
        let session = Session::new(Uuid::new_v4(), Arc::new(callbacks), true);

        for seq in [1u32, 3, 2, 4] {
            let mut payload = Vec::new();
            write_u32(&mut payload, seq);
            payload.extend_from_slice(b"x");
            let raw = response_frame(0x88, 0x02, &payload);
            let frame = ResponseFrame::parse(&raw).unwrap();
            session.dispatch(&frame).unwrap();
        }
        assert_eq!(*callbacks_order.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn succeeded_resolves_the_matching_pending_request() {
        let session = session();
        let rx = session.await_response(ServerCommand::Subscribe.code());
        let raw = response_frame(0x80, ServerCommand::Subscribe.code(), b"ok");
        let frame = ResponseFrame::parse(&raw).unwrap();
        session.dispatch(&frame).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Ok(b"ok".to_vec()));
    }

    #[test]
    fn update_cipher_keys_stores_both_slots_without_a_reply() {
        let session = session();
        let mut payload = Vec::new();
        crate::frame::write_len_bytes(&mut payload, b"key0");
        crate::frame::write_len_bytes(&mut payload, b"iv0");
        crate::frame::write_len_bytes(&mut payload, b"key1");
        crate::frame::write_len_bytes(&mut payload, b"iv1");

        let raw = response_frame(0x85, 0x04, &payload);
        let frame = ResponseFrame::parse(&raw).unwrap();
        assert!(session.dispatch(&frame).unwrap().is_none());
        let keys = session.cipher_keys.lock().unwrap();
        assert_eq!(keys[0].key, b"key0");
        assert_eq!(keys[1].iv, b"iv1");
    }

    #[test]
    fn noop_produces_no_reply() {
        let session = session();
        let raw = response_frame(0xFF, 0x00, &[]);
        let frame = ResponseFrame::parse(&raw).unwrap();
        assert!(session.dispatch(&frame).unwrap().is_none());
    }
}
