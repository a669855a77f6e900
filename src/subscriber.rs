// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Top-level `Subscriber` facade (§4.4–§4.6, §5, §9): owns the session state
machine, the TCP (or TLS) command channel, the optional UDP data channel,
and the connect/reconnect supervisor, and wires them into the three flows
of control §5 describes — a command-channel reader, an optional
data-channel reader, and a connection-supervisor/disconnect worker.

This module owns every socket and thread in the crate; `Session` itself
stays synchronous and socket-free so it can be driven directly by tests
(§8).
*/

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;

#[cfg(feature = "tls")]
use native_tls::TlsConnector;

use crate::callbacks::Callbacks;
use crate::commands::{OperationalModes, ServerCommand};
use crate::config::Config;
use crate::connector::Connector;
use crate::errors::{Result, SttpError};
use crate::session::Session;
use crate::signal_index_cache::SignalIndexCache;
use crate::subscription::SubscriptionInfo;
use crate::transport::{TcpChannel, UdpChannel};
#[cfg(feature = "tls")]
use crate::transport::TlsChannel;

/// The command channel, plaintext or TLS-wrapped. `Subscriber` never cares
/// which: both variants frame commands and responses identically (§4.5).
enum CommandChannel {
    Plain(TcpChannel),
    #[cfg(feature = "tls")]
    Tls(TlsChannel),
}

impl CommandChannel {
    fn send_command(&self, code: u8, payload: &[u8]) -> Result<()> {
        match self {
            Self::Plain(c) => c.send_command(code, payload),
            #[cfg(feature = "tls")]
            Self::Tls(c) => c.send_command(code, payload),
        }
    }

    fn send_raw(&self, frame: &[u8]) -> Result<()> {
        match self {
            Self::Plain(c) => c.send_raw(frame),
            #[cfg(feature = "tls")]
            Self::Tls(c) => c.send_raw(frame),
        }
    }

    fn read_frame(&self) -> Result<Vec<u8>> {
        match self {
            Self::Plain(c) => c.read_frame(),
            #[cfg(feature = "tls")]
            Self::Tls(c) => c.read_frame(),
        }
    }

    fn shutdown(&self) -> Result<()> {
        match self {
            Self::Plain(c) => c.shutdown(),
            #[cfg(feature = "tls")]
            Self::Tls(c) => c.shutdown(),
        }
    }
}

/// Everything that comes and goes with a single TCP connect/disconnect
/// cycle. A fresh `Connection` is built on every connect and every
/// reconnect; nothing here survives across one.
struct Connection {
    session: Arc<Session>,
    channel: Arc<CommandChannel>,
    udp: Mutex<Option<Arc<UdpChannel>>>,
    command_reader: Option<JoinHandle<()>>,
    data_reader: Option<JoinHandle<()>>,
    /// Cleared by whichever reader (command or data) first observes a
    /// transport fault, so the other reader's concurrent failure does not
    /// also trigger a second teardown/reconnect (§5's "no shared mutable
    /// state" discipline, applied to fault handling).
    alive: Arc<AtomicBool>,
}

struct Inner {
    config: Config,
    callbacks: Arc<Callbacks>,
    connector: Mutex<Connector>,
    host: Mutex<Option<(String, u16)>>,
    connection: Mutex<Option<Connection>>,
    subscription: Mutex<Option<SubscriptionInfo>>,
    disconnecting: AtomicBool,
    disconnect_worker: Mutex<Option<JoinHandle<()>>>,
}

/// The subscriber side of an STTP session (§1, §2): connect/reconnect
/// lifecycle, operational-mode negotiation, subscribe/unsubscribe, and
/// measurement delivery to the registered [`Callbacks`].
///
/// Cheaply cloneable — clones share the same underlying connection and
/// callbacks, so a `Subscriber` can be handed to a callback-driven UI layer
/// alongside the thread that drives it.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<Inner>,
}

impl Subscriber {
    /// Creates a disconnected subscriber with the given configuration and
    /// callback registration.
    pub fn new(config: Config, callbacks: Callbacks) -> Self {
        let connector = Connector::new(
            config.max_retries,
            Duration::from_secs_f64(config.retry_interval),
            Duration::from_secs_f64(config.max_retry_interval),
            config.auto_reconnect,
        );
        Self {
            inner: Arc::new(Inner {
                config,
                callbacks: Arc::new(callbacks),
                connector: Mutex::new(connector),
                host: Mutex::new(None),
                connection: Mutex::new(None),
                subscription: Mutex::new(None),
                disconnecting: AtomicBool::new(false),
                disconnect_worker: Mutex::new(None),
            }),
        }
    }

    /// Connects to `host:port`: waits for any in-progress disconnect worker
    /// to finish first (§5's suspension points), negotiates operational
    /// modes, requests metadata if configured, and re-subscribes
    /// automatically if a subscription from a prior connect is remembered
    /// and `auto_subscribe` is set (§7).
    ///
    /// Host/port resolution failures are returned synchronously as
    /// [`SttpError::Configuration`] and do not trigger auto-reconnect (§7).
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.join_disconnect_worker();
        self.inner.disconnecting.store(false, Ordering::SeqCst);
        self.inner.connector.lock().unwrap().uncancel();
        *self.inner.host.lock().unwrap() = Some((host.to_owned(), port));
        establish(&self.inner, host, port)
    }

    /// Idempotent, non-blocking (§4.4, §5): flips the disconnecting flag,
    /// shuts down the command and data sockets so both readers observe an
    /// error and exit, then hands the join + termination callback off to a
    /// worker thread rather than blocking the caller.
    pub fn disconnect(&self) {
        if self.inner.disconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connector.lock().unwrap().cancel();

        let Some(mut connection) = self.inner.connection.lock().unwrap().take() else {
            return;
        };
        let _ = connection.channel.shutdown();
        connection.udp.lock().unwrap().take();

        let inner = self.inner.clone();
        let worker = thread::spawn(move || {
            if let Some(handle) = connection.command_reader.take() {
                let _ = handle.join();
            }
            if let Some(handle) = connection.data_reader.take() {
                let _ = handle.join();
            }
            inner.callbacks.connection_terminated();
        });
        *self.inner.disconnect_worker.lock().unwrap() = Some(worker);
    }

    /// Places (or replaces) a measurement subscription on the current
    /// connection, remembering it so `auto_subscribe` can restore it after
    /// a reconnect. Blocks until the publisher acknowledges the `Subscribe`
    /// command or the wait times out (§4.4).
    pub fn subscribe(&self, info: SubscriptionInfo) -> Result<()> {
        info.validate()?;
        *self.inner.subscription.lock().unwrap() = Some(info.clone());

        let (session, channel, alive) = {
            let guard = self.inner.connection.lock().unwrap();
            let connection = guard.as_ref().ok_or(SttpError::NotConnected)?;
            (
                connection.session.clone(),
                connection.channel.clone(),
                connection.alive.clone(),
            )
        };

        do_subscribe(&self.inner, &session, &channel, &alive, &info)
    }

    /// Cancels the current subscription and forgets it, so a subsequent
    /// reconnect does not auto-resubscribe.
    pub fn unsubscribe(&self) -> Result<()> {
        *self.inner.subscription.lock().unwrap() = None;
        let channel = {
            let guard = self.inner.connection.lock().unwrap();
            guard.as_ref().ok_or(SttpError::NotConnected)?.channel.clone()
        };
        channel.send_raw(&Session::build_unsubscribe())
    }

    /// `true` while a connection is established (not necessarily
    /// subscribed).
    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().unwrap().is_some()
    }

    /// A snapshot of the currently active signal index cache, if connected
    /// (§3, §5).
    pub fn active_signal_index_cache(&self) -> Option<SignalIndexCache> {
        self.inner
            .connection
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| c.session.active_cache())
    }

    fn join_disconnect_worker(&self) {
        let worker = self.inner.disconnect_worker.lock().unwrap().take();
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

fn establish(inner: &Arc<Inner>, host: &str, port: u16) -> Result<()> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| SttpError::Configuration(format!("invalid host/port {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| SttpError::Configuration(format!("no address resolved for {host}:{port}")))?;

    let channel = Arc::new(dial(inner, addr, host)?);

    let use_ms_resolution = inner
        .subscription
        .lock()
        .unwrap()
        .as_ref()
        .map(|s| s.use_millisecond_resolution)
        .unwrap_or(false);
    let session = Arc::new(Session::new(Uuid::new_v4(), inner.callbacks.clone(), use_ms_resolution));

    let alive = Arc::new(AtomicBool::new(true));
    let command_reader = {
        let inner = inner.clone();
        let session = session.clone();
        let channel = channel.clone();
        let alive = alive.clone();
        thread::spawn(move || run_command_reader(inner, session, channel, alive))
    };

    let modes = operational_modes(&inner.config);
    let frame = Session::build_define_operational_modes(inner.config.version, modes, inner.config.compress_payload_data);
    channel.send_raw(&frame)?;

    if inner.config.auto_request_metadata {
        request_metadata(inner, &session, &channel);
    }

    *inner.connection.lock().unwrap() = Some(Connection {
        session: session.clone(),
        channel: channel.clone(),
        udp: Mutex::new(None),
        command_reader: Some(command_reader),
        data_reader: None,
        alive: alive.clone(),
    });

    let pending_subscription = inner.subscription.lock().unwrap().clone();
    if inner.config.auto_subscribe {
        if let Some(info) = pending_subscription {
            do_subscribe(inner, &session, &channel, &alive, &info)?;
        }
    }

    inner.connector.lock().unwrap().reset();
    Ok(())
}

fn dial(inner: &Arc<Inner>, addr: std::net::SocketAddr, host: &str) -> Result<CommandChannel> {
    let read_timeout = Some(inner.config.read_poll_interval);

    #[cfg(feature = "tls")]
    if inner.config.use_tls {
        let connector = TlsConnector::new().map_err(SttpError::Tls)?;
        return Ok(CommandChannel::Tls(TlsChannel::connect(
            &connector,
            host,
            addr,
            read_timeout,
            inner.config.max_frame_size,
        )?));
    }
    #[cfg(not(feature = "tls"))]
    if inner.config.use_tls {
        log::warn!("Config::use_tls is set but this crate was built without the `tls` feature; connecting without TLS");
    }
    let _ = host;

    Ok(CommandChannel::Plain(TcpChannel::connect(
        addr,
        read_timeout,
        inner.config.max_frame_size,
    )?))
}

/// Packs the requested compression/metadata knobs into an
/// [`OperationalModes`] word. `ReceiveInternalMetadata` is always
/// requested: §6 lists it as a negotiable bit but `Config` exposes no
/// separate toggle for it, and requesting it is required for
/// `auto_request_metadata` to produce anything (see DESIGN.md).
fn operational_modes(config: &Config) -> OperationalModes {
    let mut modes = OperationalModes::RECEIVE_INTERNAL_METADATA;
    if config.compress_payload_data {
        modes |= OperationalModes::COMPRESS_PAYLOAD_DATA;
        modes |= OperationalModes::COMPRESS_TSSC;
    }
    if config.compress_metadata {
        modes |= OperationalModes::COMPRESS_METADATA;
    }
    if config.compress_signal_index_cache {
        modes |= OperationalModes::COMPRESS_SIGNAL_INDEX_CACHE;
    }
    modes
}

fn request_metadata(inner: &Arc<Inner>, session: &Arc<Session>, channel: &Arc<CommandChannel>) {
    let rx = session.await_response(ServerCommand::MetaDataRefresh.code());
    if let Err(e) = channel.send_command(ServerCommand::MetaDataRefresh.code(), &[]) {
        inner.callbacks.error_message(format!("failed to request metadata: {e}"));
        return;
    }
    let callbacks = inner.callbacks.clone();
    thread::spawn(move || match rx.recv_timeout(Duration::from_secs(30)) {
        Ok(Ok(payload)) => callbacks.metadata_received(payload),
        Ok(Err(reason)) => callbacks.error_message(format!("metadata refresh failed: {reason}")),
        Err(_) => callbacks.error_message("timed out waiting for metadata refresh".into()),
    });
}

fn do_subscribe(
    inner: &Arc<Inner>,
    session: &Arc<Session>,
    channel: &Arc<CommandChannel>,
    alive: &Arc<AtomicBool>,
    info: &SubscriptionInfo,
) -> Result<()> {
    if info.udp_data_channel.enabled {
        let udp = Arc::new(UdpChannel::bind(
            &info.udp_data_channel.interface,
            info.udp_data_channel.local_port,
            Some(inner.config.read_poll_interval),
        )?);
        let data_reader = {
            let inner = inner.clone();
            let session = session.clone();
            let udp = udp.clone();
            let alive = alive.clone();
            thread::spawn(move || run_data_reader(inner, session, udp, alive))
        };
        if let Some(connection) = inner.connection.lock().unwrap().as_mut() {
            *connection.udp.lock().unwrap() = Some(udp);
            connection.data_reader = Some(data_reader);
        }
    }

    // A fresh subscribe always follows with a new signal index cache push,
    // so the TSSC predictor must not carry state from the old one (§4.3).
    session.request_tssc_reset();

    let rx = session.await_response(ServerCommand::Subscribe.code());
    let frame = Session::build_subscribe(&info.to_connection_string());
    channel.send_raw(&frame)?;

    match rx.recv_timeout(Duration::from_secs(30)) {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(reason)) => Err(SttpError::Rejected(reason)),
        Err(_) => Err(SttpError::Timeout("Subscribe acknowledgement".into())),
    }
}

fn run_command_reader(inner: Arc<Inner>, session: Arc<Session>, channel: Arc<CommandChannel>, alive: Arc<AtomicBool>) {
    loop {
        match channel.read_frame() {
            Ok(raw) => match crate::commands::ResponseFrame::parse(&raw) {
                Ok(frame) => match session.dispatch(&frame) {
                    Ok(Some(reply)) => {
                        if let Err(e) = channel.send_raw(&reply) {
                            log::warn!("failed to send reply frame: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("dropping response frame: {e}"),
                },
                Err(e) => log::warn!("dropping malformed response frame: {e}"),
            },
            Err(SttpError::Io(ref io_err)) if is_timeout(io_err) => {
                if inner.disconnecting.load(Ordering::SeqCst) {
                    return;
                }
            }
            Err(e) => {
                if inner.disconnecting.load(Ordering::SeqCst) {
                    return;
                }
                if alive.swap(false, Ordering::SeqCst) {
                    handle_transport_fault(inner, format!("command channel error: {e}"));
                }
                return;
            }
        }
    }
}

fn run_data_reader(inner: Arc<Inner>, session: Arc<Session>, udp: Arc<UdpChannel>, alive: Arc<AtomicBool>) {
    let mut buf = UdpChannel::new_buffer();
    loop {
        match udp.recv(&mut buf) {
            Ok(n) => {
                if let Err(e) = session.handle_data_packet(&buf[..n]) {
                    log::warn!("dropping malformed UDP data packet: {e}");
                }
            }
            Err(SttpError::Io(ref io_err)) if is_timeout(io_err) => {
                if inner.disconnecting.load(Ordering::SeqCst) {
                    return;
                }
            }
            Err(e) => {
                if inner.disconnecting.load(Ordering::SeqCst) {
                    return;
                }
                if alive.swap(false, Ordering::SeqCst) {
                    handle_transport_fault(inner, format!("UDP data channel error: {e}"));
                }
                return;
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

/// Handles an unrequested transport failure (§7): tears down the dead
/// connection, fires `connection_terminated`, and — unless disposal is
/// already in progress or the retry budget is exhausted — schedules a
/// reconnect (§4.6, §5).
fn handle_transport_fault(inner: Arc<Inner>, reason: String) {
    if inner.disconnecting.load(Ordering::SeqCst) {
        return;
    }

    inner.callbacks.error_message(reason);
    if let Some(connection) = inner.connection.lock().unwrap().take() {
        let _ = connection.channel.shutdown();
        connection.udp.lock().unwrap().take();
        // Not joined here: this function may be running on one of the two
        // reader threads it would need to join, which would deadlock.
    }
    inner.callbacks.connection_terminated();

    let should_retry = {
        let mut connector = inner.connector.lock().unwrap();
        connector.record_failure(false);
        connector.should_retry()
    };
    if !should_retry {
        return;
    }

    inner.callbacks.auto_reconnect();
    thread::spawn(move || reconnect_loop(inner));
}

fn reconnect_loop(inner: Arc<Inner>) {
    loop {
        if inner.disconnecting.load(Ordering::SeqCst) {
            return;
        }
        let delay = inner.connector.lock().unwrap().next_delay();
        if cooperative_sleep(&inner, delay) {
            return;
        }
        if inner.disconnecting.load(Ordering::SeqCst) {
            return;
        }

        let Some((host, port)) = inner.host.lock().unwrap().clone() else {
            return;
        };

        match establish(&inner, &host, port) {
            Ok(()) => return,
            Err(e) => {
                inner.callbacks.error_message(format!("reconnect attempt failed: {e}"));
                let refused = matches!(&e, SttpError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused);
                let mut connector = inner.connector.lock().unwrap();
                connector.record_failure(refused);
                if !connector.should_retry() {
                    return;
                }
            }
        }
    }
}

/// Sleeps `total`, polling cancellation every `STEP` so `disconnect()` or
/// `Connector::cancel` interrupts the backoff promptly (§4.6, §5). Returns
/// `true` if the sleep was cut short by cancellation.
fn cooperative_sleep(inner: &Arc<Inner>, total: Duration) -> bool {
    const STEP: Duration = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < total {
        if inner.disconnecting.load(Ordering::SeqCst) || inner.connector.lock().unwrap().is_cancelled() {
            return true;
        }
        let chunk = STEP.min(total - waited);
        thread::sleep(chunk);
        waited += chunk;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::AtomicUsize;

    fn spawn_stub_publisher(listener: TcpListener) -> JoinHandle<()> {
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut header = [0u8; 5];
            // DefineOperationalModes
            socket.read_exact(&mut header).unwrap();
            let len = u32::from_be_bytes(header[1..5].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).unwrap();

            // MetaDataRefresh
            socket.read_exact(&mut header).unwrap();
            let len = u32::from_be_bytes(header[1..5].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).unwrap();
            let mut reply = vec![0x80, header[0]];
            reply.extend_from_slice(&0u32.to_be_bytes());
            socket.write_all(&reply).unwrap();

            // Keep the connection open briefly so the reader thread has
            // something to block on before the test tears it down.
            let mut scratch = [0u8; 1];
            let _ = socket.set_read_timeout(Some(Duration::from_millis(200)));
            let _ = socket.read(&mut scratch);
        })
    }

    #[test]
    fn connect_negotiates_modes_and_requests_metadata() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = spawn_stub_publisher(listener);

        let received = Arc::new(AtomicBool::new(false));
        let received_clone = received.clone();
        let callbacks = Callbacks::builder()
            .metadata_received(move |_| received_clone.store(true, Ordering::SeqCst))
            .build();
        let subscriber = Subscriber::new(Config::default(), callbacks);

        subscriber.connect(&addr.ip().to_string(), addr.port()).unwrap();
        assert!(subscriber.is_connected());

        for _ in 0..50 {
            if received.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(received.load(Ordering::SeqCst));

        subscriber.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn disconnect_is_idempotent() {
        let subscriber = Subscriber::new(Config::default(), Callbacks::builder().build());
        subscriber.disconnect();
        subscriber.disconnect();
        assert!(!subscriber.is_connected());
    }

    #[test]
    fn subscribe_without_a_connection_is_not_connected_error() {
        let subscriber = Subscriber::new(Config::default(), Callbacks::builder().build());
        let result = subscriber.subscribe(SubscriptionInfo::default());
        assert!(matches!(result, Err(SttpError::NotConnected)));
    }

    #[test]
    fn invalid_host_is_a_configuration_error_not_a_fault() {
        let callbacks_fired = Arc::new(AtomicUsize::new(0));
        let clone = callbacks_fired.clone();
        let callbacks = Callbacks::builder()
            .connection_terminated(move |_| {
                clone.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let subscriber = Subscriber::new(Config::default(), callbacks);
        let result = subscriber.connect("this-host-does-not-resolve.invalid", 7165);
        assert!(matches!(result, Err(SttpError::Configuration(_))));
        assert_eq!(callbacks_fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stub_reader_never_constructed_for_tls_without_feature() {
        let _ = TcpStream::connect; // keeps the import used across feature combinations
    }
}
