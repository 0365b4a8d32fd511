//! PTP/IP transaction engine.
//!
//! One client per camera connection. Commands are queued with a priority,
//! issued strictly one at a time, and matched back to callers through their
//! transaction id. Data phases are reassembled from StartData/Data/EndData
//! packets and handed over together with the final command response.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::buffer::ByteBuffer;
use super::codes::response_ok;
use super::packet::{Packet, parse_packets};
use super::transport::{Channel, PtpTransport, TransportEvent};
use crate::error::{PtpError, Result};

/// Protocol version announced in the init handshake.
const PROTOCOL_VERSION: u32 = 0x0001_0000;

/// Outgoing data phases larger than this are split into Data packets.
const MAX_OUTBOUND_DATA_CHUNK: usize = 0x8000;

/// Scheduling tier for queued commands. FIFO within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// A command request to be issued on the control channel.
#[derive(Debug, Clone)]
pub struct Command {
    pub code: u16,
    pub args: Vec<u32>,
    /// Outgoing data phase, if the operation carries one.
    pub data: Option<ByteBuffer>,
}

impl Command {
    pub fn new(code: u16, args: Vec<u32>) -> Self {
        Self { code, args, data: None }
    }

    pub fn with_data(code: u16, args: Vec<u32>, data: ByteBuffer) -> Self {
        Self {
            code,
            args,
            data: Some(data),
        }
    }
}

/// Final status of a command.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: u16,
    pub transaction_id: Option<u32>,
}

impl Response {
    pub fn ok(&self) -> bool {
        response_ok(self.code)
    }
}

/// Event observed on the event channel.
#[derive(Debug, Clone)]
pub struct PtpEvent {
    pub code: u16,
    pub transaction_id: u32,
    pub params: Vec<u32>,
}

/// Derive the 16-byte GUID announced during the init handshake from a device
/// identifier string. Non-alphanumeric characters and any literal "uuid"
/// prefix are stripped, the trailing 16 characters kept, short identifiers
/// zero-padded.
pub fn derive_guid(identifier: &str) -> [u8; 16] {
    let cleaned: String = identifier
        .to_lowercase()
        .replace("uuid", "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let tail = &cleaned[cleaned.len().saturating_sub(16)..];
    let mut guid = [0u8; 16];
    for (i, b) in tail.bytes().enumerate() {
        guid[i] = b;
    }
    guid
}

enum TransportCmd {
    Connect,
    OpenEventChannel { session_id: u32 },
    Send(Channel, Vec<u8>),
    Disconnect,
}

struct PendingCommand {
    command: Command,
    /// Match a response that carries no transaction id (session-open quirk).
    any_response: bool,
    response_tx: oneshot::Sender<Result<Response>>,
    data_tx: Option<oneshot::Sender<Result<ByteBuffer>>>,
}

struct PendingResponse {
    any_response: bool,
    tx: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
struct DataContainer {
    expected: Option<u64>,
    bytes: Vec<u8>,
    finished: bool,
}

struct InFlight {
    transaction_id: u32,
    response_done: bool,
    data_done: bool,
}

#[derive(Default)]
struct CommandQueue {
    high: VecDeque<PendingCommand>,
    normal: VecDeque<PendingCommand>,
    low: VecDeque<PendingCommand>,
}

impl CommandQueue {
    fn push(&mut self, priority: Priority, cmd: PendingCommand) {
        match priority {
            Priority::High => self.high.push_back(cmd),
            Priority::Normal => self.normal.push_back(cmd),
            Priority::Low => self.low.push_back(cmd),
        }
    }

    fn pop_next(&mut self) -> Option<PendingCommand> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
        self.low.clear();
    }
}

struct ClientState {
    connected: bool,
    /// Set after an unrecoverable framing error; the stream can no longer be
    /// trusted, so further inbound bytes are dropped until the next connect.
    fatal: bool,
    session_id: Option<u32>,
    next_transaction_id: u32,
    queue: CommandQueue,
    in_flight: Option<InFlight>,
    pending_responses: HashMap<u32, PendingResponse>,
    data_waiters: HashMap<u32, oneshot::Sender<Result<ByteBuffer>>>,
    containers: HashMap<u32, DataContainer>,
    /// Transactions whose response completed ok before their data finished.
    await_data_ok: HashSet<u32>,
    connect_waiter: Option<oneshot::Sender<Result<()>>>,
    pong_waiters: Vec<oneshot::Sender<()>>,
    control_buf: ByteBuffer,
    event_buf: ByteBuffer,
    event_tx: mpsc::UnboundedSender<PtpEvent>,
}

impl ClientState {
    fn new(event_tx: mpsc::UnboundedSender<PtpEvent>) -> Self {
        Self {
            connected: false,
            fatal: false,
            session_id: None,
            next_transaction_id: 0,
            queue: CommandQueue::default(),
            in_flight: None,
            pending_responses: HashMap::new(),
            data_waiters: HashMap::new(),
            containers: HashMap::new(),
            await_data_ok: HashSet::new(),
            connect_waiter: None,
            pong_waiters: Vec::new(),
            control_buf: ByteBuffer::new(),
            event_buf: ByteBuffer::new(),
            event_tx,
        }
    }

    /// Drop all session state. Pending waiters are dropped, which surfaces as
    /// SocketClosed at their callers.
    fn reset(&mut self) {
        self.connected = false;
        self.fatal = false;
        self.session_id = None;
        self.next_transaction_id = 0;
        self.queue.clear();
        self.in_flight = None;
        self.pending_responses.clear();
        self.data_waiters.clear();
        self.containers.clear();
        self.await_data_ok.clear();
        self.connect_waiter = None;
        self.pong_waiters.clear();
        self.control_buf.clear();
        self.event_buf.clear();
    }

    fn take_transaction_id(&mut self) -> u32 {
        loop {
            let tid = self.next_transaction_id;
            self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
            // Never reuse an id with a callback still registered.
            if !self.pending_responses.contains_key(&tid) && !self.data_waiters.contains_key(&tid)
            {
                return tid;
            }
        }
    }
}

struct ClientInner {
    state: Mutex<ClientState>,
    outbound: mpsc::UnboundedSender<TransportCmd>,
    guid: [u8; 16],
    client_name: String,
    connect_timeout: Duration,
}

/// Handle to a camera's PTP/IP connection. Cheap to clone.
#[derive(Clone)]
pub struct PtpIpClient {
    inner: Arc<ClientInner>,
}

impl PtpIpClient {
    /// Build a client over the given transport. Spawns the writer and reader
    /// tasks; returns the client plus the stream of camera events.
    pub fn new(
        guid: [u8; 16],
        client_name: &str,
        mut transport: Box<dyn PtpTransport>,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PtpEvent>) {
        let inbound = transport.take_inbound();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ClientInner {
            state: Mutex::new(ClientState::new(event_tx)),
            outbound: outbound_tx,
            guid,
            client_name: client_name.to_string(),
            connect_timeout,
        });

        tokio::spawn(run_writer(transport, outbound_rx, Arc::downgrade(&inner)));
        tokio::spawn(run_reader(inbound, Arc::downgrade(&inner)));

        (Self { inner }, event_rx)
    }

    /// Run the full init handshake: open the control channel, exchange
    /// InitCommand/InitCommandAck, open the event channel, exchange
    /// InitEvent/InitEventAck.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.inner.state.lock().unwrap();
            st.reset();
            st.connect_waiter = Some(tx);
        }

        self.inner.send_cmd(TransportCmd::Connect);
        self.inner.send_cmd(TransportCmd::Send(
            Channel::Control,
            Packet::InitCommand {
                guid: self.inner.guid,
                name: self.inner.client_name.clone(),
                version: PROTOCOL_VERSION,
            }
            .serialize(),
        ));

        match timeout(self.inner.connect_timeout, rx).await {
            Err(_) => {
                self.inner.state.lock().unwrap().reset();
                Err(PtpError::timeout("PTP/IP init handshake"))
            }
            Ok(Err(_)) => Err(PtpError::SocketClosed),
            Ok(Ok(result)) => result,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().unwrap().connected
    }

    /// Queue a command and wait for its response packet. An error response
    /// code is returned as a normal [`Response`]; callers inspect `code`.
    pub async fn command(&self, command: Command, priority: Priority) -> Result<Response> {
        let (rx, _) = self.submit(command, priority, false, false);
        rx.await.map_err(|_| PtpError::SocketClosed)?
    }

    /// Like [`command`](Self::command), but also matched by a response that
    /// arrives without a transaction id. Session-open responses on some
    /// firmwares omit it.
    pub async fn command_any_response(
        &self,
        command: Command,
        priority: Priority,
    ) -> Result<Response> {
        let (rx, _) = self.submit(command, priority, true, false);
        rx.await.map_err(|_| PtpError::SocketClosed)?
    }

    /// Queue a command that expects an inbound data phase. Fails with
    /// [`PtpError::CommandRequestFailed`] when the camera answers with an
    /// error response code.
    pub async fn command_with_data(
        &self,
        command: Command,
        priority: Priority,
    ) -> Result<(Response, ByteBuffer)> {
        let (resp_rx, data_rx) = self.submit(command, priority, false, true);
        let Some(data_rx) = data_rx else {
            return Err(PtpError::SocketClosed);
        };
        let response = resp_rx.await.map_err(|_| PtpError::SocketClosed)??;
        let data = data_rx.await.map_err(|_| PtpError::SocketClosed)??;
        Ok((response, data))
    }

    /// Liveness probe: send Ping, wait for Pong.
    pub async fn ping(&self, wait: Duration) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.inner.state.lock().unwrap();
            if !st.connected {
                return Err(PtpError::SocketClosed);
            }
            st.pong_waiters.push(tx);
        }
        self.inner
            .send_cmd(TransportCmd::Send(Channel::Event, Packet::Ping.serialize()));
        timeout(wait, rx)
            .await
            .map_err(|_| PtpError::timeout("waiting for pong"))?
            .map_err(|_| PtpError::SocketClosed)
    }

    /// Tear down both channels and fail every outstanding caller.
    pub fn disconnect(&self) {
        self.inner.send_cmd(TransportCmd::Disconnect);
        self.inner.state.lock().unwrap().reset();
    }

    fn submit(
        &self,
        command: Command,
        priority: Priority,
        any_response: bool,
        want_data: bool,
    ) -> (
        oneshot::Receiver<Result<Response>>,
        Option<oneshot::Receiver<Result<ByteBuffer>>>,
    ) {
        let (response_tx, response_rx) = oneshot::channel();
        let (data_tx, data_rx) = if want_data {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut st = self.inner.state.lock().unwrap();
        if st.fatal {
            // Dropping the senders surfaces SocketClosed at the caller.
            return (response_rx, data_rx);
        }
        st.queue.push(
            priority,
            PendingCommand {
                command,
                any_response,
                response_tx,
                data_tx,
            },
        );
        self.inner.pump(&mut st);
        (response_rx, data_rx)
    }

    #[cfg(test)]
    pub(crate) fn queued_commands(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn in_flight_transaction(&self) -> Option<u32> {
        self.inner
            .state
            .lock()
            .unwrap()
            .in_flight
            .as_ref()
            .map(|f| f.transaction_id)
    }

    #[cfg(test)]
    pub(crate) fn next_transaction_id(&self) -> u32 {
        self.inner.state.lock().unwrap().next_transaction_id
    }

    #[cfg(test)]
    pub(crate) fn set_next_transaction_id(&self, tid: u32) {
        self.inner.state.lock().unwrap().next_transaction_id = tid;
    }
}

impl ClientInner {
    fn send_cmd(&self, cmd: TransportCmd) {
        if self.outbound.send(cmd).is_err() {
            warn!("transport writer task is gone");
        }
    }

    /// Issue the next queued command if the line is idle.
    fn pump(&self, st: &mut ClientState) {
        if !st.connected || st.in_flight.is_some() {
            return;
        }
        let Some(pending) = st.queue.pop_next() else {
            return;
        };

        let tid = st.take_transaction_id();
        let want_data = pending.data_tx.is_some();

        st.pending_responses.insert(
            tid,
            PendingResponse {
                any_response: pending.any_response,
                tx: pending.response_tx,
            },
        );
        if let Some(data_tx) = pending.data_tx {
            st.data_waiters.insert(tid, data_tx);
        }
        st.in_flight = Some(InFlight {
            transaction_id: tid,
            response_done: false,
            data_done: !want_data,
        });

        debug!(
            code = format_args!("{:#06x}", pending.command.code),
            tid, "issuing command request"
        );
        self.send_cmd(TransportCmd::Send(
            Channel::Control,
            Packet::CommandRequest {
                code: pending.command.code as u32,
                transaction_id: tid,
                args: pending.command.args,
            }
            .serialize(),
        ));

        if let Some(data) = pending.command.data {
            self.send_data_phase(tid, data);
        }
    }

    /// Send an outgoing data phase as StartData, zero or more Data packets,
    /// and a final EndData.
    fn send_data_phase(&self, tid: u32, data: ByteBuffer) {
        let bytes = data.into_vec();
        self.send_cmd(TransportCmd::Send(
            Channel::Control,
            Packet::StartData {
                transaction_id: tid,
                total_length: bytes.len() as u64,
            }
            .serialize(),
        ));

        let mut rest = bytes.as_slice();
        while rest.len() > MAX_OUTBOUND_DATA_CHUNK {
            let (chunk, tail) = rest.split_at(MAX_OUTBOUND_DATA_CHUNK);
            self.send_cmd(TransportCmd::Send(
                Channel::Control,
                Packet::Data {
                    transaction_id: tid,
                    payload: chunk.to_vec(),
                }
                .serialize(),
            ));
            rest = tail;
        }
        self.send_cmd(TransportCmd::Send(
            Channel::Control,
            Packet::EndData {
                transaction_id: tid,
                payload: rest.to_vec(),
            }
            .serialize(),
        ));
    }

    /// Feed raw transport bytes into the per-channel accumulator and handle
    /// every complete packet.
    fn ingest(&self, channel: Channel, bytes: &[u8]) {
        let packets = {
            let mut st = self.state.lock().unwrap();
            if st.fatal {
                return;
            }
            let buf = match channel {
                Channel::Control => &mut st.control_buf,
                Channel::Event => &mut st.event_buf,
            };
            buf.append_slice(bytes);
            match parse_packets(buf) {
                Ok(packets) => packets,
                Err(e) => {
                    error!("Unrecoverable framing error on {channel:?} channel: {e}");
                    self.fail_connect_locked(&mut st, PtpError::framing(e.to_string()));
                    st.reset();
                    st.fatal = true;
                    self.send_cmd(TransportCmd::Disconnect);
                    return;
                }
            }
        };
        for packet in packets {
            self.handle_packet(channel, packet);
        }
    }

    fn handle_packet(&self, channel: Channel, packet: Packet) {
        match packet {
            Packet::InitCommandAck { session_id, name, .. } => {
                debug!(session_id, camera = %name, "init command acknowledged");
                let mut st = self.state.lock().unwrap();
                st.session_id = Some(session_id);
                self.send_cmd(TransportCmd::OpenEventChannel { session_id });
            }
            Packet::InitEventAck => {
                let mut st = self.state.lock().unwrap();
                st.connected = true;
                if let Some(waiter) = st.connect_waiter.take() {
                    let _ = waiter.send(Ok(()));
                }
                self.pump(&mut st);
            }
            Packet::Error { payload } => {
                warn!(payload = %hex::encode(&payload), "camera sent error packet");
            }
            Packet::CommandResponse { code, transaction_id } => {
                self.handle_response(code, transaction_id);
            }
            Packet::StartData { transaction_id, total_length } => {
                let mut st = self.state.lock().unwrap();
                let container = st.containers.entry(transaction_id).or_default();
                container.expected = Some(total_length);
            }
            Packet::Data { transaction_id, payload } => {
                let mut st = self.state.lock().unwrap();
                let container = st.containers.entry(transaction_id).or_default();
                container.bytes.extend_from_slice(&payload);
            }
            Packet::EndData { transaction_id, payload } => {
                self.handle_end_data(transaction_id, payload);
            }
            Packet::Cancel { transaction_id } => {
                warn!(tid = transaction_id, "camera cancelled transaction");
                let mut st = self.state.lock().unwrap();
                if let Some(pending) = st.pending_responses.remove(&transaction_id) {
                    let _ = pending
                        .tx
                        .send(Err(PtpError::invalid_response("transaction cancelled")));
                }
                if let Some(data_tx) = st.data_waiters.remove(&transaction_id) {
                    let _ = data_tx.send(Err(PtpError::invalid_response("transaction cancelled")));
                }
                st.containers.remove(&transaction_id);
                if st
                    .in_flight
                    .as_ref()
                    .is_some_and(|f| f.transaction_id == transaction_id)
                {
                    st.in_flight = None;
                }
                self.pump(&mut st);
            }
            Packet::Event { code, transaction_id, params } => {
                let st = self.state.lock().unwrap();
                let _ = st.event_tx.send(PtpEvent {
                    code,
                    transaction_id,
                    params,
                });
            }
            Packet::Ping => {
                self.send_cmd(TransportCmd::Send(channel, Packet::Pong.serialize()));
            }
            Packet::Pong => {
                let mut st = self.state.lock().unwrap();
                for waiter in st.pong_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            // We are the initiator; these only flow camera-bound.
            Packet::InitCommand { .. } | Packet::InitEvent { .. } | Packet::CommandRequest { .. } => {
                warn!(kind = ?packet.kind(), "ignoring initiator-only packet from camera");
            }
        }
    }

    fn handle_response(&self, code: u16, transaction_id: Option<u32>) {
        let mut st = self.state.lock().unwrap();
        match transaction_id {
            Some(tid) => self.complete_response(&mut st, tid, code, Some(tid)),
            None => {
                // Match every registration that opted into id-less responses.
                let ids: Vec<u32> = st
                    .pending_responses
                    .iter()
                    .filter(|(_, p)| p.any_response)
                    .map(|(tid, _)| *tid)
                    .collect();
                if ids.is_empty() {
                    warn!(code = format_args!("{code:#06x}"), "unmatched id-less response");
                }
                for tid in ids {
                    self.complete_response(&mut st, tid, code, None);
                }
            }
        }
        self.pump(&mut st);
    }

    /// Resolve the response leg of transaction `tid`, and the data leg where
    /// the response decides it (error response, or data already complete).
    fn complete_response(
        &self,
        st: &mut ClientState,
        tid: u32,
        code: u16,
        wire_tid: Option<u32>,
    ) {
        if let Some(pending) = st.pending_responses.remove(&tid) {
            let _ = pending.tx.send(Ok(Response {
                code,
                transaction_id: wire_tid,
            }));
        } else {
            warn!(tid, "response for unknown transaction");
        }

        if response_ok(code) {
            if st.containers.get(&tid).is_some_and(|c| c.finished) {
                if let Some(container) = st.containers.remove(&tid)
                    && let Some(data_tx) = st.data_waiters.remove(&tid)
                {
                    let _ = data_tx.send(Ok(ByteBuffer::from_bytes(container.bytes)));
                }
            } else if st.data_waiters.contains_key(&tid) {
                // Data still streaming in; deliver on EndData.
                st.await_data_ok.insert(tid);
            }
        } else {
            st.containers.remove(&tid);
            if let Some(data_tx) = st.data_waiters.remove(&tid) {
                let _ = data_tx.send(Err(PtpError::CommandRequestFailed(code)));
            }
        }

        if let Some(in_flight) = st.in_flight.as_mut()
            && in_flight.transaction_id == tid
        {
            in_flight.response_done = true;
            if !st.data_waiters.contains_key(&tid) {
                in_flight.data_done = true;
            }
        }
        Self::clear_finished_in_flight(st);
    }

    fn handle_end_data(&self, tid: u32, payload: Vec<u8>) {
        let mut st = self.state.lock().unwrap();
        let container = st.containers.entry(tid).or_default();
        container.bytes.extend_from_slice(&payload);
        container.finished = true;
        if let Some(expected) = container.expected
            && (container.bytes.len() as u64) != expected
        {
            debug!(
                tid,
                expected,
                got = container.bytes.len(),
                "data phase length differs from StartData announcement"
            );
        }

        if st.await_data_ok.remove(&tid) {
            if let Some(container) = st.containers.remove(&tid)
                && let Some(data_tx) = st.data_waiters.remove(&tid)
            {
                let _ = data_tx.send(Ok(ByteBuffer::from_bytes(container.bytes)));
            }
            if let Some(in_flight) = st.in_flight.as_mut()
                && in_flight.transaction_id == tid
            {
                in_flight.data_done = true;
            }
            Self::clear_finished_in_flight(&mut st);
            self.pump(&mut st);
        }
    }

    fn clear_finished_in_flight(st: &mut ClientState) {
        if st
            .in_flight
            .as_ref()
            .is_some_and(|f| f.response_done && f.data_done)
        {
            st.in_flight = None;
        }
    }

    fn fail_connect_locked(&self, st: &mut ClientState, error: PtpError) {
        if let Some(waiter) = st.connect_waiter.take() {
            let _ = waiter.send(Err(error));
        }
    }

    fn on_transport_error(&self, error: PtpError) {
        let mut st = self.state.lock().unwrap();
        self.fail_connect_locked(&mut st, error);
        st.reset();
    }

    fn on_channel_closed(&self, channel: Channel) {
        warn!("{channel:?} channel closed");
        if channel == Channel::Control {
            self.on_transport_error(PtpError::SocketClosed);
        }
    }
}

async fn run_writer(
    mut transport: Box<dyn PtpTransport>,
    mut rx: mpsc::UnboundedReceiver<TransportCmd>,
    inner: Weak<ClientInner>,
) {
    while let Some(cmd) = rx.recv().await {
        let result = match cmd {
            TransportCmd::Connect => transport.connect().await,
            TransportCmd::OpenEventChannel { session_id } => {
                match transport.open_event_channel().await {
                    Ok(()) => {
                        transport
                            .send(Channel::Event, &Packet::InitEvent { session_id }.serialize())
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            TransportCmd::Send(channel, bytes) => transport.send(channel, &bytes).await,
            TransportCmd::Disconnect => {
                transport.disconnect().await;
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("Transport operation failed: {e}");
            if let Some(inner) = inner.upgrade() {
                inner.on_transport_error(e);
            }
        }
    }
    transport.disconnect().await;
}

async fn run_reader(
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    inner: Weak<ClientInner>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Data { channel, bytes } => inner.ingest(channel, &bytes),
            TransportEvent::Closed { channel } => inner.on_channel_closed(channel),
        }
    }
}
