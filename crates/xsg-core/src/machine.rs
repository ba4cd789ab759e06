//! Sans-IO session state machine.
//!
//! The machine never touches a socket or a clock. Callers feed it inputs
//! (`connect`, datagrams, ticks, commands) together with the current time and
//! drain [`Output`]s: datagrams to transmit, events, and completions for
//! pending operations. All session mutation happens through `&mut self`, so
//! the async driver in [`crate::session`] needs no locks.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xsg_crypto::{derive_session_keys, random_iv, ConsoleCertificate, KeyPair, PacketCipher};
use xsg_proto::{
    decode, disconnect_reason, Ack, ConnectRequestProtected, ConnectResponse, ConnectResult, ConsoleStatus,
    Disconnect, DiscoveryRequest, DiscoveryResponse, Fragment, GameDvrRecord, Gamepad, JsonMessage, MediaCommand,
    MessageFlags, MessageHeader, MessagePacket, MessagePayload, MessageType, Packet, PowerOff, SimplePacket,
    StartChannelRequest, StartChannelResponse, ACK_CHANNEL_ID, CORE_CHANNEL_ID,
};
use xsg_transport::TransportError;

use crate::channel::{ChannelKind, ChannelTable, FragmentAssembler, OpenResult};
use crate::command::{Command, Response};
use crate::config::SessionConfig;
use crate::errors::{CommandError, ConnectError, DisconnectReason, ErrorKind};
use crate::state::{DeviceState, StateTracker, StatusUpdate};

/// Correlates a submitted command with its completion.
pub type CommandToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Discovering,
    Connecting,
    /// Keys exist, authentication not yet acknowledged.
    Connected,
    Authenticated,
}

/// What the client learned about the console while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleInfo {
    pub name: String,
    pub uuid: String,
    pub live_id: String,
    pub address: SocketAddr,
    pub participant_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Emitted once per authentication, on the first console status.
    DeviceInfo { firmware: String, locale: String },
    StateChanged(DeviceState),
    Disconnected(DisconnectReason),
    Error { kind: ErrorKind, detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Transmit { to: SocketAddr, data: Vec<u8> },
    State(SessionState),
    Event(SessionEvent),
    /// Completion of the connect attempt started by [`SessionMachine::connect`].
    Connected(Result<ConsoleInfo, ConnectError>),
    CommandDone {
        token: CommandToken,
        result: Result<Response, CommandError>,
    },
    /// The session is terminal; release the transport binding.
    Release,
}

#[derive(Debug)]
enum Stage {
    AwaitingChannel(Command),
    AwaitingMedia(u64),
    AwaitingJson(String),
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    stage: Stage,
}

#[derive(Debug, Clone)]
struct Target {
    address: SocketAddr,
    live_id: String,
}

pub struct SessionMachine {
    config: SessionConfig,
    state: SessionState,
    closed: bool,
    started: Instant,
    outputs: VecDeque<Output>,

    target: Option<Target>,
    console: Option<ConsoleInfo>,
    peer_key: Option<[u8; xsg_crypto::PUBLIC_KEY_LEN]>,
    client_uuid: [u8; 16],
    key_pair: Option<KeyPair>,
    cipher: Option<PacketCipher>,
    attempts: u32,
    deadline: Option<Instant>,

    participant_id: u32,
    next_sequence: u32,
    last_inbound: Option<u32>,
    last_inbound_at: Instant,
    next_heartbeat: Instant,
    join_sequence: Option<u32>,
    held_status: Option<ConsoleStatus>,

    channels: ChannelTable,
    fragments: FragmentAssembler,
    tracker: StateTracker,
    device_info_sent: bool,
    pending: HashMap<CommandToken, Pending>,
    next_media_request: u64,
    next_msgid: u64,
}

impl SessionMachine {
    pub fn new(config: SessionConfig, now: Instant) -> Self {
        let fragments = FragmentAssembler::new(config.fragment_max_age);
        let channels = ChannelTable::new(config.channel_open_interval, config.channel_open_attempts);
        Self {
            config,
            state: SessionState::Disconnected,
            closed: false,
            started: now,
            outputs: VecDeque::new(),
            target: None,
            console: None,
            peer_key: None,
            client_uuid: Uuid::new_v4().into_bytes(),
            key_pair: None,
            cipher: None,
            attempts: 0,
            deadline: None,
            participant_id: 0,
            next_sequence: 1,
            last_inbound: None,
            last_inbound_at: now,
            next_heartbeat: now,
            join_sequence: None,
            held_status: None,
            channels,
            fragments,
            tracker: StateTracker::new(),
            device_info_sent: false,
            pending: HashMap::new(),
            next_media_request: 1,
            next_msgid: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn device_state(&self) -> &DeviceState {
        self.tracker.snapshot()
    }

    pub fn console(&self) -> Option<&ConsoleInfo> {
        self.console.as_ref()
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    // ------------------------------------------------------------------------
    // Caller inputs
    // ------------------------------------------------------------------------

    /// Start discovery and handshake against `address`. `live_id` selects the
    /// console among discovery responses; empty accepts whatever answers from
    /// `address`.
    pub fn connect(&mut self, now: Instant, address: SocketAddr, live_id: &str) {
        if self.closed {
            self.outputs.push_back(Output::Connected(Err(ConnectError::SessionClosed)));
            return;
        }
        if self.state != SessionState::Disconnected {
            self.outputs.push_back(Output::Connected(Err(ConnectError::InProgress)));
            return;
        }
        info!(%address, live_id, "connecting");
        self.target = Some(Target {
            address,
            live_id: live_id.to_string(),
        });
        self.console = None;
        self.attempts = 0;
        self.set_state(SessionState::Discovering);
        self.send_discovery(now);
    }

    /// Close the session for good: notify the console, cancel everything
    /// pending and release the transport.
    pub fn disconnect(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Authenticated => self.end_session(now, DisconnectReason::Requested),
            SessionState::Discovering | SessionState::Connecting | SessionState::Connected => {
                if self.state == SessionState::Connected {
                    self.send_disconnect();
                }
                self.outputs.push_back(Output::Connected(Err(ConnectError::SessionClosed)));
                self.teardown();
                self.set_state(SessionState::Disconnected);
                self.emit(SessionEvent::Disconnected(DisconnectReason::Requested));
            }
        }
        self.closed = true;
        self.outputs.push_back(Output::Release);
    }

    pub fn submit(&mut self, now: Instant, token: CommandToken, command: Command) {
        if self.closed {
            self.complete(token, Err(CommandError::SessionClosed));
            return;
        }
        if self.state != SessionState::Authenticated {
            self.complete(token, Err(CommandError::NotAuthenticated(self.state)));
            return;
        }
        let deadline = now + self.config.command_timeout;
        let kind = command.channel();
        match self.channels.id_of(kind) {
            Some(channel_id) => self.dispatch_command(now, token, command, channel_id, deadline),
            None => {
                debug!(channel = %kind, token, "channel not open, queueing command");
                self.pending.insert(
                    token,
                    Pending {
                        deadline,
                        stage: Stage::AwaitingChannel(command),
                    },
                );
                self.open_channel(now, kind);
            }
        }
    }

    /// Ask the console to power down, then end the session.
    pub fn power_off(&mut self, now: Instant, token: CommandToken) {
        if let Err(err) = self.ready() {
            self.complete(token, Err(err));
            return;
        }
        let live_id = self
            .console
            .as_ref()
            .map(|c| c.live_id.clone())
            .unwrap_or_default();
        info!(live_id = %live_id, "powering off console");
        self.send_message(
            MessageType::PowerOff,
            CORE_CHANNEL_ID,
            &MessagePayload::PowerOff(PowerOff { live_id }),
            true,
        );
        self.apply_update(&StatusUpdate::powered_off());
        self.end_session(now, DisconnectReason::PoweredOff);
        self.complete(token, Ok(Response::Sent));
    }

    /// Ask the console to save a clip of the last `seconds` of gameplay.
    pub fn record_game_dvr(&mut self, token: CommandToken, seconds: u32) {
        if let Err(err) = self.ready() {
            self.complete(token, Err(err));
            return;
        }
        if seconds == 0 {
            self.complete(token, Err(CommandError::InvalidCommand("clip length must be positive".into())));
            return;
        }
        info!(seconds, "recording game clip");
        let payload = MessagePayload::GameDvrRecord(GameDvrRecord::last(seconds));
        let result = match self.send_message(MessageType::GameDvrRecord, CORE_CHANNEL_ID, &payload, true) {
            Some(_) => Ok(Response::Sent),
            None => Err(CommandError::InvalidCommand("game dvr record".into())),
        };
        self.complete(token, result);
    }

    fn ready(&self) -> Result<(), CommandError> {
        if self.closed {
            Err(CommandError::SessionClosed)
        } else if self.state != SessionState::Authenticated {
            Err(CommandError::NotAuthenticated(self.state))
        } else {
            Ok(())
        }
    }

    /// A fatal transport error ends the session for good.
    pub fn transport_failed(&mut self, now: Instant, error: &TransportError) {
        if self.closed {
            return;
        }
        warn!(%error, "transport failed");
        let detail = error.to_string();
        match self.state {
            SessionState::Authenticated => {
                self.end_session(now, DisconnectReason::TransportFailed(detail.clone()))
            }
            SessionState::Discovering | SessionState::Connecting | SessionState::Connected => {
                self.fail_connect(ConnectError::Transport(detail.clone()))
            }
            SessionState::Disconnected => {}
        }
        self.emit(SessionEvent::Error {
            kind: ErrorKind::Transport,
            detail,
        });
        self.closed = true;
        self.outputs.push_back(Output::Release);
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    pub fn handle_tick(&mut self, now: Instant) {
        let expired = self.deadline.is_some_and(|d| now >= d);
        match self.state {
            SessionState::Discovering if expired => {
                if self.attempts >= self.config.discovery_attempts {
                    self.fail_connect(ConnectError::DiscoveryTimeout);
                } else {
                    self.send_discovery(now);
                }
            }
            SessionState::Connecting if expired => {
                if self.attempts >= self.config.connect_attempts {
                    self.fail_connect(ConnectError::HandshakeTimeout);
                } else {
                    self.send_connect_request(now);
                }
            }
            SessionState::Connected if expired => {
                self.send_disconnect();
                self.fail_connect(ConnectError::HandshakeTimeout);
            }
            SessionState::Authenticated => {
                if now.saturating_duration_since(self.last_inbound_at) >= self.config.connection_loss_after() {
                    warn!("no traffic from console, connection lost");
                    self.end_session(now, DisconnectReason::ConnectionLost);
                } else {
                    if now >= self.next_heartbeat {
                        self.send_heartbeat();
                        self.next_heartbeat = now + self.config.heartbeat_interval;
                    }
                    self.retry_channel_opens(now);
                }
            }
            _ => {}
        }
        self.expire_commands(now);
        self.fragments.sweep(now);
    }

    fn expire_commands(&mut self, now: Instant) {
        let mut expired: Vec<CommandToken> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.deadline)
            .map(|(token, _)| *token)
            .collect();
        expired.sort_unstable();
        for token in expired {
            self.pending.remove(&token);
            debug!(token, "command timed out");
            self.complete(token, Err(CommandError::Timeout));
        }
    }

    // ------------------------------------------------------------------------
    // Inbound datagrams
    // ------------------------------------------------------------------------

    pub fn handle_datagram(&mut self, now: Instant, from: SocketAddr, data: &[u8]) {
        if self.closed || self.state == SessionState::Disconnected {
            debug!(%from, "datagram while disconnected, dropping");
            return;
        }
        let packet = match decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%from, error = %e, "undecodable datagram, dropping");
                return;
            }
        };
        let from_console = self.console.as_ref().is_some_and(|c| c.address == from);
        match (self.state, packet) {
            (SessionState::Discovering, Packet::Simple(SimplePacket::DiscoveryResponse(response))) => {
                self.on_discovery_response(now, from, response)
            }
            (SessionState::Connecting, Packet::Simple(SimplePacket::ConnectResponse(response))) if from_console => {
                self.on_connect_response(now, response)
            }
            (SessionState::Connected | SessionState::Authenticated, Packet::Message(message)) if from_console => {
                self.on_message(now, message)
            }
            (state, packet) => {
                debug!(%from, ?state, packet_type = ?packet.packet_type(), "unexpected packet, dropping")
            }
        }
    }

    fn on_discovery_response(&mut self, now: Instant, from: SocketAddr, response: DiscoveryResponse) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let cert = match ConsoleCertificate::parse(&response.certificate) {
            Ok(cert) => cert,
            Err(e) if from == target.address => {
                self.fail_connect(ConnectError::HandshakeFailed(format!("console certificate: {e}")));
                return;
            }
            Err(e) => {
                debug!(%from, error = %e, "ignoring discovery response with bad certificate");
                return;
            }
        };
        let matches = if target.live_id.is_empty() {
            from.ip() == target.address.ip()
        } else {
            cert.live_id.eq_ignore_ascii_case(&target.live_id)
        };
        if !matches {
            debug!(%from, live_id = %cert.live_id, "discovery response from another console");
            return;
        }

        info!(%from, name = %response.name, live_id = %cert.live_id, "console discovered");
        self.console = Some(ConsoleInfo {
            name: response.name,
            uuid: response.uuid,
            live_id: cert.live_id,
            address: from,
            participant_id: 0,
        });
        self.peer_key = Some(cert.public_key);
        self.attempts = 0;
        self.set_state(SessionState::Connecting);
        self.start_handshake(now);
    }

    fn on_connect_response(&mut self, now: Instant, response: ConnectResponse) {
        let Some(cipher) = self.cipher.as_ref() else {
            return;
        };
        let protected = match cipher.open_connect_response(&response) {
            Ok(protected) => protected,
            Err(e) => {
                self.fail_connect(ConnectError::HandshakeFailed(format!("connect response rejected: {e}")));
                return;
            }
        };
        match protected.result {
            ConnectResult::Success => {
                self.participant_id = protected.participant_id;
                if let Some(console) = self.console.as_mut() {
                    console.participant_id = protected.participant_id;
                }
                info!(participant_id = protected.participant_id, "handshake complete");
                self.last_inbound = None;
                self.channels.clear();
                self.fragments.clear();
                self.set_state(SessionState::Connected);
                self.send_local_join(now);
            }
            ConnectResult::Pending => {
                debug!("console reports connect pending");
                self.deadline = Some(now + self.config.connect_interval);
            }
            result if result.is_auth_failure() => {
                warn!(?result, "console rejected credentials");
                self.fail_connect(ConnectError::AuthRejected(format!("{result:?}")));
            }
            result => {
                warn!(?result, "console refused connection");
                self.fail_connect(ConnectError::HandshakeFailed(format!("{result:?}")));
            }
        }
    }

    fn on_message(&mut self, now: Instant, packet: MessagePacket) {
        let Some(cipher) = self.cipher.as_ref() else {
            return;
        };
        let mut plain = match cipher.open_message(&packet) {
            Ok(plain) => plain,
            Err(e) => {
                debug!(sequence = packet.header.sequence, error = %e, "discarding message");
                return;
            }
        };

        let header = packet.header;
        if self.last_inbound.is_some_and(|last| header.sequence <= last) {
            debug!(sequence = header.sequence, last = ?self.last_inbound, "stale sequence, dropping");
            // The console repeats a message until it sees the ack.
            if header.flags.need_ack {
                self.send_ack(header.sequence);
            }
            return;
        }
        self.last_inbound = Some(header.sequence);
        self.last_inbound_at = now;

        if header.flags.need_ack {
            self.send_ack(header.sequence);
        }

        let message_type = header.flags.message_type;
        if header.flags.is_fragment {
            let fragment = match Fragment::decode(&plain) {
                Ok(fragment) => fragment,
                Err(e) => {
                    debug!(error = %e, "bad fragment, dropping");
                    return;
                }
            };
            match self
                .fragments
                .push(now, header.channel_id, message_type, header.sequence, fragment)
            {
                Some(full) => plain = full,
                None => return,
            }
        }

        let payload = match MessagePayload::decode(message_type, &plain) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(?message_type, error = %e, "undecodable payload, dropping");
                return;
            }
        };

        match self.state {
            SessionState::Connected => self.on_join_message(now, payload),
            SessionState::Authenticated => self.on_session_message(now, header.channel_id, payload),
            _ => {}
        }
    }

    fn on_join_message(&mut self, now: Instant, payload: MessagePayload) {
        match payload {
            MessagePayload::Ack(ack) if self.join_sequence.is_some_and(|seq| ack.acknowledges(seq)) => {
                self.authenticate(now)
            }
            MessagePayload::Disconnect(d) => {
                warn!(reason = d.reason, error = d.error_code, "console refused local join");
                self.fail_connect(ConnectError::AuthRejected(format!(
                    "console disconnected during join (reason {}, error {:#x})",
                    d.reason, d.error_code
                )));
            }
            MessagePayload::ConsoleStatus(status) => self.held_status = Some(status),
            other => debug!(message_type = ?other.message_type(), "message before authentication, dropping"),
        }
    }

    fn authenticate(&mut self, now: Instant) {
        info!("session authenticated");
        self.join_sequence = None;
        self.deadline = None;
        self.last_inbound_at = now;
        self.next_heartbeat = now + self.config.heartbeat_interval;
        self.device_info_sent = false;
        self.tracker.rearm();
        self.set_state(SessionState::Authenticated);
        if let Some(console) = self.console.clone() {
            self.outputs.push_back(Output::Connected(Ok(console)));
        }
        if let Some(status) = self.held_status.take() {
            self.apply_console_status(&status);
        }
        if self.config.auto_open_media {
            self.open_channel(now, ChannelKind::Media);
        }
    }

    fn on_session_message(&mut self, now: Instant, channel_id: u64, payload: MessagePayload) {
        match payload {
            MessagePayload::Ack(_) => {}
            MessagePayload::ConsoleStatus(status) => self.apply_console_status(&status),
            MessagePayload::StartChannelResponse(response) => self.on_channel_response(now, response),
            MessagePayload::StopChannel(stop) => {
                if let Some(kind) = self.channels.close(stop.target_channel_id) {
                    info!(channel = %kind, "console stopped channel");
                }
            }
            MessagePayload::MediaState(_)
            | MessagePayload::MediaControllerRemoved(_)
            | MessagePayload::MediaCommandResult(_)
            | MessagePayload::Json(_)
                if self.channels.kind_of(channel_id) != channel_for(&payload) =>
            {
                debug!(
                    message_type = ?payload.message_type(),
                    channel_id,
                    "message on the wrong channel, dropping"
                );
            }
            MessagePayload::MediaState(media) => self.apply_update(&StatusUpdate::from_media_state(&media)),
            MessagePayload::MediaControllerRemoved(_) => self.apply_update(&StatusUpdate::media_removed()),
            MessagePayload::MediaCommandResult(result) => {
                let token = self.find_pending(|stage| matches!(stage, Stage::AwaitingMedia(id) if *id == result.request_id));
                match token {
                    Some(token) => {
                        self.pending.remove(&token);
                        self.complete(token, Ok(Response::MediaResult(result.result)));
                    }
                    None => debug!(request_id = result.request_id, "media result for unknown request"),
                }
            }
            MessagePayload::Json(json) => self.on_json(channel_id, &json.text),
            MessagePayload::Disconnect(d) => {
                info!(reason = d.reason, "console closed the session");
                if d.reason == disconnect_reason::POWER_OFF {
                    self.apply_update(&StatusUpdate::powered_off());
                }
                self.end_session(now, DisconnectReason::ConsoleDisconnected(d.reason));
            }
            other => debug!(message_type = ?other.message_type(), channel_id, "unhandled message"),
        }
    }

    fn on_json(&mut self, channel_id: u64, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(channel_id, error = %e, "invalid json message");
                return;
            }
        };
        if let Some(msgid) = value.get("msgid").and_then(Value::as_str) {
            let token = self.find_pending(|stage| matches!(stage, Stage::AwaitingJson(id) if id == msgid));
            if let Some(token) = token {
                self.pending.remove(&token);
                self.complete(token, Ok(Response::Json(value)));
                return;
            }
        }
        match StatusUpdate::from_tv_remote(&value) {
            Some(update) => self.apply_update(&update),
            None => debug!(channel_id, "unsolicited json ignored"),
        }
    }

    fn on_channel_response(&mut self, now: Instant, response: StartChannelResponse) {
        match self.channels.complete_open(&response) {
            None => debug!(request_id = response.channel_request_id, "unexpected channel response"),
            Some(OpenResult::Opened { kind, channel_id }) => {
                info!(channel = %kind, channel_id, "channel open");
                for (token, pending) in self.take_waiting_for(kind) {
                    if let Stage::AwaitingChannel(command) = pending.stage {
                        self.dispatch_command(now, token, command, channel_id, pending.deadline);
                    }
                }
            }
            Some(OpenResult::Rejected { kind, result }) => {
                warn!(channel = %kind, result, "console refused channel");
                for (token, _) in self.take_waiting_for(kind) {
                    self.complete(token, Err(CommandError::ChannelRejected { channel: kind, result }));
                }
                self.emit(SessionEvent::Error {
                    kind: ErrorKind::Channel,
                    detail: format!("{kind} channel rejected with result {result:#x}"),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn open_channel(&mut self, now: Instant, kind: ChannelKind) {
        if let Some(request) = self.channels.begin_open(now, kind, 0) {
            debug!(channel = %kind, request_id = request.channel_request_id, "opening channel");
            self.send_channel_request(request);
        }
    }

    fn send_channel_request(&mut self, request: StartChannelRequest) {
        self.send_message(
            MessageType::StartChannelRequest,
            CORE_CHANNEL_ID,
            &MessagePayload::StartChannelRequest(request),
            true,
        );
    }

    /// Resend unanswered opens; fail commands queued behind an abandoned one.
    fn retry_channel_opens(&mut self, now: Instant) {
        let retries = self.channels.due_retries(now);
        for request in retries.resend {
            debug!(request_id = request.channel_request_id, "resending channel request");
            self.send_channel_request(request);
        }
        for kind in retries.abandoned {
            warn!(channel = %kind, "no answer to channel request, giving up");
            for (token, _) in self.take_waiting_for(kind) {
                self.complete(token, Err(CommandError::Timeout));
            }
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Channel,
                detail: format!("{kind} channel did not open"),
            });
        }
    }

    fn dispatch_command(
        &mut self,
        now: Instant,
        token: CommandToken,
        command: Command,
        channel_id: u64,
        deadline: Instant,
    ) {
        match command {
            Command::Input(button) => {
                let timestamp = now.saturating_duration_since(self.started).as_millis() as u64;
                let press = Gamepad {
                    timestamp,
                    ..Gamepad::pressed(button)
                };
                let release = Gamepad {
                    timestamp: timestamp + 1,
                    ..Gamepad::released()
                };
                self.send_message(MessageType::Gamepad, channel_id, &MessagePayload::Gamepad(press), false);
                self.send_message(MessageType::Gamepad, channel_id, &MessagePayload::Gamepad(release), false);
                self.complete(token, Ok(Response::Sent));
            }
            Command::Media { control, seek } => {
                let request_id = self.next_media_request;
                self.next_media_request += 1;
                let payload = MessagePayload::MediaCommand(MediaCommand {
                    request_id,
                    title_id: self.tracker.snapshot().title_id.unwrap_or(0),
                    command: control,
                    seek_position: seek,
                });
                if self.send_message(MessageType::MediaCommand, channel_id, &payload, false).is_some() {
                    self.pending.insert(
                        token,
                        Pending {
                            deadline,
                            stage: Stage::AwaitingMedia(request_id),
                        },
                    );
                } else {
                    self.complete(token, Err(CommandError::InvalidCommand(format!("{control:?}"))));
                }
            }
            Command::TvRemote(request) => {
                let msgid = format!("xsg.{}", self.next_msgid);
                self.next_msgid += 1;
                let payload = MessagePayload::Json(JsonMessage {
                    text: request.to_json(&msgid).to_string(),
                });
                if self.send_message(MessageType::Json, channel_id, &payload, false).is_none() {
                    self.complete(token, Err(CommandError::InvalidCommand(request.name().into())));
                } else if request.expects_response() {
                    self.pending.insert(
                        token,
                        Pending {
                            deadline,
                            stage: Stage::AwaitingJson(msgid),
                        },
                    );
                } else {
                    self.complete(token, Ok(Response::Sent));
                }
            }
        }
    }

    fn find_pending(&self, pred: impl Fn(&Stage) -> bool) -> Option<CommandToken> {
        self.pending
            .iter()
            .find(|(_, p)| pred(&p.stage))
            .map(|(token, _)| *token)
    }

    /// Remove commands queued behind `kind`, in submission order.
    fn take_waiting_for(&mut self, kind: ChannelKind) -> Vec<(CommandToken, Pending)> {
        let mut tokens: Vec<CommandToken> = self
            .pending
            .iter()
            .filter(|(_, p)| matches!(&p.stage, Stage::AwaitingChannel(c) if c.channel() == kind))
            .map(|(token, _)| *token)
            .collect();
        tokens.sort_unstable();
        tokens
            .into_iter()
            .filter_map(|token| self.pending.remove(&token).map(|p| (token, p)))
            .collect()
    }

    fn complete(&mut self, token: CommandToken, result: Result<Response, CommandError>) {
        self.outputs.push_back(Output::CommandDone { token, result });
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    fn send_discovery(&mut self, now: Instant) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let to = target.address;
        self.attempts += 1;
        self.deadline = Some(now + self.config.discovery_interval);
        debug!(%to, attempt = self.attempts, "sending discovery request");
        match SimplePacket::DiscoveryRequest(DiscoveryRequest::default()).encode() {
            Ok(data) => self.outputs.push_back(Output::Transmit { to, data }),
            Err(e) => warn!(error = %e, "could not encode discovery request"),
        }
    }

    fn start_handshake(&mut self, now: Instant) {
        let Some(peer_key) = self.peer_key else {
            return;
        };
        let key_pair = KeyPair::generate();
        match derive_session_keys(&key_pair, &peer_key) {
            Ok(keys) => {
                self.cipher = Some(PacketCipher::new(keys));
                self.key_pair = Some(key_pair);
                self.send_connect_request(now);
            }
            Err(e) => self.fail_connect(ConnectError::HandshakeFailed(format!("console key: {e}"))),
        }
    }

    fn send_connect_request(&mut self, now: Instant) {
        let (Some(cipher), Some(key_pair), Some(console)) = (&self.cipher, &self.key_pair, &self.console) else {
            return;
        };
        let to = console.address;
        let auth = self.config.auth_token.clone().unwrap_or_default();
        let payload = ConnectRequestProtected {
            user_hash: auth.user_hash,
            auth_token: auth.token,
            request_num: 0,
            group_start: 0,
            group_end: 1,
        };
        let sealed = random_iv()
            .and_then(|iv| cipher.seal_connect_request(self.client_uuid, &key_pair.public_bytes(), iv, &payload))
            .and_then(|request| Ok(SimplePacket::ConnectRequest(request).encode()?));
        match sealed {
            Ok(data) => {
                self.attempts += 1;
                self.deadline = Some(now + self.config.connect_interval);
                debug!(%to, attempt = self.attempts, "sending connect request");
                self.outputs.push_back(Output::Transmit { to, data });
            }
            Err(e) => self.fail_connect(ConnectError::HandshakeFailed(format!("connect request: {e}"))),
        }
    }

    fn send_local_join(&mut self, now: Instant) {
        let join = MessagePayload::LocalJoin(self.config.local_join.clone());
        self.join_sequence = self.send_message(MessageType::LocalJoin, CORE_CHANNEL_ID, &join, true);
        self.deadline = Some(now + self.config.auth_timeout);
        self.last_inbound_at = now;
    }

    fn send_ack(&mut self, sequence: u32) {
        let ack = MessagePayload::Ack(Ack {
            low_watermark: sequence,
            processed: vec![sequence],
            rejected: vec![],
        });
        self.send_message(MessageType::Ack, ACK_CHANNEL_ID, &ack, false);
    }

    fn send_heartbeat(&mut self) {
        let ack = MessagePayload::Ack(Ack {
            low_watermark: self.last_inbound.unwrap_or(0),
            processed: vec![],
            rejected: vec![],
        });
        self.send_message(MessageType::Ack, ACK_CHANNEL_ID, &ack, true);
    }

    fn send_disconnect(&mut self) {
        let payload = MessagePayload::Disconnect(Disconnect {
            reason: disconnect_reason::APP_CLOSE,
            error_code: 0,
        });
        self.send_message(MessageType::Disconnect, CORE_CHANNEL_ID, &payload, false);
    }

    /// Encrypt and queue one message; returns its sequence number.
    fn send_message(
        &mut self,
        message_type: MessageType,
        channel_id: u64,
        payload: &MessagePayload,
        need_ack: bool,
    ) -> Option<u32> {
        let (cipher, console) = (self.cipher.as_ref()?, self.console.as_ref()?);
        let to = console.address;
        let plaintext = match payload.encode() {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(?message_type, error = %e, "could not encode payload");
                return None;
            }
        };
        let sequence = self.next_sequence;
        let mut flags = MessageFlags::new(message_type);
        flags.need_ack = need_ack;
        let header = MessageHeader {
            protected_len: 0,
            sequence,
            target_participant: 0,
            source_participant: self.participant_id,
            flags,
            channel_id,
        };
        let data = match cipher
            .seal_message(header, &plaintext)
            .and_then(|packet| Ok(packet.encode()?))
        {
            Ok(data) => data,
            Err(e) => {
                warn!(?message_type, error = %e, "could not seal message");
                return None;
            }
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.outputs.push_back(Output::Transmit { to, data });
        Some(sequence)
    }

    // ------------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------------

    fn apply_console_status(&mut self, status: &ConsoleStatus) {
        if !self.device_info_sent {
            self.device_info_sent = true;
            self.emit(SessionEvent::DeviceInfo {
                firmware: status.firmware_revision(),
                locale: status.locale.clone(),
            });
        }
        self.apply_update(&StatusUpdate::from_console_status(status));
    }

    fn apply_update(&mut self, update: &StatusUpdate) {
        if let Some(state) = self.tracker.apply(update) {
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn fail_connect(&mut self, error: ConnectError) {
        warn!(%error, "connect failed");
        self.teardown();
        self.set_state(SessionState::Disconnected);
        self.outputs.push_back(Output::Connected(Err(error.clone())));
        self.emit(SessionEvent::Error {
            kind: error.kind(),
            detail: error.to_string(),
        });
    }

    fn end_session(&mut self, _now: Instant, reason: DisconnectReason) {
        if self.state != SessionState::Authenticated {
            return;
        }
        if matches!(reason, DisconnectReason::Requested) {
            self.send_disconnect();
        }
        info!(?reason, "session ended");
        self.teardown();
        self.set_state(SessionState::Disconnected);
        self.emit(SessionEvent::Disconnected(reason));
    }

    /// Drop all per-handshake material and cancel pending commands.
    fn teardown(&mut self) {
        self.cipher = None;
        self.key_pair = None;
        self.deadline = None;
        self.join_sequence = None;
        self.held_status = None;
        self.last_inbound = None;
        self.channels.clear();
        self.fragments.clear();
        let mut tokens: Vec<CommandToken> = self.pending.keys().copied().collect();
        tokens.sort_unstable();
        for token in tokens {
            self.pending.remove(&token);
            self.complete(token, Err(CommandError::SessionClosed));
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state");
            self.state = state;
            self.outputs.push_back(Output::State(state));
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.outputs.push_back(Output::Event(event));
    }
}

/// Channel a channel-scoped message must arrive on.
fn channel_for(payload: &MessagePayload) -> Option<ChannelKind> {
    match payload {
        MessagePayload::MediaState(_)
        | MessagePayload::MediaControllerRemoved(_)
        | MessagePayload::MediaCommandResult(_) => Some(ChannelKind::Media),
        MessagePayload::Json(_) => Some(ChannelKind::TvRemote),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr() -> SocketAddr {
        "192.168.1.50:5050".parse().unwrap()
    }

    fn drain(machine: &mut SessionMachine) -> Vec<Output> {
        std::iter::from_fn(|| machine.poll_output()).collect()
    }

    #[test]
    fn command_while_disconnected_never_transmits() {
        let now = Instant::now();
        let mut machine = SessionMachine::new(SessionConfig::default(), now);
        machine.submit(now, 1, Command::Input(xsg_proto::GamepadButton::A));
        assert_eq!(
            drain(&mut machine),
            vec![Output::CommandDone {
                token: 1,
                result: Err(CommandError::NotAuthenticated(SessionState::Disconnected)),
            }]
        );
    }

    #[test]
    fn discovery_retries_then_times_out() {
        let now = Instant::now();
        let config = SessionConfig::default();
        let interval = config.discovery_interval;
        let mut machine = SessionMachine::new(config, now);
        machine.connect(now, addr(), "FD00112233FFEE66");

        let mut transmits = 0;
        let mut result = None;
        for step in 0..20u32 {
            machine.handle_tick(now + interval * step);
            for output in drain(&mut machine) {
                match output {
                    Output::Transmit { to, .. } => {
                        assert_eq!(to, addr());
                        transmits += 1;
                    }
                    Output::Connected(r) => result = Some(r),
                    _ => {}
                }
            }
        }
        assert_eq!(transmits, 5);
        assert_eq!(result, Some(Err(ConnectError::DiscoveryTimeout)));
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn second_connect_reports_in_progress() {
        let now = Instant::now();
        let mut machine = SessionMachine::new(SessionConfig::default(), now);
        machine.connect(now, addr(), "");
        drain(&mut machine);
        machine.connect(now, addr(), "");
        assert_eq!(drain(&mut machine), vec![Output::Connected(Err(ConnectError::InProgress))]);
    }

    #[test]
    fn disconnect_is_terminal() {
        let now = Instant::now();
        let mut machine = SessionMachine::new(SessionConfig::default(), now);
        machine.connect(now, addr(), "");
        drain(&mut machine);
        machine.disconnect(now);
        let outputs = drain(&mut machine);
        assert!(outputs.contains(&Output::Connected(Err(ConnectError::SessionClosed))));
        assert!(outputs.contains(&Output::Release));
        assert!(machine.is_closed());

        machine.connect(now + Duration::from_secs(1), addr(), "");
        assert_eq!(drain(&mut machine), vec![Output::Connected(Err(ConnectError::SessionClosed))]);
    }

    #[test]
    fn game_clip_needs_an_authenticated_session() {
        let now = Instant::now();
        let mut machine = SessionMachine::new(SessionConfig::default(), now);
        machine.record_game_dvr(7, 60);
        assert_eq!(
            drain(&mut machine),
            vec![Output::CommandDone {
                token: 7,
                result: Err(CommandError::NotAuthenticated(SessionState::Disconnected)),
            }]
        );
    }

    #[test]
    fn garbage_is_ignored() {
        let now = Instant::now();
        let mut machine = SessionMachine::new(SessionConfig::default(), now);
        machine.connect(now, addr(), "");
        drain(&mut machine);
        machine.handle_datagram(now, addr(), &[0xde, 0xad, 0xbe, 0xef]);
        machine.handle_datagram(now, addr(), &[0xd0]);
        assert!(drain(&mut machine).is_empty());
        assert_eq!(machine.state(), SessionState::Discovering);
    }
}
