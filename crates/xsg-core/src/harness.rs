//! Test harness: a scripted console on a [`MemoryNetwork`].
//!
//! [`FakeConsole`] answers discovery and the connect handshake with a real
//! certificate and key, acknowledges the local join, serves channel opens,
//! media commands and tv-remote queries, and can be steered from a test
//! (push status, go silent, disconnect).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;
use xsg_crypto::{derive_session_keys, random_iv, CryptoError, KeyPair, PacketCipher};
use xsg_proto::{
    decode, Ack, ActiveTitle, ConnectRequest, ConnectResponseProtected, ConnectResult, ConsoleStatus, Disconnect,
    DiscoveryResponse, Fragment, JsonMessage, MediaCommand, MediaCommandResult, MediaState, MessageFlags,
    MessageHeader, MessagePacket, MessagePayload, MessageType, Packet, PlaybackStatus, SimplePacket, SoundLevel,
    StartChannelRequest, StartChannelResponse, ACK_CHANNEL_ID, CORE_CHANNEL_ID,
};
use xsg_transport::{DatagramTransport, MemoryNetwork, MemoryTransport};

use crate::channel::ChannelKind;

/// Where tests bind the client.
pub const CLIENT_ADDR: &str = "192.168.1.20:41000";
/// Where the fake console listens by default.
pub const CONSOLE_ADDR: &str = "192.168.1.50:5050";
pub const CONSOLE_LIVE_ID: &str = "FD00112233FFEE66";

/// Client type a console reports in its discovery response.
const CONSOLE_CLIENT_TYPE: u16 = 0x01;
const PARTICIPANT_ID: u32 = 31;
const FIRST_CHANNEL_ID: u64 = 0x97;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("certificate generation failed: {0}")]
    Certificate(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// How the fake console responds.
#[derive(Debug, Clone)]
pub struct ConsoleBehavior {
    pub name: String,
    pub live_id: String,
    pub connect_result: ConnectResult,
    /// Answer the local join with Disconnect instead of an Ack.
    pub reject_join: bool,
    /// Sent right after the join is acknowledged.
    pub initial_status: Option<ConsoleStatus>,
    /// Sent on the media channel once it opens.
    pub media_state: Option<MediaState>,
    /// Result code for every start-channel request; 0 opens.
    pub channel_result: u32,
    pub media_result: u32,
    /// Split tv-remote JSON responses into this many fragments.
    pub json_fragments: u32,
    /// Ignore this many start-channel requests before serving any.
    pub drop_channel_requests: u32,
}

impl Default for ConsoleBehavior {
    fn default() -> Self {
        Self {
            name: "XboxOne".into(),
            live_id: CONSOLE_LIVE_ID.into(),
            connect_result: ConnectResult::Success,
            reject_join: false,
            initial_status: Some(console_status(0x162615ad, "Microsoft.Xbox.Dashboard_8wekyb3d8bbwe!Xbox.Dashboard.Application")),
            media_state: None,
            channel_result: 0,
            media_result: 0,
            json_fragments: 1,
            drop_channel_requests: 0,
        }
    }
}

/// Steering commands for a running console.
#[derive(Debug, Clone)]
pub enum ConsoleControl {
    SendStatus(ConsoleStatus),
    /// Send a status with a caller-chosen sequence number.
    SendStatusWithSequence {
        status: ConsoleStatus,
        sequence: u32,
        need_ack: bool,
    },
    SendMediaState(MediaState),
    SendJson(Value),
    /// Send any payload on the core channel.
    SendOnCore(MessagePayload),
    /// Stop answering anything until `Resume`.
    GoSilent,
    Resume,
    Disconnect(u32),
}

/// A message the console received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMessage {
    pub message_type: MessageType,
    pub sequence: u32,
    pub channel_id: u64,
    pub need_ack: bool,
    /// Sequences listed as processed, for acks.
    pub acked: Vec<u32>,
}

pub struct FakeConsole {
    address: SocketAddr,
    live_id: String,
    control: mpsc::UnboundedSender<ConsoleControl>,
    seen: Arc<Mutex<Vec<SeenMessage>>>,
    task: JoinHandle<()>,
}

impl FakeConsole {
    /// Bind a console at [`CONSOLE_ADDR`] and start answering.
    pub fn spawn(network: &MemoryNetwork, behavior: ConsoleBehavior) -> Result<Self, HarnessError> {
        let address: SocketAddr = CONSOLE_ADDR
            .parse()
            .map_err(|e: std::net::AddrParseError| HarnessError::Certificate(e.to_string()))?;
        Self::spawn_at(network, address, behavior)
    }

    pub fn spawn_at(
        network: &MemoryNetwork,
        address: SocketAddr,
        behavior: ConsoleBehavior,
    ) -> Result<Self, HarnessError> {
        let (identity, certificate) = console_identity(&behavior.live_id)?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let live_id = behavior.live_id.clone();

        let console = ConsoleTask {
            transport: network.bind(address),
            identity,
            certificate,
            uuid: Uuid::new_v4().hyphenated().to_string().to_uppercase(),
            behavior,
            cipher: None,
            client: None,
            next_sequence: 1,
            channels: HashMap::new(),
            next_channel_id: FIRST_CHANNEL_ID,
            dropped_channel_requests: 0,
            silent: false,
            seen: seen.clone(),
        };
        let task = tokio::spawn(console.run(control_rx));

        Ok(Self {
            address,
            live_id,
            control: control_tx,
            seen,
            task,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn live_id(&self) -> &str {
        &self.live_id
    }

    pub fn control(&self, control: ConsoleControl) {
        let _ = self.control.send(control);
    }

    /// Every message received from the client, in arrival order.
    pub fn seen(&self) -> Vec<SeenMessage> {
        self.seen.lock().clone()
    }

    pub fn seen_count(&self, message_type: MessageType) -> usize {
        self.seen.lock().iter().filter(|m| m.message_type == message_type).count()
    }

    /// How many acks from the client covered `sequence`.
    pub fn acks_for(&self, sequence: u32) -> usize {
        self.seen.lock().iter().filter(|m| m.acked.contains(&sequence)).count()
    }

    /// Acks from the client that ask for an ack back.
    pub fn heartbeats(&self) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|m| m.message_type == MessageType::Ack && m.need_ack)
            .count()
    }
}

impl Drop for FakeConsole {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A status with one focused title.
pub fn console_status(title_id: u32, aum: &str) -> ConsoleStatus {
    ConsoleStatus {
        live_tv_provider: 0,
        major_version: 10,
        minor_version: 0,
        build_number: 22621,
        locale: "en-US".into(),
        active_titles: vec![ActiveTitle {
            title_id,
            has_focus: true,
            title_location: 0,
            product_id: Uuid::nil(),
            sandbox_id: Uuid::nil(),
            aum: aum.into(),
        }],
    }
}

pub fn media_state(playback_status: PlaybackStatus, sound_level: SoundLevel) -> MediaState {
    MediaState {
        title_id: 0x162615ad,
        aum_id: "Microsoft.Xbox.Dashboard_8wekyb3d8bbwe!Xbox.Dashboard.Application".into(),
        asset_id: String::new(),
        media_type: 0,
        sound_level,
        enabled_commands: 0,
        playback_status,
        rate: 1.0,
        position: 0,
        media_start: 0,
        media_end: 0,
        min_seek: 0,
        max_seek: 0,
        metadata: vec![("title".into(), "Test".into())],
    }
}

fn console_identity(live_id: &str) -> Result<(KeyPair, Vec<u8>), HarnessError> {
    let cert_err = |e: rcgen::Error| HarnessError::Certificate(e.to_string());
    let key_pair = rcgen::KeyPair::generate().map_err(cert_err)?;
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).map_err(cert_err)?;
    params.distinguished_name.push(rcgen::DnType::CommonName, live_id);
    let cert = params.self_signed(&key_pair).map_err(cert_err)?;
    let identity = KeyPair::from_pkcs8_der(&key_pair.serialize_der())?;
    Ok((identity, cert.der().to_vec()))
}

// ============================================================================
// Console task
// ============================================================================

struct ConsoleTask {
    transport: MemoryTransport,
    identity: KeyPair,
    certificate: Vec<u8>,
    uuid: String,
    behavior: ConsoleBehavior,
    cipher: Option<PacketCipher>,
    client: Option<SocketAddr>,
    next_sequence: u32,
    channels: HashMap<ChannelKind, u64>,
    next_channel_id: u64,
    dropped_channel_requests: u32,
    silent: bool,
    seen: Arc<Mutex<Vec<SeenMessage>>>,
}

impl ConsoleTask {
    async fn run(mut self, mut control: mpsc::UnboundedReceiver<ConsoleControl>) {
        loop {
            tokio::select! {
                datagram = self.transport.recv_from() => match datagram {
                    Ok(datagram) => {
                        if !self.silent {
                            self.on_datagram(datagram.peer, &datagram.data).await;
                        }
                    }
                    Err(_) => break,
                },
                command = control.recv() => match command {
                    Some(command) => self.on_control(command).await,
                    None => break,
                },
            }
        }
    }

    async fn on_control(&mut self, control: ConsoleControl) {
        match control {
            ConsoleControl::SendStatus(status) => {
                self.send(MessageType::ConsoleStatus, CORE_CHANNEL_ID, &MessagePayload::ConsoleStatus(status), false)
                    .await
            }
            ConsoleControl::SendStatusWithSequence {
                status,
                sequence,
                need_ack,
            } => {
                let saved = self.next_sequence;
                self.next_sequence = sequence;
                self.send(
                    MessageType::ConsoleStatus,
                    CORE_CHANNEL_ID,
                    &MessagePayload::ConsoleStatus(status),
                    need_ack,
                )
                .await;
                self.next_sequence = saved.max(sequence.wrapping_add(1));
            }
            ConsoleControl::SendMediaState(state) => {
                let channel = self.channels.get(&ChannelKind::Media).copied().unwrap_or(CORE_CHANNEL_ID);
                self.send(MessageType::MediaState, channel, &MessagePayload::MediaState(state), false)
                    .await
            }
            ConsoleControl::SendJson(value) => {
                let channel = self.channels.get(&ChannelKind::TvRemote).copied().unwrap_or(CORE_CHANNEL_ID);
                let json = MessagePayload::Json(JsonMessage { text: value.to_string() });
                self.send(MessageType::Json, channel, &json, false).await
            }
            ConsoleControl::SendOnCore(payload) => {
                self.send(payload.message_type(), CORE_CHANNEL_ID, &payload, false).await
            }
            ConsoleControl::GoSilent => self.silent = true,
            ConsoleControl::Resume => self.silent = false,
            ConsoleControl::Disconnect(reason) => {
                let payload = MessagePayload::Disconnect(Disconnect { reason, error_code: 0 });
                self.send(MessageType::Disconnect, CORE_CHANNEL_ID, &payload, false).await;
                self.reset();
            }
        }
    }

    async fn on_datagram(&mut self, from: SocketAddr, data: &[u8]) {
        match decode(data) {
            Ok(Packet::Simple(SimplePacket::DiscoveryRequest(_))) => self.answer_discovery(from).await,
            Ok(Packet::Simple(SimplePacket::ConnectRequest(request))) => self.answer_connect(from, request).await,
            Ok(Packet::Message(packet)) if self.client == Some(from) => self.on_message(packet).await,
            Ok(other) => debug!(%from, packet_type = ?other.packet_type(), "fake console ignoring packet"),
            Err(e) => debug!(%from, error = %e, "fake console got garbage"),
        }
    }

    async fn answer_discovery(&mut self, from: SocketAddr) {
        let response = SimplePacket::DiscoveryResponse(DiscoveryResponse {
            flags: 0,
            client_type: CONSOLE_CLIENT_TYPE,
            name: self.behavior.name.clone(),
            uuid: self.uuid.clone(),
            last_error: 0,
            certificate: self.certificate.clone(),
        });
        if let Ok(data) = response.encode() {
            let _ = self.transport.send_to(from, &data).await;
        }
    }

    async fn answer_connect(&mut self, from: SocketAddr, request: ConnectRequest) {
        let cipher = match derive_session_keys(&self.identity, &request.public_key) {
            Ok(keys) => PacketCipher::new(keys),
            Err(e) => {
                debug!(error = %e, "fake console cannot derive keys");
                return;
            }
        };
        if let Err(e) = cipher.open_connect_request(&request) {
            debug!(error = %e, "fake console rejected connect request");
            return;
        }
        let protected = ConnectResponseProtected {
            result: self.behavior.connect_result,
            pairing_state: 0,
            participant_id: PARTICIPANT_ID,
        };
        let sealed = random_iv().and_then(|iv| cipher.seal_connect_response(iv, &protected));
        let Ok(response) = sealed else {
            return;
        };
        if let Ok(data) = SimplePacket::ConnectResponse(response).encode() {
            let _ = self.transport.send_to(from, &data).await;
        }
        if self.behavior.connect_result == ConnectResult::Success {
            self.channels.clear();
            self.cipher = Some(cipher);
            self.client = Some(from);
        }
    }

    async fn on_message(&mut self, packet: MessagePacket) {
        let Some(cipher) = self.cipher.as_ref() else {
            return;
        };
        let Ok(plain) = cipher.open_message(&packet) else {
            debug!("fake console could not open message");
            return;
        };
        let header = packet.header;
        let message_type = header.flags.message_type;
        let decoded = MessagePayload::decode(message_type, &plain);
        let acked = match &decoded {
            Ok(MessagePayload::Ack(ack)) => ack.processed.clone(),
            _ => Vec::new(),
        };
        self.seen.lock().push(SeenMessage {
            message_type,
            sequence: header.sequence,
            channel_id: header.channel_id,
            need_ack: header.flags.need_ack,
            acked,
        });
        let Ok(payload) = decoded else {
            return;
        };

        match payload {
            MessagePayload::LocalJoin(_) if self.behavior.reject_join => {
                let payload = MessagePayload::Disconnect(Disconnect {
                    reason: xsg_proto::disconnect_reason::ERROR,
                    error_code: 0x8000_0005,
                });
                self.send(MessageType::Disconnect, CORE_CHANNEL_ID, &payload, false).await;
                self.reset();
            }
            MessagePayload::LocalJoin(_) => {
                self.ack(header.sequence).await;
                if let Some(status) = self.behavior.initial_status.clone() {
                    self.send(MessageType::ConsoleStatus, CORE_CHANNEL_ID, &MessagePayload::ConsoleStatus(status), false)
                        .await;
                }
            }
            MessagePayload::StartChannelRequest(request)
                if self.dropped_channel_requests < self.behavior.drop_channel_requests =>
            {
                self.dropped_channel_requests += 1;
                debug!(request_id = request.channel_request_id, "fake console dropping channel request");
            }
            MessagePayload::StartChannelRequest(request) => self.open_channel(header.sequence, request).await,
            MessagePayload::MediaCommand(command) => self.answer_media(header.channel_id, command).await,
            MessagePayload::Json(json) => self.answer_json(header.channel_id, &json.text).await,
            MessagePayload::Disconnect(_) | MessagePayload::PowerOff(_) => self.reset(),
            _ => {
                if header.flags.need_ack {
                    self.ack(header.sequence).await;
                }
            }
        }
    }

    async fn open_channel(&mut self, sequence: u32, request: StartChannelRequest) {
        self.ack(sequence).await;
        let kind = ChannelKind::from_service(&request.service);
        let channel_id = match (kind, self.behavior.channel_result) {
            (Some(kind), 0) => {
                let id = self.next_channel_id;
                self.next_channel_id += 1;
                self.channels.insert(kind, id);
                id
            }
            _ => 0,
        };
        let result = match kind {
            Some(_) => self.behavior.channel_result,
            None => 0x8000_0001,
        };
        let response = MessagePayload::StartChannelResponse(StartChannelResponse {
            channel_request_id: request.channel_request_id,
            target_channel_id: channel_id,
            result,
        });
        self.send(MessageType::StartChannelResponse, CORE_CHANNEL_ID, &response, false).await;

        if kind == Some(ChannelKind::Media) && result == 0 {
            if let Some(state) = self.behavior.media_state.clone() {
                self.send(MessageType::MediaState, channel_id, &MessagePayload::MediaState(state), false)
                    .await;
            }
        }
    }

    async fn answer_media(&mut self, channel_id: u64, command: MediaCommand) {
        let result = MessagePayload::MediaCommandResult(MediaCommandResult {
            request_id: command.request_id,
            result: self.behavior.media_result,
        });
        self.send(MessageType::MediaCommandResult, channel_id, &result, false).await;
    }

    async fn answer_json(&mut self, channel_id: u64, text: &str) {
        let Ok(request) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let name = request.get("request").and_then(Value::as_str).unwrap_or_default();
        if name == "SendKey" || name.is_empty() {
            return;
        }
        let response = json!({
            "msgid": request.get("msgid").cloned().unwrap_or(Value::Null),
            "response": name,
            "params": {
                "device_id": "tuner",
                "device_type": "tv",
                "buttons": ["btn.power", "btn.vol_up", "btn.vol_down", "btn.vol_mute"],
            },
        });
        let payload = MessagePayload::Json(JsonMessage {
            text: response.to_string(),
        });
        let parts = self.behavior.json_fragments.max(1);
        if parts == 1 {
            self.send(MessageType::Json, channel_id, &payload, false).await;
            return;
        }

        let Ok(bytes) = payload.encode() else {
            return;
        };
        let chunk = bytes.len().div_ceil(parts as usize).max(1);
        let chunks: Vec<&[u8]> = bytes.chunks(chunk).collect();
        let begin = self.next_sequence;
        let end = begin + chunks.len() as u32;
        for (sequence, data) in (begin..end).zip(chunks) {
            let fragment = Fragment {
                sequence_begin: begin,
                sequence_end: end,
                data: data.to_vec(),
            };
            let Ok(encoded) = fragment.encode() else {
                return;
            };
            let mut flags = MessageFlags::new(MessageType::Json);
            flags.is_fragment = true;
            self.send_raw(flags, channel_id, &encoded, sequence).await;
        }
        self.next_sequence = end;
    }

    async fn ack(&mut self, sequence: u32) {
        let ack = MessagePayload::Ack(Ack {
            low_watermark: sequence,
            processed: vec![sequence],
            rejected: vec![],
        });
        self.send(MessageType::Ack, ACK_CHANNEL_ID, &ack, false).await;
    }

    async fn send(&mut self, message_type: MessageType, channel_id: u64, payload: &MessagePayload, need_ack: bool) {
        let Ok(plaintext) = payload.encode() else {
            return;
        };
        let mut flags = MessageFlags::new(message_type);
        flags.need_ack = need_ack;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.send_raw(flags, channel_id, &plaintext, sequence).await;
    }

    async fn send_raw(&mut self, flags: MessageFlags, channel_id: u64, plaintext: &[u8], sequence: u32) {
        let (Some(cipher), Some(client)) = (self.cipher.as_ref(), self.client) else {
            return;
        };
        let header = MessageHeader {
            protected_len: 0,
            sequence,
            target_participant: PARTICIPANT_ID,
            source_participant: 0,
            flags,
            channel_id,
        };
        let Ok(packet) = cipher.seal_message(header, plaintext) else {
            return;
        };
        if let Ok(data) = packet.encode() {
            let _ = self.transport.send_to(client, &data).await;
        }
    }

    fn reset(&mut self) {
        self.cipher = None;
        self.client = None;
        self.channels.clear();
    }
}
