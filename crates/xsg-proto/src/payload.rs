//! Plaintext payloads carried inside message packets.

use std::str::FromStr;

use bytes::BufMut;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::message::MessageType;
use crate::primitives::{put_len16, put_prefixed_bytes, put_sgstring, put_u32_list, Reader};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    pub low_watermark: u32,
    pub processed: Vec<u32>,
    pub rejected: Vec<u32>,
}

impl Ack {
    /// Whether this acknowledgement covers `sequence`.
    pub fn acknowledges(&self, sequence: u32) -> bool {
        self.processed.contains(&sequence) || (self.low_watermark >= sequence && !self.rejected.contains(&sequence))
    }
}

/// Client introduction sent right after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalJoin {
    pub device_type: u16,
    pub native_width: u16,
    pub native_height: u16,
    pub dpi_x: u16,
    pub dpi_y: u16,
    pub device_capabilities: u64,
    pub client_version: u32,
    pub os_major: u32,
    pub os_minor: u32,
    pub display_name: String,
}

impl Default for LocalJoin {
    fn default() -> Self {
        Self {
            device_type: crate::simple::CLIENT_TYPE_ANDROID,
            native_width: 1080,
            native_height: 1920,
            dpi_x: 480,
            dpi_y: 480,
            device_capabilities: u64::MAX,
            client_version: 15,
            os_major: 6,
            os_minor: 2,
            display_name: "xsg".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTitle {
    pub title_id: u32,
    pub has_focus: bool,
    pub title_location: u16,
    pub product_id: Uuid,
    pub sandbox_id: Uuid,
    pub aum: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleStatus {
    pub live_tv_provider: u32,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    pub locale: String,
    pub active_titles: Vec<ActiveTitle>,
}

impl ConsoleStatus {
    /// Firmware revision as `major.minor.build`.
    pub fn firmware_revision(&self) -> String {
        format!("{}.{}.{}", self.major_version, self.minor_version, self.build_number)
    }

    /// The title holding focus, or the first listed one.
    pub fn focused_title(&self) -> Option<&ActiveTitle> {
        self.active_titles
            .iter()
            .find(|t| t.has_focus)
            .or_else(|| self.active_titles.first())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartChannelRequest {
    pub channel_request_id: u32,
    pub title_id: u32,
    pub service: Uuid,
    pub activity_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartChannelResponse {
    pub channel_request_id: u32,
    pub target_channel_id: u64,
    pub result: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopChannel {
    pub target_channel_id: u64,
}

/// Disconnect reason codes.
pub mod disconnect_reason {
    pub const UNSPECIFIED: u32 = 0;
    pub const ERROR: u32 = 1;
    pub const POWER_OFF: u32 = 2;
    pub const MAINTENANCE: u32 = 3;
    pub const APP_CLOSE: u32 = 4;
    pub const SIGN_OUT: u32 = 5;
    pub const REBOOT: u32 = 6;
    pub const DISABLED: u32 = 7;
    pub const LOW_POWER: u32 = 8;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: u32,
    pub error_code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerOff {
    pub live_id: String,
}

/// Ask the console to save a clip of recent gameplay.
///
/// Both deltas are seconds relative to now; negative values reach into the
/// past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameDvrRecord {
    pub start_time_delta: i32,
    pub end_time_delta: i32,
}

impl GameDvrRecord {
    /// Clip covering the last `seconds` seconds.
    pub fn last(seconds: u32) -> Self {
        Self {
            start_time_delta: -(seconds.min(i32::MAX as u32) as i32),
            end_time_delta: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaControllerRemoved {
    pub title_id: u32,
}

/// Media transport commands. Values are the wire flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaControl {
    Play = 0x0002,
    Pause = 0x0004,
    PlayPauseToggle = 0x0008,
    Stop = 0x0010,
    Record = 0x0020,
    NextTrack = 0x0040,
    PreviousTrack = 0x0080,
    FastForward = 0x0100,
    Rewind = 0x0200,
    ChannelUp = 0x0400,
    ChannelDown = 0x0800,
    Back = 0x1000,
    View = 0x2000,
    Menu = 0x4000,
    Seek = 0x8000,
}

impl MediaControl {
    const ALL: [MediaControl; 15] = [
        MediaControl::Play,
        MediaControl::Pause,
        MediaControl::PlayPauseToggle,
        MediaControl::Stop,
        MediaControl::Record,
        MediaControl::NextTrack,
        MediaControl::PreviousTrack,
        MediaControl::FastForward,
        MediaControl::Rewind,
        MediaControl::ChannelUp,
        MediaControl::ChannelDown,
        MediaControl::Back,
        MediaControl::View,
        MediaControl::Menu,
        MediaControl::Seek,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u32 == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            MediaControl::Play => "play",
            MediaControl::Pause => "pause",
            MediaControl::PlayPauseToggle => "play-pause",
            MediaControl::Stop => "stop",
            MediaControl::Record => "record",
            MediaControl::NextTrack => "next",
            MediaControl::PreviousTrack => "previous",
            MediaControl::FastForward => "fast-forward",
            MediaControl::Rewind => "rewind",
            MediaControl::ChannelUp => "channel-up",
            MediaControl::ChannelDown => "channel-down",
            MediaControl::Back => "back",
            MediaControl::View => "view",
            MediaControl::Menu => "menu",
            MediaControl::Seek => "seek",
        }
    }
}

impl FromStr for MediaControl {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or(DecodeError::malformed("media_control", "unknown command name"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub request_id: u64,
    pub title_id: u32,
    pub command: MediaControl,
    /// Present only for [`MediaControl::Seek`].
    pub seek_position: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommandResult {
    pub request_id: u64,
    pub result: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundLevel {
    Muted,
    Low,
    Full,
    Other(u16),
}

impl SoundLevel {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => SoundLevel::Muted,
            1 => SoundLevel::Low,
            2 => SoundLevel::Full,
            other => SoundLevel::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            SoundLevel::Muted => 0,
            SoundLevel::Low => 1,
            SoundLevel::Full => 2,
            SoundLevel::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Closed,
    Changing,
    Stopped,
    Playing,
    Paused,
    Other(u16),
}

impl PlaybackStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => PlaybackStatus::Closed,
            1 => PlaybackStatus::Changing,
            2 => PlaybackStatus::Stopped,
            3 => PlaybackStatus::Playing,
            4 => PlaybackStatus::Paused,
            other => PlaybackStatus::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            PlaybackStatus::Closed => 0,
            PlaybackStatus::Changing => 1,
            PlaybackStatus::Stopped => 2,
            PlaybackStatus::Playing => 3,
            PlaybackStatus::Paused => 4,
            PlaybackStatus::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaState {
    pub title_id: u32,
    pub aum_id: String,
    pub asset_id: String,
    pub media_type: u16,
    pub sound_level: SoundLevel,
    pub enabled_commands: u32,
    pub playback_status: PlaybackStatus,
    pub rate: f32,
    pub position: u64,
    pub media_start: u64,
    pub media_end: u64,
    pub min_seek: u64,
    pub max_seek: u64,
    pub metadata: Vec<(String, String)>,
}

/// Gamepad button flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GamepadButton {
    Nexus = 0x0002,
    Menu = 0x0004,
    View = 0x0008,
    A = 0x0010,
    B = 0x0020,
    X = 0x0040,
    Y = 0x0080,
    DPadUp = 0x0100,
    DPadDown = 0x0200,
    DPadLeft = 0x0400,
    DPadRight = 0x0800,
    LeftShoulder = 0x1000,
    RightShoulder = 0x2000,
    LeftThumbstick = 0x4000,
    RightThumbstick = 0x8000,
}

impl GamepadButton {
    const ALL: [GamepadButton; 15] = [
        GamepadButton::Nexus,
        GamepadButton::Menu,
        GamepadButton::View,
        GamepadButton::A,
        GamepadButton::B,
        GamepadButton::X,
        GamepadButton::Y,
        GamepadButton::DPadUp,
        GamepadButton::DPadDown,
        GamepadButton::DPadLeft,
        GamepadButton::DPadRight,
        GamepadButton::LeftShoulder,
        GamepadButton::RightShoulder,
        GamepadButton::LeftThumbstick,
        GamepadButton::RightThumbstick,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GamepadButton::Nexus => "nexus",
            GamepadButton::Menu => "menu",
            GamepadButton::View => "view",
            GamepadButton::A => "a",
            GamepadButton::B => "b",
            GamepadButton::X => "x",
            GamepadButton::Y => "y",
            GamepadButton::DPadUp => "up",
            GamepadButton::DPadDown => "down",
            GamepadButton::DPadLeft => "left",
            GamepadButton::DPadRight => "right",
            GamepadButton::LeftShoulder => "left-shoulder",
            GamepadButton::RightShoulder => "right-shoulder",
            GamepadButton::LeftThumbstick => "left-thumbstick",
            GamepadButton::RightThumbstick => "right-thumbstick",
        }
    }
}

impl FromStr for GamepadButton {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.name() == wanted)
            .ok_or(DecodeError::malformed("gamepad_button", "unknown button name"))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gamepad {
    pub timestamp: u64,
    /// Bitwise OR of [`GamepadButton`] flags; 0 releases everything.
    pub buttons: u16,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub left_thumbstick_x: f32,
    pub left_thumbstick_y: f32,
    pub right_thumbstick_x: f32,
    pub right_thumbstick_y: f32,
}

impl Gamepad {
    pub fn pressed(button: GamepadButton) -> Self {
        Self {
            buttons: button as u16,
            ..Self::default()
        }
    }

    pub fn released() -> Self {
        Self::default()
    }
}

/// Payload of a fragmented message; `data` is one slice of the full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub sequence_begin: u32,
    pub sequence_end: u32,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(10 + self.data.len());
        out.put_u32(self.sequence_begin);
        out.put_u32(self.sequence_end);
        put_prefixed_bytes(&mut out, &self.data)?;
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let fragment = Self {
            sequence_begin: r.u32()?,
            sequence_end: r.u32()?,
            data: r.prefixed_bytes()?,
        };
        if fragment.sequence_end <= fragment.sequence_begin {
            return Err(DecodeError::malformed("sequence_end", "empty fragment range"));
        }
        Ok(fragment)
    }
}

/// Decoded plaintext of a message packet, one variant per message type.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Ack(Ack),
    LocalJoin(LocalJoin),
    Json(JsonMessage),
    GameDvrRecord(GameDvrRecord),
    ConsoleStatus(ConsoleStatus),
    StartChannelRequest(StartChannelRequest),
    StartChannelResponse(StartChannelResponse),
    StopChannel(StopChannel),
    Disconnect(Disconnect),
    PowerOff(PowerOff),
    MediaControllerRemoved(MediaControllerRemoved),
    MediaCommand(MediaCommand),
    MediaCommandResult(MediaCommandResult),
    MediaState(MediaState),
    Gamepad(Gamepad),
    Unknown { code: u16, data: Vec<u8> },
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Ack(_) => MessageType::Ack,
            MessagePayload::LocalJoin(_) => MessageType::LocalJoin,
            MessagePayload::Json(_) => MessageType::Json,
            MessagePayload::GameDvrRecord(_) => MessageType::GameDvrRecord,
            MessagePayload::ConsoleStatus(_) => MessageType::ConsoleStatus,
            MessagePayload::StartChannelRequest(_) => MessageType::StartChannelRequest,
            MessagePayload::StartChannelResponse(_) => MessageType::StartChannelResponse,
            MessagePayload::StopChannel(_) => MessageType::StopChannel,
            MessagePayload::Disconnect(_) => MessageType::Disconnect,
            MessagePayload::PowerOff(_) => MessageType::PowerOff,
            MessagePayload::MediaControllerRemoved(_) => MessageType::MediaControllerRemoved,
            MessagePayload::MediaCommand(_) => MessageType::MediaCommand,
            MessagePayload::MediaCommandResult(_) => MessageType::MediaCommandResult,
            MessagePayload::MediaState(_) => MessageType::MediaState,
            MessagePayload::Gamepad(_) => MessageType::Gamepad,
            MessagePayload::Unknown { code, .. } => MessageType::Unknown(*code),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        match self {
            MessagePayload::Ack(p) => {
                out.put_u32(p.low_watermark);
                put_u32_list(&mut out, &p.processed);
                put_u32_list(&mut out, &p.rejected);
            }
            MessagePayload::LocalJoin(p) => {
                out.put_u16(p.device_type);
                out.put_u16(p.native_width);
                out.put_u16(p.native_height);
                out.put_u16(p.dpi_x);
                out.put_u16(p.dpi_y);
                out.put_u64(p.device_capabilities);
                out.put_u32(p.client_version);
                out.put_u32(p.os_major);
                out.put_u32(p.os_minor);
                put_sgstring(&mut out, &p.display_name)?;
            }
            MessagePayload::Json(p) => {
                if p.text.is_empty() {
                    return Err(DecodeError::MissingField("json_text"));
                }
                put_sgstring(&mut out, &p.text)?;
            }
            MessagePayload::GameDvrRecord(p) => {
                if p.end_time_delta < p.start_time_delta {
                    return Err(DecodeError::malformed("end_time_delta", "clip ends before it starts"));
                }
                out.put_i32(p.start_time_delta);
                out.put_i32(p.end_time_delta);
            }
            MessagePayload::ConsoleStatus(p) => {
                out.put_u32(p.live_tv_provider);
                out.put_u32(p.major_version);
                out.put_u32(p.minor_version);
                out.put_u32(p.build_number);
                put_sgstring(&mut out, &p.locale)?;
                put_len16(&mut out, "active_titles", p.active_titles.len())?;
                for title in &p.active_titles {
                    out.put_u32(title.title_id);
                    out.put_u16((u16::from(title.has_focus) << 15) | (title.title_location & 0x7fff));
                    out.extend_from_slice(title.product_id.as_bytes());
                    out.extend_from_slice(title.sandbox_id.as_bytes());
                    put_sgstring(&mut out, &title.aum)?;
                }
            }
            MessagePayload::StartChannelRequest(p) => {
                out.put_u32(p.channel_request_id);
                out.put_u32(p.title_id);
                out.extend_from_slice(p.service.as_bytes());
                out.put_u32(p.activity_id);
            }
            MessagePayload::StartChannelResponse(p) => {
                out.put_u32(p.channel_request_id);
                out.put_u64(p.target_channel_id);
                out.put_u32(p.result);
            }
            MessagePayload::StopChannel(p) => out.put_u64(p.target_channel_id),
            MessagePayload::Disconnect(p) => {
                out.put_u32(p.reason);
                out.put_u32(p.error_code);
            }
            MessagePayload::PowerOff(p) => {
                if p.live_id.is_empty() {
                    return Err(DecodeError::MissingField("live_id"));
                }
                put_sgstring(&mut out, &p.live_id)?;
            }
            MessagePayload::MediaControllerRemoved(p) => out.put_u32(p.title_id),
            MessagePayload::MediaCommand(p) => {
                out.put_u64(p.request_id);
                out.put_u32(p.title_id);
                out.put_u32(p.command as u32);
                match (p.command, p.seek_position) {
                    (MediaControl::Seek, Some(position)) => out.put_u64(position),
                    (MediaControl::Seek, None) => return Err(DecodeError::MissingField("seek_position")),
                    _ => {}
                }
            }
            MessagePayload::MediaCommandResult(p) => {
                out.put_u64(p.request_id);
                out.put_u32(p.result);
            }
            MessagePayload::MediaState(p) => {
                out.put_u32(p.title_id);
                put_sgstring(&mut out, &p.aum_id)?;
                put_sgstring(&mut out, &p.asset_id)?;
                out.put_u16(p.media_type);
                out.put_u16(p.sound_level.code());
                out.put_u32(p.enabled_commands);
                out.put_u16(p.playback_status.code());
                out.put_f32(p.rate);
                out.put_u64(p.position);
                out.put_u64(p.media_start);
                out.put_u64(p.media_end);
                out.put_u64(p.min_seek);
                out.put_u64(p.max_seek);
                put_len16(&mut out, "metadata", p.metadata.len())?;
                for (name, value) in &p.metadata {
                    put_sgstring(&mut out, name)?;
                    put_sgstring(&mut out, value)?;
                }
            }
            MessagePayload::Gamepad(p) => {
                out.put_u64(p.timestamp);
                out.put_u16(p.buttons);
                out.put_f32(p.left_trigger);
                out.put_f32(p.right_trigger);
                out.put_f32(p.left_thumbstick_x);
                out.put_f32(p.left_thumbstick_y);
                out.put_f32(p.right_thumbstick_x);
                out.put_f32(p.right_thumbstick_y);
            }
            MessagePayload::Unknown { data, .. } => out.extend_from_slice(data),
        }
        Ok(out)
    }

    pub fn decode(message_type: MessageType, buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let payload = match message_type {
            MessageType::Ack => MessagePayload::Ack(Ack {
                low_watermark: r.u32()?,
                processed: r.u32_list()?,
                rejected: r.u32_list()?,
            }),
            MessageType::LocalJoin => MessagePayload::LocalJoin(LocalJoin {
                device_type: r.u16()?,
                native_width: r.u16()?,
                native_height: r.u16()?,
                dpi_x: r.u16()?,
                dpi_y: r.u16()?,
                device_capabilities: r.u64()?,
                client_version: r.u32()?,
                os_major: r.u32()?,
                os_minor: r.u32()?,
                display_name: r.sgstring("display_name")?,
            }),
            MessageType::Json => MessagePayload::Json(JsonMessage {
                text: r.sgstring("json_text")?,
            }),
            MessageType::ConsoleStatus => {
                let live_tv_provider = r.u32()?;
                let major_version = r.u32()?;
                let minor_version = r.u32()?;
                let build_number = r.u32()?;
                let locale = r.sgstring("locale")?;
                let count = r.u16()?;
                let mut active_titles = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let title_id = r.u32()?;
                    let disposition = r.u16()?;
                    active_titles.push(ActiveTitle {
                        title_id,
                        has_focus: disposition & 0x8000 != 0,
                        title_location: disposition & 0x7fff,
                        product_id: Uuid::from_bytes(r.array16()?),
                        sandbox_id: Uuid::from_bytes(r.array16()?),
                        aum: r.sgstring("aum")?,
                    });
                }
                MessagePayload::ConsoleStatus(ConsoleStatus {
                    live_tv_provider,
                    major_version,
                    minor_version,
                    build_number,
                    locale,
                    active_titles,
                })
            }
            MessageType::StartChannelRequest => MessagePayload::StartChannelRequest(StartChannelRequest {
                channel_request_id: r.u32()?,
                title_id: r.u32()?,
                service: Uuid::from_bytes(r.array16()?),
                activity_id: r.u32()?,
            }),
            MessageType::StartChannelResponse => MessagePayload::StartChannelResponse(StartChannelResponse {
                channel_request_id: r.u32()?,
                target_channel_id: r.u64()?,
                result: r.u32()?,
            }),
            MessageType::StopChannel => MessagePayload::StopChannel(StopChannel {
                target_channel_id: r.u64()?,
            }),
            MessageType::Disconnect => MessagePayload::Disconnect(Disconnect {
                reason: r.u32()?,
                error_code: r.u32()?,
            }),
            MessageType::GameDvrRecord => MessagePayload::GameDvrRecord(GameDvrRecord {
                start_time_delta: r.u32()? as i32,
                end_time_delta: r.u32()? as i32,
            }),
            MessageType::PowerOff => MessagePayload::PowerOff(PowerOff {
                live_id: r.sgstring("live_id")?,
            }),
            MessageType::MediaControllerRemoved => {
                MessagePayload::MediaControllerRemoved(MediaControllerRemoved { title_id: r.u32()? })
            }
            MessageType::MediaCommand => {
                let request_id = r.u64()?;
                let title_id = r.u32()?;
                let command = MediaControl::from_code(r.u32()?)
                    .ok_or(DecodeError::malformed("media_control", "unknown command flag"))?;
                let seek_position = if command == MediaControl::Seek { Some(r.u64()?) } else { None };
                MessagePayload::MediaCommand(MediaCommand {
                    request_id,
                    title_id,
                    command,
                    seek_position,
                })
            }
            MessageType::MediaCommandResult => MessagePayload::MediaCommandResult(MediaCommandResult {
                request_id: r.u64()?,
                result: r.u32()?,
            }),
            MessageType::MediaState => {
                let title_id = r.u32()?;
                let aum_id = r.sgstring("aum_id")?;
                let asset_id = r.sgstring("asset_id")?;
                let media_type = r.u16()?;
                let sound_level = SoundLevel::from_code(r.u16()?);
                let enabled_commands = r.u32()?;
                let playback_status = PlaybackStatus::from_code(r.u16()?);
                let rate = r.f32()?;
                let position = r.u64()?;
                let media_start = r.u64()?;
                let media_end = r.u64()?;
                let min_seek = r.u64()?;
                let max_seek = r.u64()?;
                let count = r.u16()?;
                let mut metadata = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    metadata.push((r.sgstring("metadata_name")?, r.sgstring("metadata_value")?));
                }
                MessagePayload::MediaState(MediaState {
                    title_id,
                    aum_id,
                    asset_id,
                    media_type,
                    sound_level,
                    enabled_commands,
                    playback_status,
                    rate,
                    position,
                    media_start,
                    media_end,
                    min_seek,
                    max_seek,
                    metadata,
                })
            }
            MessageType::Gamepad => MessagePayload::Gamepad(Gamepad {
                timestamp: r.u64()?,
                buttons: r.u16()?,
                left_trigger: r.f32()?,
                right_trigger: r.f32()?,
                left_thumbstick_x: r.f32()?,
                left_thumbstick_y: r.f32()?,
                right_thumbstick_x: r.f32()?,
                right_thumbstick_y: r.f32()?,
            }),
            MessageType::Unknown(code) => MessagePayload::Unknown {
                code,
                data: r.rest().to_vec(),
            },
        };
        Ok(payload)
    }
}
