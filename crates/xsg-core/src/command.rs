//! Commands a caller can issue on an authenticated session.

use serde_json::{json, Value};
use xsg_proto::{GamepadButton, MediaControl};

use crate::channel::ChannelKind;
use crate::errors::CommandError;

/// Requests understood by the tv-remote channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TvRemoteRequest {
    /// Press a remote button such as `btn.vol_up`.
    SendKey { button_id: String, device_id: Option<String> },
    GetConfiguration,
    GetHeadendInfo,
    GetLiveTvInfo,
    GetRecentChannels { start: u32, count: u32 },
}

impl TvRemoteRequest {
    pub fn name(&self) -> &'static str {
        match self {
            TvRemoteRequest::SendKey { .. } => "SendKey",
            TvRemoteRequest::GetConfiguration => "GetConfiguration",
            TvRemoteRequest::GetHeadendInfo => "GetHeadendInfo",
            TvRemoteRequest::GetLiveTvInfo => "GetLiveTVInfo",
            TvRemoteRequest::GetRecentChannels { .. } => "GetRecentChannels",
        }
    }

    /// Queries wait for a JSON response; key presses do not.
    pub fn expects_response(&self) -> bool {
        !matches!(self, TvRemoteRequest::SendKey { .. })
    }

    pub fn to_json(&self, msgid: &str) -> Value {
        let params = match self {
            TvRemoteRequest::SendKey { button_id, device_id } => json!({
                "button_id": button_id,
                "device_id": device_id,
            }),
            TvRemoteRequest::GetRecentChannels { start, count } => json!({
                "startindex": start,
                "count": count,
            }),
            _ => Value::Null,
        };
        json!({
            "msgid": msgid,
            "request": self.name(),
            "params": params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Press and release one gamepad button.
    Input(GamepadButton),
    Media { control: MediaControl, seek: Option<u64> },
    TvRemote(TvRemoteRequest),
}

impl Command {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Command::Input(_) => ChannelKind::Input,
            Command::Media { .. } => ChannelKind::Media,
            Command::TvRemote(_) => ChannelKind::TvRemote,
        }
    }

    /// Build a command from a channel name, a command name and optional
    /// parameters, e.g. `("input", "a", None)` or `("media", "seek", Some("1200"))`.
    pub fn parse(channel: &str, command: &str, params: Option<&str>) -> Result<Self, CommandError> {
        let invalid = |what: String| CommandError::InvalidCommand(what);
        match channel.parse::<ChannelKind>()? {
            ChannelKind::Input => command
                .parse::<GamepadButton>()
                .map(Command::Input)
                .map_err(|_| invalid(format!("unknown button {command:?}"))),
            ChannelKind::Media => {
                let control = command
                    .parse::<MediaControl>()
                    .map_err(|_| invalid(format!("unknown media command {command:?}")))?;
                let seek = match (control, params) {
                    (MediaControl::Seek, Some(raw)) => Some(
                        raw.trim()
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("bad seek position {raw:?}")))?,
                    ),
                    (MediaControl::Seek, None) => return Err(invalid("seek needs a position".into())),
                    _ => None,
                };
                Ok(Command::Media { control, seek })
            }
            ChannelKind::TvRemote => {
                let request = match command.to_ascii_lowercase().as_str() {
                    "sendkey" | "key" => TvRemoteRequest::SendKey {
                        button_id: params
                            .map(str::to_string)
                            .ok_or_else(|| invalid("SendKey needs a button id".into()))?,
                        device_id: None,
                    },
                    "getconfiguration" => TvRemoteRequest::GetConfiguration,
                    "getheadendinfo" => TvRemoteRequest::GetHeadendInfo,
                    "getlivetvinfo" => TvRemoteRequest::GetLiveTvInfo,
                    "getrecentchannels" => TvRemoteRequest::GetRecentChannels { start: 0, count: 50 },
                    other => return Err(invalid(format!("unknown tv-remote request {other:?}"))),
                };
                Ok(Command::TvRemote(request))
            }
        }
    }
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Fire-and-forget command handed to the transport.
    Sent,
    /// Result code from the media channel.
    MediaResult(u32),
    /// JSON response from the tv-remote channel.
    Json(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_and_media() {
        assert_eq!(
            Command::parse("input", "A", None).unwrap(),
            Command::Input(GamepadButton::A)
        );
        assert_eq!(
            Command::parse("media", "seek", Some("1200")).unwrap(),
            Command::Media {
                control: MediaControl::Seek,
                seek: Some(1200)
            }
        );
        assert!(matches!(
            Command::parse("media", "seek", None),
            Err(CommandError::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::parse("input", "turbo", None),
            Err(CommandError::InvalidCommand(_))
        ));
    }

    #[test]
    fn tv_remote_json_shape() {
        let command = Command::parse("tv-remote", "SendKey", Some("btn.vol_up")).unwrap();
        let Command::TvRemote(request) = command else {
            panic!("expected tv-remote command");
        };
        assert!(!request.expects_response());
        let value = request.to_json("xsg.1");
        assert_eq!(value["request"], "SendKey");
        assert_eq!(value["params"]["button_id"], "btn.vol_up");
        assert_eq!(value["msgid"], "xsg.1");

        let query = TvRemoteRequest::GetLiveTvInfo.to_json("xsg.2");
        assert_eq!(query["request"], "GetLiveTVInfo");
        assert!(query["params"].is_null());
    }
}
