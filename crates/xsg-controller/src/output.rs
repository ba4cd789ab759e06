//! Output formatting for CLI results
//!
//! Three output formats are supported:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use xsg_core::command::Response;
use xsg_core::{ConsoleInfo, DeviceState, DiscoveredConsole, DisconnectReason, SessionEvent};

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }

    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::success(data)
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }

    pub fn error_with_command(message: &str, command: &str) -> JsonResponse<()> {
        JsonResponse {
            command: Some(command.to_string()),
            ..Self::error(message)
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_consoles(&self, consoles: &[DiscoveredConsole]) -> String {
        match self.format {
            OutputFormat::Table => self.consoles_table(consoles),
            OutputFormat::Json => {
                let list: Vec<ConsoleOutput> = consoles.iter().map(ConsoleOutput::from).collect();
                self.to_json_response(&list, "discover")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_connected(&self, info: &ConsoleInfo) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Name", &info.name]);
                table.add_row(vec!["Live ID", &info.live_id]);
                table.add_row(vec!["UUID", &info.uuid]);
                table.add_row(vec!["Address", &info.address.to_string()]);
                table.add_row(vec!["Participant", &info.participant_id.to_string()]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(&SessionOutput::from(info), "connect"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_device_state(&self, state: &DeviceState) -> String {
        match self.format {
            OutputFormat::Table => self.device_state_table(state),
            OutputFormat::Json => self.to_json_response(&DeviceStateOutput::from(state), "status"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// One event as a single line: plain text for tables, one JSON object
    /// per line for JSON.
    pub fn format_event(&self, event: &SessionEvent) -> String {
        let output = EventOutput::from(event);
        match self.format {
            OutputFormat::Table => {
                let time = chrono::Local::now().format("%H:%M:%S");
                format!("[{time}] {:<14} {}", output.event, output.summary())
            }
            OutputFormat::Json => serde_json::to_string(&output).unwrap_or_default(),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_response(&self, response: &Response, command: &str) -> String {
        let output = ResponseOutput::from(response);
        match self.format {
            OutputFormat::Table => match response {
                Response::Sent => format!("{command}: sent"),
                Response::MediaResult(code) => format!("{command}: result {code}"),
                Response::Json(value) => {
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
                }
            },
            OutputFormat::Json => self.to_json_response(&output, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, error: &dyn std::error::Error, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => self.to_json(&ErrorWithCodeOutput {
                success: false,
                error: error.to_string(),
                exit_code: code as i32,
                exit_code_name: code.name(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress messages only show in verbose table mode
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("✗ {message}");
        } else if self.format == OutputFormat::Json {
            println!("{}", self.to_json(&JsonResponse::<()>::error(message)));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }

    fn consoles_table(&self, consoles: &[DiscoveredConsole]) -> String {
        if consoles.is_empty() {
            return "No consoles found.".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Name", "Live ID", "Address", "UUID"]);
        for c in consoles {
            table.add_row(vec![
                c.name.as_str(),
                c.live_id.as_str(),
                &c.address.to_string(),
                c.uuid.as_str(),
            ]);
        }
        table.to_string()
    }

    fn device_state_table(&self, state: &DeviceState) -> String {
        let output = DeviceStateOutput::from(state);
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Property", "Value"]);
        table.add_row(vec!["Power", if output.power { "on" } else { "off" }]);
        table.add_row(vec!["Title", output.title_id.as_deref().unwrap_or("-")]);
        table.add_row(vec!["App", output.active_reference.as_deref().unwrap_or("-")]);
        table.add_row(vec!["Volume", &output.volume.to_string()]);
        table.add_row(vec!["Muted", if output.muted { "yes" } else { "no" }]);
        table.add_row(vec!["Media", &output.media]);
        table.add_row(vec!["Firmware", output.firmware.as_deref().unwrap_or("-")]);
        table.add_row(vec!["Locale", output.locale.as_deref().unwrap_or("-")]);
        table.to_string()
    }
}

// ============================================================================
// JSON output structures
// ============================================================================

#[derive(Serialize)]
struct ConsoleOutput {
    name: String,
    live_id: String,
    uuid: String,
    address: String,
}

impl From<&DiscoveredConsole> for ConsoleOutput {
    fn from(c: &DiscoveredConsole) -> Self {
        Self {
            name: c.name.clone(),
            live_id: c.live_id.clone(),
            uuid: c.uuid.clone(),
            address: c.address.to_string(),
        }
    }
}

#[derive(Serialize)]
struct SessionOutput {
    name: String,
    live_id: String,
    uuid: String,
    address: String,
    participant_id: u32,
}

impl From<&ConsoleInfo> for SessionOutput {
    fn from(info: &ConsoleInfo) -> Self {
        Self {
            name: info.name.clone(),
            live_id: info.live_id.clone(),
            uuid: info.uuid.clone(),
            address: info.address.to_string(),
            participant_id: info.participant_id,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DeviceStateOutput {
    pub power: bool,
    /// Hex, e.g. `0x162615AD`
    pub title_id: Option<String>,
    pub active_reference: Option<String>,
    pub volume: u8,
    pub muted: bool,
    pub media: String,
    pub firmware: Option<String>,
    pub locale: Option<String>,
    pub idle_screen: bool,
}

impl From<&DeviceState> for DeviceStateOutput {
    fn from(state: &DeviceState) -> Self {
        Self {
            power: state.power,
            title_id: state.title_id.map(|id| format!("0x{id:08X}")),
            active_reference: state.active_reference.clone(),
            volume: state.volume,
            muted: state.muted,
            media: format!("{:?}", state.media).to_lowercase(),
            firmware: state.firmware.clone(),
            locale: state.locale.clone(),
            idle_screen: state.is_idle_screen(),
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    event: &'static str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<DeviceStateOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl EventOutput {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            state: None,
            firmware: None,
            locale: None,
            reason: None,
            kind: None,
            detail: None,
        }
    }

    fn summary(&self) -> String {
        if let Some(state) = &self.state {
            return format!(
                "power={} title={} volume={} muted={} media={}",
                if state.power { "on" } else { "off" },
                state.title_id.as_deref().unwrap_or("-"),
                state.volume,
                state.muted,
                state.media,
            );
        }
        match (&self.firmware, &self.locale, &self.reason, &self.kind) {
            (Some(firmware), Some(locale), _, _) => format!("firmware={firmware} locale={locale}"),
            (_, _, Some(reason), _) => format!("reason={reason}"),
            (_, _, _, Some(kind)) => format!("{kind}: {}", self.detail.as_deref().unwrap_or("")),
            _ => String::new(),
        }
    }
}

impl From<&SessionEvent> for EventOutput {
    fn from(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::DeviceInfo { firmware, locale } => Self {
                firmware: Some(firmware.clone()),
                locale: Some(locale.clone()),
                ..Self::new("device_info")
            },
            SessionEvent::StateChanged(state) => Self {
                state: Some(DeviceStateOutput::from(state)),
                ..Self::new("state_changed")
            },
            SessionEvent::Disconnected(reason) => Self {
                reason: Some(disconnect_reason(reason)),
                ..Self::new("disconnected")
            },
            SessionEvent::Error { kind, detail } => Self {
                kind: Some(format!("{kind:?}").to_lowercase()),
                detail: Some(detail.clone()),
                ..Self::new("error")
            },
        }
    }
}

fn disconnect_reason(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::Requested => "requested".into(),
        DisconnectReason::ConnectionLost => "connection_lost".into(),
        DisconnectReason::ConsoleDisconnected(code) => format!("console_disconnected({code})"),
        DisconnectReason::PoweredOff => "powered_off".into(),
        DisconnectReason::TransportFailed(detail) => format!("transport_failed({detail})"),
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ResponseOutput {
    Sent,
    MediaResult { result: u32 },
    Json { body: serde_json::Value },
}

impl From<&Response> for ResponseOutput {
    fn from(response: &Response) -> Self {
        match response {
            Response::Sent => ResponseOutput::Sent,
            Response::MediaResult(result) => ResponseOutput::MediaResult { result: *result },
            Response::Json(body) => ResponseOutput::Json { body: body.clone() },
        }
    }
}

#[derive(Serialize)]
struct ErrorWithCodeOutput {
    success: bool,
    error: String,
    exit_code: i32,
    exit_code_name: &'static str,
    timestamp: String,
}
