//! CLI command definitions and argument parsing

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use xsg_core::{ConsoleInfo, DisconnectReason, Session, SessionEvent};
use xsg_transport::{DatagramTransport, UdpTransport};

use crate::config::{parse_console_address, Config};
use crate::output::{OutputFormat, OutputFormatter};
use crate::ExitCode;

/// XSG Controller CLI - console LAN control client
#[derive(Parser, Debug)]
#[command(name = "xsg-controller")]
#[command(version, about = "XSG Controller CLI - control consoles on the local network")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (protocol-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "XSG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Console address (`ip` or `ip:port`), overrides the config file
    #[arg(long, global = true, env = "XSG_ADDRESS")]
    pub address: Option<String>,

    /// Console live id, overrides the config file
    #[arg(long, global = true, env = "XSG_LIVE_ID")]
    pub live_id: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find consoles on the local network
    Discover(DiscoverArgs),
    /// Wake a console from standby
    PowerOn,
    /// Connect and power the console off
    PowerOff,
    /// Connect and print the current device state
    Status(StatusArgs),
    /// Connect and print device events until interrupted
    Watch(WatchArgs),
    /// Connect and send one command
    Send(SendArgs),
    /// Connect and save a clip of recent gameplay
    Record(RecordArgs),
    /// Print a sample configuration file
    Config,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Scan window in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,

    /// Probe this address instead of broadcasting
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// How long to wait for status after authenticating, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Reconnect when the connection drops
    #[arg(long)]
    pub reconnect: bool,

    /// Give up after this many consecutive failed reconnects (0 = never)
    #[arg(long, default_value_t = 0)]
    pub max_retries: u32,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel: input, media or tv-remote
    pub channel: String,

    /// Command name, e.g. `a`, `play`, `GetConfiguration`
    pub command: String,

    /// Optional parameter, e.g. a seek position or a remote button id
    pub params: Option<String>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Clip length in seconds, counted back from now
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub seconds: u32,
}

/// First delay before a reconnect attempt.
pub const RECONNECT_BASE: Duration = Duration::from_secs(1);
/// Upper bound on the delay between reconnect attempts.
pub const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

impl Cli {
    /// Execute the CLI command with the default configuration
    pub async fn execute(self) -> anyhow::Result<ExitCode> {
        let config = Config::load_default().unwrap_or_default();
        self.execute_with_config(config).await
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output, self.verbose || config.output.verbose);
        let ctx = Context { config, formatter };

        match self.command {
            Commands::Discover(args) => ctx.discover(args).await,
            Commands::PowerOn => ctx.power_on().await,
            Commands::PowerOff => ctx.power_off().await,
            Commands::Status(args) => ctx.status(args).await,
            Commands::Watch(args) => ctx.watch(args).await,
            Commands::Send(args) => ctx.send(args).await,
            Commands::Record(args) => ctx.record(args).await,
            Commands::Config => {
                print!("{}", Config::sample_toml());
                Ok(ExitCode::Success)
            }
        }
    }
}

struct Connected {
    session: Session,
    info: ConsoleInfo,
    events: broadcast::Receiver<SessionEvent>,
}

struct Context {
    config: Config,
    formatter: OutputFormatter,
}

impl Context {
    fn target(&self) -> Result<(SocketAddr, String), ExitCode> {
        match self.config.console_address() {
            Ok(Some(address)) => Ok((address, self.config.console.live_id.clone().unwrap_or_default())),
            Ok(None) => {
                self.formatter
                    .error("No console address; pass --address or set [console] address");
                Err(ExitCode::InvalidInput)
            }
            Err(e) => {
                self.formatter.error(&e.to_string());
                Err(ExitCode::InvalidInput)
            }
        }
    }

    /// Bind a session and run the handshake. The event receiver is
    /// subscribed before connecting so the first status is not missed.
    async fn connect(&self) -> anyhow::Result<Result<Connected, ExitCode>> {
        let (address, live_id) = match self.target() {
            Ok(target) => target,
            Err(code) => return Ok(Err(code)),
        };

        let session = Session::bind(self.config.session_config()).await?;
        let events = session.subscribe();
        self.formatter.progress(&format!("Connecting to {address}..."));
        match session.connect(address, &live_id).await {
            Ok(info) => {
                info!(console = %info.name, live_id = %info.live_id, "session authenticated");
                self.formatter.progress(&format!("Connected to {}", info.name));
                Ok(Ok(Connected { session, info, events }))
            }
            Err(e) => {
                let code = ExitCode::from(&e);
                eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                Ok(Err(code))
            }
        }
    }

    async fn discover(&self, args: DiscoverArgs) -> anyhow::Result<ExitCode> {
        let port = self.config.console.port;
        let target = match args.target.as_deref() {
            Some(raw) => match parse_console_address(raw, port) {
                Ok(addr) => addr,
                Err(e) => {
                    self.formatter.error(&e.to_string());
                    return Ok(ExitCode::InvalidInput);
                }
            },
            None => SocketAddr::new(Ipv4Addr::BROADCAST.into(), port),
        };

        let transport = UdpTransport::bind_any().await?;
        self.formatter.progress(&format!("Scanning {target} for {}ms...", args.timeout_ms));
        let consoles = xsg_core::discover(&transport, target, Duration::from_millis(args.timeout_ms)).await?;
        transport.close().await;

        println!("{}", self.formatter.format_consoles(&consoles));
        if consoles.is_empty() {
            Ok(ExitCode::Timeout)
        } else {
            Ok(ExitCode::Success)
        }
    }

    async fn power_on(&self) -> anyhow::Result<ExitCode> {
        let (address, live_id) = match self.target() {
            Ok(target) => target,
            Err(code) => return Ok(code),
        };
        if live_id.is_empty() {
            self.formatter.error("power-on needs the console live id; pass --live-id");
            return Ok(ExitCode::InvalidInput);
        }

        let settings = self.config.session_config();
        let transport = UdpTransport::bind_any().await?;
        xsg_core::power_on(
            &transport,
            address,
            &live_id,
            settings.power_on_attempts,
            settings.power_on_interval,
        )
        .await?;
        transport.close().await;

        self.formatter.success(&format!("Power-on sent to {live_id} at {address}"));
        Ok(ExitCode::Success)
    }

    async fn power_off(&self) -> anyhow::Result<ExitCode> {
        let Connected { session, info, .. } = match self.connect().await? {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };
        let result = session.power_off().await;
        session.disconnect().await;
        match result {
            Ok(()) => {
                self.formatter.success(&format!("Powered off {}", info.name));
                Ok(ExitCode::Success)
            }
            Err(e) => {
                let code = ExitCode::from(&e);
                eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                Ok(code)
            }
        }
    }

    async fn record(&self, args: RecordArgs) -> anyhow::Result<ExitCode> {
        let Connected { session, info, .. } = match self.connect().await? {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };
        let result = session.record_game_dvr(args.seconds).await;
        session.disconnect().await;
        match result {
            Ok(()) => {
                self.formatter
                    .success(&format!("Saved the last {}s of gameplay on {}", args.seconds, info.name));
                Ok(ExitCode::Success)
            }
            Err(e) => {
                let code = ExitCode::from(&e);
                eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                Ok(code)
            }
        }
    }

    async fn status(&self, args: StatusArgs) -> anyhow::Result<ExitCode> {
        let Connected {
            session, mut events, ..
        } = match self.connect().await? {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };

        // Status arrives shortly after authentication.
        let settle = tokio::time::sleep(Duration::from_millis(args.settle_ms));
        tokio::pin!(settle);
        while session.device_state().firmware.is_none() {
            tokio::select! {
                _ = &mut settle => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::StateChanged(state)) if state.firmware.is_some() => break,
                    Ok(SessionEvent::Disconnected(_)) | Err(RecvError::Closed) => break,
                    _ => {}
                },
            }
        }

        println!("{}", self.formatter.format_device_state(&session.device_state()));
        session.disconnect().await;
        Ok(ExitCode::Success)
    }

    async fn send(&self, args: SendArgs) -> anyhow::Result<ExitCode> {
        let Connected { session, .. } = match self.connect().await? {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };

        let label = format!("{} {}", args.channel, args.command);
        let result = session
            .send_command(&args.channel, &args.command, args.params.as_deref())
            .await;
        session.disconnect().await;

        match result {
            Ok(response) => {
                println!("{}", self.formatter.format_response(&response, &label));
                Ok(ExitCode::Success)
            }
            Err(e) => {
                let code = ExitCode::from(&e);
                eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                Ok(code)
            }
        }
    }

    async fn watch(&self, args: WatchArgs) -> anyhow::Result<ExitCode> {
        let (address, live_id) = match self.target() {
            Ok(target) => target,
            Err(code) => return Ok(code),
        };
        let Connected {
            session,
            info,
            mut events,
        } = match self.connect().await? {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };
        self.formatter
            .success(&format!("Watching {} ({}), Ctrl-C to stop", info.name, info.live_id));

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            let event = tokio::select! {
                _ = &mut ctrl_c => {
                    debug!("interrupted");
                    session.disconnect().await;
                    return Ok(ExitCode::Success);
                }
                event = events.recv() => event,
            };

            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(ExitCode::ConnectionFailed),
            };

            let line = self.formatter.format_event(&event);
            if !line.is_empty() {
                println!("{line}");
            }

            let SessionEvent::Disconnected(reason) = event else {
                continue;
            };
            let recoverable = matches!(
                reason,
                DisconnectReason::ConnectionLost | DisconnectReason::ConsoleDisconnected(_)
            );
            if !(args.reconnect && recoverable) {
                session.disconnect().await;
                return Ok(match reason {
                    DisconnectReason::ConnectionLost | DisconnectReason::TransportFailed(_) => {
                        ExitCode::ConnectionFailed
                    }
                    _ => ExitCode::Success,
                });
            }

            tokio::select! {
                _ = &mut ctrl_c => {
                    session.disconnect().await;
                    return Ok(ExitCode::Success);
                }
                result = self.reconnect(&session, address, &live_id, args.max_retries) => {
                    if let Err(code) = result {
                        session.disconnect().await;
                        return Ok(code);
                    }
                }
            }
        }
    }

    /// Retry the handshake with backoff until it succeeds or `max_retries`
    /// consecutive attempts fail.
    async fn reconnect(
        &self,
        session: &Session,
        address: SocketAddr,
        live_id: &str,
        max_retries: u32,
    ) -> Result<(), ExitCode> {
        let mut attempt = 0u32;
        loop {
            let delay = reconnect_delay(attempt, RECONNECT_BASE, RECONNECT_MAX);
            self.formatter
                .progress(&format!("Reconnecting in {}ms (attempt {})", delay.as_millis(), attempt + 1));
            tokio::time::sleep(delay).await;

            match session.connect(address, live_id).await {
                Ok(info) => {
                    info!(console = %info.name, attempt, "reconnected");
                    self.formatter.success(&format!("Reconnected to {}", info.name));
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, attempt, "reconnect failed");
                    let code = ExitCode::from(&e);
                    if code == ExitCode::AuthenticationFailed || code == ExitCode::GeneralError {
                        eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                        return Err(code);
                    }
                    attempt += 1;
                    if max_retries != 0 && attempt >= max_retries {
                        eprintln!("{}", self.formatter.format_error_with_code(&e, code));
                        return Err(code);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "xsg-controller",
            "--address",
            "192.168.1.50",
            "send",
            "media",
            "seek",
            "1200",
        ])
        .unwrap();
        assert_eq!(cli.address.as_deref(), Some("192.168.1.50"));
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.channel, "media");
                assert_eq!(args.command, "seek");
                assert_eq!(args.params.as_deref(), Some("1200"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from(["xsg-controller", "record"]).unwrap();
        match cli.command {
            Commands::Record(args) => assert_eq!(args.seconds, 60),
            other => panic!("unexpected command {other:?}"),
        }
        let cli = Cli::try_parse_from(["xsg-controller", "record", "--seconds", "30"]).unwrap();
        assert!(matches!(cli.command, Commands::Record(RecordArgs { seconds: 30 })));
        assert!(Cli::try_parse_from(["xsg-controller", "record", "--seconds", "0"]).is_err());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["xsg-controller", "watch", "--reconnect", "--output", "json", "-v"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.verbose);
        match cli.command {
            Commands::Watch(args) => {
                assert!(args.reconnect);
                assert_eq!(args.max_retries, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_output() {
        assert!(Cli::try_parse_from(["xsg-controller", "--output", "xml", "discover"]).is_err());
    }

    #[test]
    fn test_reconnect_delay_doubles_then_caps() {
        assert_eq!(reconnect_delay(0, RECONNECT_BASE, RECONNECT_MAX), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1, RECONNECT_BASE, RECONNECT_MAX), Duration::from_secs(2));
        assert_eq!(reconnect_delay(4, RECONNECT_BASE, RECONNECT_MAX), Duration::from_secs(16));
        assert_eq!(reconnect_delay(5, RECONNECT_BASE, RECONNECT_MAX), RECONNECT_MAX);
        assert_eq!(reconnect_delay(200, RECONNECT_BASE, RECONNECT_MAX), RECONNECT_MAX);
    }

    #[tokio::test]
    async fn test_power_on_requires_live_id() {
        let mut config = Config::default();
        config.console.address = Some("127.0.0.1".into());
        let ctx = Context {
            config,
            formatter: OutputFormatter::new(OutputFormat::Quiet, false),
        };
        assert_eq!(ctx.power_on().await.unwrap(), ExitCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_send_without_address_is_invalid_input() {
        let ctx = Context {
            config: Config::default(),
            formatter: OutputFormatter::new(OutputFormat::Quiet, false),
        };
        let args = SendArgs {
            channel: "input".into(),
            command: "a".into(),
            params: None,
        };
        assert_eq!(ctx.send(args).await.unwrap(), ExitCode::InvalidInput);
    }
}
