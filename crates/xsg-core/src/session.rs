//! Async session handle.
//!
//! [`Session`] is a cheap front for a driver task that owns the
//! [`SessionMachine`] and the transport's receive loop. Caller requests,
//! inbound datagrams and timer ticks are serialized through one `select!`
//! loop, so the machine is never touched concurrently.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};
use xsg_transport::{spawn_receiver, DatagramTransport, TransportError, UdpTransport};

use crate::command::{Command, Response};
use crate::config::SessionConfig;
use crate::discovery;
use crate::errors::{CommandError, ConnectError};
use crate::machine::{CommandToken, ConsoleInfo, Output, SessionEvent, SessionMachine, SessionState};
use crate::state::DeviceState;

const REQUEST_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 128;

type ConnectReply = oneshot::Sender<Result<ConsoleInfo, ConnectError>>;
type CommandReply = oneshot::Sender<Result<Response, CommandError>>;

enum Request {
    Connect {
        address: SocketAddr,
        live_id: String,
        reply: ConnectReply,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Command {
        command: Command,
        reply: CommandReply,
    },
    PowerOff {
        reply: CommandReply,
    },
    RecordGameDvr {
        seconds: u32,
        reply: CommandReply,
    },
}

/// One logical connection to one console.
///
/// Dropping every clone of the handle disconnects the session.
#[derive(Clone)]
pub struct Session {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<SessionState>,
    device: watch::Receiver<DeviceState>,
    events: broadcast::Sender<SessionEvent>,
    transport: Arc<dyn DatagramTransport>,
    config: Arc<SessionConfig>,
}

impl Session {
    /// Start a session over `transport`. Must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn DatagramTransport>, config: SessionConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (device_tx, device_rx) = watch::channel(DeviceState::default());
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE);

        let driver = Driver {
            machine: SessionMachine::new(config.clone(), Instant::now()),
            transport: transport.clone(),
            state: state_tx,
            device: device_tx,
            events: events_tx.clone(),
            connect_waiter: None,
            command_waiters: HashMap::new(),
            after_flush: Vec::new(),
            next_token: 1,
            released: false,
        };
        tokio::spawn(driver.run(requests_rx, config.tick_interval));

        Self {
            requests: requests_tx,
            state: state_rx,
            device: device_rx,
            events: events_tx,
            transport,
            config: Arc::new(config),
        }
    }

    /// Bind a UDP socket on an ephemeral port and start a session on it.
    pub async fn bind(config: SessionConfig) -> Result<Self, TransportError> {
        let transport = UdpTransport::bind_any().await?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Discover the console at `address` and run the handshake. `live_id`
    /// picks the console among responders; empty accepts whichever console
    /// answers from `address`.
    pub async fn connect(&self, address: SocketAddr, live_id: &str) -> Result<ConsoleInfo, ConnectError> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Connect {
            address,
            live_id: live_id.to_string(),
            reply,
        };
        if self.requests.send(request).await.is_err() {
            return Err(ConnectError::SessionClosed);
        }
        rx.await.unwrap_or(Err(ConnectError::SessionClosed))
    }

    /// Best-effort notify the console and close the session for good.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Wake a console in standby. Works in any session state.
    pub async fn power_on(&self, address: SocketAddr, live_id: &str) -> Result<(), TransportError> {
        discovery::power_on(
            self.transport.as_ref(),
            address,
            live_id,
            self.config.power_on_attempts,
            self.config.power_on_interval,
        )
        .await
    }

    /// Ask the console to power down; the session ends with `PoweredOff`.
    pub async fn power_off(&self) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::PowerOff { reply }).await.is_err() {
            return Err(CommandError::SessionClosed);
        }
        rx.await.unwrap_or(Err(CommandError::SessionClosed)).map(|_| ())
    }

    /// Ask the console to save the last `seconds` of gameplay as a clip.
    pub async fn record_game_dvr(&self, seconds: u32) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::RecordGameDvr { seconds, reply }).await.is_err() {
            return Err(CommandError::SessionClosed);
        }
        rx.await.unwrap_or(Err(CommandError::SessionClosed)).map(|_| ())
    }

    /// Parse and run a command by channel and command name, e.g.
    /// `send_command("media", "play", None)`.
    pub async fn send_command(
        &self,
        channel: &str,
        command: &str,
        params: Option<&str>,
    ) -> Result<Response, CommandError> {
        let command = Command::parse(channel, command, params)?;
        self.execute(command).await
    }

    pub async fn execute(&self, command: Command) -> Result<Response, CommandError> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Command { command, reply }).await.is_err() {
            return Err(CommandError::SessionClosed);
        }
        rx.await.unwrap_or(Err(CommandError::SessionClosed))
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Latest reduced device snapshot.
    pub fn device_state(&self) -> DeviceState {
        self.device.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.transport.local_addr()
    }
}

// ============================================================================
// Driver task
// ============================================================================

struct Driver {
    machine: SessionMachine,
    transport: Arc<dyn DatagramTransport>,
    state: watch::Sender<SessionState>,
    device: watch::Sender<DeviceState>,
    events: broadcast::Sender<SessionEvent>,
    connect_waiter: Option<ConnectReply>,
    command_waiters: HashMap<CommandToken, CommandReply>,
    after_flush: Vec<oneshot::Sender<()>>,
    next_token: CommandToken,
    released: bool,
}

impl Driver {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>, tick: std::time::Duration) {
        let (mut inbound, pump) = spawn_receiver(self.transport.clone());
        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        debug!("all session handles dropped");
                        self.machine.disconnect(Instant::now());
                    }
                },
                datagram = inbound.recv() => match datagram {
                    Some(Ok(datagram)) => {
                        self.machine.handle_datagram(Instant::now(), datagram.peer, &datagram.data)
                    }
                    Some(Err(e)) => self.machine.transport_failed(Instant::now(), &e),
                    None => self.machine.transport_failed(Instant::now(), &TransportError::Closed),
                },
                _ = ticker.tick() => self.machine.handle_tick(Instant::now()),
            }
            self.flush().await;
            if self.released {
                break;
            }
        }

        pump.abort();
        info!("session driver stopped");
    }

    fn handle_request(&mut self, request: Request) {
        let now = Instant::now();
        match request {
            Request::Connect {
                address,
                live_id,
                reply,
            } => {
                if self.connect_waiter.is_some() {
                    let _ = reply.send(Err(ConnectError::InProgress));
                } else {
                    self.connect_waiter = Some(reply);
                    self.machine.connect(now, address, &live_id);
                }
            }
            Request::Disconnect { reply } => {
                self.machine.disconnect(now);
                self.after_flush.push(reply);
            }
            Request::Command { command, reply } => {
                let token = self.token();
                self.command_waiters.insert(token, reply);
                self.machine.submit(now, token, command);
            }
            Request::PowerOff { reply } => {
                let token = self.token();
                self.command_waiters.insert(token, reply);
                self.machine.power_off(now, token);
            }
            Request::RecordGameDvr { seconds, reply } => {
                let token = self.token();
                self.command_waiters.insert(token, reply);
                self.machine.record_game_dvr(token, seconds);
            }
        }
    }

    fn token(&mut self) -> CommandToken {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    async fn flush(&mut self) {
        while let Some(output) = self.machine.poll_output() {
            match output {
                Output::Transmit { to, data } => {
                    if self.released {
                        continue;
                    }
                    if let Err(e) = self.transport.send_to(to, &data).await {
                        if e.is_fatal() {
                            self.machine.transport_failed(Instant::now(), &e);
                        } else {
                            debug!(%to, error = %e, "send failed");
                        }
                    }
                }
                Output::State(state) => {
                    self.state.send_replace(state);
                }
                Output::Event(event) => {
                    if let SessionEvent::StateChanged(snapshot) = &event {
                        self.device.send_replace(snapshot.clone());
                    }
                    let _ = self.events.send(event);
                }
                Output::Connected(result) => {
                    if let Some(waiter) = self.connect_waiter.take() {
                        let _ = waiter.send(result);
                    }
                }
                Output::CommandDone { token, result } => {
                    if let Some(waiter) = self.command_waiters.remove(&token) {
                        let _ = waiter.send(result);
                    }
                }
                Output::Release => {
                    self.released = true;
                    self.transport.close().await;
                }
            }
        }
        for reply in self.after_flush.drain(..) {
            let _ = reply.send(());
        }
    }
}
