//! End-to-end session flows against the scripted console.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::time;
use xsg_core::harness::{
    console_status, media_state, ConsoleBehavior, ConsoleControl, FakeConsole, CLIENT_ADDR, CONSOLE_ADDR,
    CONSOLE_LIVE_ID,
};
use xsg_core::{
    discover, ChannelKind, Command, CommandError, ConnectError, DeviceState, DisconnectReason, ErrorKind,
    MediaPlayback, Response, Session, SessionConfig, SessionEvent, SessionState, TvRemoteRequest,
};
use xsg_proto::{
    disconnect_reason, ConnectResult, GamepadButton, JsonMessage, MediaControl, MessagePayload, MessageType,
    PlaybackStatus, SoundLevel,
};
use xsg_transport::MemoryNetwork;

const DASHBOARD: &str = "Microsoft.Xbox.Dashboard_8wekyb3d8bbwe!Xbox.Dashboard.Application";

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

struct Rig {
    net: MemoryNetwork,
    console: FakeConsole,
    session: Session,
    events: broadcast::Receiver<SessionEvent>,
}

impl Rig {
    fn new(behavior: ConsoleBehavior) -> Self {
        let net = MemoryNetwork::new();
        let console = FakeConsole::spawn(&net, behavior).unwrap();
        let session = Session::new(Arc::new(net.bind(addr(CLIENT_ADDR))), SessionConfig::default());
        let events = session.subscribe();
        Self {
            net,
            console,
            session,
            events,
        }
    }

    async fn connected(behavior: ConsoleBehavior) -> Self {
        let rig = Self::new(behavior);
        rig.session
            .connect(rig.console.address(), CONSOLE_LIVE_ID)
            .await
            .expect("session should authenticate");
        rig
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn state_changes(&mut self) -> Vec<DeviceState> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

async fn settle() {
    time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test(start_paused = true)]
async fn discovery_without_responder_times_out() {
    let net = MemoryNetwork::new();
    let session = Session::new(Arc::new(net.bind(addr(CLIENT_ADDR))), SessionConfig::default());
    let mut events = session.subscribe();

    let result = session.connect(addr(CONSOLE_ADDR), CONSOLE_LIVE_ID).await;
    assert_eq!(result, Err(ConnectError::DiscoveryTimeout));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(net.sent_from(addr(CLIENT_ADDR)).len(), 5);
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::Error {
            kind: ErrorKind::Discovery,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn discovery_ignores_other_consoles() {
    let rig = Rig::new(ConsoleBehavior {
        live_id: "FD00998877665544".into(),
        ..Default::default()
    });
    let result = rig.session.connect(rig.console.address(), CONSOLE_LIVE_ID).await;
    assert_eq!(result, Err(ConnectError::DiscoveryTimeout));

    // An empty live id accepts whoever answers from the address.
    let info = rig.session.connect(rig.console.address(), "").await.unwrap();
    assert_eq!(info.live_id, "FD00998877665544");
}

#[tokio::test(start_paused = true)]
async fn handshake_reports_console_identity() {
    let rig = Rig::new(ConsoleBehavior::default());
    let info = rig
        .session
        .connect(rig.console.address(), &CONSOLE_LIVE_ID.to_lowercase())
        .await
        .unwrap();
    assert_eq!(info.live_id, CONSOLE_LIVE_ID);
    assert_eq!(info.name, "XboxOne");
    assert_eq!(info.address, addr(CONSOLE_ADDR));
    assert_eq!(info.participant_id, 31);
    assert_eq!(rig.session.state(), SessionState::Authenticated);
    assert_eq!(rig.console.seen_count(MessageType::LocalJoin), 1);
}

#[tokio::test(start_paused = true)]
async fn first_status_after_auth_emits_once() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;

    let events = rig.drain();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::DeviceInfo { .. }))
            .collect::<Vec<_>>(),
        vec![&SessionEvent::DeviceInfo {
            firmware: "10.0.22621".into(),
            locale: "en-US".into(),
        }]
    );
    let changes: Vec<_> = events
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].power);
    assert_eq!(changes[0].title_id, Some(0x162615ad));
    assert_eq!(changes[0].active_reference.as_deref(), Some(DASHBOARD));
    assert_eq!(changes[0].volume, 0);
    assert_eq!(changes[0].media, MediaPlayback::Stopped);

    // Field-equal repeat is suppressed.
    rig.console
        .control(ConsoleControl::SendStatus(console_status(0x162615ad, DASHBOARD)));
    settle().await;
    assert!(rig.state_changes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn status_sources_merge_into_one_snapshot() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console.control(ConsoleControl::SendMediaState(media_state(
        PlaybackStatus::Playing,
        SoundLevel::Full,
    )));
    settle().await;
    let changes = rig.state_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].media, MediaPlayback::Playing);
    assert_eq!(changes[0].volume, 100);

    // Notifications arrive on the tv-remote channel.
    rig.session
        .send_command("tv-remote", "SendKey", Some("btn.vol_up"))
        .await
        .unwrap();
    settle().await;
    assert!(rig.state_changes().is_empty());

    rig.console.control(ConsoleControl::SendJson(json!({
        "notification": "VolumeChanged",
        "params": { "volume": 30, "muted": false }
    })));
    settle().await;
    assert_eq!(rig.state_changes().len(), 1);

    assert_eq!(
        rig.session.device_state(),
        DeviceState {
            power: true,
            title_id: Some(0x162615ad),
            active_reference: Some(DASHBOARD.into()),
            volume: 30,
            muted: false,
            media: MediaPlayback::Playing,
            firmware: Some("10.0.22621".into()),
            locale: Some("en-US".into()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn command_while_disconnected_touches_no_network() {
    let net = MemoryNetwork::new();
    let session = Session::new(Arc::new(net.bind(addr(CLIENT_ADDR))), SessionConfig::default());

    let result = session.send_command("input", "A", None).await;
    assert_eq!(result, Err(CommandError::NotAuthenticated(SessionState::Disconnected)));
    assert!(net.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_console_is_lost_once() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console.control(ConsoleControl::GoSilent);
    time::sleep(Duration::from_secs(12)).await;
    assert_eq!(rig.session.state(), SessionState::Disconnected);

    time::sleep(Duration::from_secs(20)).await;
    let disconnects: Vec<_> = rig
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Disconnected(_)))
        .collect();
    assert_eq!(disconnects, vec![SessionEvent::Disconnected(DisconnectReason::ConnectionLost)]);

    let result = rig.session.execute(Command::Input(GamepadButton::A)).await;
    assert_eq!(result, Err(CommandError::NotAuthenticated(SessionState::Disconnected)));
}

#[tokio::test(start_paused = true)]
async fn reauthentication_re_emits_unchanged_state() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    let before = rig.state_changes();
    assert_eq!(before.len(), 1);

    rig.console.control(ConsoleControl::GoSilent);
    time::sleep(Duration::from_secs(12)).await;
    rig.drain();
    rig.console.control(ConsoleControl::Resume);

    rig.session
        .connect(rig.console.address(), CONSOLE_LIVE_ID)
        .await
        .expect("reconnect");
    settle().await;
    let events = rig.drain();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::DeviceInfo { .. }))
            .count(),
        1
    );
    let after: Vec<_> = events
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(after, before);

    // Outbound sequence numbers never repeat across reconnects.
    let sequences: Vec<u32> = rig.console.seen().iter().map(|m| m.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");
    assert_eq!(rig.console.seen_count(MessageType::LocalJoin), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_sequence_is_dropped() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console.control(ConsoleControl::SendStatusWithSequence {
        status: console_status(0x1234, "Other_8wekyb3d8bbwe!App"),
        sequence: 1,
        need_ack: false,
    });
    settle().await;
    assert!(rig.state_changes().is_empty());
    assert_eq!(rig.session.device_state().title_id, Some(0x162615ad));

    rig.console
        .control(ConsoleControl::SendStatus(console_status(0x1234, "Other_8wekyb3d8bbwe!App")));
    settle().await;
    let changes = rig.state_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].title_id, Some(0x1234));
}

#[tokio::test(start_paused = true)]
async fn repeated_message_is_acked_again_but_applied_once() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console.control(ConsoleControl::SendStatusWithSequence {
        status: console_status(0x1234, "Other_8wekyb3d8bbwe!App"),
        sequence: 1000,
        need_ack: true,
    });
    settle().await;
    assert_eq!(rig.state_changes().len(), 1);
    assert_eq!(rig.console.acks_for(1000), 1);

    // Same sequence again, as a console does when its ack went missing.
    rig.console.control(ConsoleControl::SendStatusWithSequence {
        status: console_status(0x5678, "Third_8wekyb3d8bbwe!App"),
        sequence: 1000,
        need_ack: true,
    });
    settle().await;
    assert!(rig.state_changes().is_empty());
    assert_eq!(rig.session.device_state().title_id, Some(0x1234));
    assert_eq!(rig.console.acks_for(1000), 2);
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_a_responsive_session_alive() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(rig.session.state(), SessionState::Authenticated);
    // One heartbeat every 3 seconds.
    let heartbeats = rig.console.heartbeats();
    assert!((19..=21).contains(&heartbeats), "{heartbeats} heartbeats");
    let events = rig.drain();
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, SessionEvent::Disconnected(_) | SessionEvent::Error { .. })),
        "{events:?}"
    );

    let result = rig.session.send_command("input", "a", None).await;
    assert_eq!(result, Ok(Response::Sent));
}

#[tokio::test(start_paused = true)]
async fn channel_messages_on_the_core_channel_are_ignored() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console.control(ConsoleControl::SendOnCore(MessagePayload::MediaState(media_state(
        PlaybackStatus::Playing,
        SoundLevel::Full,
    ))));
    rig.console.control(ConsoleControl::SendOnCore(MessagePayload::Json(JsonMessage {
        text: json!({
            "notification": "VolumeChanged",
            "params": { "volume": 30, "muted": false }
        })
        .to_string(),
    })));
    settle().await;
    assert!(rig.state_changes().is_empty());
    assert_eq!(rig.session.device_state().media, MediaPlayback::Stopped);

    // The same media state on the media channel applies.
    rig.console.control(ConsoleControl::SendMediaState(media_state(
        PlaybackStatus::Playing,
        SoundLevel::Full,
    )));
    settle().await;
    let changes = rig.state_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].media, MediaPlayback::Playing);
}

#[tokio::test(start_paused = true)]
async fn lost_channel_request_is_resent() {
    let rig = Rig::connected(ConsoleBehavior {
        drop_channel_requests: 1,
        ..Default::default()
    })
    .await;

    // The media open sent on authentication never arrived; the command
    // waits for the resend instead of stalling the channel.
    let result = rig
        .session
        .execute(Command::Media {
            control: MediaControl::Play,
            seek: None,
        })
        .await;
    assert_eq!(result, Ok(Response::MediaResult(0)));
    let requests: Vec<_> = rig
        .console
        .seen()
        .into_iter()
        .filter(|m| m.message_type == MessageType::StartChannelRequest)
        .collect();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].sequence < requests[1].sequence);
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn unanswered_channel_open_gives_up_and_reopens_later() {
    let mut rig = Rig::connected(ConsoleBehavior {
        drop_channel_requests: 3,
        ..Default::default()
    })
    .await;

    let media = Command::Media {
        control: MediaControl::Play,
        seek: None,
    };
    let started = time::Instant::now();
    assert_eq!(rig.session.execute(media.clone()).await, Err(CommandError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(rig.console.seen_count(MessageType::StartChannelRequest), 3);
    assert!(rig.drain().iter().any(|e| matches!(
        e,
        SessionEvent::Error {
            kind: ErrorKind::Channel,
            ..
        }
    )));

    assert_eq!(rig.session.execute(media).await, Ok(Response::MediaResult(0)));
    assert_eq!(rig.console.seen_count(MessageType::StartChannelRequest), 4);
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn game_clip_goes_out_on_the_core_channel() {
    let rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;

    rig.session.record_game_dvr(60).await.unwrap();
    settle().await;
    let clips: Vec<_> = rig
        .console
        .seen()
        .into_iter()
        .filter(|m| m.message_type == MessageType::GameDvrRecord)
        .collect();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].channel_id, 0);
    assert!(clips[0].need_ack);

    assert!(matches!(
        rig.session.record_game_dvr(0).await,
        Err(CommandError::InvalidCommand(_))
    ));
    assert_eq!(rig.console.seen_count(MessageType::GameDvrRecord), 1);
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn media_channel_opens_once_and_commands_complete() {
    let mut rig = Rig::connected(ConsoleBehavior {
        media_state: Some(media_state(PlaybackStatus::Playing, SoundLevel::Low)),
        ..Default::default()
    })
    .await;
    settle().await;
    let last = rig.state_changes().pop().unwrap();
    assert_eq!(last.media, MediaPlayback::Playing);
    assert_eq!(last.volume, 50);

    let result = rig
        .session
        .execute(Command::Media {
            control: MediaControl::Play,
            seek: None,
        })
        .await;
    assert_eq!(result, Ok(Response::MediaResult(0)));
    assert_eq!(rig.console.seen_count(MessageType::StartChannelRequest), 1);

    let result = rig.session.send_command("input", "nexus", None).await;
    assert_eq!(result, Ok(Response::Sent));
    settle().await;
    assert_eq!(rig.console.seen_count(MessageType::StartChannelRequest), 2);
    assert_eq!(rig.console.seen_count(MessageType::Gamepad), 2);

    // Second input reuses the channel.
    rig.session.send_command("input", "b", None).await.unwrap();
    settle().await;
    assert_eq!(rig.console.seen_count(MessageType::StartChannelRequest), 2);
    assert_eq!(rig.console.seen_count(MessageType::Gamepad), 4);
}

#[tokio::test(start_paused = true)]
async fn fragmented_tv_remote_response_is_reassembled() {
    let rig = Rig::connected(ConsoleBehavior {
        json_fragments: 3,
        ..Default::default()
    })
    .await;

    let response = rig
        .session
        .send_command("tv-remote", "GetConfiguration", None)
        .await
        .unwrap();
    let Response::Json(value) = response else {
        panic!("expected json response, got {response:?}");
    };
    assert_eq!(value["response"], "GetConfiguration");
    assert_eq!(value["params"]["device_id"], "tuner");
    assert!(value["msgid"].as_str().unwrap().starts_with("xsg."));

    let key = rig
        .session
        .execute(Command::TvRemote(TvRemoteRequest::SendKey {
            button_id: "btn.vol_up".into(),
            device_id: None,
        }))
        .await;
    assert_eq!(key, Ok(Response::Sent));
}

#[tokio::test(start_paused = true)]
async fn rejected_channel_fails_queued_command() {
    let rig = Rig::connected(ConsoleBehavior {
        channel_result: 0x8000_0001,
        ..Default::default()
    })
    .await;

    let result = rig.session.execute(Command::Input(GamepadButton::A)).await;
    assert_eq!(
        result,
        Err(CommandError::ChannelRejected {
            channel: ChannelKind::Input,
            result: 0x8000_0001
        })
    );
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn unanswered_command_times_out_without_dropping_session() {
    let rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.console.control(ConsoleControl::GoSilent);

    let started = time::Instant::now();
    let result = rig
        .session
        .execute(Command::Media {
            control: MediaControl::Pause,
            seek: None,
        })
        .await;
    assert_eq!(result, Err(CommandError::Timeout));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(rig.session.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn power_off_ends_session() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.session.power_off().await.unwrap();
    settle().await;
    let events = rig.drain();
    assert!(matches!(&events[0], SessionEvent::StateChanged(state) if !state.power));
    assert_eq!(events[1], SessionEvent::Disconnected(DisconnectReason::PoweredOff));
    assert_eq!(rig.console.seen_count(MessageType::PowerOff), 1);
    assert_eq!(rig.session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn console_disconnect_for_power_off() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.console
        .control(ConsoleControl::Disconnect(disconnect_reason::POWER_OFF));
    settle().await;
    let events = rig.drain();
    assert!(matches!(&events[0], SessionEvent::StateChanged(state) if !state.power));
    assert_eq!(
        events[1],
        SessionEvent::Disconnected(DisconnectReason::ConsoleDisconnected(disconnect_reason::POWER_OFF))
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_is_terminal() {
    let mut rig = Rig::connected(ConsoleBehavior::default()).await;
    settle().await;
    rig.drain();

    rig.session.disconnect().await;
    assert_eq!(rig.session.state(), SessionState::Disconnected);
    assert_eq!(rig.drain(), vec![SessionEvent::Disconnected(DisconnectReason::Requested)]);
    settle().await;
    assert_eq!(rig.console.seen_count(MessageType::Disconnect), 1);

    assert_eq!(
        rig.session.connect(rig.console.address(), CONSOLE_LIVE_ID).await,
        Err(ConnectError::SessionClosed)
    );
    assert_eq!(
        rig.session.send_command("media", "play", None).await,
        Err(CommandError::SessionClosed)
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials() {
    let rig = Rig::new(ConsoleBehavior {
        connect_result: ConnectResult::FailUserAuthFailed,
        ..Default::default()
    });
    let result = rig.session.connect(rig.console.address(), CONSOLE_LIVE_ID).await;
    assert!(matches!(result, Err(ConnectError::AuthRejected(_))), "{result:?}");
    assert_eq!(rig.session.state(), SessionState::Disconnected);

    let rig = Rig::new(ConsoleBehavior {
        reject_join: true,
        ..Default::default()
    });
    let result = rig.session.connect(rig.console.address(), CONSOLE_LIVE_ID).await;
    assert!(matches!(result, Err(ConnectError::AuthRejected(_))), "{result:?}");

    let rig = Rig::new(ConsoleBehavior {
        connect_result: ConnectResult::FailDeviceLimitExceeded,
        ..Default::default()
    });
    let result = rig.session.connect(rig.console.address(), CONSOLE_LIVE_ID).await;
    assert!(matches!(result, Err(ConnectError::HandshakeFailed(_))), "{result:?}");
}

#[tokio::test(start_paused = true)]
async fn concurrent_connect_is_refused() {
    let rig = Rig::new(ConsoleBehavior::default());
    let session = rig.session.clone();
    let address = rig.console.address();
    let first = tokio::spawn(async move { session.connect(address, CONSOLE_LIVE_ID).await });
    time::sleep(Duration::from_millis(1)).await;

    let second = rig.session.connect(address, CONSOLE_LIVE_ID).await;
    assert_eq!(second, Err(ConnectError::InProgress));
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn discover_collects_every_console() {
    let net = MemoryNetwork::new();
    let _a = FakeConsole::spawn(&net, ConsoleBehavior::default()).unwrap();
    let _b = FakeConsole::spawn_at(
        &net,
        addr("192.168.1.51:5050"),
        ConsoleBehavior {
            name: "XboxSeriesX".into(),
            live_id: "F4000ABCDEF01234".into(),
            ..Default::default()
        },
    )
    .unwrap();
    let client = net.bind(addr(CLIENT_ADDR));

    let mut found = discover(&client, addr("255.255.255.255:5050"), Duration::from_secs(3))
        .await
        .unwrap();
    found.sort_by(|a, b| a.address.cmp(&b.address));
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].live_id, CONSOLE_LIVE_ID);
    assert_eq!(found[1].name, "XboxSeriesX");
    assert_eq!(found[1].address, addr("192.168.1.51:5050"));
}

#[tokio::test(start_paused = true)]
async fn power_on_hits_address_and_broadcast() {
    let net = MemoryNetwork::new();
    let session = Session::new(Arc::new(net.bind(addr(CLIENT_ADDR))), SessionConfig::default());

    session
        .power_on(addr(CONSOLE_ADDR), CONSOLE_LIVE_ID)
        .await
        .unwrap();
    let sent = net.sent_from(addr(CLIENT_ADDR));
    assert_eq!(sent.len(), 10);
    assert_eq!(sent.iter().filter(|d| d.to == addr(CONSOLE_ADDR)).count(), 5);
    assert_eq!(
        sent.iter()
            .filter(|d| d.to == addr("255.255.255.255:5050"))
            .count(),
        5
    );
    assert_eq!(session.state(), SessionState::Disconnected);
}
