//! Session timing and identity settings.

use std::time::Duration;

use xsg_proto::LocalJoin;

/// Optional credentials sent inside the encrypted connect request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthToken {
    pub user_hash: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub discovery_attempts: u32,
    pub discovery_interval: Duration,
    pub connect_attempts: u32,
    pub connect_interval: Duration,
    /// How long to wait for the console to acknowledge the local join.
    pub auth_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Silent heartbeat intervals before the connection counts as lost.
    pub heartbeat_loss_intervals: u32,
    pub command_timeout: Duration,
    /// Resend an unanswered start-channel request after this long.
    pub channel_open_interval: Duration,
    /// Sends of one start-channel request before the open is abandoned.
    pub channel_open_attempts: u32,
    pub fragment_max_age: Duration,
    pub power_on_attempts: u32,
    pub power_on_interval: Duration,
    /// Resolution of the session's timers.
    pub tick_interval: Duration,
    /// Open the media channel as soon as the session authenticates so media
    /// status starts flowing.
    pub auto_open_media: bool,
    pub auth_token: Option<AuthToken>,
    pub local_join: LocalJoin,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_attempts: 5,
            discovery_interval: Duration::from_secs(1),
            connect_attempts: 3,
            connect_interval: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(3),
            heartbeat_loss_intervals: 3,
            command_timeout: Duration::from_secs(5),
            channel_open_interval: Duration::from_secs(1),
            channel_open_attempts: 3,
            fragment_max_age: Duration::from_secs(10),
            power_on_attempts: 5,
            power_on_interval: Duration::from_millis(500),
            tick_interval: Duration::from_millis(100),
            auto_open_media: true,
            auth_token: None,
            local_join: LocalJoin::default(),
        }
    }
}

impl SessionConfig {
    /// Silence longer than this tears the session down.
    pub fn connection_loss_after(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_loss_intervals
    }
}
