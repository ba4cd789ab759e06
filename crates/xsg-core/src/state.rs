//! Device state reduction.
//!
//! Status payloads are turned into a [`StatusUpdate`] (every field optional),
//! merged onto the current [`DeviceState`], and the result is emitted only
//! when something actually changed.

use serde_json::Value;
use xsg_proto::{ConsoleStatus, MediaState, PlaybackStatus, SoundLevel};

/// Application the console shows when nothing else is running.
pub const IDLE_SCREEN_AUM: &str = "Xbox.IdleScreen_8wekyb3d8bbwe!Xbox.IdleScreen.Application";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaPlayback {
    #[default]
    Stopped,
    Playing,
    Paused,
    Loading,
    Interrupted,
}

impl From<PlaybackStatus> for MediaPlayback {
    fn from(status: PlaybackStatus) -> Self {
        match status {
            PlaybackStatus::Playing => MediaPlayback::Playing,
            PlaybackStatus::Paused => MediaPlayback::Paused,
            PlaybackStatus::Changing => MediaPlayback::Loading,
            PlaybackStatus::Closed | PlaybackStatus::Stopped | PlaybackStatus::Other(_) => {
                MediaPlayback::Stopped
            }
        }
    }
}

/// Canonical snapshot of the console.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub power: bool,
    pub title_id: Option<u32>,
    /// Application user model id of the focused app.
    pub active_reference: Option<String>,
    /// 0-100.
    pub volume: u8,
    pub muted: bool,
    pub media: MediaPlayback,
    pub firmware: Option<String>,
    pub locale: Option<String>,
}

impl DeviceState {
    /// Powered on but sitting on the idle screen.
    pub fn is_idle_screen(&self) -> bool {
        self.power && self.active_reference.as_deref() == Some(IDLE_SCREEN_AUM)
    }

    fn merged(&self, update: &StatusUpdate) -> DeviceState {
        DeviceState {
            power: update.power.unwrap_or(self.power),
            title_id: update.title_id.or(self.title_id),
            active_reference: update
                .active_reference
                .clone()
                .or_else(|| self.active_reference.clone()),
            volume: update.volume.unwrap_or(self.volume),
            muted: update.muted.unwrap_or(self.muted),
            media: update.media.unwrap_or(self.media),
            firmware: update.firmware.clone().or_else(|| self.firmware.clone()),
            locale: update.locale.clone().or_else(|| self.locale.clone()),
        }
    }
}

/// Partial state carried by one status payload; `None` keeps the old value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusUpdate {
    pub power: Option<bool>,
    pub title_id: Option<u32>,
    pub active_reference: Option<String>,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub media: Option<MediaPlayback>,
    pub firmware: Option<String>,
    pub locale: Option<String>,
}

impl StatusUpdate {
    pub fn from_console_status(status: &ConsoleStatus) -> Self {
        let focused = status.focused_title();
        StatusUpdate {
            power: Some(true),
            title_id: focused.map(|t| t.title_id),
            active_reference: focused.map(|t| t.aum.clone()),
            firmware: Some(status.firmware_revision()),
            locale: Some(status.locale.clone()),
            ..Default::default()
        }
    }

    pub fn from_media_state(state: &MediaState) -> Self {
        let (volume, muted) = match state.sound_level {
            SoundLevel::Muted => (None, Some(true)),
            SoundLevel::Low => (Some(50), Some(false)),
            SoundLevel::Full => (Some(100), Some(false)),
            SoundLevel::Other(_) => (None, None),
        };
        StatusUpdate {
            volume,
            muted,
            media: Some(state.playback_status.into()),
            ..Default::default()
        }
    }

    pub fn media_removed() -> Self {
        StatusUpdate {
            media: Some(MediaPlayback::Interrupted),
            ..Default::default()
        }
    }

    pub fn powered_off() -> Self {
        StatusUpdate {
            power: Some(false),
            media: Some(MediaPlayback::Stopped),
            ..Default::default()
        }
    }

    /// `VolumeChanged` notification from the tv-remote channel; other JSON
    /// yields `None`.
    pub fn from_tv_remote(json: &Value) -> Option<Self> {
        if json.get("notification").and_then(Value::as_str) != Some("VolumeChanged") {
            return None;
        }
        let params = json.get("params")?;
        let update = StatusUpdate {
            volume: params
                .get("volume")
                .and_then(Value::as_u64)
                .map(|v| v.min(100) as u8),
            muted: params.get("muted").and_then(Value::as_bool),
            ..Default::default()
        };
        (update != StatusUpdate::default()).then_some(update)
    }
}

/// Reduces status updates and suppresses no-op repeats.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: DeviceState,
    force_next: bool,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: DeviceState::default(),
            force_next: true,
        }
    }

    pub fn snapshot(&self) -> &DeviceState {
        &self.current
    }

    /// Arm the next update to be emitted even when nothing changed. Called on
    /// every (re)authentication; cached values are kept.
    pub fn rearm(&mut self) {
        self.force_next = true;
    }

    /// Merge `update`; returns the new snapshot when it should be emitted.
    pub fn apply(&mut self, update: &StatusUpdate) -> Option<DeviceState> {
        let next = self.current.merged(update);
        let emit = self.force_next || next != self.current;
        self.current = next;
        if emit {
            self.force_next = false;
            Some(self.current.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use xsg_proto::ActiveTitle;

    fn playing_at(volume: u8) -> StatusUpdate {
        StatusUpdate {
            power: Some(true),
            volume: Some(volume),
            muted: Some(false),
            media: Some(MediaPlayback::Playing),
            ..Default::default()
        }
    }

    #[test]
    fn first_update_merges_onto_defaults() {
        let mut tracker = StateTracker::new();
        let emitted = tracker.apply(&playing_at(30)).unwrap();
        assert_eq!(
            emitted,
            DeviceState {
                power: true,
                volume: 30,
                muted: false,
                media: MediaPlayback::Playing,
                ..Default::default()
            }
        );
    }

    #[test]
    fn field_equal_repeat_is_suppressed() {
        let mut tracker = StateTracker::new();
        assert!(tracker.apply(&playing_at(30)).is_some());
        // Structurally different payload carrying the same values.
        let partial = StatusUpdate {
            volume: Some(30),
            ..Default::default()
        };
        assert!(tracker.apply(&partial).is_none());
        assert!(tracker.apply(&playing_at(30)).is_none());
    }

    #[test]
    fn single_field_change_emits_once() {
        let mut tracker = StateTracker::new();
        tracker.apply(&playing_at(30));
        let emitted = tracker.apply(&StatusUpdate {
            muted: Some(true),
            ..Default::default()
        });
        assert!(emitted.unwrap().muted);
        assert!(tracker
            .apply(&StatusUpdate {
                muted: Some(true),
                ..Default::default()
            })
            .is_none());
    }

    #[test]
    fn rearm_forces_emit_of_equal_state() {
        let mut tracker = StateTracker::new();
        tracker.apply(&playing_at(30));
        tracker.rearm();
        assert_eq!(tracker.apply(&playing_at(30)).unwrap().volume, 30);
        assert!(tracker.apply(&playing_at(30)).is_none());
    }

    #[test]
    fn console_status_reduction() {
        let status = ConsoleStatus {
            live_tv_provider: 0,
            major_version: 10,
            minor_version: 0,
            build_number: 22621,
            locale: "en-GB".into(),
            active_titles: vec![ActiveTitle {
                title_id: 714681658,
                has_focus: true,
                title_location: 0,
                product_id: uuid::Uuid::nil(),
                sandbox_id: uuid::Uuid::nil(),
                aum: IDLE_SCREEN_AUM.into(),
            }],
        };
        let mut tracker = StateTracker::new();
        let state = tracker.apply(&StatusUpdate::from_console_status(&status)).unwrap();
        assert!(state.power);
        assert_eq!(state.title_id, Some(714681658));
        assert_eq!(state.firmware.as_deref(), Some("10.0.22621"));
        assert!(state.is_idle_screen());

        // An empty title list keeps the previous title.
        let empty = ConsoleStatus {
            active_titles: vec![],
            ..status
        };
        assert!(tracker.apply(&StatusUpdate::from_console_status(&empty)).is_none());
    }

    #[test]
    fn playback_and_sound_mapping() {
        assert_eq!(MediaPlayback::from(PlaybackStatus::Changing), MediaPlayback::Loading);
        assert_eq!(MediaPlayback::from(PlaybackStatus::Closed), MediaPlayback::Stopped);
        let media = MediaState {
            title_id: 1,
            aum_id: String::new(),
            asset_id: String::new(),
            media_type: 0,
            sound_level: SoundLevel::Muted,
            enabled_commands: 0,
            playback_status: PlaybackStatus::Paused,
            rate: 0.0,
            position: 0,
            media_start: 0,
            media_end: 0,
            min_seek: 0,
            max_seek: 0,
            metadata: vec![],
        };
        let update = StatusUpdate::from_media_state(&media);
        assert_eq!(update.muted, Some(true));
        assert_eq!(update.volume, None);
        assert_eq!(update.media, Some(MediaPlayback::Paused));
    }

    #[test]
    fn volume_notification() {
        let update = StatusUpdate::from_tv_remote(&json!({
            "notification": "VolumeChanged",
            "params": { "volume": 30, "muted": false }
        }))
        .unwrap();
        assert_eq!(update.volume, Some(30));
        assert_eq!(update.muted, Some(false));

        assert!(StatusUpdate::from_tv_remote(&json!({"msgid": "1", "response": "GetConfiguration"})).is_none());
    }

    fn any_update() -> impl Strategy<Value = StatusUpdate> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(0u8..=100),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(power, volume, muted)| StatusUpdate {
                power,
                volume,
                muted,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn emits_iff_snapshot_changes(updates in proptest::collection::vec(any_update(), 1..20)) {
            let mut tracker = StateTracker::new();
            tracker.apply(&StatusUpdate::default());
            for update in updates {
                let before = tracker.snapshot().clone();
                let emitted = tracker.apply(&update);
                prop_assert_eq!(emitted.is_some(), &before != tracker.snapshot());
            }
        }
    }
}
