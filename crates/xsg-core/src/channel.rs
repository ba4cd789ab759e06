//! Channel bookkeeping and fragment reassembly.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use xsg_proto::{Fragment, MessageType, StartChannelRequest, StartChannelResponse};

use crate::errors::CommandError;

/// Logical channels this client opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Input,
    TvRemote,
    Media,
}

impl ChannelKind {
    /// Service id sent in the start-channel request.
    pub fn service(self) -> Uuid {
        match self {
            ChannelKind::Input => Uuid::from_u128(0xfa20b8ca_66fb_46e0_adb6_0b978a59d35f),
            ChannelKind::TvRemote => Uuid::from_u128(0xd451e3b3_60bb_4c71_b3db_f994b1aca3a7),
            ChannelKind::Media => Uuid::from_u128(0x48a9ca24_eb6d_4e12_8c43_d57469edd3cd),
        }
    }

    pub fn from_service(service: &Uuid) -> Option<Self> {
        [ChannelKind::Input, ChannelKind::TvRemote, ChannelKind::Media]
            .into_iter()
            .find(|kind| kind.service() == *service)
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Input => "input",
            ChannelKind::TvRemote => "tv-remote",
            ChannelKind::Media => "media",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelKind {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(ChannelKind::Input),
            "tv-remote" | "tvremote" | "tv_remote" => Ok(ChannelKind::TvRemote),
            "media" => Ok(ChannelKind::Media),
            other => Err(CommandError::InvalidCommand(format!("unknown channel {other:?}"))),
        }
    }
}

/// Outcome of a start-channel response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenResult {
    Opened { kind: ChannelKind, channel_id: u64 },
    Rejected { kind: ChannelKind, result: u32 },
}

/// Start-channel requests that got no response yet.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OpenRetries {
    /// Requests to send again, with their original request ids.
    pub resend: Vec<StartChannelRequest>,
    /// Kinds whose open ran out of attempts; they can be opened afresh.
    pub abandoned: Vec<ChannelKind>,
}

#[derive(Debug)]
struct PendingOpen {
    kind: ChannelKind,
    request: StartChannelRequest,
    attempts: u32,
    next_attempt: Instant,
}

/// Channel ids assigned by the console for the current session.
///
/// Opening is idempotent per kind: a kind that is open or being opened
/// produces no second request. An unanswered open is resent every
/// `retry_interval` and abandoned after `max_attempts` sends.
#[derive(Debug)]
pub struct ChannelTable {
    open: HashMap<ChannelKind, u64>,
    by_id: HashMap<u64, ChannelKind>,
    pending: HashMap<u32, PendingOpen>,
    next_request_id: u32,
    retry_interval: Duration,
    max_attempts: u32,
}

impl ChannelTable {
    pub fn new(retry_interval: Duration, max_attempts: u32) -> Self {
        Self {
            open: HashMap::new(),
            by_id: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: 0,
            retry_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn id_of(&self, kind: ChannelKind) -> Option<u64> {
        self.open.get(&kind).copied()
    }

    pub fn kind_of(&self, channel_id: u64) -> Option<ChannelKind> {
        self.by_id.get(&channel_id).copied()
    }

    pub fn is_opening(&self, kind: ChannelKind) -> bool {
        self.pending.values().any(|p| p.kind == kind)
    }

    /// Start-channel request for `kind`, or `None` if already open or opening.
    pub fn begin_open(&mut self, now: Instant, kind: ChannelKind, title_id: u32) -> Option<StartChannelRequest> {
        if self.open.contains_key(&kind) || self.is_opening(kind) {
            return None;
        }
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request = StartChannelRequest {
            channel_request_id: self.next_request_id,
            title_id,
            service: kind.service(),
            activity_id: 0,
        };
        self.pending.insert(
            request.channel_request_id,
            PendingOpen {
                kind,
                request: request.clone(),
                attempts: 1,
                next_attempt: now + self.retry_interval,
            },
        );
        Some(request)
    }

    /// Collect opens whose retry time has come, in request order.
    pub fn due_retries(&mut self, now: Instant) -> OpenRetries {
        let mut due: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.next_attempt)
            .map(|(id, _)| *id)
            .collect();
        due.sort_unstable();

        let mut retries = OpenRetries::default();
        for id in due {
            let Some(entry) = self.pending.get_mut(&id) else {
                continue;
            };
            if entry.attempts >= self.max_attempts {
                if let Some(entry) = self.pending.remove(&id) {
                    retries.abandoned.push(entry.kind);
                }
                continue;
            }
            entry.attempts += 1;
            entry.next_attempt = now + self.retry_interval;
            retries.resend.push(entry.request.clone());
        }
        retries
    }

    /// Resolve a pending open. Responses to unknown request ids yield `None`.
    pub fn complete_open(&mut self, response: &StartChannelResponse) -> Option<OpenResult> {
        let kind = self.pending.remove(&response.channel_request_id)?.kind;
        if response.result != 0 {
            return Some(OpenResult::Rejected {
                kind,
                result: response.result,
            });
        }
        self.open.insert(kind, response.target_channel_id);
        self.by_id.insert(response.target_channel_id, kind);
        Some(OpenResult::Opened {
            kind,
            channel_id: response.target_channel_id,
        })
    }

    /// Forget a channel; returns its kind if it was open.
    pub fn close(&mut self, channel_id: u64) -> Option<ChannelKind> {
        let kind = self.by_id.remove(&channel_id)?;
        self.open.remove(&kind);
        Some(kind)
    }

    /// Invalidate every channel id; used on disconnect.
    pub fn clear(&mut self) {
        self.open.clear();
        self.by_id.clear();
        self.pending.clear();
    }
}

// ============================================================================
// Fragment reassembly
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragmentKey {
    channel_id: u64,
    message_type: MessageType,
    sequence_begin: u32,
    sequence_end: u32,
}

#[derive(Debug)]
struct PartialMessage {
    started: Instant,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// Buffers fragments keyed by their sequence range until every part arrived.
#[derive(Debug)]
pub struct FragmentAssembler {
    partial: HashMap<FragmentKey, PartialMessage>,
    max_age: Duration,
}

impl FragmentAssembler {
    pub fn new(max_age: Duration) -> Self {
        Self {
            partial: HashMap::new(),
            max_age,
        }
    }

    /// Add the fragment carried by the message with `sequence`. Returns the
    /// full payload once the range is complete.
    pub fn push(
        &mut self,
        now: Instant,
        channel_id: u64,
        message_type: MessageType,
        sequence: u32,
        fragment: Fragment,
    ) -> Option<Vec<u8>> {
        if sequence < fragment.sequence_begin || sequence >= fragment.sequence_end {
            debug!(sequence, "fragment outside its own range, dropping");
            return None;
        }
        let key = FragmentKey {
            channel_id,
            message_type,
            sequence_begin: fragment.sequence_begin,
            sequence_end: fragment.sequence_end,
        };
        let entry = self.partial.entry(key).or_insert_with(|| PartialMessage {
            started: now,
            parts: BTreeMap::new(),
        });
        entry.parts.insert(sequence, fragment.data);

        let expected = (key.sequence_end - key.sequence_begin) as usize;
        if entry.parts.len() < expected {
            return None;
        }
        let done = self.partial.remove(&key)?;
        Some(done.parts.into_values().flatten().collect())
    }

    /// Drop partial messages older than the maximum age.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.partial.len();
        let max_age = self.max_age;
        self.partial
            .retain(|_, partial| now.saturating_duration_since(partial.started) < max_age);
        let dropped = before - self.partial.len();
        if dropped > 0 {
            debug!(dropped, "expired incomplete fragment sets");
        }
        dropped
    }

    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}
