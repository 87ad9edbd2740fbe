//! Broadcast port.
//!
//! The engine hands plain structured messages to a [`Broadcaster`]; framing
//! and delivery to players belong to the transport. Messages are tagged
//! with `"type"` when serialized so clients can dispatch on the kind.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::phase::GamePhase;
use crate::resolution::ResolutionResult;
use crate::session::HistoryEntry;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Which side of the table a participant plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Email-sending team
    Esp,
    /// Mailbox-provider team
    Destination,
}

/// Per-ESP figures shown on a destination's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EspMetrics {
    /// Emails the ESP sent to this destination last round
    pub volume: u64,
    /// Final inbox rate at this destination last round
    pub delivery_rate: f64,
    /// ESP's reputation at this destination
    pub reputation: u8,
    /// Whether a spam trap at this destination caught the ESP
    pub spam_trap_hit: bool,
}

/// A message addressed to everyone in a room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// A participant locked in.
    LockConfirmed {
        /// Team or destination name
        participant: String,
        /// Which side the participant plays
        side: Side,
        /// When the lock was recorded
        locked_at: DateTime<Utc>,
        /// Whether the lock was forced by the timer
        automatic: bool,
    },

    /// How many participants are still deciding.
    RemainingPlayers {
        /// Participants not yet locked
        remaining: usize,
        /// Participants with players
        total: usize,
        /// Whether everyone has locked
        all_locked: bool,
    },

    /// The planning timer is about to run out.
    AutoLockWarning {
        /// Seconds left
        seconds_remaining: u64,
    },

    /// The room moved to a new phase.
    PhaseTransition {
        /// Phase entered
        phase: GamePhase,
        /// Current round
        round: u32,
        /// Player-facing summary
        message: String,
        /// Every resolved round so far
        history: Vec<HistoryEntry>,
        /// Most recent resolution
        latest: Option<ResolutionResult>,
    },

    /// Refreshed numbers for one ESP.
    EspDashboard {
        /// Team name
        team: String,
        /// Credit balance
        credits: u64,
        /// Reputation per destination
        reputation: IndexMap<String, u8>,
    },

    /// Refreshed numbers for one destination.
    DestinationDashboard {
        /// Destination name
        destination: String,
        /// Budget balance
        budget: u64,
        /// Tools the destination owns
        owned_tools: Vec<String>,
        /// Figures per ESP
        esp_metrics: IndexMap<String, EspMetrics>,
    },
}

impl BroadcastMessage {
    /// Serialized `"type"` tag of the message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LockConfirmed { .. } => "lock_confirmed",
            Self::RemainingPlayers { .. } => "remaining_players",
            Self::AutoLockWarning { .. } => "auto_lock_warning",
            Self::PhaseTransition { .. } => "phase_transition",
            Self::EspDashboard { .. } => "esp_dashboard",
            Self::DestinationDashboard { .. } => "destination_dashboard",
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Delivers messages to every player in a room.
///
/// Implementations must not fail the caller; delivery problems are theirs
/// to log.
pub trait Broadcaster: Send + Sync {
    /// Sends `message` to the room.
    fn broadcast(&self, room: &str, message: &BroadcastMessage);
}

/// Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast(&self, _room: &str, _message: &BroadcastMessage) {}
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    messages: Mutex<Vec<(String, BroadcastMessage)>>,
}

impl RecordingBroadcaster {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything broadcast so far.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, BroadcastMessage)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Messages of one kind sent to one room.
    #[must_use]
    pub fn of_kind(&self, room: &str, kind: &str) -> Vec<BroadcastMessage> {
        self.messages()
            .into_iter()
            .filter(|(r, m)| r == room && m.kind() == kind)
            .map(|(_, m)| m)
            .collect()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        if let Ok(mut m) = self.messages.lock() {
            m.clear();
        }
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, room: &str, message: &BroadcastMessage) {
        if let Ok(mut m) = self.messages.lock() {
            m.push((room.to_string(), message.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// JSONL writer
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Envelope<'a> {
    sequence: u64,
    room: &'a str,
    #[serde(flatten)]
    message: &'a BroadcastMessage,
}

/// Writes each message as one JSON line with a sequence number.
///
/// Serialization or I/O failures are dropped; a broken sink must not stall
/// a round.
pub struct JsonlBroadcaster {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for JsonlBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlBroadcaster")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonlBroadcaster {
    /// Creates a broadcaster writing to `writer`.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates a broadcaster writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates a broadcaster writing to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl Broadcaster for JsonlBroadcaster {
    fn broadcast(&self, room: &str, message: &BroadcastMessage) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            sequence,
            room,
            message,
        };
        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }
}
