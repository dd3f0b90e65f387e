//! Shared types and constants for the Herald companion process.
//!
//! This crate provides the foundational types used across all Herald
//! crates: platform ID newtypes, sound names, voice-session states, and
//! the gateway-facing voice event record.
//!
//! No crate in the workspace depends on anything *except* `herald-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The one audio container Herald serves. Every catalog asset is stored
/// as `<name>.mp3` and every upload must declare this extension.
pub const SOUND_EXTENSION: &str = "mp3";

/// A platform guild (logical community). Owns at most one active voice
/// session at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GuildId(pub u64);

/// A voice channel within a guild.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChannelId(pub u64);

/// A platform user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string cannot be used as a sound name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidSoundName {
    /// The name was empty or whitespace-only.
    #[error("sound name is empty")]
    Empty,
    /// The name contained a path separator or parent-directory component.
    #[error("sound name contains path components: {0}")]
    PathComponents(String),
}

/// The name of a catalog asset, derived from its filename stem.
///
/// Names are plain identifiers, never paths: construction rejects path
/// separators and `..` so a name can always be joined onto the asset
/// directory safely.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SoundName(String);

impl SoundName {
    /// Validates and wraps a sound name.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidSoundName> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidSoundName::Empty);
        }
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(InvalidSoundName::PathComponents(name));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the filename this sound is stored under in the catalog
    /// directory, e.g. `"horn.mp3"`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, SOUND_EXTENSION)
    }
}

impl fmt::Display for SoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SoundName {
    type Err = InvalidSoundName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// States a voice session moves through.
///
/// `Destroyed` is terminal: the registry entry is removed and a later
/// qualifying join starts a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Connection establishment is in flight.
    Connecting,
    /// The transport reported readiness; playback has not started yet.
    Ready,
    /// A clip is streaming on the shared sink.
    Playing,
    /// Playback finished; the session is about to be torn down.
    Idle,
    /// The transport reported an involuntary disconnect.
    Disconnected,
    /// Terminal. The connection handle has been released.
    Destroyed,
}

impl SessionState {
    /// Returns the canonical string label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::Playing => "PLAYING",
            Self::Idle => "IDLE",
            Self::Disconnected => "DISCONNECTED",
            Self::Destroyed => "DESTROYED",
        }
    }

    /// Whether this state still owns a live connection handle.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Destroyed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A voice-state change delivered by the platform gateway collaborator.
///
/// The gateway resolves channel rosters; Herald does not track them. For
/// a leave event, `old_channel_occupants` carries the number of
/// non-automated members remaining in `old_channel` *after* the update,
/// which is what empty-channel teardown keys on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Channel the member was in before the update, if any.
    pub old_channel: Option<ChannelId>,
    /// Channel the member is in after the update, if any.
    pub new_channel: Option<ChannelId>,
    /// Whether the member is a bot/automated account (including Herald
    /// itself). Automated members never trigger greetings or count
    /// toward occupancy.
    pub user_is_automated: bool,
    /// Non-automated members remaining in `old_channel` after this
    /// update. Zero when `old_channel` is `None`.
    pub old_channel_occupants: u32,
}

impl VoiceStateUpdate {
    /// A qualifying join: the member went from no channel to some channel.
    pub fn is_join(&self) -> bool {
        self.old_channel.is_none() && self.new_channel.is_some()
    }

    /// The member left or moved out of `old_channel`.
    pub fn is_leave(&self) -> bool {
        self.old_channel.is_some()
            && self.new_channel != self.old_channel
    }
}
