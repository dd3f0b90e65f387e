//! Command surface operations.
//!
//! The platform's command-dispatch collaborator parses user input,
//! calls one of these operations, and renders the outcome. Every
//! operation returns an explicit result; validation failures leave no
//! partial state behind.

use crate::sessions::SessionError;
use crate::AppState;
use herald_store::{CatalogError, PreferenceMapping};
use herald_types::{
    ChannelId, GuildId, InvalidSoundName, SessionState, SoundName, UserId, SOUND_EXTENSION,
};
use thiserror::Error;

/// Which preference mapping a set-sound request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundScope {
    Channel(ChannelId),
    User(UserId),
}

/// Errors reported back through the command dispatcher.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid sound name: {0}")]
    InvalidName(#[from] InvalidSoundName),

    #[error("attachment must be a .{SOUND_EXTENSION} file, got \"{0}\"")]
    UnsupportedExtension(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("no sound named \"{0}\" in the catalog")]
    UnknownSound(SoundName),

    #[error("failed to persist preferences, nothing was changed")]
    PersistFailed,

    #[error("you are not in a voice channel")]
    NotInVoiceChannel,

    #[error("no sounds available")]
    NoSounds,

    #[error(transparent)]
    Session(SessionError),
}

/// `/stop` — destroys the guild's session if one exists. Returns
/// whether one was active.
pub async fn stop(state: &AppState, guild: GuildId) -> bool {
    state.sessions.stop(guild).await
}

/// Adds a new sound from an uploaded attachment.
///
/// The attachment's declared filename must carry the supported audio
/// extension; the bytes themselves are container-checked by the
/// catalog. Duplicate names are rejected without touching the existing
/// asset.
pub async fn add_sound(
    state: &AppState,
    name: &str,
    declared_name: &str,
    bytes: &[u8],
) -> Result<SoundName, CommandError> {
    let has_extension = declared_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(SOUND_EXTENSION));
    if !has_extension {
        return Err(CommandError::UnsupportedExtension(declared_name.to_string()));
    }

    let sound = SoundName::new(name)?;
    state.catalog.add(&sound, bytes)?;
    Ok(sound)
}

/// Maps a channel or user to a greeting sound.
///
/// The sound must exist in the catalog at request time. The mapping is
/// persisted before the in-memory state is committed, so a failed save
/// changes nothing.
pub async fn set_sound(
    state: &AppState,
    scope: SoundScope,
    sound_name: &str,
) -> Result<(), CommandError> {
    let sound = SoundName::new(sound_name)?;
    if !state.catalog.exists(&sound) {
        return Err(CommandError::UnknownSound(sound));
    }

    let mut prefs = state.prefs.write().await;
    let mut updated = prefs.clone();
    match scope {
        SoundScope::Channel(channel) => updated.set_channel_sound(channel, sound.clone()),
        SoundScope::User(user) => updated.set_user_sound(user, sound.clone()),
    }

    if !state.store.save(&updated) {
        return Err(CommandError::PersistFailed);
    }
    *prefs = updated;

    tracing::info!(?scope, %sound, "preference updated");
    Ok(())
}

/// Sets the fallback sound used when no user or channel mapping
/// applies.
pub async fn set_default_sound(state: &AppState, sound_name: &str) -> Result<(), CommandError> {
    let sound = SoundName::new(sound_name)?;
    if !state.catalog.exists(&sound) {
        return Err(CommandError::UnknownSound(sound));
    }

    let mut prefs = state.prefs.write().await;
    let mut updated = prefs.clone();
    updated.set_default_sound(sound.clone());

    if !state.store.save(&updated) {
        return Err(CommandError::PersistFailed);
    }
    *prefs = updated;

    tracing::info!(%sound, "default sound updated");
    Ok(())
}

/// Lists the catalog for display.
pub fn list_sounds(state: &AppState) -> Vec<SoundName> {
    state.catalog.list()
}

/// `/random` — joins (or reuses a session in) the invoker's current
/// voice channel and plays a random clip, bypassing preference
/// precedence.
pub async fn random_play(
    state: &AppState,
    user: UserId,
    current_channel: Option<ChannelId>,
    guild: GuildId,
) -> Result<SoundName, CommandError> {
    let channel = current_channel.ok_or(CommandError::NotInVoiceChannel)?;

    tracing::info!(%guild, %user, %channel, "random play requested");
    state
        .sessions
        .random_play(guild, channel)
        .await
        .map_err(|e| match e {
            SessionError::NoSoundAvailable => CommandError::NoSounds,
            other => CommandError::Session(other),
        })
}

/// Returns the full preference mapping for diagnostic display.
pub async fn debug_dump(state: &AppState) -> PreferenceMapping {
    state.prefs.read().await.clone()
}

/// Lists live sessions and their states for diagnostics.
pub async fn active_sessions(state: &AppState) -> Vec<(GuildId, SessionState)> {
    state.sessions.active().await
}
