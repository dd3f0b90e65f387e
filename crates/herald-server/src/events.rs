//! The engine event queue and gateway event handling.
//!
//! All session and playback signals funnel into one `mpsc` queue drained
//! by [`run_event_loop`], which serializes state transitions per guild.
//! The gateway collaborator feeds [`EngineEvent::Gateway`] through the
//! sender exposed on [`crate::AppState`]; playback completions and
//! connection drops arrive from internal forwarder tasks.

use crate::sessions::GreetOutcome;
use crate::AppState;
use herald_types::{GuildId, VoiceStateUpdate};
use herald_voice::PlaybackFinished;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One unit of work for the engine loop.
#[derive(Debug)]
pub enum EngineEvent {
    /// A voice-state change delivered by the platform gateway.
    Gateway(VoiceStateUpdate),
    /// The shared sink finished streaming a clip.
    PlaybackFinished(PlaybackFinished),
    /// A session's connection reported an involuntary disconnect.
    ConnectionLost {
        guild_id: GuildId,
        session_id: Uuid,
    },
}

/// Bridges the playback controller's completion channel onto the engine
/// queue.
pub fn spawn_playback_forwarder(
    mut finished_rx: mpsc::Receiver<PlaybackFinished>,
    engine_tx: mpsc::Sender<EngineEvent>,
) {
    tokio::spawn(async move {
        while let Some(finished) = finished_rx.recv().await {
            if engine_tx
                .send(EngineEvent::PlaybackFinished(finished))
                .await
                .is_err()
            {
                return;
            }
        }
    });
}

/// Drains the engine queue until every sender is dropped.
pub async fn run_event_loop(state: Arc<AppState>, mut rx: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        handle_event(&state, event).await;
    }
    tracing::info!("engine event queue closed, event loop exiting");
}

async fn handle_event(state: &Arc<AppState>, event: EngineEvent) {
    match event {
        EngineEvent::Gateway(update) => handle_voice_state_update(state, update).await,
        EngineEvent::PlaybackFinished(finished) => {
            state
                .sessions
                .on_playback_finished(finished.guild_id, finished.session_id)
                .await;
        }
        EngineEvent::ConnectionLost {
            guild_id,
            session_id,
        } => {
            state.sessions.on_connection_lost(guild_id, session_id).await;
        }
    }
}

/// Reacts to a member's voice-state change.
///
/// A qualifying join (no channel → some channel) starts a greeting
/// session; establishment runs on its own task so one guild's connect
/// wait never delays another guild's events. A leave that empties the
/// origin channel of non-automated members tears the session down.
pub async fn handle_voice_state_update(state: &Arc<AppState>, update: VoiceStateUpdate) {
    if update.user_is_automated {
        return;
    }

    if update.is_join() {
        if let Some(channel) = update.new_channel {
            let sessions = state.sessions.clone();
            let guild = update.guild_id;
            let user = update.user_id;
            tokio::spawn(async move {
                match sessions.greet(guild, channel, user).await {
                    Ok(GreetOutcome::Playing(_)) | Ok(GreetOutcome::AlreadyActive) => {}
                    Err(e) => {
                        tracing::warn!(%guild, %user, "greeting failed: {}", e);
                    }
                }
            });
        }
        return;
    }

    if update.is_leave() && update.old_channel_occupants == 0 {
        if let Some(channel) = update.old_channel {
            state
                .sessions
                .on_channel_emptied(update.guild_id, channel)
                .await;
        }
    }
}
