//! The voice transport capability interface.
//!
//! A production build implements these traits over the platform SDK's
//! voice objects; tests and local runs use [`crate::loopback`]. The
//! session manager only ever sees `Arc<dyn VoiceConnection>` and drives
//! its state machine off the [`ConnectionState`] broadcast.

use crate::error::VoiceError;
use async_trait::async_trait;
use herald_types::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Lifecycle states a voice connection reports.
///
/// `Signalling` and `Connecting` are the two platform-side states that
/// indicate a reconnection is in progress after an involuntary drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Gateway signalling in progress.
    Signalling,
    /// Transport-level connection establishment in progress.
    Connecting,
    /// Connected and able to carry audio.
    Ready,
    /// The connection dropped involuntarily.
    Disconnected,
}

/// Factory for voice connections, one per (guild, channel) join.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Begins establishing a connection to `channel` in `guild`.
    ///
    /// Returns as soon as the platform accepts the join request; track
    /// readiness through [`VoiceConnection::state`] and
    /// [`VoiceConnection::events`].
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

/// A live voice connection handle.
///
/// The session manager holds the sole reference and must call
/// [`disconnect`](VoiceConnection::disconnect) on every exit path.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn guild_id(&self) -> GuildId;

    fn channel_id(&self) -> ChannelId;

    /// The most recently reported lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Subscribes to lifecycle state changes.
    fn events(&self) -> broadcast::Receiver<ConnectionState>;

    /// Releases the connection. Idempotent; further state events stop.
    async fn disconnect(&self);
}

/// Waits up to `window` for the connection to enter `wanted`.
///
/// Checks the current state before listening so a state entered just
/// prior to the call is not missed, then follows the event stream.
/// Returns `false` on timeout or if the connection's event channel
/// closes first.
pub async fn wait_for_state(
    conn: &Arc<dyn VoiceConnection>,
    wanted: ConnectionState,
    window: Duration,
) -> bool {
    let mut rx = conn.events();
    if conn.state() == wanted {
        return true;
    }

    let listen = async {
        loop {
            match rx.recv().await {
                Ok(state) if state == wanted => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        guild = %conn.guild_id(),
                        skipped,
                        "lagged behind connection state events"
                    );
                    if conn.state() == wanted {
                        return true;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };

    tokio::time::timeout(window, listen).await.unwrap_or(false)
}
