//! In-process simulated transport and sink.
//!
//! A production deployment implements [`VoiceTransport`]/[`AudioSink`]
//! over the platform SDK's voice connection and audio player. This
//! module is the stand-in used by tests and local runs: connections are
//! plain state cells whose lifecycle tests can drive explicitly, and
//! the sink "plays" a clip by waiting out a configured duration before
//! emitting its completion signal.

use crate::error::VoiceError;
use crate::playback::AudioSink;
use crate::transport::{ConnectionState, VoiceConnection, VoiceTransport};
use async_trait::async_trait;
use herald_types::{ChannelId, GuildId};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the per-connection state broadcast.
const STATE_BROADCAST_CAPACITY: usize = 16;

/// A simulated voice connection.
///
/// Tests drive the lifecycle with [`set_state`](Self::set_state); the
/// session manager observes it through the [`VoiceConnection`] trait
/// like any other connection.
#[derive(Debug)]
pub struct LoopbackConnection {
    guild: GuildId,
    channel: ChannelId,
    state: RwLock<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionState>,
}

impl LoopbackConnection {
    pub fn new(guild: GuildId, channel: ChannelId, initial: ConnectionState) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(STATE_BROADCAST_CAPACITY);
        Arc::new(Self {
            guild,
            channel,
            state: RwLock::new(initial),
            events_tx,
        })
    }

    /// Moves the connection into `state` and broadcasts the change,
    /// simulating a platform-side lifecycle event.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap() = state;
        let _ = self.events_tx.send(state);
    }
}

#[async_trait]
impl VoiceConnection for LoopbackConnection {
    fn guild_id(&self) -> GuildId {
        self.guild
    }

    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    fn events(&self) -> broadcast::Receiver<ConnectionState> {
        self.events_tx.subscribe()
    }

    async fn disconnect(&self) {
        let mut state = self.state.write().unwrap();
        if *state != ConnectionState::Disconnected {
            tracing::debug!(guild = %self.guild, "loopback connection released");
            // Voluntary release: no lifecycle event is broadcast, the
            // handle just goes quiet.
            *state = ConnectionState::Disconnected;
        }
    }
}

/// Simulated transport factory.
pub struct LoopbackTransport {
    connect_delay: Duration,
    ready_on_connect: bool,
    connections: Mutex<Vec<Arc<LoopbackConnection>>>,
}

impl LoopbackTransport {
    /// Connections come up `Ready` as soon as `connect` returns, after
    /// a small simulated handshake delay.
    pub fn new() -> Self {
        Self {
            connect_delay: Duration::from_millis(20),
            ready_on_connect: true,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Connections come up in `Connecting` and stay there until a test
    /// drives them with [`LoopbackConnection::set_state`].
    pub fn held() -> Self {
        Self {
            connect_delay: Duration::ZERO,
            ready_on_connect: false,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// The most recently created connection, for tests that need to
    /// drive its lifecycle.
    pub fn last_connection(&self) -> Option<Arc<LoopbackConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceTransport for LoopbackTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        let initial = if self.ready_on_connect {
            ConnectionState::Ready
        } else {
            ConnectionState::Connecting
        };
        let conn = LoopbackConnection::new(guild, channel, initial);
        tracing::debug!(%guild, %channel, state = ?initial, "loopback connection established");

        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }
}

/// Simulated shared sink: a clip "plays" for a fixed duration, then one
/// completion is emitted. `stop` cancels the pending completion.
pub struct LoopbackSink {
    clip_duration: Duration,
    attached: Mutex<Option<GuildId>>,
    completions_tx: broadcast::Sender<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackSink {
    pub fn new(clip_duration: Duration) -> Self {
        let (completions_tx, _) = broadcast::channel(STATE_BROADCAST_CAPACITY);
        Self {
            clip_duration,
            attached: Mutex::new(None),
            completions_tx,
            timer: Mutex::new(None),
        }
    }

    /// The guild whose connection the sink is currently attached to.
    pub fn attached_guild(&self) -> Option<GuildId> {
        *self.attached.lock().unwrap()
    }
}

#[async_trait]
impl AudioSink for LoopbackSink {
    async fn attach(&self, conn: Arc<dyn VoiceConnection>) -> Result<(), VoiceError> {
        let guild = conn.guild_id();
        *self.attached.lock().unwrap() = Some(guild);
        tracing::debug!(%guild, "sink attached");
        Ok(())
    }

    async fn play(&self, path: &Path) -> Result<(), VoiceError> {
        if self.attached.lock().unwrap().is_none() {
            return Err(VoiceError::SinkDetached);
        }

        let duration = self.clip_duration;
        let tx = self.completions_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(());
        });

        if let Some(prev) = self.timer.lock().unwrap().replace(handle) {
            prev.abort();
        }

        tracing::debug!(path = %path.display(), "loopback playback started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.abort();
        }
    }

    fn completions(&self) -> broadcast::Receiver<()> {
        self.completions_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_comes_up_ready() {
        let transport = LoopbackTransport::new();
        let conn = transport.connect(GuildId(1), ChannelId(2)).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.guild_id(), GuildId(1));
        assert_eq!(conn.channel_id(), ChannelId(2));
    }

    #[tokio::test]
    async fn held_connection_stays_connecting_until_driven() {
        let transport = LoopbackTransport::held();
        let conn = transport.connect(GuildId(1), ChannelId(2)).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);

        let raw = transport.last_connection().unwrap();
        let mut rx = conn.events();
        raw.set_state(ConnectionState::Ready);

        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn sink_completion_fires_after_clip_duration() {
        let transport = LoopbackTransport::new();
        let conn = transport.connect(GuildId(1), ChannelId(2)).await.unwrap();

        let sink = LoopbackSink::new(Duration::from_millis(10));
        sink.attach(conn).await.unwrap();

        let mut completions = sink.completions();
        sink.play(Path::new("clip.mp3")).await.unwrap();
        completions.recv().await.unwrap();
    }

    #[tokio::test]
    async fn sink_stop_cancels_pending_completion() {
        let transport = LoopbackTransport::new();
        let conn = transport.connect(GuildId(1), ChannelId(2)).await.unwrap();

        let sink = LoopbackSink::new(Duration::from_millis(100));
        sink.attach(conn).await.unwrap();

        let mut completions = sink.completions();
        sink.play(Path::new("clip.mp3")).await.unwrap();
        sink.stop().await;

        let res = tokio::time::timeout(Duration::from_millis(200), completions.recv()).await;
        assert!(res.is_err(), "stopped clip must not complete");
    }
}
