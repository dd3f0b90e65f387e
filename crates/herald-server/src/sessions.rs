//! Voice session lifecycle and the per-guild session registry.
//!
//! One guild owns at most one session at a time. The registry maps
//! guild → session and is the single source of truth for liveness: a
//! session exists exactly while its entry does, and `Destroyed` is
//! expressed by removing the entry.
//!
//! Every session carries a `Uuid` assigned at creation. Spawned waits
//! (connect readiness, the reconnect race) re-enter the manager through
//! methods that compare that ID against the registry and no-op on a
//! mismatch, so a session that was stopped and replaced mid-wait never
//! receives a stale transition.
//!
//! Lifecycle per session:
//!
//! ```text
//! Absent -> Connecting -> Ready -> Playing -> Idle -> Destroyed
//!                  \          \         \
//!                   \          +--- Disconnected --(reconnect race)--+
//!                    \                                               |
//!                     +---- timeout/stop/channel-empty ----> Destroyed
//! ```

use crate::events::EngineEvent;
use herald_store::{resolve_sound, PreferenceMapping, SoundCatalog};
use herald_types::{ChannelId, GuildId, SessionState, SoundName, UserId};
use herald_voice::{
    wait_for_state, ConnectionState, PlaybackController, VoiceConnection, VoiceError,
    VoiceTransport,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Bounded-wait windows for the session state machine.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// How long a new connection may take to become ready.
    pub connect: Duration,
    /// Window for each leg of the reconnect race after an involuntary
    /// disconnect.
    pub reconnect: Duration,
    /// Settle delay between readiness and sink subscription.
    pub settle: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            reconnect: Duration::from_secs(5),
            settle: Duration::from_secs(1),
        }
    }
}

/// Errors surfaced to the path that initiated a session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("voice connection was not ready within {0:?}")]
    ConnectTimeout(Duration),

    #[error("no sounds available to play")]
    NoSoundAvailable,

    #[error("session was torn down before playback started")]
    TornDown,

    #[error("a session for this guild is still connecting")]
    ConnectInProgress,

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// What happened on a greet request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GreetOutcome {
    /// A session was established and the named clip is streaming.
    Playing(SoundName),
    /// A live session already existed for the guild; the join was
    /// ignored.
    AlreadyActive,
}

/// How the clip for a new session is chosen.
enum Selection {
    /// Preference resolution for the joining user (user > channel >
    /// default > random).
    Greeting(UserId),
    /// A pre-picked clip, bypassing preference precedence.
    Fixed(SoundName),
}

struct SessionEntry {
    session_id: Uuid,
    channel_id: ChannelId,
    state: SessionState,
    connection: Option<Arc<dyn VoiceConnection>>,
    watcher: Option<JoinHandle<()>>,
}

/// Owns the guild → session registry and drives every state transition.
///
/// Cheap to clone: every field is shared, so the engine loop, command
/// surface, and spawned waiters all see the same registry.
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn VoiceTransport>,
    playback: Arc<PlaybackController>,
    prefs: Arc<RwLock<PreferenceMapping>>,
    catalog: SoundCatalog,
    timeouts: SessionTimeouts,
    engine_tx: mpsc::Sender<EngineEvent>,
    sessions: Arc<RwLock<HashMap<GuildId, SessionEntry>>>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        playback: PlaybackController,
        prefs: Arc<RwLock<PreferenceMapping>>,
        catalog: SoundCatalog,
        timeouts: SessionTimeouts,
        engine_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            transport,
            playback: Arc::new(playback),
            prefs,
            catalog,
            timeouts,
            engine_tx,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Handles a qualifying join: establishes a session in `channel`
    /// and greets `user` with their resolved sound.
    ///
    /// A guild with a live session ignores further joins until that
    /// session is destroyed.
    pub async fn greet(
        &self,
        guild: GuildId,
        channel: ChannelId,
        user: UserId,
    ) -> Result<GreetOutcome, SessionError> {
        let Some(session_id) = self.begin_connecting(guild, channel).await else {
            tracing::debug!(%guild, %user, "live session exists, ignoring join");
            return Ok(GreetOutcome::AlreadyActive);
        };

        tracing::info!(%guild, %channel, %user, session = %session_id, "establishing voice session");
        let sound = self
            .establish(guild, channel, session_id, Selection::Greeting(user))
            .await?;
        Ok(GreetOutcome::Playing(sound))
    }

    /// Plays a uniformly random clip in `channel`, reusing the guild's
    /// live session when it is already in that channel.
    pub async fn random_play(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<SoundName, SessionError> {
        let sound = self
            .catalog
            .random()
            .ok_or(SessionError::NoSoundAvailable)?;

        let reuse = {
            let sessions = self.sessions.read().await;
            sessions.get(&guild).map(|entry| {
                (
                    entry.session_id,
                    entry.channel_id,
                    entry.connection.clone(),
                )
            })
        };

        match reuse {
            Some((session_id, existing_channel, Some(conn))) if existing_channel == channel => {
                // Same channel: reuse the connection and just swap what
                // the sink is streaming.
                self.playback.attach(conn).await?;
                let path = self.catalog.path_for(&sound);
                self.playback.play(guild, session_id, &path).await?;
                self.update_state(guild, session_id, SessionState::Playing)
                    .await;
                tracing::info!(%guild, %sound, "random clip playing on existing session");
                Ok(sound)
            }
            Some((_, _, None)) => Err(SessionError::ConnectInProgress),
            other => {
                if other.is_some() {
                    // Session lives in a different channel; follow the
                    // invoker instead.
                    self.destroy(guild, None).await;
                }
                let Some(session_id) = self.begin_connecting(guild, channel).await else {
                    return Err(SessionError::ConnectInProgress);
                };
                self.establish(guild, channel, session_id, Selection::Fixed(sound))
                    .await
            }
        }
    }

    /// Destroys the guild's session if one exists. Returns whether one
    /// was active. This is the `/stop` path and is unconditional: any
    /// state tears down.
    pub async fn stop(&self, guild: GuildId) -> bool {
        self.destroy(guild, None).await
    }

    /// A leave event emptied `channel` of non-automated members. Tears
    /// down the guild's session if that channel is its origin.
    pub async fn on_channel_emptied(&self, guild: GuildId, channel: ChannelId) {
        let matches = {
            let sessions = self.sessions.read().await;
            sessions
                .get(&guild)
                .is_some_and(|entry| entry.channel_id == channel)
        };
        if matches {
            tracing::info!(%guild, %channel, "origin channel emptied, tearing session down");
            self.destroy(guild, None).await;
        }
    }

    /// Consumes the one completion signal for a play call and drives
    /// `Playing → Idle → Destroyed` (every greeting is one-shot).
    pub async fn on_playback_finished(&self, guild: GuildId, session_id: Uuid) {
        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&guild) {
                Some(entry) if entry.session_id == session_id => {
                    entry.state = SessionState::Idle;
                }
                _ => {
                    tracing::warn!(
                        %guild,
                        session = %session_id,
                        "playback completion for an unknown session, ignoring"
                    );
                    return;
                }
            }
        }

        tracing::debug!(%guild, "playback finished, session going idle");
        self.destroy(guild, Some(session_id)).await;
    }

    /// The transport reported an involuntary disconnect. Marks the
    /// session `Disconnected` and races two bounded waits for the
    /// platform's reconnection states; if neither resolves in time the
    /// session is torn down, otherwise it is kept as-is.
    pub async fn on_connection_lost(&self, guild: GuildId, session_id: Uuid) {
        let conn = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&guild) {
                Some(entry)
                    if entry.session_id == session_id
                        && entry.state != SessionState::Disconnected =>
                {
                    entry.state = SessionState::Disconnected;
                    entry.connection.clone()
                }
                _ => {
                    tracing::debug!(%guild, "stale or duplicate disconnect signal, ignoring");
                    return;
                }
            }
        };
        let Some(conn) = conn else { return };

        tracing::warn!(%guild, "voice connection dropped, watching for reconnection");

        let manager = self.clone();
        let window = self.timeouts.reconnect;
        tokio::spawn(async move {
            let signalling = wait_for_state(&conn, ConnectionState::Signalling, window);
            let connecting = wait_for_state(&conn, ConnectionState::Connecting, window);
            tokio::pin!(signalling);
            tokio::pin!(connecting);

            // First reconnection indicator wins; a leg that times out
            // defers to the other.
            let reconnecting = tokio::select! {
                hit = &mut signalling => {
                    if hit { true } else { connecting.await }
                }
                hit = &mut connecting => {
                    if hit { true } else { signalling.await }
                }
            };

            if reconnecting {
                manager.note_reconnecting(guild, session_id, &conn).await;
            } else {
                tracing::warn!(%guild, ?window, "no reconnection observed, tearing session down");
                manager.destroy(guild, Some(session_id)).await;
            }
        });
    }

    /// Read-only snapshot of live sessions for diagnostics.
    pub async fn active(&self) -> Vec<(GuildId, SessionState)> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<_> = sessions
            .iter()
            .map(|(guild, entry)| (*guild, entry.state))
            .collect();
        list.sort_by_key(|(guild, _)| *guild);
        list
    }

    /// Tears down every live session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = {
            let sessions = self.sessions.read().await;
            sessions.keys().copied().collect()
        };
        for guild in guilds {
            self.destroy(guild, None).await;
        }
    }

    /// Inserts a `Connecting` registry entry, unless a live session
    /// already holds the guild. Returns the new session's ID.
    ///
    /// The insert happens before any await so a concurrent join for the
    /// same guild observes the entry and backs off.
    async fn begin_connecting(&self, guild: GuildId, channel: ChannelId) -> Option<Uuid> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(&guild).is_some() {
            return None;
        }
        let session_id = Uuid::new_v4();
        sessions.insert(
            guild,
            SessionEntry {
                session_id,
                channel_id: channel,
                state: SessionState::Connecting,
                connection: None,
                watcher: None,
            },
        );
        Some(session_id)
    }

    /// Runs the connect → ready → resolve → settle → subscribe → play
    /// sequence, destroying the session on any failure before the error
    /// is surfaced to the invoking path.
    async fn establish(
        &self,
        guild: GuildId,
        channel: ChannelId,
        session_id: Uuid,
        selection: Selection,
    ) -> Result<SoundName, SessionError> {
        match self
            .try_establish(guild, channel, session_id, selection)
            .await
        {
            Ok(sound) => {
                tracing::info!(%guild, %sound, "greeting playback started");
                Ok(sound)
            }
            Err(e) => {
                self.destroy(guild, Some(session_id)).await;
                Err(e)
            }
        }
    }

    async fn try_establish(
        &self,
        guild: GuildId,
        channel: ChannelId,
        session_id: Uuid,
        selection: Selection,
    ) -> Result<SoundName, SessionError> {
        let conn = self.transport.connect(guild, channel).await?;

        if !self.adopt_connection(guild, session_id, &conn).await {
            // Stopped while connecting; the fresh handle is ours to
            // release since it never reached the registry.
            conn.disconnect().await;
            return Err(SessionError::TornDown);
        }

        if !wait_for_state(&conn, ConnectionState::Ready, self.timeouts.connect).await {
            return Err(SessionError::ConnectTimeout(self.timeouts.connect));
        }
        if !self
            .update_state(guild, session_id, SessionState::Ready)
            .await
        {
            return Err(SessionError::TornDown);
        }

        self.spawn_watcher(guild, session_id, &conn).await;

        let sound = match selection {
            Selection::Greeting(user) => {
                let prefs = self.prefs.read().await;
                resolve_sound(&prefs, &self.catalog, user, channel)
            }
            Selection::Fixed(sound) => Some(sound),
        }
        .ok_or(SessionError::NoSoundAvailable)?;

        // Settle window before touching the sink; the connection
        // adapter may still be wiring up its audio path right after
        // reporting ready.
        if !self.timeouts.settle.is_zero() {
            tokio::time::sleep(self.timeouts.settle).await;
        }
        if !self
            .update_state(guild, session_id, SessionState::Ready)
            .await
        {
            return Err(SessionError::TornDown);
        }

        // Subscribe before play, always.
        self.playback.attach(conn.clone()).await?;
        let path = self.catalog.path_for(&sound);
        self.playback.play(guild, session_id, &path).await?;

        self.update_state(guild, session_id, SessionState::Playing)
            .await;
        Ok(sound)
    }

    /// Stores the freshly established connection on the entry, failing
    /// if the session was destroyed or replaced in the meantime.
    async fn adopt_connection(
        &self,
        guild: GuildId,
        session_id: Uuid,
        conn: &Arc<dyn VoiceConnection>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&guild) {
            Some(entry) if entry.session_id == session_id => {
                entry.connection = Some(conn.clone());
                true
            }
            _ => false,
        }
    }

    /// Updates the session's state field iff the entry still belongs to
    /// `session_id`. Returns whether it did.
    async fn update_state(&self, guild: GuildId, session_id: Uuid, state: SessionState) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&guild) {
            Some(entry) if entry.session_id == session_id => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    /// Forwards the connection's `Disconnected` events onto the engine
    /// queue for as long as the session lives.
    async fn spawn_watcher(&self, guild: GuildId, session_id: Uuid, conn: &Arc<dyn VoiceConnection>) {
        let mut events = conn.events();
        let tx = self.engine_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionState::Disconnected) => {
                        if tx
                            .send(EngineEvent::ConnectionLost {
                                guild_id: guild,
                                session_id,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&guild) {
            Some(entry) if entry.session_id == session_id => {
                entry.watcher = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    /// The session survived the reconnect race; keep it, adopting
    /// whatever state the platform settled into.
    async fn note_reconnecting(
        &self,
        guild: GuildId,
        session_id: Uuid,
        conn: &Arc<dyn VoiceConnection>,
    ) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&guild) {
            if entry.session_id == session_id {
                if conn.state() == ConnectionState::Ready {
                    entry.state = SessionState::Ready;
                }
                tracing::info!(%guild, "reconnection in progress, keeping session");
            }
        }
    }

    /// Removes the registry entry (optionally only if it still belongs
    /// to `expected`) and releases everything the session owned:
    /// watcher task, sink playback, connection handle.
    async fn destroy(&self, guild: GuildId, expected: Option<Uuid>) -> bool {
        let entry = {
            let mut sessions = self.sessions.write().await;
            let matches = sessions
                .get(&guild)
                .is_some_and(|entry| expected.is_none_or(|id| entry.session_id == id));
            if matches {
                sessions.remove(&guild)
            } else {
                None
            }
        };

        let Some(mut entry) = entry else {
            return false;
        };

        if let Some(watcher) = entry.watcher.take() {
            watcher.abort();
        }
        self.playback.stop(guild).await;
        if let Some(conn) = entry.connection.take() {
            conn.disconnect().await;
        }

        tracing::info!(%guild, session = %entry.session_id, "voice session destroyed");
        true
    }
}
