//! The process-wide playback controller.
//!
//! Herald keeps exactly one audio sink for the whole process, so only
//! one guild can be audible at a time. The controller enforces the
//! subscribe-before-play ordering, checks the asset still exists at
//! play time, and forwards the sink's completion signal to the engine
//! as a [`PlaybackFinished`] event tagged with the session it belongs
//! to.

use crate::error::VoiceError;
use crate::transport::VoiceConnection;
use async_trait::async_trait;
use herald_types::GuildId;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Emitted once per successful `play` call when the clip finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFinished {
    pub guild_id: GuildId,
    pub session_id: Uuid,
}

/// The shared audio output sink.
///
/// Contract: [`attach`](AudioSink::attach) must be called with the
/// session's connection before [`play`](AudioSink::play); each
/// successful `play` emits exactly one completion on the channel
/// returned by [`completions`](AudioSink::completions). `stop` cuts the
/// current clip without emitting a completion and is idempotent.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn attach(&self, conn: Arc<dyn VoiceConnection>) -> Result<(), VoiceError>;

    async fn play(&self, path: &Path) -> Result<(), VoiceError>;

    async fn stop(&self);

    fn completions(&self) -> broadcast::Receiver<()>;
}

struct CurrentPlayback {
    guild_id: GuildId,
    forwarder: JoinHandle<()>,
}

/// Owns the single shared sink and the bookkeeping of which guild is
/// audible.
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    finished_tx: mpsc::Sender<PlaybackFinished>,
    current: Arc<Mutex<Option<CurrentPlayback>>>,
}

impl PlaybackController {
    /// `finished_tx` is the engine-event side channel completion
    /// signals are forwarded onto.
    pub fn new(sink: Arc<dyn AudioSink>, finished_tx: mpsc::Sender<PlaybackFinished>) -> Self {
        Self {
            sink,
            finished_tx,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Attaches the shared sink to a session's connection. Must happen
    /// before [`play`](Self::play) for that session.
    pub async fn attach(&self, conn: Arc<dyn VoiceConnection>) -> Result<(), VoiceError> {
        self.sink.attach(conn).await
    }

    /// Starts streaming `path` for `guild`.
    ///
    /// Fails with [`VoiceError::AssetMissing`] if the file disappeared
    /// between catalog listing and now. On success the sink will emit
    /// one completion, which comes back to the engine as a
    /// [`PlaybackFinished`] carrying `session_id`.
    pub async fn play(
        &self,
        guild: GuildId,
        session_id: Uuid,
        path: &Path,
    ) -> Result<(), VoiceError> {
        if !path.is_file() {
            return Err(VoiceError::AssetMissing(path.to_path_buf()));
        }

        // Subscribe before starting so the completion cannot be missed
        // even if the clip is shorter than the spawn below.
        let mut completions = self.sink.completions();
        self.sink.play(path).await?;

        let tx = self.finished_tx.clone();
        let current = self.current.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match completions.recv().await {
                    Ok(()) => {
                        {
                            let mut cur = current.lock().await;
                            if cur.as_ref().is_some_and(|c| c.guild_id == guild) {
                                *cur = None;
                            }
                        }
                        let _ = tx
                            .send(PlaybackFinished {
                                guild_id: guild,
                                session_id,
                            })
                            .await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        let mut current = self.current.lock().await;
        if let Some(prev) = current.replace(CurrentPlayback {
            guild_id: guild,
            forwarder,
        }) {
            // Single shared sink: starting a new clip displaces whatever
            // was audible.
            prev.forwarder.abort();
            tracing::warn!(
                displaced = %prev.guild_id,
                now_playing = %guild,
                "new playback displaced an active clip on the shared sink"
            );
        }

        tracing::debug!(%guild, path = %path.display(), "playback started");
        Ok(())
    }

    /// Cuts playback early if `guild` is the one audible. Idempotent;
    /// no completion is emitted for a stopped clip.
    pub async fn stop(&self, guild: GuildId) {
        let displaced = {
            let mut current = self.current.lock().await;
            match current.as_ref() {
                Some(cur) if cur.guild_id == guild => current.take(),
                _ => None,
            }
        };

        if let Some(cur) = displaced {
            cur.forwarder.abort();
            self.sink.stop().await;
            tracing::debug!(%guild, "playback stopped");
        }
    }

    /// Whether `guild` currently owns the shared sink.
    pub async fn is_playing(&self, guild: GuildId) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|cur| cur.guild_id == guild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackSink, LoopbackTransport};
    use crate::transport::VoiceTransport;
    use herald_types::ChannelId;
    use std::time::Duration;

    async fn attached_controller(
        clip: Duration,
    ) -> (PlaybackController, mpsc::Receiver<PlaybackFinished>) {
        let transport = LoopbackTransport::new();
        let conn = transport
            .connect(GuildId(1), ChannelId(2))
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(8);
        let controller = PlaybackController::new(Arc::new(LoopbackSink::new(clip)), tx);
        controller.attach(conn).await.unwrap();
        (controller, rx)
    }

    fn temp_clip() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"ID3\x04\x00\x00\x00\x00\x00\x00").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn play_emits_exactly_one_completion() {
        let (controller, mut rx) = attached_controller(Duration::from_millis(10)).await;
        let (_dir, path) = temp_clip();

        let session = Uuid::new_v4();
        controller.play(GuildId(1), session, &path).await.unwrap();

        let finished = rx.recv().await.unwrap();
        assert_eq!(finished.guild_id, GuildId(1));
        assert_eq!(finished.session_id, session);

        // No second completion for the same play call.
        let extra =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn play_missing_file_is_asset_missing() {
        let (controller, _rx) = attached_controller(Duration::from_millis(10)).await;

        let err = controller
            .play(GuildId(1), Uuid::new_v4(), Path::new("/no/such/clip.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::AssetMissing(_)));
    }

    #[tokio::test]
    async fn stop_suppresses_completion_and_is_idempotent() {
        let (controller, mut rx) = attached_controller(Duration::from_millis(200)).await;
        let (_dir, path) = temp_clip();

        controller.play(GuildId(1), Uuid::new_v4(), &path).await.unwrap();
        assert!(controller.is_playing(GuildId(1)).await);

        controller.stop(GuildId(1)).await;
        controller.stop(GuildId(1)).await;
        assert!(!controller.is_playing(GuildId(1)).await);

        let finished =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(finished.is_err(), "stopped clip must not emit a completion");
    }

    #[tokio::test]
    async fn stop_for_other_guild_leaves_playback_alone() {
        let (controller, mut rx) = attached_controller(Duration::from_millis(20)).await;
        let (_dir, path) = temp_clip();

        controller.play(GuildId(1), Uuid::new_v4(), &path).await.unwrap();
        controller.stop(GuildId(99)).await;

        assert!(rx.recv().await.is_some(), "clip should still complete");
    }

    #[tokio::test]
    async fn play_before_attach_is_rejected() {
        let (tx, _rx) = mpsc::channel(8);
        let controller =
            PlaybackController::new(Arc::new(LoopbackSink::new(Duration::from_millis(10))), tx);
        let (_dir, path) = temp_clip();

        let err = controller
            .play(GuildId(1), Uuid::new_v4(), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::SinkDetached));
    }
}
