use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("voice connect failed: {0}")]
    Connect(String),

    #[error("sound asset missing: {0}")]
    AssetMissing(PathBuf),

    #[error("sink is not attached to a connection")]
    SinkDetached,

    #[error("playback error: {0}")]
    Playback(String),
}
