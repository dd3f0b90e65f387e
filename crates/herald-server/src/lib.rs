//! Herald server library logic.
//!
//! Wires the preference store, sound catalog, playback controller, and
//! session manager into one shared [`AppState`], and exposes the engine
//! event queue the platform gateway collaborator feeds.

pub mod commands;
pub mod config;
pub mod events;
pub mod sessions;

use events::EngineEvent;
use herald_store::{PreferenceMapping, PreferenceStore, SoundCatalog};
use herald_voice::{AudioSink, PlaybackController, VoiceTransport};
use sessions::{SessionManager, SessionTimeouts};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Capacity of the engine event queue. Events are small and handled
/// promptly; backpressure on the gateway side is acceptable.
const ENGINE_QUEUE_CAPACITY: usize = 256;

/// Capacity of the playback completion side channel.
const PLAYBACK_QUEUE_CAPACITY: usize = 16;

/// Application state shared between the engine loop and the command
/// surface.
///
/// Locks guard brief map/struct operations only and are never held
/// across an `.await` that leaves this module's control.
pub struct AppState {
    /// Flat-file store backing the preference mapping.
    pub store: PreferenceStore,
    /// The in-memory preference mapping. Mutated only by the command
    /// surface, read by the resolver.
    pub prefs: Arc<RwLock<PreferenceMapping>>,
    /// The sound asset catalog.
    pub catalog: SoundCatalog,
    /// Session registry and state machine.
    pub sessions: Arc<SessionManager>,
    /// Sender half of the engine queue, for the platform gateway
    /// collaborator to feed [`EngineEvent::Gateway`] into.
    pub engine_tx: mpsc::Sender<EngineEvent>,
}

/// Builds the shared state and returns it with the engine queue's
/// receiver, which the caller hands to [`events::run_event_loop`].
///
/// Must run inside a tokio runtime: the playback completion forwarder
/// task is spawned here.
pub fn build_state(
    store: PreferenceStore,
    catalog: SoundCatalog,
    transport: Arc<dyn VoiceTransport>,
    sink: Arc<dyn AudioSink>,
    timeouts: SessionTimeouts,
) -> (Arc<AppState>, mpsc::Receiver<EngineEvent>) {
    let (engine_tx, engine_rx) = mpsc::channel(ENGINE_QUEUE_CAPACITY);
    let (finished_tx, finished_rx) = mpsc::channel(PLAYBACK_QUEUE_CAPACITY);

    let playback = PlaybackController::new(sink, finished_tx);
    let prefs = Arc::new(RwLock::new(store.load()));

    let sessions = Arc::new(SessionManager::new(
        transport,
        playback,
        prefs.clone(),
        catalog.clone(),
        timeouts,
        engine_tx.clone(),
    ));

    events::spawn_playback_forwarder(finished_rx, engine_tx.clone());

    let state = Arc::new(AppState {
        store,
        prefs,
        catalog,
        sessions,
        engine_tx,
    });
    (state, engine_rx)
}
