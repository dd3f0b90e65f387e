//! Tests for the command surface: library management, preference
//! mutation with persistence, random play, and diagnostics.

use herald_server::commands::{self, CommandError, SoundScope};
use herald_server::events;
use herald_server::sessions::SessionTimeouts;
use herald_server::{build_state, AppState};
use herald_store::{CatalogError, PreferenceStore, SoundCatalog};
use herald_types::{ChannelId, GuildId, SoundName, UserId};
use herald_voice::{LoopbackSink, LoopbackTransport, VoiceTransport};
use std::sync::Arc;
use std::time::Duration;

const MP3_BYTES: &[u8] = &[0x49, 0x44, 0x33, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

struct Harness {
    state: Arc<AppState>,
    prefs_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(sounds: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SoundCatalog::new(dir.path().join("sounds"));
    for name in sounds {
        catalog
            .add(&SoundName::new(*name).unwrap(), MP3_BYTES)
            .unwrap();
    }

    let prefs_path = dir.path().join("preferences.json");
    let store = PreferenceStore::new(&prefs_path);
    let transport = Arc::new(LoopbackTransport::new()) as Arc<dyn VoiceTransport>;
    let sink = Arc::new(LoopbackSink::new(Duration::from_millis(200)));

    let timeouts = SessionTimeouts {
        connect: Duration::from_millis(500),
        reconnect: Duration::from_millis(200),
        settle: Duration::ZERO,
    };

    let (state, engine_rx) = build_state(store, catalog, transport, sink, timeouts);
    tokio::spawn(events::run_event_loop(state.clone(), engine_rx));

    Harness {
        state,
        prefs_path,
        _dir: dir,
    }
}

fn sound(name: &str) -> SoundName {
    SoundName::new(name).unwrap()
}

#[tokio::test]
async fn add_sound_requires_mp3_extension() {
    let h = harness(&[]);

    let err = commands::add_sound(&h.state, "horn", "horn.wav", MP3_BYTES)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnsupportedExtension(_)));
    assert!(commands::list_sounds(&h.state).is_empty());
}

#[tokio::test]
async fn add_sound_rejects_non_mp3_bytes() {
    let h = harness(&[]);

    let err = commands::add_sound(&h.state, "horn", "horn.mp3", b"RIFFxxxxWAVE")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Catalog(CatalogError::InvalidFormat)
    ));
    assert!(commands::list_sounds(&h.state).is_empty());
}

#[tokio::test]
async fn add_sound_twice_fails_and_lists_once() {
    let h = harness(&[]);

    commands::add_sound(&h.state, "horn", "horn.mp3", MP3_BYTES)
        .await
        .unwrap();
    let err = commands::add_sound(&h.state, "horn", "horn.mp3", MP3_BYTES)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Catalog(CatalogError::AlreadyExists(_))
    ));
    assert_eq!(commands::list_sounds(&h.state), vec![sound("horn")]);
}

#[tokio::test]
async fn set_sound_rejects_unknown_sound() {
    let h = harness(&["horn"]);

    let err = commands::set_sound(&h.state, SoundScope::User(UserId(1)), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnknownSound(_)));

    // No partial state: nothing was persisted or kept in memory.
    let dump = commands::debug_dump(&h.state).await;
    assert!(dump.user_sounds.is_empty());
}

#[tokio::test]
async fn set_sound_persists_across_reload() {
    let h = harness(&["horn", "bell"]);

    commands::set_sound(&h.state, SoundScope::User(UserId(1)), "horn")
        .await
        .unwrap();
    commands::set_sound(&h.state, SoundScope::Channel(ChannelId(2)), "bell")
        .await
        .unwrap();
    commands::set_default_sound(&h.state, "horn").await.unwrap();

    // A fresh store over the same file sees the same mapping.
    let reloaded = PreferenceStore::new(&h.prefs_path).load();
    assert_eq!(reloaded.user_sound(UserId(1)), Some(&sound("horn")));
    assert_eq!(reloaded.channel_sound(ChannelId(2)), Some(&sound("bell")));
    assert_eq!(reloaded.default_sound, Some(sound("horn")));

    let dump = commands::debug_dump(&h.state).await;
    assert_eq!(dump, reloaded);
}

#[tokio::test]
async fn set_default_sound_rejects_unknown() {
    let h = harness(&["horn"]);

    let err = commands::set_default_sound(&h.state, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnknownSound(_)));
}

#[tokio::test]
async fn random_play_requires_voice_channel() {
    let h = harness(&["horn"]);

    let err = commands::random_play(&h.state, UserId(1), None, GuildId(10))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotInVoiceChannel));
}

#[tokio::test]
async fn random_play_with_empty_catalog_reports_no_sounds() {
    let h = harness(&[]);

    let err = commands::random_play(&h.state, UserId(1), Some(ChannelId(2)), GuildId(10))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NoSounds));
    assert!(commands::active_sessions(&h.state).await.is_empty());
}

#[tokio::test]
async fn random_play_joins_and_plays_catalog_sound() {
    let h = harness(&["horn", "bell"]);

    let played = commands::random_play(&h.state, UserId(1), Some(ChannelId(2)), GuildId(10))
        .await
        .unwrap();
    assert!(played == sound("horn") || played == sound("bell"));
    assert_eq!(commands::active_sessions(&h.state).await.len(), 1);

    // One-shot: the session disappears once the clip finishes.
    let start = tokio::time::Instant::now();
    loop {
        if commands::active_sessions(&h.state).await.is_empty() {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn stop_reports_whether_a_session_was_active() {
    let h = harness(&["horn"]);

    assert!(!commands::stop(&h.state, GuildId(10)).await);

    commands::random_play(&h.state, UserId(1), Some(ChannelId(2)), GuildId(10))
        .await
        .unwrap();
    assert!(commands::stop(&h.state, GuildId(10)).await);
    assert!(!commands::stop(&h.state, GuildId(10)).await);
    assert!(commands::active_sessions(&h.state).await.is_empty());
}

#[tokio::test]
async fn debug_dump_reflects_live_mapping() {
    let h = harness(&["horn"]);

    commands::set_sound(&h.state, SoundScope::User(UserId(7)), "horn")
        .await
        .unwrap();

    let dump = commands::debug_dump(&h.state).await;
    assert_eq!(dump.user_sound(UserId(7)), Some(&sound("horn")));
    assert!(dump.channel_sounds.is_empty());
    assert_eq!(dump.default_sound, None);
}
