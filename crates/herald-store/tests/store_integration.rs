//! End-to-end store tests over a real temp directory: catalog and
//! preference file working together the way the engine uses them.

use herald_store::{resolve_sound, PreferenceMapping, PreferenceStore, SoundCatalog};
use herald_types::{ChannelId, SoundName, UserId};

const MP3_BYTES: &[u8] = &[0x49, 0x44, 0x33, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

fn sound(name: &str) -> SoundName {
    SoundName::new(name).unwrap()
}

#[test]
fn full_preference_flow_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SoundCatalog::new(dir.path().join("sounds"));
    catalog.add(&sound("horn"), MP3_BYTES).unwrap();
    catalog.add(&sound("bell"), MP3_BYTES).unwrap();

    let store = PreferenceStore::new(dir.path().join("preferences.json"));
    let mut prefs = store.load();
    assert_eq!(prefs, PreferenceMapping::default());

    prefs.set_user_sound(UserId(1), sound("horn"));
    prefs.set_channel_sound(ChannelId(2), sound("bell"));
    assert!(store.save(&prefs));

    // A separate store instance over the same path resolves the same
    // way the original would.
    let reloaded = PreferenceStore::new(dir.path().join("preferences.json")).load();
    assert_eq!(reloaded, prefs);
    assert_eq!(
        resolve_sound(&reloaded, &catalog, UserId(1), ChannelId(9)),
        Some(sound("horn"))
    );
    assert_eq!(
        resolve_sound(&reloaded, &catalog, UserId(9), ChannelId(2)),
        Some(sound("bell"))
    );
}

#[test]
fn resolution_tracks_catalog_changes_between_calls() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SoundCatalog::new(dir.path().join("sounds"));
    catalog.add(&sound("horn"), MP3_BYTES).unwrap();

    let mut prefs = PreferenceMapping::default();
    prefs.set_user_sound(UserId(1), sound("horn"));

    assert_eq!(
        resolve_sound(&prefs, &catalog, UserId(1), ChannelId(2)),
        Some(sound("horn"))
    );

    // The asset disappears out from under the mapping (deletion is not
    // supported through the catalog, but nothing stops an operator on
    // disk). The stale entry falls through instead of erroring.
    std::fs::remove_file(catalog.path_for(&sound("horn"))).unwrap();
    assert_eq!(resolve_sound(&prefs, &catalog, UserId(1), ChannelId(2)), None);
}

#[test]
fn malformed_preference_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preferences.json");
    std::fs::write(&path, r#"{"user_sounds": 7}"#).unwrap();

    let store = PreferenceStore::new(&path);
    assert_eq!(store.load(), PreferenceMapping::default());

    // Saving over the bad file recovers it.
    let mut prefs = PreferenceMapping::default();
    prefs.set_default_sound(sound("horn"));
    assert!(store.save(&prefs));
    assert_eq!(store.load(), prefs);
}
