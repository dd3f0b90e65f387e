//! Greeting-sound resolution.
//!
//! Precedence, first match wins: user mapping, channel mapping, default,
//! random pick, none. A mapping entry whose asset has since disappeared
//! from the catalog falls through silently to the next rule.

use crate::catalog::SoundCatalog;
use crate::prefs::PreferenceMapping;
use herald_types::{ChannelId, SoundName, UserId};

/// Picks the greeting sound for `user` joining `channel`.
///
/// Returns `None` only when the catalog is empty and no still-valid
/// mapping applies. Never errors: stale preference entries are skipped,
/// not reported.
pub fn resolve_sound(
    prefs: &PreferenceMapping,
    catalog: &SoundCatalog,
    user: UserId,
    channel: ChannelId,
) -> Option<SoundName> {
    if let Some(sound) = prefs.user_sound(user) {
        if catalog.exists(sound) {
            return Some(sound.clone());
        }
        tracing::debug!(%user, %sound, "user sound missing from catalog, falling through");
    }

    if let Some(sound) = prefs.channel_sound(channel) {
        if catalog.exists(sound) {
            return Some(sound.clone());
        }
        tracing::debug!(%channel, %sound, "channel sound missing from catalog, falling through");
    }

    if let Some(sound) = &prefs.default_sound {
        if catalog.exists(sound) {
            return Some(sound.clone());
        }
        tracing::debug!(%sound, "default sound missing from catalog, falling through");
    }

    catalog.random()
}
