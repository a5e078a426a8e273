//! Capability resolution.
//!
//! Hosts report raw feature probes once, at startup; everything downstream
//! depends on the normalised [`Capabilities`] and never re-probes per event.

use serde::{Deserialize, Serialize};

/// Raw feature probes as a host observes them, vendor prefixes included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// The sink answers "probably"/"maybe" for the segmented manifest mime type.
    pub native_segmented: bool,
    /// A media-source style API is available for a segment loader library.
    pub media_source: bool,
    pub audio_context: bool,
    pub webkit_audio_context: bool,
    pub max_touch_points: u32,
}

/// Normalised platform capabilities, resolved once per adapter construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub native_segmented: bool,
    pub segment_loader: bool,
    pub decode_context: bool,
    /// iOS-family media pipeline: drops the play state when backgrounded.
    pub ios: bool,
}

impl Capabilities {
    pub fn detect(user_agent: &str, flags: FeatureFlags) -> Self {
        let ios = is_ios(user_agent, flags.max_touch_points);
        let capabilities = Self {
            native_segmented: flags.native_segmented,
            segment_loader: flags.media_source,
            decode_context: flags.audio_context || flags.webkit_audio_context,
            ios,
        };
        tracing::debug!(?capabilities, "resolved platform capabilities");
        capabilities
    }

    /// Capabilities of a host without a browser: segment loading and a decode
    /// context are available, native segmented playback is not.
    pub fn headless() -> Self {
        Self {
            native_segmented: false,
            segment_loader: true,
            decode_context: true,
            ios: false,
        }
    }
}

fn is_ios(user_agent: &str, max_touch_points: u32) -> bool {
    if ["iPhone", "iPad", "iPod"]
        .iter()
        .any(|device| user_agent.contains(device))
    {
        return true;
    }
    // iPadOS reports a desktop Safari user agent.
    user_agent.contains("Macintosh") && max_touch_points > 1
}
