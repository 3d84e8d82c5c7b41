//! Alternate-source adapter for natively embeddable players

use crate::error::{Error, Result};
use crate::types::{ControllerConfig, DeliveryKind, MediaSource};
use serde::{Deserialize, Serialize};
use url::Url;

/// Feature policy granted to third-party frames
pub const FRAME_PERMISSIONS: &str =
    "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture";

/// Passive frame the rendering layer shows instead of the engine surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFrame {
    pub url: Url,
    pub allow: String,
    pub allow_fullscreen: bool,
}

impl EmbedFrame {
    /// Build the frame for an embedded source
    pub fn for_source(source: &MediaSource, config: &ControllerConfig) -> Result<Self> {
        if source.kind() != DeliveryKind::Embedded {
            return Err(Error::InvalidSource(format!("{} is not an embedded source", source.name())));
        }
        let base = source
            .embed_url()
            .ok_or_else(|| Error::InvalidSource(format!("{} has no embed URL", source.name())))?;

        Ok(Self {
            url: with_playback_params(base, config.embed_autoplay, config.embed_muted),
            allow: FRAME_PERMISSIONS.to_string(),
            allow_fullscreen: true,
        })
    }
}

/// Force `autoplay`/`mute` to the configured values, keeping other params
fn with_playback_params(base: &Url, autoplay: bool, muted: bool) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "autoplay" && k != "mute")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("autoplay", if autoplay { "1" } else { "0" })
        .append_pair("mute", if muted { "1" } else { "0" });
    url
}
