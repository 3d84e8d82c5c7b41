//! Core types for Castline

use crate::drm::ClearKeyConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a media source reaches the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    /// Manifest-driven playback through the adaptive engine
    #[serde(alias = "dash", alias = "hls", alias = "stream")]
    Adaptive,
    /// Natively embeddable third-party player
    #[serde(alias = "youtube", alias = "iframe")]
    Embedded,
}

impl std::fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryKind::Adaptive => write!(f, "adaptive"),
            DeliveryKind::Embedded => write!(f, "embedded"),
        }
    }
}

/// A playable catalog item.
///
/// Immutable once constructed: either through [`MediaSource::adaptive`] /
/// [`MediaSource::embedded`] or by deserializing a catalog record, which is
/// validated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MediaSourceRecord", into = "MediaSourceRecord")]
pub struct MediaSource {
    id: String,
    name: String,
    kind: DeliveryKind,
    manifest_uri: Option<Url>,
    embed_url: Option<Url>,
    clear_keys: Option<ClearKeyConfig>,
    category: Option<String>,
    logo: Option<Url>,
}

impl MediaSource {
    /// Create a source played through the adaptive engine
    pub fn adaptive(id: impl Into<String>, name: impl Into<String>, manifest_uri: Url) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DeliveryKind::Adaptive,
            manifest_uri: Some(manifest_uri),
            embed_url: None,
            clear_keys: None,
            category: None,
            logo: None,
        }
    }

    /// Create a natively embeddable source
    pub fn embedded(id: impl Into<String>, name: impl Into<String>, embed_url: Url) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DeliveryKind::Embedded,
            manifest_uri: None,
            embed_url: Some(embed_url),
            clear_keys: None,
            category: None,
            logo: None,
        }
    }

    /// Attach clear-key material (`key id -> key`, both hex)
    pub fn with_clear_keys(mut self, keys: BTreeMap<String, String>) -> Result<Self> {
        self.clear_keys = Some(ClearKeyConfig::new(keys)?);
        Ok(self)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_logo(mut self, logo: Url) -> Self {
        self.logo = Some(logo);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeliveryKind {
        self.kind
    }

    pub fn manifest_uri(&self) -> Option<&Url> {
        self.manifest_uri.as_ref()
    }

    pub fn embed_url(&self) -> Option<&Url> {
        self.embed_url.as_ref()
    }

    pub fn clear_keys(&self) -> Option<&ClearKeyConfig> {
        self.clear_keys.as_ref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn logo(&self) -> Option<&Url> {
        self.logo.as_ref()
    }

    /// Short form carried in the observable status
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Wire shape of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaSourceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(alias = "type")]
    kind: DeliveryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manifest_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embed_url: Option<Url>,
    #[serde(default, alias = "clearKeys", skip_serializing_if = "Option::is_none")]
    clear_key: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logo: Option<Url>,
}

impl TryFrom<MediaSourceRecord> for MediaSource {
    type Error = Error;

    fn try_from(record: MediaSourceRecord) -> Result<Self> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidSource("source name is empty".into()));
        }

        match record.kind {
            DeliveryKind::Adaptive if record.manifest_uri.is_none() => {
                return Err(Error::InvalidSource(format!("{} has no manifest URI", name)));
            }
            DeliveryKind::Embedded if record.embed_url.is_none() => {
                return Err(Error::InvalidSource(format!("{} has no embed URL", name)));
            }
            _ => {}
        }

        let clear_keys = match record.clear_key {
            Some(keys) if !keys.is_empty() => Some(
                ClearKeyConfig::new(keys)
                    .map_err(|e| Error::InvalidSource(format!("{}: {}", name, e)))?,
            ),
            _ => None,
        };

        Ok(Self {
            id: record.id.unwrap_or_else(|| slugify(&name)),
            name,
            kind: record.kind,
            manifest_uri: record.manifest_uri,
            embed_url: record.embed_url,
            clear_keys,
            category: record.category,
            logo: record.logo,
        })
    }
}

impl From<MediaSource> for MediaSourceRecord {
    fn from(source: MediaSource) -> Self {
        Self {
            id: Some(source.id),
            name: source.name,
            kind: source.kind,
            manifest_uri: source.manifest_uri,
            embed_url: source.embed_url,
            clear_key: source.clear_keys.map(|c| c.keys().clone()),
            category: source.category,
            logo: source.logo,
        }
    }
}

/// Derive a stable identifier from a display name
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Identifies the source currently bound to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    pub kind: DeliveryKind,
}

/// Quality selection key: the ABR sentinel or an engine track id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum VariantId {
    /// Let the engine pick the rendition
    #[default]
    Automatic,
    /// Pin a specific engine track
    Track(String),
}

impl VariantId {
    pub fn track(id: impl Into<String>) -> Self {
        VariantId::Track(id.into())
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, VariantId::Automatic)
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantId::Automatic => write!(f, "auto"),
            VariantId::Track(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for VariantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "auto" | "automatic" => VariantId::Automatic,
            other => VariantId::Track(other.to_string()),
        })
    }
}

impl Serialize for VariantId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VariantId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// One selectable rendition in the quality menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVariant {
    pub id: VariantId,
    /// Vertical resolution in pixels
    pub height: Option<u32>,
    /// Bandwidth in bits per second
    pub bandwidth: Option<u64>,
    /// Menu label, e.g. "1080p"
    pub label: String,
}

impl QualityVariant {
    /// The synthetic ABR entry that heads every catalog
    pub fn automatic() -> Self {
        Self {
            id: VariantId::Automatic,
            height: None,
            bandwidth: None,
            label: "Auto".to_string(),
        }
    }

    pub fn pinned(id: impl Into<String>, height: u32, bandwidth: Option<u64>) -> Self {
        Self {
            id: VariantId::Track(id.into()),
            height: Some(height),
            bandwidth,
            label: format!("{}p", height),
        }
    }
}

/// Player state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing loaded, or an embedded source is showing
    #[default]
    Idle,
    /// Engine loading / manifest in flight
    Loading,
    /// Manifest loaded, playback not started yet
    Ready,
    Playing,
    Paused,
    /// Load or playback failed; needs a fresh load
    Errored,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // Any state may start a new load or be reset
            (_, Loading) | (_, Idle) |
            // From Loading
            (Loading, Ready) | (Loading, Errored) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Errored) |
            // From Playing
            (Playing, Paused) | (Playing, Errored) |
            // From Paused
            (Paused, Playing) | (Paused, Errored)
        )
    }

    /// States in which an adaptive session is bound and controllable
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Errored => write!(f, "errored"),
        }
    }
}

/// Handle to the drawable surface the engine attaches to.
///
/// The controller never creates surfaces; the host hands one in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderSurface {
    id: String,
}

impl RenderSurface {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Start playback as soon as the manifest is loaded
    pub auto_play: bool,
    /// Flush buffered media when pinning a variant
    pub clear_buffer_on_switch: bool,
    /// Upper bound on awaiting a session teardown (milliseconds)
    pub teardown_timeout_ms: u64,
    /// Append `autoplay=1` to embed frame URLs
    pub embed_autoplay: bool,
    /// Start embed frames muted
    pub embed_muted: bool,
    /// Manifest request timeout for the headless engine (milliseconds)
    pub request_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auto_play: true,
            clear_buffer_on_switch: true,
            teardown_timeout_ms: 5000,
            embed_autoplay: true,
            embed_muted: false,
            request_timeout_ms: 10000,
        }
    }
}

impl ControllerConfig {
    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.teardown_timeout_ms == 0 {
            return Err(Error::InvalidConfig("teardown_timeout_ms must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
