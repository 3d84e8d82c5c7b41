//! Adaptive engine boundary
//!
//! The controller never talks to a concrete player. It drives two traits:
//! [`AdaptiveEngine`] for the process-wide runtime (bootstrap, polyfills,
//! platform probing, player construction) and [`EnginePlayer`] for a single
//! player bound to a render surface.

#[cfg(feature = "headless")]
pub mod headless;
pub mod scripted;

#[cfg(feature = "headless")]
pub use headless::HeadlessEngine;
pub use scripted::{ScriptedEngine, ScriptedManifest, ScriptedPlayer};

use crate::{drm::ClearKeyConfig, RenderSurface, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;

/// Capacity of each player's notification channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Result of probing the host for required capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSupport {
    Supported,
    Unsupported(String),
}

/// Notifications a player emits on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Media started or resumed
    Playing,
    /// Media paused, by the user or externally
    Paused,
    /// Fatal decode/network error after load
    Error(String),
    /// Player was destroyed; no further events follow
    Destroyed,
}

/// Process-wide engine runtime
#[async_trait]
pub trait AdaptiveEngine: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Make the engine available (inject/fetch/initialize). Called once.
    async fn bootstrap(&self) -> Result<()>;

    /// Patch environment incompatibilities. Called once, after bootstrap.
    fn install_polyfills(&self) {}

    /// Probe for required capabilities
    fn platform_support(&self) -> PlatformSupport;

    /// Build a player attached to `surface`
    async fn create_player(&self, surface: &RenderSurface) -> Result<Box<dyn EnginePlayer>>;
}

/// One player instance bound to a surface
#[async_trait]
pub trait EnginePlayer: Send + Sync {
    /// Apply clear-key DRM before the manifest is loaded
    async fn configure_clear_keys(&self, keys: &ClearKeyConfig) -> Result<()>;

    /// Load a manifest; resolves once tracks are known
    async fn load(&self, manifest: &Url) -> Result<()>;

    /// Raw variant track objects, validated by the catalog builder
    fn variant_tracks(&self) -> Vec<serde_json::Value>;

    /// Toggle adaptive bitrate selection
    fn set_abr_enabled(&self, enabled: bool);

    /// Pin a variant track by engine id
    fn select_variant_track(&self, track_id: &str, clear_buffer: bool) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    fn set_muted(&self, muted: bool);

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()>;

    /// Release all engine resources
    async fn destroy(&self) -> Result<()>;

    /// Subscribe to play/pause/error notifications
    fn events(&self) -> broadcast::Receiver<EngineEvent>;
}
