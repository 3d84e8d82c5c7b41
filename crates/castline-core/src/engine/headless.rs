//! Headless engine
//!
//! Fetches manifests over HTTP and exposes their variants as engine tracks
//! without decoding media. Playback commands only flip state and emit the
//! matching notifications, which is enough to drive the controller from a
//! terminal or a QC job.

use super::{AdaptiveEngine, EngineEvent, EnginePlayer, PlatformSupport, EVENT_CHANNEL_CAPACITY};
use crate::{
    drm::ClearKeyConfig,
    manifest::{parse_manifest, Manifest},
    ControllerConfig, Error, RenderSurface, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, instrument};
use url::Url;

/// Engine backed by an HTTP client and the built-in manifest parsers
pub struct HeadlessEngine {
    request_timeout: Duration,
    client: OnceCell<Client>,
}

impl HeadlessEngine {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            client: OnceCell::new(),
        }
    }

    /// Reuse an existing client instead of building one on bootstrap
    pub fn with_client(client: Client) -> Self {
        Self {
            request_timeout: Duration::from_millis(ControllerConfig::default().request_timeout_ms),
            client: OnceCell::new_with(Some(client)),
        }
    }
}

#[async_trait]
impl AdaptiveEngine for HeadlessEngine {
    fn name(&self) -> &str {
        "headless"
    }

    async fn bootstrap(&self) -> Result<()> {
        if self.client.initialized() {
            return Ok(());
        }
        let client = Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("castline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::EngineLoad(e.to_string()))?;
        let _ = self.client.set(client);
        info!(timeout_ms = self.request_timeout.as_millis() as u64, "Headless engine ready");
        Ok(())
    }

    fn platform_support(&self) -> PlatformSupport {
        PlatformSupport::Supported
    }

    async fn create_player(&self, surface: &RenderSurface) -> Result<Box<dyn EnginePlayer>> {
        let client = self
            .client
            .get()
            .cloned()
            .ok_or_else(|| Error::engine("headless engine used before bootstrap"))?;
        Ok(Box::new(HeadlessPlayer::new(client, surface.clone())))
    }
}

#[derive(Default)]
struct PlayerState {
    clear_keys: Option<ClearKeyConfig>,
    manifest: Option<Manifest>,
    pinned: Option<String>,
}

/// Player created by [`HeadlessEngine`]
pub struct HeadlessPlayer {
    client: Client,
    surface: RenderSurface,
    state: Mutex<PlayerState>,
    abr_enabled: AtomicBool,
    playing: AtomicBool,
    muted: AtomicBool,
    destroyed: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
}

impl HeadlessPlayer {
    fn new(client: Client, surface: RenderSurface) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            surface,
            state: Mutex::new(PlayerState::default()),
            abr_enabled: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            events,
        }
    }

    /// Track pinned by the last manual selection
    pub fn pinned_track(&self) -> Option<String> {
        self.state().pinned.clone()
    }

    pub fn abr_enabled(&self) -> bool {
        self.abr_enabled.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::engine("player destroyed"));
        }
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ManifestFetch(format!("HTTP {} for {}", status, url)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))
    }
}

/// Every protected key id must have a configured key
fn check_keys(manifest: &Manifest, keys: Option<&ClearKeyConfig>) -> Result<()> {
    for kid in &manifest.default_kids {
        let covered = keys.map(|k| k.covers(kid)).unwrap_or(false);
        if !covered {
            return Err(Error::ContentKeyNotFound { kid: kid.clone() });
        }
    }
    Ok(())
}

#[async_trait]
impl EnginePlayer for HeadlessPlayer {
    async fn configure_clear_keys(&self, keys: &ClearKeyConfig) -> Result<()> {
        self.ensure_alive()?;
        debug!(keys = keys.len(), surface = self.surface.id(), "ClearKey configured");
        self.state().clear_keys = Some(keys.clone());
        Ok(())
    }

    #[instrument(skip(self), fields(surface = %self.surface.id()))]
    async fn load(&self, manifest_url: &Url) -> Result<()> {
        self.ensure_alive()?;
        let content = self.fetch(manifest_url).await?;
        // A destroy that raced the fetch wins
        self.ensure_alive()?;

        let manifest = parse_manifest(manifest_url, &content)?;
        check_keys(&manifest, self.state().clear_keys.as_ref())?;

        info!(
            variants = manifest.variants.len(),
            is_live = manifest.is_live,
            encrypted = manifest.is_encrypted(),
            "Manifest parsed"
        );
        self.state().manifest = Some(manifest);
        Ok(())
    }

    fn variant_tracks(&self) -> Vec<serde_json::Value> {
        self.state()
            .manifest
            .as_ref()
            .map(|m| m.variants.iter().map(|v| v.to_track()).collect())
            .unwrap_or_default()
    }

    fn set_abr_enabled(&self, enabled: bool) {
        self.abr_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.state().pinned = None;
        }
    }

    fn select_variant_track(&self, track_id: &str, clear_buffer: bool) -> Result<()> {
        self.ensure_alive()?;
        let mut state = self.state();
        let known = state
            .manifest
            .as_ref()
            .map(|m| m.variants.iter().any(|v| v.id == track_id))
            .unwrap_or(false);
        if !known {
            return Err(Error::engine(format!("unknown variant track {}", track_id)));
        }
        debug!(track_id, clear_buffer, "Variant pinned");
        state.pinned = Some(track_id.to_string());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.playing.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(EngineEvent::Playing);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.playing.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(EngineEvent::Paused);
        }
        Ok(())
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    async fn set_fullscreen(&self, _fullscreen: bool) -> Result<()> {
        // No window to resize
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.playing.store(false, Ordering::SeqCst);
        *self.state() = PlayerState::default();
        let _ = self.events.send(EngineEvent::Destroyed);
        debug!(surface = self.surface.id(), "Headless player destroyed");
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestType, ManifestVariant};
    use std::collections::BTreeMap;

    fn encrypted_manifest(kid: &str) -> Manifest {
        Manifest {
            manifest_type: ManifestType::Dash,
            variants: vec![ManifestVariant {
                id: "v1".into(),
                bandwidth: 1,
                width: None,
                height: Some(720),
                codecs: None,
                frame_rate: None,
            }],
            is_live: true,
            duration: None,
            default_kids: vec![kid.to_string()],
        }
    }

    #[test]
    fn test_check_keys() {
        let kid = "eb676abb-cb34-5e96-bbcf-616630f1a3da";
        let manifest = encrypted_manifest(kid);
        assert!(matches!(check_keys(&manifest, None), Err(Error::ContentKeyNotFound { .. })));

        let keys = ClearKeyConfig::new(BTreeMap::from([(
            "eb676abbcb345e96bbcf616630f1a3da".to_string(),
            "100b6c20940f779a4589152b57d2dacb".to_string(),
        )]))
        .unwrap();
        assert!(check_keys(&manifest, Some(&keys)).is_ok());
    }

    #[tokio::test]
    async fn test_create_player_requires_bootstrap() {
        let engine = HeadlessEngine::new(&ControllerConfig::default());
        let surface = RenderSurface::new("headless");
        assert!(engine.create_player(&surface).await.is_err());

        engine.bootstrap().await.unwrap();
        let player = engine.create_player(&surface).await.unwrap();
        assert!(player.variant_tracks().is_empty());
        assert!(player.select_variant_track("0", true).is_err());

        player.destroy().await.unwrap();
        assert!(player.play().await.is_err());
    }
}
