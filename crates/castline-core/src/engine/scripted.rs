//! In-memory engine with scripted manifests
//!
//! Serves canned track lists per manifest URL, with optional latency and
//! failures, and keeps counters (bootstraps, live players) so callers can
//! check sequencing guarantees. Used by the test suite and by dry runs.

use super::{AdaptiveEngine, EngineEvent, EnginePlayer, PlatformSupport, EVENT_CHANNEL_CAPACITY};
use crate::{drm::ClearKeyConfig, drm::normalize_kid, Error, RenderSurface, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::debug;
use url::Url;

/// What a scripted manifest URL resolves to
#[derive(Debug, Clone, Default)]
pub struct ScriptedManifest {
    /// Raw track objects reported after load
    pub tracks: Vec<serde_json::Value>,
    /// Simulated fetch/parse latency
    pub delay: Duration,
    /// Fail the load with this reason after the delay
    pub failure: Option<String>,
    /// Key ids the content is encrypted with
    pub required_kids: Vec<String>,
}

impl ScriptedManifest {
    pub fn with_tracks(tracks: Vec<serde_json::Value>) -> Self {
        Self {
            tracks,
            ..Default::default()
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    /// A 1080p/720p/480p ladder
    pub fn standard_ladder() -> Self {
        Self::with_tracks(vec![
            serde_json::json!({ "id": 1, "width": 1920, "height": 1080, "bandwidth": 5_000_000 }),
            serde_json::json!({ "id": 2, "width": 1280, "height": 720, "bandwidth": 2_800_000 }),
            serde_json::json!({ "id": 3, "width": 854, "height": 480, "bandwidth": 1_200_000 }),
        ])
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn encrypted_with(mut self, kid: impl Into<String>) -> Self {
        self.required_kids.push(kid.into());
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    bootstraps: AtomicUsize,
    polyfills: AtomicUsize,
    created: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    destroyed: AtomicUsize,
}

/// Scripted engine runtime
pub struct ScriptedEngine {
    manifests: HashMap<String, ScriptedManifest>,
    fallback: Option<ScriptedManifest>,
    support: PlatformSupport,
    bootstrap_failures: AtomicUsize,
    bootstrap_delay: Duration,
    failing_teardown: bool,
    counters: Arc<Counters>,
    players: Mutex<Vec<ScriptedPlayer>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            manifests: HashMap::new(),
            fallback: None,
            support: PlatformSupport::Supported,
            bootstrap_failures: AtomicUsize::new(0),
            bootstrap_delay: Duration::ZERO,
            failing_teardown: false,
            counters: Arc::new(Counters::default()),
            players: Mutex::new(Vec::new()),
        }
    }

    /// Script the response for one manifest URL
    pub fn with_manifest(mut self, url: &str, manifest: ScriptedManifest) -> Self {
        self.manifests.insert(url.to_string(), manifest);
        self
    }

    /// Response for any URL without a script
    pub fn with_fallback(mut self, manifest: ScriptedManifest) -> Self {
        self.fallback = Some(manifest);
        self
    }

    pub fn unsupported(mut self, reason: impl Into<String>) -> Self {
        self.support = PlatformSupport::Unsupported(reason.into());
        self
    }

    /// Fail the first `count` bootstrap attempts
    pub fn with_bootstrap_failures(self, count: usize) -> Self {
        self.bootstrap_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_bootstrap_delay(mut self, delay: Duration) -> Self {
        self.bootstrap_delay = delay;
        self
    }

    /// Make every `destroy` report an error (resources are still released)
    pub fn with_failing_teardown(mut self) -> Self {
        self.failing_teardown = true;
        self
    }

    pub fn bootstrap_count(&self) -> usize {
        self.counters.bootstraps.load(Ordering::SeqCst)
    }

    pub fn polyfill_count(&self) -> usize {
        self.counters.polyfills.load(Ordering::SeqCst)
    }

    pub fn players_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn live_players(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live players ever observed
    pub fn max_live_players(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn players_destroyed(&self) -> usize {
        self.counters.destroyed.load(Ordering::SeqCst)
    }

    pub fn player(&self, index: usize) -> Option<ScriptedPlayer> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner).get(index).cloned()
    }

    pub fn last_player(&self) -> Option<ScriptedPlayer> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdaptiveEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn bootstrap(&self) -> Result<()> {
        self.counters.bootstraps.fetch_add(1, Ordering::SeqCst);
        if !self.bootstrap_delay.is_zero() {
            tokio::time::sleep(self.bootstrap_delay).await;
        }

        let remaining = self.bootstrap_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.bootstrap_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::EngineLoad("scripted bootstrap failure".into()));
        }
        Ok(())
    }

    fn install_polyfills(&self) {
        self.counters.polyfills.fetch_add(1, Ordering::SeqCst);
    }

    fn platform_support(&self) -> PlatformSupport {
        self.support.clone()
    }

    async fn create_player(&self, surface: &RenderSurface) -> Result<Box<dyn EnginePlayer>> {
        let index = self.counters.created.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);

        let scripts: HashMap<String, ScriptedManifest> = self.manifests.clone();
        let player = ScriptedPlayer::new(
            index,
            surface.clone(),
            scripts,
            self.fallback.clone(),
            self.failing_teardown,
            self.counters.clone(),
        );
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(player.clone());

        debug!(index, surface = surface.id(), live, "Scripted player created");
        Ok(Box::new(player))
    }
}

struct PlayerInner {
    index: usize,
    surface: RenderSurface,
    scripts: HashMap<String, ScriptedManifest>,
    fallback: Option<ScriptedManifest>,
    failing_teardown: bool,
    counters: Arc<Counters>,
    clear_keys: Mutex<Option<ClearKeyConfig>>,
    loaded: Mutex<Option<Url>>,
    tracks: Mutex<Vec<serde_json::Value>>,
    selected: Mutex<Option<(String, bool)>>,
    abr_enabled: AtomicBool,
    playing: AtomicBool,
    muted: AtomicBool,
    fullscreen: AtomicBool,
    destroyed: watch::Sender<bool>,
    events: broadcast::Sender<EngineEvent>,
}

/// Player handed out by [`ScriptedEngine`]; clones share state
#[derive(Clone)]
pub struct ScriptedPlayer {
    inner: Arc<PlayerInner>,
}

impl ScriptedPlayer {
    fn new(
        index: usize,
        surface: RenderSurface,
        scripts: HashMap<String, ScriptedManifest>,
        fallback: Option<ScriptedManifest>,
        failing_teardown: bool,
        counters: Arc<Counters>,
    ) -> Self {
        let (destroyed, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(PlayerInner {
                index,
                surface,
                scripts,
                fallback,
                failing_teardown,
                counters,
                clear_keys: Mutex::new(None),
                loaded: Mutex::new(None),
                tracks: Mutex::new(Vec::new()),
                selected: Mutex::new(None),
                abr_enabled: AtomicBool::new(true),
                playing: AtomicBool::new(false),
                muted: AtomicBool::new(false),
                fullscreen: AtomicBool::new(false),
                destroyed,
                events,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.inner.surface
    }

    pub fn is_destroyed(&self) -> bool {
        *self.inner.destroyed.borrow()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.inner.fullscreen.load(Ordering::SeqCst)
    }

    pub fn abr_enabled(&self) -> bool {
        self.inner.abr_enabled.load(Ordering::SeqCst)
    }

    /// Pinned track id and whether the buffer was cleared
    pub fn selected_track(&self) -> Option<(String, bool)> {
        self.inner.selected.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_keys(&self) -> Option<ClearKeyConfig> {
        self.inner.clear_keys.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn loaded_manifest(&self) -> Option<Url> {
        self.inner.loaded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Raise a notification as if the media element fired it
    pub fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Playing => self.inner.playing.store(true, Ordering::SeqCst),
            EngineEvent::Paused => self.inner.playing.store(false, Ordering::SeqCst),
            _ => {}
        }
        let _ = self.inner.events.send(event);
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::engine("player destroyed"));
        }
        Ok(())
    }

    fn script_for(&self, url: &Url) -> Option<ScriptedManifest> {
        self.inner
            .scripts
            .get(url.as_str())
            .or(self.inner.fallback.as_ref())
            .cloned()
    }
}

#[async_trait]
impl EnginePlayer for ScriptedPlayer {
    async fn configure_clear_keys(&self, keys: &ClearKeyConfig) -> Result<()> {
        self.ensure_alive()?;
        *self.inner.clear_keys.lock().unwrap_or_else(PoisonError::into_inner) = Some(keys.clone());
        Ok(())
    }

    async fn load(&self, manifest: &Url) -> Result<()> {
        self.ensure_alive()?;
        let script = self
            .script_for(manifest)
            .ok_or_else(|| Error::ManifestFetch(format!("404 Not Found: {}", manifest)))?;

        if !script.delay.is_zero() {
            let mut destroyed = self.inner.destroyed.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(script.delay) => {}
                _ = destroyed.wait_for(|d| *d) => {
                    return Err(Error::engine("load interrupted by destroy"));
                }
            }
        }
        self.ensure_alive()?;

        if let Some(reason) = script.failure {
            return Err(Error::ManifestFetch(reason));
        }

        let keys = self.clear_keys();
        for kid in &script.required_kids {
            let covered = keys.as_ref().map(|k| k.covers(kid)).unwrap_or(false);
            if !covered {
                return Err(Error::ContentKeyNotFound { kid: normalize_kid(kid) });
            }
        }

        *self.inner.tracks.lock().unwrap_or_else(PoisonError::into_inner) = script.tracks;
        *self.inner.loaded.lock().unwrap_or_else(PoisonError::into_inner) = Some(manifest.clone());
        Ok(())
    }

    fn variant_tracks(&self) -> Vec<serde_json::Value> {
        self.inner.tracks.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_abr_enabled(&self, enabled: bool) {
        self.inner.abr_enabled.store(enabled, Ordering::SeqCst);
    }

    fn select_variant_track(&self, track_id: &str, clear_buffer: bool) -> Result<()> {
        self.ensure_alive()?;
        *self.inner.selected.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((track_id.to_string(), clear_buffer));
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.ensure_alive()?;
        self.emit(EngineEvent::Playing);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.ensure_alive()?;
        self.emit(EngineEvent::Paused);
        Ok(())
    }

    fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::SeqCst);
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.ensure_alive()?;
        self.inner.fullscreen.store(fullscreen, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.send_replace(true) {
            return Ok(());
        }
        self.inner.playing.store(false, Ordering::SeqCst);
        self.inner.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.inner.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.events.send(EngineEvent::Destroyed);

        if self.inner.failing_teardown {
            return Err(Error::Teardown("scripted teardown failure".into()));
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }
}
