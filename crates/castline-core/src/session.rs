//! Session manager - binds one engine player at a time to the surface
//!
//! Coordinates:
//! - Tearing down the previous player before a new one exists
//! - Engine bootstrap through the shared loader
//! - Clear-key configuration, manifest load and the quality menu
//! - Forwarding the player's own notifications into the status
//!
//! Every step re-checks the load's token, so a load that was overtaken by
//! a newer `load_media` or by a dispose stops touching shared state.

use crate::{
    catalog::TrackCatalog,
    embed::EmbedFrame,
    engine::{EngineEvent, EnginePlayer},
    loader::EngineLoader,
    state::{LoadToken, PlaybackEvent, StateStore},
    types::*,
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// How a `load_media` call ended
#[derive(Debug)]
pub enum LoadOutcome {
    /// Manifest loaded and playback started
    Playing,
    /// Manifest loaded; auto-play was off or the engine refused to start
    Ready,
    /// Embedded source bound, no engine involved
    Embedded,
    /// A newer load or a dispose took over before this one finished
    Superseded,
    /// The load failed; the status carries the overlay message
    Failed(Error),
}

impl LoadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadOutcome::Playing | LoadOutcome::Ready | LoadOutcome::Embedded)
    }
}

/// Public view of the bound session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub source: SourceSummary,
}

/// One engine player bound to the surface
pub struct PlaybackSession {
    id: SessionId,
    token: LoadToken,
    created_at: DateTime<Utc>,
    source: SourceSummary,
    player: Arc<dyn EnginePlayer>,
    listener: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn player(&self) -> Arc<dyn EnginePlayer> {
        Arc::clone(&self.player)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            created_at: self.created_at,
            source: self.source.clone(),
        }
    }

    /// Destroy the player, bounded by `limit`. Failures are logged only.
    async fn teardown(mut self, limit: Duration) {
        let started = Utc::now();
        match tokio::time::timeout(limit, self.player.destroy()).await {
            Ok(Ok(())) => {
                let elapsed_ms = (Utc::now() - started).num_milliseconds();
                info!(session_id = %self.id, source = %self.source.name, elapsed_ms, "Session torn down");
            }
            Ok(Err(e)) => {
                warn!(session_id = %self.id, error = %e, "Teardown failed, continuing");
            }
            Err(_) => {
                warn!(
                    session_id = %self.id,
                    timeout_ms = limit.as_millis() as u64,
                    "Teardown timed out, continuing"
                );
            }
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    /// Release without awaiting the engine (no runtime available)
    fn abandon(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        warn!(session_id = %self.id, "Session dropped without engine teardown");
    }
}

type Slot = Arc<Mutex<Option<PlaybackSession>>>;

/// Owns the single session slot and runs loads against it
pub struct SessionManager {
    loader: Arc<EngineLoader>,
    surface: RenderSurface,
    config: ControllerConfig,
    state: Arc<StateStore>,
    slot: Slot,
}

impl SessionManager {
    pub fn new(
        loader: Arc<EngineLoader>,
        surface: RenderSurface,
        config: ControllerConfig,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            loader,
            surface,
            config,
            state,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.config.teardown_timeout_ms)
    }

    /// Bind `source`, replacing whatever was bound before
    #[instrument(skip(self, source), fields(source = %source.name(), kind = %source.kind()))]
    pub async fn load_media(&self, source: &MediaSource) -> LoadOutcome {
        match source.kind() {
            DeliveryKind::Embedded => self.load_embedded(source).await,
            DeliveryKind::Adaptive => self.load_adaptive(source).await,
        }
    }

    async fn load_embedded(&self, source: &MediaSource) -> LoadOutcome {
        let frame = match EmbedFrame::for_source(source, &self.config) {
            Ok(frame) => frame,
            Err(e) => {
                let token = self.state.begin(PlaybackEvent::LoadStarted { source: source.summary() });
                teardown_slot(&self.slot, self.teardown_timeout()).await;
                return self.fail(token, source, e);
            }
        };

        let url = frame.url.clone();
        let token = self.state.begin(PlaybackEvent::EmbedStarted {
            source: source.summary(),
            frame,
        });
        teardown_slot(&self.slot, self.teardown_timeout()).await;

        if !self.state.is_current(token) {
            return LoadOutcome::Superseded;
        }
        info!(url = %url, "Embedded source bound");
        LoadOutcome::Embedded
    }

    async fn load_adaptive(&self, source: &MediaSource) -> LoadOutcome {
        let token = self.state.begin(PlaybackEvent::LoadStarted { source: source.summary() });
        teardown_slot(&self.slot, self.teardown_timeout()).await;

        match self.start_session(token, source).await {
            Ok(outcome) => outcome,
            Err(Error::Superseded) => {
                debug!("Load superseded");
                LoadOutcome::Superseded
            }
            Err(e) => {
                self.teardown_owned(token).await;
                self.fail(token, source, e)
            }
        }
    }

    fn fail(&self, token: LoadToken, source: &MediaSource, error: Error) -> LoadOutcome {
        let message = error.overlay_message(source.name());
        if !self.state.apply(token, PlaybackEvent::Failed(message)) && !self.state.is_current(token) {
            return LoadOutcome::Superseded;
        }
        warn!(error = %error, code = error.error_code(), "Load failed");
        LoadOutcome::Failed(error)
    }

    fn ensure_current(&self, token: LoadToken) -> Result<()> {
        if self.state.is_current(token) {
            Ok(())
        } else {
            Err(Error::Superseded)
        }
    }

    async fn start_session(&self, token: LoadToken, source: &MediaSource) -> Result<LoadOutcome> {
        let manifest = source
            .manifest_uri()
            .cloned()
            .ok_or_else(|| Error::InvalidSource(format!("{} has no manifest URI", source.name())))?;

        let engine = self.loader.ensure_ready().await?;
        self.ensure_current(token)?;

        let (player, session_id) = {
            let mut slot = self.slot.lock().await;
            // A newer load may have started while we waited for the lock
            self.ensure_current(token)?;
            if let Some(leftover) = slot.take() {
                leftover.teardown(self.teardown_timeout()).await;
            }

            let player: Arc<dyn EnginePlayer> = Arc::from(engine.create_player(&self.surface).await?);
            let events = player.events();
            let session = PlaybackSession {
                id: SessionId::new(),
                token,
                created_at: Utc::now(),
                source: source.summary(),
                player: Arc::clone(&player),
                listener: Some(self.spawn_listener(token, source.name().to_string(), events)),
            };
            let session_id = session.id;
            *slot = Some(session);
            info!(session_id = %session_id, engine = engine.name(), "Session created");

            let status = self.state.snapshot();
            player.set_muted(status.muted);
            if status.fullscreen {
                player.set_fullscreen(true).await?;
            }
            if let Some(keys) = source.clear_keys() {
                player.configure_clear_keys(keys).await?;
                debug!(keys = keys.len(), "ClearKey DRM configured");
            }
            (player, session_id)
        };

        player
            .load(&manifest)
            .await
            .map_err(|e| match e {
                Error::Superseded => e,
                other => Error::manifest_load(source.name(), &other),
            })?;
        self.ensure_current(token)?;

        // Settings toggled while the manifest was loading
        let status = self.state.snapshot();
        player.set_muted(status.muted);
        if let Err(e) = player.set_fullscreen(status.fullscreen).await {
            warn!(error = %e, "Fullscreen sync failed");
        }

        let catalog = TrackCatalog::from_raw(&player.variant_tracks());
        info!(
            session_id = %session_id,
            variants = catalog.pinnable_len(),
            "Manifest loaded"
        );
        let loaded = self.state.apply(
            token,
            PlaybackEvent::ManifestLoaded {
                variants: catalog.into_variants(),
                session_id,
            },
        );
        if !loaded {
            self.ensure_current(token)?;
            // Still ours, so the player errored while loading
            return Err(Error::manifest_load(
                source.name(),
                &Error::engine("player reported an error during load"),
            ));
        }

        if !self.config.auto_play {
            return Ok(LoadOutcome::Ready);
        }
        match player.play().await {
            Ok(()) => {
                self.state.apply(token, PlaybackEvent::Played);
                Ok(LoadOutcome::Playing)
            }
            Err(e) => {
                warn!(error = %e, "Auto-play refused, staying ready");
                Ok(LoadOutcome::Ready)
            }
        }
    }

    /// Mirror the player's own notifications into the status
    fn spawn_listener(
        &self,
        token: LoadToken,
        source_name: String,
        mut events: broadcast::Receiver<EngineEvent>,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Engine event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !state.is_current(token) {
                    break;
                }
                match event {
                    EngineEvent::Playing => {
                        state.apply(token, PlaybackEvent::Played);
                    }
                    EngineEvent::Paused => {
                        state.apply(token, PlaybackEvent::Paused);
                    }
                    EngineEvent::Error(reason) => {
                        warn!(source = %source_name, %reason, "Engine reported an error");
                        state.apply(token, PlaybackEvent::Failed(format!("Failed to load {}", source_name)));
                    }
                    EngineEvent::Destroyed => break,
                }
            }
        })
    }

    /// Tear down the session only if `token`'s load created it
    async fn teardown_owned(&self, token: LoadToken) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().map(|s| s.token == token).unwrap_or(false) {
            if let Some(session) = slot.take() {
                session.teardown(self.teardown_timeout()).await;
            }
        }
    }

    /// Tear down whatever is bound
    pub async fn teardown_current(&self) {
        teardown_slot(&self.slot, self.teardown_timeout()).await;
    }

    /// Start a teardown without waiting for it.
    ///
    /// Returns the task handle when a runtime is available. Without one the
    /// session is released synchronously if the slot is free.
    pub fn teardown_detached(&self) -> Option<JoinHandle<()>> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let slot = Arc::clone(&self.slot);
                let limit = self.teardown_timeout();
                Some(handle.spawn(async move { teardown_slot(&slot, limit).await }))
            }
            Err(_) => {
                match self.slot.try_lock() {
                    Ok(mut slot) => {
                        if let Some(session) = slot.take() {
                            session.abandon();
                        }
                    }
                    Err(_) => warn!("Session slot busy and no runtime; teardown skipped"),
                }
                None
            }
        }
    }

    /// Player of the bound adaptive session, if any
    pub async fn current_player(&self) -> Option<Arc<dyn EnginePlayer>> {
        self.slot.lock().await.as_ref().map(PlaybackSession::player)
    }

    /// Player of session `id`, if that session is still bound
    pub async fn player_for(&self, id: SessionId) -> Option<Arc<dyn EnginePlayer>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .filter(|session| session.id == id)
            .map(PlaybackSession::player)
    }

    pub async fn current_session(&self) -> Option<SessionInfo> {
        self.slot.lock().await.as_ref().map(PlaybackSession::info)
    }
}

/// Destroy the slot's session while holding the slot, so no new player can
/// be created until the old one is gone
async fn teardown_slot(slot: &Mutex<Option<PlaybackSession>>, limit: Duration) {
    let mut slot = slot.lock().await;
    if let Some(session) = slot.take() {
        session.teardown(limit).await;
    }
}
