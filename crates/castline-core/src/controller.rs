//! Playback controller
//!
//! The single object a host drives: load a source, issue play/pause/mute/
//! fullscreen/quality commands, observe [`PlayerStatus`], dispose.

use crate::{
    engine::EnginePlayer,
    loader::EngineLoader,
    session::{LoadOutcome, SessionInfo, SessionManager},
    state::{PlaybackEvent, PlayerStatus, StateStore},
    types::*,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Drives one render surface
pub struct PlaybackController {
    sessions: SessionManager,
    state: Arc<StateStore>,
}

impl PlaybackController {
    /// Create a controller bound to `surface`.
    ///
    /// The loader can be shared by any number of controllers; the engine is
    /// bootstrapped at most once across all of them.
    pub fn new(loader: Arc<EngineLoader>, surface: RenderSurface, config: ControllerConfig) -> Self {
        let state = Arc::new(StateStore::new());
        info!(surface = surface.id(), engine = loader.engine_name(), "Playback controller created");
        Self {
            sessions: SessionManager::new(loader, surface, config, Arc::clone(&state)),
            state,
        }
    }

    /// Bind `source`, superseding any load still in flight.
    ///
    /// Only the most recent call's outcome reaches the status.
    pub async fn load_media(&self, source: &MediaSource) -> LoadOutcome {
        self.sessions.load_media(source).await
    }

    /// Current snapshot
    pub fn status(&self) -> PlayerStatus {
        self.state.snapshot()
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.state.subscribe()
    }

    pub async fn current_session(&self) -> Option<SessionInfo> {
        self.sessions.current_session().await
    }

    /// Player of the bound adaptive session, if the status allows commands
    async fn controllable_player(&self) -> Option<Arc<dyn EnginePlayer>> {
        let status = self.state.snapshot();
        if status.is_embedded() || !status.state.is_active() {
            debug!(state = %status.state, embedded = status.is_embedded(), "Command ignored");
            return None;
        }
        self.sessions.current_player().await
    }

    #[instrument(skip(self))]
    pub async fn play(&self) -> bool {
        let Some(player) = self.controllable_player().await else {
            return false;
        };
        match player.play().await {
            Ok(()) => {
                self.state.apply_current(PlaybackEvent::Played);
                true
            }
            Err(e) => {
                warn!(error = %e, "Play failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn pause(&self) -> bool {
        let Some(player) = self.controllable_player().await else {
            return false;
        };
        match player.pause().await {
            Ok(()) => {
                self.state.apply_current(PlaybackEvent::Paused);
                true
            }
            Err(e) => {
                warn!(error = %e, "Pause failed");
                false
            }
        }
    }

    /// Player of the bound adaptive session in any state, including mid-load
    async fn bound_player(&self) -> Option<Arc<dyn EnginePlayer>> {
        if self.state.snapshot().is_embedded() {
            return None;
        }
        self.sessions.current_player().await
    }

    /// Flip mute on the engine and in the status.
    ///
    /// With no player bound yet the flag still flips and is applied to the
    /// next player created. Embedded frames manage their own audio.
    pub async fn toggle_mute(&self) -> bool {
        let status = self.state.snapshot();
        if status.is_embedded() {
            return false;
        }
        if let Some(player) = self.bound_player().await {
            player.set_muted(!status.muted);
        }
        self.state.apply_current(PlaybackEvent::MuteToggled)
    }

    /// Flip fullscreen. Embedded frames toggle the flag only.
    pub async fn toggle_fullscreen(&self) -> bool {
        let target = !self.state.snapshot().fullscreen;
        if let Some(player) = self.bound_player().await {
            if let Err(e) = player.set_fullscreen(target).await {
                warn!(error = %e, "Fullscreen request failed");
                return false;
            }
        }
        self.state.apply_current(PlaybackEvent::FullscreenToggled)
    }

    /// Switch between ABR and a pinned rendition.
    ///
    /// Ids that are not in the current quality menu are ignored. The engine
    /// is only touched if the session that published the menu is still bound.
    #[instrument(skip(self), fields(variant = %id))]
    pub async fn select_variant(&self, id: VariantId) -> bool {
        let status = self.state.snapshot();
        let selectable = |status: &PlayerStatus| {
            status.state.is_active()
                && !status.is_embedded()
                && status.selected != id
                && status.variants.iter().any(|v| v.id == id)
        };
        let Some(session_id) = status.session_id.filter(|_| selectable(&status)) else {
            debug!("Variant not selectable");
            return false;
        };
        let Some(player) = self.sessions.player_for(session_id).await else {
            return false;
        };
        let status = self.state.snapshot();
        if status.session_id != Some(session_id) || !selectable(&status) {
            debug!("Session changed before the switch");
            return false;
        }

        match &id {
            VariantId::Automatic => player.set_abr_enabled(true),
            VariantId::Track(track_id) => {
                player.set_abr_enabled(false);
                let clear_buffer = self.sessions.config().clear_buffer_on_switch;
                if let Err(e) = player.select_variant_track(track_id, clear_buffer) {
                    warn!(error = %e, "Variant switch failed");
                    return false;
                }
            }
        }
        info!("Quality switched");
        self.state.apply_current(PlaybackEvent::VariantSelected(id))
    }

    /// Reset to idle and release the bound session.
    ///
    /// Returns immediately. The teardown runs on the current runtime and
    /// its handle is returned for callers that want to wait on it. The
    /// controller stays usable; a later `load_media` starts fresh.
    pub fn dispose(&self) -> Option<JoinHandle<()>> {
        self.state.begin(PlaybackEvent::Reset);
        info!("Playback controller disposed");
        self.sessions.teardown_detached()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}
