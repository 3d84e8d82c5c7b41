//! Observable player status
//!
//! [`PlayerStatus`] is both the snapshot the rendering layer reads and the
//! state machine that mutates it. Every change goes through
//! [`PlayerStatus::transition`], and [`StateStore`] publishes the result on
//! a `watch` channel.
//!
//! Loads are tagged with a [`LoadToken`]. Starting a load (or a reset)
//! bumps the store's generation, and events carrying an older token are
//! dropped. This is what makes the newest `load_media` call the only one
//! whose outcome can reach the snapshot.

use crate::embed::EmbedFrame;
use crate::error::{Error, Result};
use crate::types::{PlaybackState, QualityVariant, SessionId, SourceSummary, VariantId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, trace};

/// What the rendering layer should show
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Surface {
    /// Nothing bound
    #[default]
    None,
    /// The engine's render surface
    Adaptive,
    /// A passive third-party frame
    Embedded(EmbedFrame),
}

/// Snapshot of everything the UI renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub muted: bool,
    pub fullscreen: bool,
    /// Overlay message while errored
    pub error: Option<String>,
    pub source: Option<SourceSummary>,
    pub surface: Surface,
    /// Quality menu, `Auto` first; empty until a manifest is loaded
    pub variants: Vec<QualityVariant>,
    pub selected: VariantId,
    /// Whether the custom control bar applies
    pub controls_visible: bool,
    pub session_id: Option<SessionId>,
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// An adaptive load began
    LoadStarted { source: SourceSummary },
    /// An embedded source was bound
    EmbedStarted { source: SourceSummary, frame: EmbedFrame },
    /// Manifest loaded and quality menu built
    ManifestLoaded {
        variants: Vec<QualityVariant>,
        session_id: SessionId,
    },
    Played,
    Paused,
    Failed(String),
    VariantSelected(VariantId),
    MuteToggled,
    FullscreenToggled,
    /// Back to idle, nothing bound
    Reset,
}

impl PlayerStatus {
    pub fn is_embedded(&self) -> bool {
        matches!(self.surface, Surface::Embedded(_))
    }

    pub fn selected_variant(&self) -> Option<&QualityVariant> {
        self.variants.iter().find(|v| v.id == self.selected)
    }

    fn enter(&mut self, target: PlaybackState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    /// Apply an event. Returns whether anything changed.
    pub fn transition(&mut self, event: PlaybackEvent) -> Result<bool> {
        match event {
            PlaybackEvent::LoadStarted { source } => {
                self.enter(PlaybackState::Loading)?;
                self.error = None;
                self.source = Some(source);
                self.surface = Surface::Adaptive;
                self.variants.clear();
                self.selected = VariantId::Automatic;
                self.controls_visible = true;
                self.session_id = None;
                Ok(true)
            }
            PlaybackEvent::EmbedStarted { source, frame } => {
                self.enter(PlaybackState::Idle)?;
                self.error = None;
                self.source = Some(source);
                self.surface = Surface::Embedded(frame);
                self.variants.clear();
                self.selected = VariantId::Automatic;
                self.controls_visible = false;
                self.session_id = None;
                Ok(true)
            }
            PlaybackEvent::ManifestLoaded { variants, session_id } => {
                if self.state != PlaybackState::Loading {
                    return Err(Error::InvalidStateTransition {
                        from: self.state.to_string(),
                        to: PlaybackState::Ready.to_string(),
                    });
                }
                self.enter(PlaybackState::Ready)?;
                self.variants = variants;
                self.selected = VariantId::Automatic;
                self.session_id = Some(session_id);
                Ok(true)
            }
            PlaybackEvent::Played => self.move_to(PlaybackState::Playing),
            PlaybackEvent::Paused => self.move_to(PlaybackState::Paused),
            PlaybackEvent::Failed(message) => {
                let changed = self.state != PlaybackState::Errored || self.error.as_ref() != Some(&message);
                self.enter(PlaybackState::Errored)?;
                self.error = Some(message);
                Ok(changed)
            }
            PlaybackEvent::VariantSelected(id) => {
                if self.selected == id || !self.variants.iter().any(|v| v.id == id) {
                    return Ok(false);
                }
                self.selected = id;
                Ok(true)
            }
            PlaybackEvent::MuteToggled => {
                self.muted = !self.muted;
                Ok(true)
            }
            PlaybackEvent::FullscreenToggled => {
                self.fullscreen = !self.fullscreen;
                Ok(true)
            }
            PlaybackEvent::Reset => {
                let changed = *self != PlayerStatus::default();
                *self = PlayerStatus::default();
                Ok(changed)
            }
        }
    }

    fn move_to(&mut self, target: PlaybackState) -> Result<bool> {
        if self.state == target {
            return Ok(false);
        }
        self.enter(target)?;
        Ok(true)
    }
}

/// Generation a load was started under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadToken(u64);

/// Publishes [`PlayerStatus`] and arbitrates between overlapping loads
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<PlayerStatus>,
    generation: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PlayerStatus::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    /// Supersede every outstanding token and apply `event`.
    ///
    /// The bump happens under the channel lock, so no stale `apply` can
    /// slip in between the bump and the event.
    pub fn begin(&self, event: PlaybackEvent) -> LoadToken {
        let mut token = LoadToken(0);
        self.tx.send_modify(|status| {
            token = LoadToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            if let Err(e) = status.transition(event) {
                debug!(error = %e, "Ignoring event at load start");
            }
        });
        token
    }

    /// Whether `token` still belongs to the newest load
    pub fn is_current(&self, token: LoadToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// Apply an event on behalf of a load. Stale tokens are ignored.
    pub fn apply(&self, token: LoadToken, event: PlaybackEvent) -> bool {
        self.tx.send_if_modified(|status| {
            if self.generation.load(Ordering::SeqCst) != token.0 {
                trace!(?event, "Dropping event from superseded load");
                return false;
            }
            Self::transition_logged(status, event)
        })
    }

    /// Apply a user command against whatever is current
    pub fn apply_current(&self, event: PlaybackEvent) -> bool {
        self.tx.send_if_modified(|status| Self::transition_logged(status, event))
    }

    pub fn snapshot(&self) -> PlayerStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.tx.subscribe()
    }

    fn transition_logged(status: &mut PlayerStatus, event: PlaybackEvent) -> bool {
        match status.transition(event) {
            Ok(changed) => changed,
            Err(e) => {
                debug!(error = %e, "Rejected playback event");
                false
            }
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
