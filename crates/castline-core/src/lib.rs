//! Castline Core - Adaptive stream playback controller
//!
//! This crate owns the lifecycle of a streaming player bound to one render
//! surface:
//! - Once-only engine bootstrap and platform probing
//! - Strictly sequenced sessions (never two players alive at once)
//! - Clear-key DRM configuration
//! - Quality menu discovery and ABR / pinned switching
//! - An observable, enumerable playback state machine
//! - Embeddable third-party sources that bypass the engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     PlaybackController                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │    Engine    │  │   Session    │  │    Embed     │          │
//! │  │    Loader    │──│   Manager    │  │    Frame     │          │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘          │
//! │         │                 │                 │                   │
//! │  ┌──────┴───────┐  ┌──────┴───────┐         │                   │
//! │  │   Adaptive   │  │    Track     │         │                   │
//! │  │    Engine    │  │   Catalog    │         │                   │
//! │  └──────────────┘  └──────┬───────┘         │                   │
//! │                           │                 │                   │
//! │                    ┌──────┴─────────────────┴──┐                │
//! │                    │  State Store (watch)      │                │
//! │                    │  PlayerStatus snapshots   │                │
//! │                    └───────────────────────────┘                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use castline_core::{
//!     ControllerConfig, EngineLoader, MediaSource, PlaybackController, RenderSurface,
//!     ScriptedEngine, ScriptedManifest,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> castline_core::Result<()> {
//! let engine = Arc::new(ScriptedEngine::new().with_fallback(ScriptedManifest::standard_ladder()));
//! let loader = EngineLoader::shared(engine);
//! let controller = PlaybackController::new(loader, RenderSurface::new("main"), ControllerConfig::default());
//!
//! let url = url::Url::parse("https://cdn.example.com/news/manifest.mpd").unwrap();
//! controller.load_media(&MediaSource::adaptive("news", "News", url)).await;
//! println!("{}", controller.status().state);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod drm;
pub mod catalog;
pub mod embed;
pub mod engine;
#[cfg(feature = "headless")]
pub mod manifest;
pub mod loader;
pub mod state;
pub mod session;
pub mod controller;

pub use error::{Error, Result};
pub use types::*;
pub use drm::ClearKeyConfig;
pub use catalog::{RawTrack, TrackCatalog};
pub use embed::{EmbedFrame, FRAME_PERMISSIONS};
pub use engine::{
    AdaptiveEngine, EngineEvent, EnginePlayer, PlatformSupport, ScriptedEngine, ScriptedManifest,
    ScriptedPlayer,
};
#[cfg(feature = "headless")]
pub use engine::HeadlessEngine;
pub use loader::{EngineHandle, EngineLoader};
pub use state::{PlaybackEvent, PlayerStatus, StateStore, Surface};
pub use session::{LoadOutcome, SessionInfo, SessionManager};
pub use controller::PlaybackController;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library (logs the version)
pub fn init() {
    tracing::info!(version = VERSION, "Castline Core initialized");
}
