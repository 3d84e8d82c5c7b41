//! Quality switching example
//!
//! Loads a scripted channel, pins 720p, goes back to Auto and disposes.
//!
//! Run with: cargo run -p castline-core --example quality_switch

use castline_core::{
    ControllerConfig, EngineLoader, MediaSource, PlaybackController, RenderSurface, ScriptedEngine,
    ScriptedManifest, VariantId,
};
use std::sync::Arc;
use url::Url;

#[tokio::main]
async fn main() -> castline_core::Result<()> {
    println!("Castline Core - Quality Switching Example");
    println!("==========================================\n");

    let engine = Arc::new(ScriptedEngine::new().with_fallback(ScriptedManifest::standard_ladder()));
    let loader = EngineLoader::shared(engine.clone());
    let controller = PlaybackController::new(loader, RenderSurface::new("main"), ControllerConfig::default());

    let url = Url::parse("https://cdn.example.com/espn/manifest.mpd")
        .map_err(|e| castline_core::Error::InvalidSource(e.to_string()))?;
    let source = MediaSource::adaptive("espn", "ESPN", url).with_category("Sports");

    let outcome = controller.load_media(&source).await;
    println!("Load outcome: {:?}", outcome);

    let status = controller.status();
    println!("State: {}", status.state);
    println!("Qualities:");
    for variant in &status.variants {
        println!("  {:<6} track {}", variant.label, variant.id);
    }

    let pinned = status
        .variants
        .iter()
        .find(|v| v.label == "720p")
        .map(|v| v.id.clone());
    if let Some(id) = pinned {
        controller.select_variant(id).await;
        println!("\nPinned: {}", controller.status().selected);
        if let Some(player) = engine.last_player() {
            println!("  ABR enabled: {}", player.abr_enabled());
        }
    }

    controller.select_variant(VariantId::Automatic).await;
    println!("Back to: {}", controller.status().selected);

    if let Some(teardown) = controller.dispose() {
        let _ = teardown.await;
    }
    println!("\nAfter dispose: {} (live players: {})", controller.status().state, engine.live_players());
    Ok(())
}
