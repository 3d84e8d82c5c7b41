//! CLI command implementations

use crate::catalog;
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, bail, Context};
use castline_core::{
    AdaptiveEngine, ControllerConfig, EngineLoader, HeadlessEngine, LoadOutcome, MediaSource,
    PlaybackController, RenderSurface, ScriptedEngine, ScriptedManifest, VariantId,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Read controller settings, falling back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<ControllerConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ControllerConfig::default(),
    };
    config.validate()?;
    debug!(?config, "Controller configuration");
    Ok(config)
}

fn build_engine(config: &ControllerConfig, dry_run: bool) -> Arc<dyn AdaptiveEngine> {
    if dry_run {
        info!("Dry run: manifests are not fetched");
        Arc::new(ScriptedEngine::new().with_fallback(ScriptedManifest::standard_ladder()))
    } else {
        Arc::new(HeadlessEngine::new(config))
    }
}

/// Parse `KID:KEY` pairs
fn parse_clear_keys(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (kid, key) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("expected KID:KEY, got '{}'", pair))?;
            Ok((kid.trim().to_string(), key.trim().to_string()))
        })
        .collect()
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.magenta} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

async fn load_with_progress(controller: &PlaybackController, source: &MediaSource) -> LoadOutcome {
    let bar = spinner(format!("Loading {}...", source.name()));
    let outcome = controller.load_media(source).await;
    bar.finish_and_clear();
    outcome
}

fn into_result(outcome: LoadOutcome, name: &str) -> anyhow::Result<()> {
    match outcome {
        LoadOutcome::Failed(err) => Err(anyhow!(err).context(format!("{} did not load", name))),
        LoadOutcome::Superseded => bail!("load of {} was superseded", name),
        _ => Ok(()),
    }
}

/// List catalog entries
pub fn list(catalog_path: &Path, search: Option<&str>, format: &str) -> anyhow::Result<()> {
    let sources = catalog::load(catalog_path)?;
    let found = catalog::search(&sources, search);
    let format = OutputFormat::from(format);

    if format == OutputFormat::Text {
        println!("Catalog: {} ({} of {} entries)", catalog_path.display(), found.len(), sources.len());
    }
    println!("{}", output::sources(&found, format));
    Ok(())
}

/// Load a manifest and print its quality menu
pub async fn probe(
    manifest_url: &str,
    clear_keys: &[String],
    config: ControllerConfig,
    dry_run: bool,
    format: &str,
) -> anyhow::Result<()> {
    let url = Url::parse(manifest_url)?;
    let name = url.host_str().unwrap_or("manifest").to_string();

    let mut source = MediaSource::adaptive("probe", name.clone(), url);
    if !clear_keys.is_empty() {
        source = source.with_clear_keys(parse_clear_keys(clear_keys)?)?;
    }

    let config = ControllerConfig {
        auto_play: false,
        ..config
    };
    let loader = EngineLoader::shared(build_engine(&config, dry_run));
    let controller = PlaybackController::new(loader, RenderSurface::new("probe"), config);

    let format = OutputFormat::from(format);
    if format == OutputFormat::Text {
        println!("Probing manifest: {}", manifest_url);
    }
    let outcome = load_with_progress(&controller, &source).await;
    println!("{}", output::status(&controller.status(), format));

    let result = into_result(outcome, &name);
    if let Some(teardown) = controller.dispose() {
        let _ = teardown.await;
    }
    result
}

/// Play a catalog entry, optionally pin a quality and watch status changes
pub async fn play(
    catalog_path: &Path,
    channel: &str,
    quality: &str,
    duration: u64,
    config: ControllerConfig,
    dry_run: bool,
    format: &str,
) -> anyhow::Result<()> {
    let sources = catalog::load(catalog_path)?;
    let source = catalog::find(&sources, channel)
        .ok_or_else(|| anyhow!("no catalog entry named '{}'", channel))?;
    let format = OutputFormat::from(format);

    let loader = EngineLoader::shared(build_engine(&config, dry_run));
    let controller = PlaybackController::new(loader, RenderSurface::new("terminal"), config);

    let outcome = load_with_progress(&controller, source).await;
    if let Err(e) = into_result(outcome, source.name()) {
        println!("{}", output::status(&controller.status(), format));
        return Err(e);
    }

    if !quality.eq_ignore_ascii_case("auto") {
        let status = controller.status();
        let variant = status
            .variants
            .iter()
            .find(|v| v.label.eq_ignore_ascii_case(quality.trim()))
            .map(|v| v.id.clone())
            .ok_or_else(|| anyhow!("no '{}' quality for {}", quality, source.name()))?;
        if controller.select_variant(variant).await {
            info!(quality, "Quality pinned");
        }
    } else {
        controller.select_variant(VariantId::Automatic).await;
    }

    println!("{}", output::status(&controller.status(), format));

    if duration > 0 {
        watch(&controller, Duration::from_secs(duration), format).await;
        if controller.pause().await {
            println!("{}", output::status(&controller.status(), format));
        }
    }

    if let Some(teardown) = controller.dispose() {
        let _ = teardown.await;
    }
    Ok(())
}

/// Print every state change until `limit` elapses or the session errors
async fn watch(controller: &PlaybackController, limit: Duration, format: OutputFormat) {
    let mut rx = controller.subscribe();
    let mut last = rx.borrow_and_update().state;

    let _ = tokio::time::timeout(limit, async {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            if status.state != last {
                last = status.state;
                println!("{}", output::status(&status, format));
            }
            if status.error.is_some() {
                break;
            }
        }
    })
    .await;
}
