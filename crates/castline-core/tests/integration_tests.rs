//! Integration tests for Castline Core

use castline_core::{
    ClearKeyConfig, ControllerConfig, EngineEvent, EngineLoader, Error, LoadOutcome, MediaSource,
    PlaybackController, PlaybackState, PlayerStatus, RenderSurface, ScriptedEngine, ScriptedManifest,
    Surface, VariantId,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_ok, assert_err};
use url::Url;

const ESPN_URL: &str = "https://cdn.example.com/espn/manifest.mpd";
const HBO_URL: &str = "https://cdn.example.com/hbo/master.m3u8";
const KID: &str = "eb676abbcb345e96bbcf616630f1a3da";
const KEY: &str = "100b6c20940f779a4589152b57d2dacb";

// =============================================================================
// Helpers
// =============================================================================

fn espn() -> MediaSource {
    MediaSource::adaptive("espn", "ESPN", Url::parse(ESPN_URL).unwrap())
}

fn hbo() -> MediaSource {
    MediaSource::adaptive("hbo", "HBO", Url::parse(HBO_URL).unwrap())
}

fn trailer() -> MediaSource {
    MediaSource::embedded(
        "trailer",
        "Trailer",
        Url::parse("https://www.youtube.com/embed/live_stream?channel=UC123").unwrap(),
    )
}

fn controller_with(engine: &Arc<ScriptedEngine>, config: ControllerConfig) -> PlaybackController {
    let loader = EngineLoader::shared(engine.clone());
    PlaybackController::new(loader, RenderSurface::new("video"), config)
}

fn controller(engine: &Arc<ScriptedEngine>) -> PlaybackController {
    controller_with(engine, ControllerConfig::default())
}

fn ladder_engine() -> Arc<ScriptedEngine> {
    Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder())
            .with_manifest(HBO_URL, ScriptedManifest::standard_ladder()),
    )
}

async fn wait_for_state(controller: &PlaybackController, state: PlaybackState) -> PlayerStatus {
    let mut rx = controller.subscribe();
    let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("status channel closed");
    status.clone()
}

fn labels(status: &PlayerStatus) -> Vec<String> {
    status.variants.iter().map(|v| v.label.clone()).collect()
}

// =============================================================================
// Load Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_load_starts_playing() {
    let engine = ladder_engine();
    let controller = controller(&engine);

    let outcome = controller.load_media(&espn()).await;
    assert!(matches!(outcome, LoadOutcome::Playing));

    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.surface, Surface::Adaptive);
    assert!(status.controls_visible);
    assert!(status.error.is_none());
    assert!(status.session_id.is_some());
    assert_eq!(status.source.as_ref().map(|s| s.name.as_str()), Some("ESPN"));
    assert_eq!(labels(&status), vec!["Auto", "1080p", "720p", "480p"]);
    assert_eq!(status.selected, VariantId::Automatic);

    let player = engine.last_player().unwrap();
    assert!(player.is_playing());
    assert_eq!(player.loaded_manifest().unwrap().as_str(), ESPN_URL);
}

#[tokio::test]
async fn test_sessions_never_overlap() {
    let engine = ladder_engine();
    let controller = controller(&engine);

    for source in [espn(), hbo(), espn(), hbo()] {
        assert!(controller.load_media(&source).await.is_success());
        assert_eq!(engine.live_players(), 1);
    }

    assert_eq!(engine.players_created(), 4);
    assert_eq!(engine.players_destroyed(), 3);
    assert_eq!(engine.max_live_players(), 1);
    assert!(engine.player(0).unwrap().is_destroyed());
    assert!(!engine.last_player().unwrap().is_destroyed());
}

#[tokio::test]
async fn test_catalog_deduplicates_and_sorts() {
    let engine = Arc::new(ScriptedEngine::new().with_manifest(
        ESPN_URL,
        ScriptedManifest::with_tracks(vec![
            json!({ "id": 10, "height": 720, "bandwidth": 2_000_000 }),
            json!({ "id": 11, "height": 1080, "bandwidth": 4_500_000 }),
            json!({ "id": 12, "height": 1080, "bandwidth": 6_000_000 }),
            json!({ "id": 13, "bandwidth": 128_000 }),
            json!({ "id": 14, "height": 360, "bandwidth": 600_000 }),
            json!({ "label": "not a track" }),
        ]),
    ));
    let controller = controller(&engine);
    controller.load_media(&espn()).await;

    let status = controller.status();
    assert_eq!(labels(&status), vec!["Auto", "1080p", "720p", "360p"]);
    assert_eq!(status.variants[0].id, VariantId::Automatic);
    assert!(status.variants[0].height.is_none());
    assert_eq!(status.variants[1].id, VariantId::track("12"));
    assert_eq!(status.variants[1].bandwidth, Some(6_000_000));
}

#[tokio::test]
async fn test_auto_play_disabled() {
    let engine = ladder_engine();
    let config = ControllerConfig {
        auto_play: false,
        ..Default::default()
    };
    let controller = controller_with(&engine, config);

    assert!(matches!(controller.load_media(&espn()).await, LoadOutcome::Ready));
    assert_eq!(controller.status().state, PlaybackState::Ready);

    assert!(controller.play().await);
    assert_eq!(controller.status().state, PlaybackState::Playing);
}

// =============================================================================
// Quality Switching Tests
// =============================================================================

#[tokio::test]
async fn test_pin_variant_then_unknown_is_noop() {
    let engine = ladder_engine();
    let controller = controller(&engine);
    controller.load_media(&espn()).await;
    let player = engine.last_player().unwrap();

    controller.select_variant(VariantId::Automatic).await;
    assert!(player.abr_enabled());

    assert!(controller.select_variant(VariantId::track("2")).await);
    assert!(!player.abr_enabled());
    assert_eq!(player.selected_track(), Some(("2".to_string(), true)));
    assert_eq!(controller.status().selected, VariantId::track("2"));

    let before = controller.status();
    assert!(!controller.select_variant(VariantId::track("99")).await);
    assert_eq!(controller.status(), before);
    assert_eq!(player.selected_track(), Some(("2".to_string(), true)));
    assert!(!player.abr_enabled());
}

#[tokio::test]
async fn test_back_to_automatic_reenables_abr() {
    let engine = ladder_engine();
    let config = ControllerConfig {
        clear_buffer_on_switch: false,
        ..Default::default()
    };
    let controller = controller_with(&engine, config);
    controller.load_media(&espn()).await;
    let player = engine.last_player().unwrap();

    assert!(controller.select_variant(VariantId::track("3")).await);
    assert_eq!(player.selected_track(), Some(("3".to_string(), false)));

    assert!(controller.select_variant(VariantId::Automatic).await);
    assert!(player.abr_enabled());
    assert_eq!(controller.status().selected, VariantId::Automatic);
}

#[tokio::test]
async fn test_select_before_load_is_noop() {
    let engine = ladder_engine();
    let controller = controller(&engine);

    assert!(!controller.select_variant(VariantId::track("1")).await);
    assert_eq!(controller.status(), PlayerStatus::default());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_manifest_failure_names_source_and_tears_down_previous() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(HBO_URL, ScriptedManifest::standard_ladder())
            .with_manifest(ESPN_URL, ScriptedManifest::failing("404 Not Found")),
    );
    let controller = controller(&engine);

    controller.load_media(&hbo()).await;
    let previous = engine.last_player().unwrap();

    let outcome = controller.load_media(&espn()).await;
    match outcome {
        LoadOutcome::Failed(err) => {
            assert_eq!(err.error_code(), "MANIFEST_LOAD");
            assert!(err.to_string().contains("ESPN"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Errored);
    assert!(status.error.as_deref().unwrap().contains("ESPN"));
    assert!(status.variants.is_empty());
    assert!(previous.is_destroyed());
    assert_eq!(engine.live_players(), 0);
}

#[tokio::test]
async fn test_errored_recovers_on_fresh_load() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::failing("timeout"))
            .with_manifest(HBO_URL, ScriptedManifest::standard_ladder()),
    );
    let controller = controller(&engine);

    controller.load_media(&espn()).await;
    assert_eq!(controller.status().state, PlaybackState::Errored);
    assert!(!controller.play().await);

    assert!(controller.load_media(&hbo()).await.is_success());
    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_unsupported_platform() {
    let engine = Arc::new(ScriptedEngine::new().unsupported("MediaSource Extensions unavailable"));
    let controller = controller(&engine);

    let outcome = controller.load_media(&espn()).await;
    assert!(matches!(outcome, LoadOutcome::Failed(Error::UnsupportedPlatform { .. })));
    assert_eq!(controller.status().error.as_deref(), Some("Browser not supported"));
    assert_eq!(engine.players_created(), 0);
}

#[tokio::test]
async fn test_engine_load_failure_is_retryable() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_bootstrap_failures(1)
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder()),
    );
    let controller = controller(&engine);

    let outcome = controller.load_media(&espn()).await;
    match outcome {
        LoadOutcome::Failed(err) => assert!(err.is_recoverable()),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(controller.status().state, PlaybackState::Errored);

    assert!(matches!(controller.load_media(&espn()).await, LoadOutcome::Playing));
    assert_eq!(engine.bootstrap_count(), 2);
}

#[tokio::test]
async fn test_teardown_failure_does_not_block_next_session() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_failing_teardown()
            .with_fallback(ScriptedManifest::standard_ladder()),
    );
    let controller = controller(&engine);

    controller.load_media(&espn()).await;
    assert!(matches!(controller.load_media(&hbo()).await, LoadOutcome::Playing));
    assert_eq!(engine.players_destroyed(), 1);
    assert_eq!(engine.max_live_players(), 1);
}

#[tokio::test]
async fn test_engine_error_after_load() {
    let engine = ladder_engine();
    let controller = controller(&engine);
    controller.load_media(&espn()).await;

    engine
        .last_player()
        .unwrap()
        .emit(EngineEvent::Error("decoder failure".into()));

    let status = wait_for_state(&controller, PlaybackState::Errored).await;
    assert_eq!(status.error.as_deref(), Some("Failed to load ESPN"));
}

// =============================================================================
// Sequencing Tests
// =============================================================================

#[tokio::test]
async fn test_last_load_wins() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder().delayed(Duration::from_millis(200)))
            .with_manifest(
                HBO_URL,
                ScriptedManifest::with_tracks(vec![json!({ "id": "v1", "height": 576, "bandwidth": 1_500_000 })]),
            ),
    );
    let controller = controller(&engine);

    let (espn_source, hbo_source) = (espn(), hbo());
    let (first, second) = tokio::join!(controller.load_media(&espn_source), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.load_media(&hbo_source).await
    });

    assert!(matches!(first, LoadOutcome::Superseded));
    assert!(matches!(second, LoadOutcome::Playing));

    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Playing);
    assert_eq!(status.source.as_ref().map(|s| s.name.as_str()), Some("HBO"));
    assert_eq!(labels(&status), vec!["Auto", "576p"]);
    assert_eq!(engine.max_live_players(), 1);
    assert!(engine.player(0).unwrap().is_destroyed());
}

#[tokio::test]
async fn test_superseded_failure_has_no_effect() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(
                ESPN_URL,
                ScriptedManifest::failing("403 Forbidden").delayed(Duration::from_millis(100)),
            )
            .with_manifest(HBO_URL, ScriptedManifest::standard_ladder()),
    );
    let controller = controller(&engine);

    let (espn_source, hbo_source) = (espn(), hbo());
    let (first, second) = tokio::join!(controller.load_media(&espn_source), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.load_media(&hbo_source).await
    });

    assert!(matches!(first, LoadOutcome::Superseded));
    assert!(second.is_success());
    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_superseded_during_bootstrap_creates_no_player() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_bootstrap_delay(Duration::from_millis(100))
            .with_fallback(ScriptedManifest::standard_ladder()),
    );
    let controller = controller(&engine);

    let (espn_source, hbo_source) = (espn(), hbo());
    let (first, second) = tokio::join!(controller.load_media(&espn_source), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.load_media(&hbo_source).await
    });

    assert!(matches!(first, LoadOutcome::Superseded));
    assert!(second.is_success());
    assert_eq!(engine.bootstrap_count(), 1);
    assert_eq!(engine.players_created(), 1);
}

#[tokio::test]
async fn test_shared_loader_bootstraps_once() {
    let engine = ladder_engine();
    let loader = EngineLoader::shared(engine.clone());
    let left = PlaybackController::new(loader.clone(), RenderSurface::new("left"), ControllerConfig::default());
    let right = PlaybackController::new(loader, RenderSurface::new("right"), ControllerConfig::default());

    let (espn_source, hbo_source) = (espn(), hbo());
    let (a, b) = tokio::join!(left.load_media(&espn_source), right.load_media(&hbo_source));
    assert!(a.is_success() && b.is_success());
    assert_eq!(engine.bootstrap_count(), 1);
    assert_eq!(engine.polyfill_count(), 1);
    assert_eq!(engine.live_players(), 2);
}

// =============================================================================
// Dispose Tests
// =============================================================================

#[tokio::test]
async fn test_dispose_while_loading() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder().delayed(Duration::from_millis(200))),
    );
    let controller = controller(&engine);

    let source = espn();
    let (outcome, teardown) = tokio::join!(controller.load_media(&source), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let handle = controller.dispose();
        assert_eq!(controller.status().state, PlaybackState::Idle);
        handle
    });

    assert!(matches!(outcome, LoadOutcome::Superseded));
    assert_ok!(teardown.expect("runtime available").await);
    assert_eq!(controller.status(), PlayerStatus::default());
    assert_eq!(engine.live_players(), 0);
    assert!(engine.player(0).unwrap().is_destroyed());
}

#[tokio::test]
async fn test_drop_releases_session() {
    let engine = ladder_engine();
    {
        let controller = controller(&engine);
        controller.load_media(&espn()).await;
        assert_eq!(engine.live_players(), 1);
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while engine.live_players() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("teardown after drop");
}

// =============================================================================
// Controls Tests
// =============================================================================

#[tokio::test]
async fn test_engine_pause_is_mirrored() {
    let engine = ladder_engine();
    let controller = controller(&engine);
    controller.load_media(&espn()).await;

    engine.last_player().unwrap().emit(EngineEvent::Paused);
    wait_for_state(&controller, PlaybackState::Paused).await;

    engine.last_player().unwrap().emit(EngineEvent::Playing);
    wait_for_state(&controller, PlaybackState::Playing).await;
}

#[tokio::test]
async fn test_play_pause_commands() {
    let engine = ladder_engine();
    let controller = controller(&engine);
    controller.load_media(&espn()).await;
    let player = engine.last_player().unwrap();

    assert!(controller.pause().await);
    assert_eq!(controller.status().state, PlaybackState::Paused);
    assert!(!player.is_playing());

    assert!(controller.play().await);
    assert_eq!(controller.status().state, PlaybackState::Playing);
    assert!(player.is_playing());
}

#[tokio::test]
async fn test_mute_and_fullscreen_are_independent() {
    let engine = ladder_engine();
    let controller = controller(&engine);
    controller.load_media(&espn()).await;
    let player = engine.last_player().unwrap();

    assert!(controller.toggle_mute().await);
    assert!(controller.toggle_fullscreen().await);
    let status = controller.status();
    assert!(status.muted && status.fullscreen);
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(player.is_muted() && player.is_fullscreen());

    // Flags carry over to the next session
    controller.load_media(&hbo()).await;
    let next = engine.last_player().unwrap();
    assert!(next.is_muted() && next.is_fullscreen());
    assert!(controller.status().muted);

    assert!(controller.toggle_mute().await);
    assert!(!next.is_muted());
}

#[tokio::test]
async fn test_toggles_during_load_reach_player() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder().delayed(Duration::from_millis(200))),
    );
    let controller = controller(&engine);
    let source = espn();

    let (outcome, ()) = tokio::join!(controller.load_media(&source), async {
        while engine.players_created() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(controller.toggle_mute().await);
        assert!(controller.toggle_fullscreen().await);
    });

    assert!(matches!(outcome, LoadOutcome::Playing));
    let status = controller.status();
    let player = engine.last_player().unwrap();
    assert!(status.muted && status.fullscreen);
    assert!(player.is_muted());
    assert!(player.is_fullscreen());
}

#[tokio::test]
async fn test_stale_menu_pin_does_not_reach_next_session() {
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_manifest(ESPN_URL, ScriptedManifest::standard_ladder())
            .with_manifest(HBO_URL, ScriptedManifest::standard_ladder().delayed(Duration::from_millis(100))),
    );
    let controller = controller(&engine);
    controller.load_media(&espn()).await;
    let stale = controller.status().variants[1].id.clone();

    let source = hbo();
    let (outcome, switched) = tokio::join!(controller.load_media(&source), async {
        while engine.players_created() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.select_variant(stale.clone()).await
    });

    assert!(!switched);
    assert!(outcome.is_success());
    let next = engine.last_player().unwrap();
    assert!(next.abr_enabled());
    assert!(next.selected_track().is_none());
    assert_eq!(controller.status().selected, VariantId::Automatic);
}

// =============================================================================
// DRM Tests
// =============================================================================

#[tokio::test]
async fn test_clear_keys_passed_verbatim() {
    let engine = Arc::new(
        ScriptedEngine::new().with_manifest(ESPN_URL, ScriptedManifest::standard_ladder().encrypted_with(KID)),
    );
    let controller = controller(&engine);
    let keys = BTreeMap::from([(KID.to_string(), KEY.to_string())]);
    let source = espn().with_clear_keys(keys.clone()).unwrap();

    assert!(controller.load_media(&source).await.is_success());
    let configured = engine.last_player().unwrap().clear_keys().unwrap();
    assert_eq!(configured.keys(), &keys);
}

#[tokio::test]
async fn test_missing_keys_fail_load() {
    let engine = Arc::new(
        ScriptedEngine::new().with_manifest(ESPN_URL, ScriptedManifest::standard_ladder().encrypted_with(KID)),
    );
    let controller = controller(&engine);

    let outcome = controller.load_media(&espn()).await;
    assert!(matches!(outcome, LoadOutcome::Failed(_)));
    assert_eq!(controller.status().error.as_deref(), Some("Failed to load ESPN"));
    assert!(engine.last_player().unwrap().clear_keys().is_none());
}

#[test]
fn test_clear_key_validation() {
    assert_ok!(ClearKeyConfig::new(BTreeMap::from([(KID.to_string(), KEY.to_string())])));
    assert_err!(ClearKeyConfig::new(BTreeMap::from([(KID.to_string(), "short".to_string())])));
}

// =============================================================================
// Embedded Source Tests
// =============================================================================

#[tokio::test]
async fn test_embedded_source_bypasses_engine() {
    let engine = ladder_engine();
    let controller = controller(&engine);

    let outcome = controller.load_media(&trailer()).await;
    assert!(matches!(outcome, LoadOutcome::Embedded));
    assert_eq!(engine.players_created(), 0);
    assert_eq!(engine.bootstrap_count(), 0);

    let status = controller.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.variants.is_empty());
    assert!(!status.controls_visible);
    assert!(status.session_id.is_none());
    match &status.surface {
        Surface::Embedded(frame) => {
            assert!(frame.url.as_str().ends_with("channel=UC123&autoplay=1&mute=0"));
            assert!(frame.allow_fullscreen);
        }
        other => panic!("expected embed surface, got {:?}", other),
    }

    assert!(!controller.play().await);
    assert!(!controller.toggle_mute().await);
    assert!(!controller.select_variant(VariantId::track("1")).await);
    assert!(controller.toggle_fullscreen().await);
    assert!(controller.status().fullscreen);
}

#[tokio::test]
async fn test_embedded_after_adaptive_releases_session() {
    let engine = ladder_engine();
    let controller = controller(&engine);

    controller.load_media(&espn()).await;
    controller.load_media(&trailer()).await;
    assert_eq!(engine.live_players(), 0);
    assert!(controller.current_session().await.is_none());

    assert!(matches!(controller.load_media(&hbo()).await, LoadOutcome::Playing));
    assert_eq!(controller.status().surface, Surface::Adaptive);
    assert!(controller.status().controls_visible);
}

// =============================================================================
// Catalog Record Tests
// =============================================================================

#[test]
fn test_catalog_records_deserialize() {
    let records = json!([
        {
            "name": "ESPN",
            "type": "dash",
            "manifestUri": ESPN_URL,
            "clearKey": BTreeMap::from([(KID, KEY)]),
            "category": "Sports"
        },
        {
            "id": "trailer",
            "name": "Trailer",
            "type": "youtube",
            "embedUrl": "https://www.youtube.com/embed/abc"
        }
    ]);
    let sources: Vec<MediaSource> = serde_json::from_value(records).unwrap();

    assert_eq!(sources[0].id(), "espn");
    assert_eq!(sources[0].clear_keys().map(|k| k.len()), Some(1));
    assert_eq!(sources[1].kind().to_string(), "embedded");
}
