//! Engine loader
//!
//! Bootstraps the adaptive engine at most once per loader, however many
//! controllers share it, and gates every player on the platform probe.

use crate::engine::{AdaptiveEngine, PlatformSupport};
use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Proof that the engine was bootstrapped and the platform is supported
#[derive(Clone)]
pub struct EngineHandle(Arc<dyn AdaptiveEngine>);

impl Deref for EngineHandle {
    type Target = dyn AdaptiveEngine;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EngineHandle").field(&self.0.name()).finish()
    }
}

/// Shared, once-only engine initialization
pub struct EngineLoader {
    engine: Arc<dyn AdaptiveEngine>,
    bootstrapped: OnceCell<()>,
}

impl EngineLoader {
    pub fn new(engine: Arc<dyn AdaptiveEngine>) -> Self {
        Self {
            engine,
            bootstrapped: OnceCell::new(),
        }
    }

    /// Convenience for the common `Arc<EngineLoader>` sharing pattern
    pub fn shared(engine: Arc<dyn AdaptiveEngine>) -> Arc<Self> {
        Arc::new(Self::new(engine))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.initialized()
    }

    /// Bootstrap (first caller only), install polyfills, then probe the
    /// platform.
    ///
    /// Concurrent callers wait on the same initialization. A failed
    /// bootstrap is not remembered, so the next call retries it.
    pub async fn ensure_ready(&self) -> Result<EngineHandle> {
        self.bootstrapped
            .get_or_try_init(|| async {
                info!(engine = self.engine.name(), "Bootstrapping playback engine");
                self.engine.bootstrap().await.map_err(|e| match e {
                    Error::EngineLoad(_) | Error::UnsupportedPlatform { .. } => e,
                    other => Error::EngineLoad(other.to_string()),
                })?;
                self.engine.install_polyfills();
                Ok::<(), Error>(())
            })
            .await
            .inspect_err(|e| warn!(engine = self.engine.name(), error = %e, "Engine bootstrap failed"))?;

        match self.engine.platform_support() {
            PlatformSupport::Supported => Ok(EngineHandle(Arc::clone(&self.engine))),
            PlatformSupport::Unsupported(reason) => {
                warn!(engine = self.engine.name(), %reason, "Platform not supported");
                Err(Error::UnsupportedPlatform { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptedEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_bootstrap_once() {
        let engine = Arc::new(ScriptedEngine::new().with_bootstrap_delay(Duration::from_millis(20)));
        let loader = EngineLoader::new(engine.clone());

        let (a, b, c) = tokio::join!(loader.ensure_ready(), loader.ensure_ready(), loader.ensure_ready());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(engine.bootstrap_count(), 1);
        assert_eq!(engine.polyfill_count(), 1);
        assert!(loader.is_bootstrapped());

        loader.ensure_ready().await.unwrap();
        assert_eq!(engine.bootstrap_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let engine = Arc::new(ScriptedEngine::new().unsupported("MediaSource missing"));
        let loader = EngineLoader::new(engine);

        let err = loader.ensure_ready().await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { ref reason } if reason == "MediaSource missing"));
        assert_eq!(err.overlay_message("ESPN"), "Browser not supported");
    }

    #[tokio::test]
    async fn test_failed_bootstrap_is_retried() {
        let engine = Arc::new(ScriptedEngine::new().with_bootstrap_failures(1));
        let loader = EngineLoader::new(engine.clone());

        let err = loader.ensure_ready().await.unwrap_err();
        assert!(matches!(err, Error::EngineLoad(_)));
        assert!(!loader.is_bootstrapped());

        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(engine.bootstrap_count(), 2);
        assert_eq!(engine.polyfill_count(), 1);
    }
}
