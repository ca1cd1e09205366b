//! # Live Albums
//!
//! Saved searches that keep photo collections up to date.
//!
//! This crate re-exports the engine (`core-live`), its configuration and
//! event types (`core-runtime`) and the platform seams (`bridge-traits`).
//! With the default `desktop-shims` feature it also wires the desktop
//! implementations and the REST catalog connector into a ready service.
//!
//! ```ignore
//! use live_albums::{desktop, DefineRequest, LiveAlbumConfig};
//!
//! let config = LiveAlbumConfig::from_env()?;
//! let service = desktop::build_service(config).await?;
//! service.define(DefineRequest::smart("Dogs", "dogs playing")).await?;
//! service.start_scheduler().await?;
//! ```

pub use bridge_traits;
pub use core_live;
pub use core_runtime;

pub use core_live::{
    DefineRequest, DefinitionId, DefinitionSelector, DefinitionSource, LiveAlbumDependencies,
    LiveAlbumError, LiveAlbumService, OutcomeStatus, ReconcileOutcome, RefreshOptions,
    SearchDefinition, SweepReport, SyncStrategy,
};
pub use core_runtime::config::LiveAlbumConfig;
pub use core_runtime::events::{CoreEvent, EventBus};

#[cfg(feature = "desktop-shims")]
pub mod desktop {
    //! Desktop wiring: reqwest, tokio file system, tokio interval timer.

    use bridge_desktop::{IntervalTickSource, ReqwestHttpClient, TokioFileSystem};
    use bridge_traits::time::SystemClock;
    use core_live::{LiveAlbumDependencies, LiveAlbumService, Result};
    use core_runtime::config::LiveAlbumConfig;
    use core_runtime::events::EventBus;
    use core_runtime::logging::init_logging;
    use provider_catalog::RestCatalogConnector;
    use std::sync::Arc;
    use tracing::{debug, info};

    /// Event bus capacity for desktop hosts
    const EVENT_BUS_CAPACITY: usize = 256;

    /// Dependencies backed by the desktop implementations
    ///
    /// # Errors
    ///
    /// Returns `Config` if no catalog connection is configured.
    pub fn dependencies(config: &LiveAlbumConfig) -> Result<LiveAlbumDependencies> {
        let catalog_config = config.require_catalog()?;
        let http_client = Arc::new(ReqwestHttpClient::with_timeout(config.call_timeout));

        Ok(LiveAlbumDependencies {
            catalog: Arc::new(RestCatalogConnector::new(http_client, catalog_config)),
            file_system: Arc::new(TokioFileSystem::new()),
            clock: Arc::new(SystemClock),
            tick_source: Arc::new(IntervalTickSource::new()),
            event_bus: EventBus::new(EVENT_BUS_CAPACITY),
        })
    }

    /// Install logging and build a service against the configured catalog.
    ///
    /// A subscriber the host installed earlier is left in place.
    pub async fn build_service(config: LiveAlbumConfig) -> Result<LiveAlbumService> {
        if let Err(e) = init_logging(config.logging()) {
            debug!(error = %e, "Keeping existing tracing subscriber");
        }

        let deps = dependencies(&config)?;
        let service = LiveAlbumService::new(deps, config).await?;
        info!(store = %service.store().path().display(), "Live album service ready");
        Ok(service)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use core_live::LiveAlbumError;
        use tempfile::TempDir;

        #[tokio::test]
        async fn test_build_requires_catalog() {
            let err = build_service(LiveAlbumConfig::default()).await.err().unwrap();
            assert!(matches!(err, LiveAlbumError::Config(_)));
        }

        #[tokio::test]
        async fn test_build_with_catalog_and_store_path() {
            let dir = TempDir::new().unwrap();
            let store_path = dir.path().join("live").join("definitions.json");
            let config = LiveAlbumConfig::builder()
                .catalog("https://photos.example.com/api", "key-123")
                .store_path(&store_path)
                .scheduler_enabled(false)
                .build()
                .unwrap();

            // Building must not touch the network; only the store file is read.
            let service = build_service(config).await.unwrap();

            assert_eq!(service.store().path(), store_path.as_path());
            assert!(service.store().is_empty().await);
            assert!(!service.scheduler_status().await.running);
        }

        #[tokio::test]
        async fn test_build_keeps_host_subscriber() {
            let dir = TempDir::new().unwrap();
            let config = LiveAlbumConfig::builder()
                .catalog("https://photos.example.com/api", "key-123")
                .store_path(dir.path().join("definitions.json"))
                .log_filter("core_live=trace")
                .scheduler_enabled(false)
                .build()
                .unwrap();

            // The second call finds a global subscriber already installed.
            assert!(build_service(config.clone()).await.is_ok());
            assert!(build_service(config).await.is_ok());
        }
    }
}
