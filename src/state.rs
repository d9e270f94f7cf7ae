//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::capture::CapturePipeline;
use crate::config::Config;
use crate::photos::PhotoStore;
use crate::recognition::ExtractionGateway;
use crate::storage::BlobStorage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    blobs: Arc<dyn BlobStorage>,
    gateway: Arc<ExtractionGateway>,
    photo_store: PhotoStore,
    pipeline: CapturePipeline,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: Config,
        blobs: Arc<dyn BlobStorage>,
        db: SqlitePool,
        gateway: ExtractionGateway,
    ) -> Self {
        let gateway = Arc::new(gateway);
        let photo_store = PhotoStore::new(blobs.clone(), db.clone());
        let pipeline = CapturePipeline::new(gateway.clone(), photo_store.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                blobs,
                gateway,
                photo_store,
                pipeline,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the blob backend
    pub fn blobs(&self) -> &Arc<dyn BlobStorage> {
        &self.inner.blobs
    }

    /// Get the extraction gateway
    pub fn gateway(&self) -> &ExtractionGateway {
        &self.inner.gateway
    }

    /// Get the photo store
    pub fn photo_store(&self) -> &PhotoStore {
        &self.inner.photo_store
    }

    /// Get the capture pipeline
    pub fn pipeline(&self) -> &CapturePipeline {
        &self.inner.pipeline
    }
}
