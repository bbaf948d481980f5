//! bucket-registry -- provider registry front end for an object-storage bucket.
//!
//! This crate serves the read path of the provider registry protocol
//! (service discovery, version listing, download metadata and artifact
//! proxying) from providers published in a bucket under
//! `namespace/type/version/filename` keys.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod index;
pub mod keys;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::index::BucketIndex;
use crate::keys::KeyMaterialProvider;
use crate::registry::RegistryClient;
use crate::storage::ObjectStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Bucket index; rebuilt on `/refresh` and by the background task.
    pub index: Arc<BucketIndex>,
    /// Protocol operations.
    pub registry: Arc<RegistryClient>,
}

impl AppState {
    /// Wire the index and registry client over `store`.
    ///
    /// The registry answers version listings from the index only when
    /// `registry.use_index` is set; the index is created either way so an
    /// explicit refresh is always possible.
    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeyMaterialProvider>,
    ) -> Self {
        let index = Arc::new(BucketIndex::new(store.clone()));
        let mut registry = RegistryClient::new(store, keys, config.registry.hostname.clone());
        if config.registry.use_index {
            registry = registry.with_index(index.clone());
        }

        Self {
            config,
            index,
            registry: Arc::new(registry),
        }
    }
}
