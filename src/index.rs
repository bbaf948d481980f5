//! In-memory bucket index.
//!
//! A [`BucketIndex`] turns a full bucket listing into an immutable
//! [`BucketSnapshot`] mapping each provider coordinate to its published
//! versions and platforms.  Snapshots are published through an
//! [`ArcSwap`], so lookups are lock-free and a rebuild never blocks or
//! disturbs readers: a reader holds whichever snapshot it loaded until it
//! drops the `Arc`.
//!
//! Keys are interpreted as `namespace/type/version/filename`.  Platforms
//! are derived from filenames ending in `_{os}_{arch}.{ext}`; anything
//! else under a version (checksums, signatures, key material, directory
//! markers) registers the version without adding a platform.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::errors::RegistryError;
use crate::metrics::{INDEX_PROVIDERS, INDEX_REFRESH_DURATION_SECONDS, INDEX_REFRESH_TOTAL};
use crate::schema::{protocols, Platform, ProviderVersion};
use crate::storage::ObjectStore;

/// A provider coordinate: `(namespace, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub namespace: String,
    pub provider_type: String,
}

impl Coordinate {
    pub fn new(namespace: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            provider_type: provider_type.into(),
        }
    }

    /// Key prefix under which this provider's versions live.
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.namespace, self.provider_type)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.provider_type)
    }
}

/// Extract the platform from a filename of the form `…_{os}_{arch}.{ext}`.
///
/// The extension starts at the first `.` after the final `_`, so both
/// `x_linux_amd64.zip` and `x_linux_amd64.tar.gz` yield `linux/amd64`.
pub fn parse_platform(filename: &str) -> Option<Platform> {
    if filename.contains('/') {
        return None;
    }
    let (head, tail) = filename.rsplit_once('_')?;
    let (arch, ext) = tail.split_once('.')?;
    let (stem, os) = head.rsplit_once('_')?;
    if stem.is_empty() || os.is_empty() || arch.is_empty() || ext.is_empty() {
        return None;
    }
    Some(Platform::new(os, arch))
}

/// Versions of one provider in discovery order.
#[derive(Debug, Default)]
struct VersionList {
    versions: Vec<ProviderVersion>,
    positions: HashMap<String, usize>,
}

impl VersionList {
    fn entry(&mut self, version: &str) -> &mut ProviderVersion {
        let idx = match self.positions.get(version) {
            Some(&idx) => idx,
            None => {
                self.versions.push(ProviderVersion {
                    version: version.to_string(),
                    protocols: protocols(),
                    platforms: Vec::new(),
                });
                let idx = self.versions.len() - 1;
                self.positions.insert(version.to_string(), idx);
                idx
            }
        };
        &mut self.versions[idx]
    }
}

/// Accumulates keys into provider version lists.
///
/// Shared by index rebuilds and by direct listings so both paths derive
/// versions and platforms with identical rules.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    providers: HashMap<Coordinate, VersionList>,
    keys_scanned: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one object key.
    pub fn add_key(&mut self, key: &str) {
        self.keys_scanned += 1;

        let mut parts = key.splitn(4, '/');
        let (Some(namespace), Some(provider_type), Some(version), Some(filename)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return;
        };
        if namespace.is_empty() || provider_type.is_empty() || version.is_empty() {
            return;
        }

        let entry = self
            .providers
            .entry(Coordinate::new(namespace, provider_type))
            .or_default()
            .entry(version);

        if let Some(platform) = parse_platform(filename) {
            if !entry.platforms.contains(&platform) {
                entry.platforms.push(platform);
            }
        }
    }

    /// Take the versions collected for a single coordinate.
    pub fn take(mut self, coordinate: &Coordinate) -> Option<Vec<ProviderVersion>> {
        self.providers.remove(coordinate).map(|list| list.versions)
    }

    /// Freeze the collected data into a snapshot.
    pub fn finish(self, generation: u64) -> BucketSnapshot {
        BucketSnapshot {
            generation,
            built_at: Utc::now(),
            keys_scanned: self.keys_scanned,
            providers: self
                .providers
                .into_iter()
                .map(|(coordinate, list)| (coordinate, list.versions))
                .collect(),
        }
    }
}

/// One immutable, fully built view of the bucket.
#[derive(Debug)]
pub struct BucketSnapshot {
    /// Sequence number of the refresh that built this snapshot; 0 for the
    /// empty snapshot an index starts with.
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub keys_scanned: u64,
    providers: HashMap<Coordinate, Vec<ProviderVersion>>,
}

impl BucketSnapshot {
    fn empty() -> Self {
        SnapshotBuilder::new().finish(0)
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&[ProviderVersion]> {
        self.providers.get(coordinate).map(Vec::as_slice)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn version_count(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RefreshSummary {
    pub generation: u64,
    pub providers: usize,
    pub versions: usize,
    pub keys_scanned: u64,
    pub built_at: DateTime<Utc>,
}

impl From<&BucketSnapshot> for RefreshSummary {
    fn from(snapshot: &BucketSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            providers: snapshot.provider_count(),
            versions: snapshot.version_count(),
            keys_scanned: snapshot.keys_scanned,
            built_at: snapshot.built_at,
        }
    }
}

/// Copy-on-write index over the whole bucket.
pub struct BucketIndex {
    store: Arc<dyn ObjectStore>,
    current: ArcSwap<BucketSnapshot>,
    next_generation: AtomicU64,
}

impl BucketIndex {
    /// Create an index holding an empty snapshot.  Call [`refresh`] to
    /// populate it.
    ///
    /// [`refresh`]: BucketIndex::refresh
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            current: ArcSwap::from_pointee(BucketSnapshot::empty()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<BucketSnapshot> {
        self.current.load_full()
    }

    /// Whether at least one refresh has been published.
    pub fn is_populated(&self) -> bool {
        self.current.load().generation > 0
    }

    /// Versions published for `namespace/provider_type`, if any.
    pub fn lookup(&self, namespace: &str, provider_type: &str) -> Option<Vec<ProviderVersion>> {
        self.current
            .load()
            .get(&Coordinate::new(namespace, provider_type))
            .map(<[ProviderVersion]>::to_vec)
    }

    /// Rebuild the index from a full bucket listing and publish it.
    ///
    /// On listing failure the previously published snapshot stays in
    /// place.  Concurrent refreshes each build a private snapshot; the
    /// last one to publish wins.
    pub async fn refresh(&self) -> Result<RefreshSummary, RegistryError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match self.build(generation).await {
            Ok(snapshot) => {
                let summary = RefreshSummary::from(&snapshot);
                self.current.store(Arc::new(snapshot));

                let elapsed = start.elapsed();
                counter!(INDEX_REFRESH_TOTAL, "outcome" => "success").increment(1);
                histogram!(INDEX_REFRESH_DURATION_SECONDS).record(elapsed.as_secs_f64());
                gauge!(INDEX_PROVIDERS).set(summary.providers as f64);
                info!(
                    "Index refreshed: generation={} providers={} versions={} keys={} in {:?}",
                    summary.generation,
                    summary.providers,
                    summary.versions,
                    summary.keys_scanned,
                    elapsed
                );
                Ok(summary)
            }
            Err(e) => {
                counter!(INDEX_REFRESH_TOTAL, "outcome" => "failure").increment(1);
                warn!(
                    "Index refresh (generation {}) failed, keeping generation {}: {:#}",
                    generation,
                    self.current.load().generation,
                    e
                );
                Err(RegistryError::Refresh(e))
            }
        }
    }

    async fn build(&self, generation: u64) -> anyhow::Result<BucketSnapshot> {
        let mut builder = SnapshotBuilder::new();
        let mut continuation = None;
        loop {
            let page = self.store.list_page("", continuation).await?;
            for key in &page.keys {
                builder.add_key(key);
            }
            match page.next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(builder.finish(generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{ListPage, ObjectStream, StoreError};
    use std::collections::{BTreeMap, BTreeSet};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicBool;

    async fn store_with(keys: &[&str], page_size: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::with_page_size(page_size);
        for key in keys {
            if key.ends_with('/') {
                store.insert_marker(key).await;
            } else {
                store.insert(key, "x", "application/octet-stream").await;
            }
        }
        Arc::new(store)
    }

    /// Order-insensitive view: coordinate -> version -> platforms.
    fn content(
        snapshot: &BucketSnapshot,
    ) -> BTreeMap<String, BTreeMap<String, BTreeSet<(String, String)>>> {
        snapshot
            .providers
            .iter()
            .map(|(coordinate, versions)| {
                let versions = versions
                    .iter()
                    .map(|v| {
                        let platforms = v
                            .platforms
                            .iter()
                            .map(|p| (p.os.clone(), p.arch.clone()))
                            .collect();
                        (v.version.clone(), platforms)
                    })
                    .collect();
                (coordinate.to_string(), versions)
            })
            .collect()
    }

    /// Store wrapper whose listing can be switched to fail.
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl ObjectStore for FlakyStore {
        fn list_page(
            &self,
            prefix: &str,
            continuation: Option<String>,
        ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
            if self.fail.load(Ordering::SeqCst) {
                return Box::pin(async {
                    Err::<ListPage, _>(StoreError::Backend(anyhow::anyhow!(
                        "listing unavailable"
                    )))
                });
            }
            self.inner.list_page(prefix, continuation)
        }

        fn get(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = Result<ObjectStream, StoreError>> + Send + '_>> {
            self.inner.get(key)
        }
    }

    #[test]
    fn test_parse_platform() {
        assert_eq!(
            parse_platform("terraform-provider-lodge_1.0.1_linux_amd64.zip"),
            Some(Platform::new("linux", "amd64"))
        );
        assert_eq!(
            parse_platform("provider_1.0.1_windows_386.zip"),
            Some(Platform::new("windows", "386"))
        );
        assert_eq!(
            parse_platform("provider_darwin_arm64.tar.gz"),
            Some(Platform::new("darwin", "arm64"))
        );
    }

    #[test]
    fn test_parse_platform_rejects_non_artifacts() {
        assert_eq!(parse_platform(""), None);
        assert_eq!(parse_platform("shasum"), None);
        assert_eq!(parse_platform("shasum.sig"), None);
        assert_eq!(parse_platform("key_id"), None);
        assert_eq!(parse_platform("keyfile"), None);
        assert_eq!(parse_platform("linux_amd64.zip"), None);
        assert_eq!(parse_platform("provider_linux_amd64"), None);
        assert_eq!(parse_platform("provider_linux_amd64."), None);
        assert_eq!(parse_platform("nested/provider_linux_amd64.zip"), None);
    }

    #[test]
    fn test_builder_groups_versions_and_platforms() {
        let mut builder = SnapshotBuilder::new();
        for key in [
            "black/",
            "black/lodge/",
            "black/lodge/1.0.0/",
            "black/lodge/1.0.0/provider_1.0.0_linux_amd64.zip",
            "black/lodge/1.0.1/provider_1.0.1_linux_amd64.zip",
            "black/lodge/1.0.1/provider_1.0.1_windows_amd64.zip",
            "black/lodge/1.0.1/shasum",
            "black/lodge/1.0.1/shasum.sig",
        ] {
            builder.add_key(key);
        }
        let snapshot = builder.finish(1);
        let versions = snapshot.get(&Coordinate::new("black", "lodge")).unwrap();

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, "1.0.0");
        assert_eq!(versions[0].platforms, vec![Platform::new("linux", "amd64")]);
        assert_eq!(versions[0].protocols, vec!["4.0", "5.0"]);
        assert_eq!(versions[1].version, "1.0.1");
        assert_eq!(
            versions[1].platforms,
            vec![
                Platform::new("linux", "amd64"),
                Platform::new("windows", "amd64")
            ]
        );
        assert_eq!(snapshot.keys_scanned, 8);
    }

    #[test]
    fn test_builder_deduplicates_platforms() {
        let mut builder = SnapshotBuilder::new();
        builder.add_key("black/lodge/1.0.0/provider_1.0.0_linux_amd64.zip");
        builder.add_key("black/lodge/1.0.0/provider_1.0.0_linux_amd64.tar.gz");
        let versions = builder.take(&Coordinate::new("black", "lodge")).unwrap();
        assert_eq!(versions[0].platforms.len(), 1);
    }

    #[test]
    fn test_builder_marker_only_version_has_no_platforms() {
        let mut builder = SnapshotBuilder::new();
        builder.add_key("black/lodge/");
        builder.add_key("black/lodge/1.0.0/");
        let versions = builder.take(&Coordinate::new("black", "lodge")).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "1.0.0");
        assert!(versions[0].platforms.is_empty());
    }

    #[test]
    fn test_builder_ignores_shallow_keys() {
        let mut builder = SnapshotBuilder::new();
        builder.add_key("README.md");
        builder.add_key("black/lodge");
        builder.add_key("black/lodge/1.0.0");
        builder.add_key("black//1.0.0/x_linux_amd64.zip");
        let snapshot = builder.finish(1);
        assert_eq!(snapshot.provider_count(), 0);
    }

    #[test]
    fn test_builder_version_count_matches_prefixes() {
        let mut builder = SnapshotBuilder::new();
        for v in 0..7 {
            builder.add_key(&format!("black/lodge/1.0.{v}/"));
            builder.add_key(&format!("black/lodge/1.0.{v}/p_1.0.{v}_linux_amd64.zip"));
        }
        let versions = builder.take(&Coordinate::new("black", "lodge")).unwrap();
        assert_eq!(versions.len(), 7);
        let order: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order[0], "1.0.0");
        assert_eq!(order[6], "1.0.6");
    }

    #[tokio::test]
    async fn test_new_index_is_empty() {
        let index = BucketIndex::new(store_with(&[], 10).await);
        assert!(!index.is_populated());
        assert_eq!(index.snapshot().generation, 0);
        assert_eq!(index.lookup("black", "lodge"), None);
    }

    #[tokio::test]
    async fn test_refresh_and_lookup() {
        let store = store_with(
            &[
                "black/lodge/1.0.0/provider_1.0.0_linux_amd64.zip",
                "black/lodge/1.0.1/provider_1.0.1_darwin_arm64.zip",
                "red/room/2.0.0/provider_2.0.0_linux_arm.zip",
            ],
            2,
        )
        .await;
        let index = BucketIndex::new(store);

        let summary = index.refresh().await.unwrap();
        assert_eq!(summary.generation, 1);
        assert_eq!(summary.providers, 2);
        assert_eq!(summary.versions, 3);
        assert_eq!(summary.keys_scanned, 3);
        assert!(index.is_populated());

        let lodge = index.lookup("black", "lodge").unwrap();
        assert_eq!(lodge.len(), 2);
        assert_eq!(lodge[1].platforms, vec![Platform::new("darwin", "arm64")]);
        assert_eq!(index.lookup("black", "room"), None);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_regardless_of_order() {
        let keys = [
            "black/lodge/1.0.1/provider_1.0.1_windows_amd64.zip",
            "black/lodge/1.0.0/provider_1.0.0_linux_amd64.zip",
            "black/lodge/1.0.1/provider_1.0.1_linux_amd64.zip",
            "red/room/2.0.0/",
        ];
        let index = BucketIndex::new(store_with(&keys, 1).await);
        index.refresh().await.unwrap();
        let first = content(&index.snapshot());
        index.refresh().await.unwrap();
        let second = content(&index.snapshot());
        assert_eq!(first, second);

        let mut reversed = SnapshotBuilder::new();
        for key in keys.iter().rev() {
            reversed.add_key(key);
        }
        assert_eq!(first, content(&reversed.finish(9)));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_changes() {
        let store = store_with(&["black/lodge/1.0.0/p_1.0.0_linux_amd64.zip"], 10).await;
        let index = BucketIndex::new(store.clone());
        index.refresh().await.unwrap();
        assert_eq!(index.lookup("black", "lodge").unwrap().len(), 1);

        store
            .insert("black/lodge/1.1.0/p_1.1.0_linux_amd64.zip", "x", "application/zip")
            .await;
        // The published snapshot is untouched until the next refresh.
        assert_eq!(index.lookup("black", "lodge").unwrap().len(), 1);

        let summary = index.refresh().await.unwrap();
        assert_eq!(summary.generation, 2);
        assert_eq!(index.lookup("black", "lodge").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        });
        store
            .inner
            .insert("black/lodge/1.0.0/p_1.0.0_linux_amd64.zip", "x", "application/zip")
            .await;
        let index = BucketIndex::new(store.clone());
        index.refresh().await.unwrap();
        let before = index.snapshot();

        store.fail.store(true, Ordering::SeqCst);
        let err = index.refresh().await.unwrap_err();
        assert!(matches!(err, RegistryError::Refresh(_)));

        let after = index.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(index.lookup("black", "lodge").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_refresh() {
        let store = store_with(&["black/lodge/1.0.0/p_1.0.0_linux_amd64.zip"], 10).await;
        let index = BucketIndex::new(store.clone());
        index.refresh().await.unwrap();

        let held = index.snapshot();
        store.remove("black/lodge/1.0.0/p_1.0.0_linux_amd64.zip").await;
        index.refresh().await.unwrap();

        assert_eq!(held.provider_count(), 1);
        assert_eq!(index.snapshot().provider_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_and_lookup_never_tears() {
        const PROVIDERS: usize = 20;
        const VERSIONS: usize = 5;

        let store = MemoryStore::with_page_size(7);
        for p in 0..PROVIDERS {
            for v in 0..VERSIONS {
                store
                    .insert(
                        &format!("ns{p}/type{p}/1.0.{v}/p_1.0.{v}_linux_amd64.zip"),
                        "x",
                        "application/zip",
                    )
                    .await;
            }
        }
        let index = Arc::new(BucketIndex::new(Arc::new(store)));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let index = index.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    index.refresh().await.unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let index = index.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = index.snapshot();
                    if snapshot.generation == 0 {
                        assert_eq!(snapshot.provider_count(), 0);
                    } else {
                        assert_eq!(snapshot.provider_count(), PROVIDERS);
                        assert_eq!(snapshot.version_count(), PROVIDERS * VERSIONS);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(index.snapshot().provider_count(), PROVIDERS);
    }
}
