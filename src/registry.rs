//! Registry protocol operations.
//!
//! [`RegistryClient`] assembles version listings and download metadata
//! from bucket contents and proxies raw artifacts.  Version data comes
//! from the [`BucketIndex`] when one is attached, otherwise from a direct
//! listing under `namespace/type/`; both paths run keys through the same
//! [`SnapshotBuilder`], so their answers are identical for the same bucket.

use std::sync::Arc;

use tracing::debug;

use crate::errors::RegistryError;
use crate::index::{BucketIndex, Coordinate, SnapshotBuilder};
use crate::keys::KeyMaterialProvider;
use crate::schema::{protocols, DownloadData, ProviderVersion, ProviderVersions, SigningKeys};
use crate::storage::backend::read_text;
use crate::storage::{ObjectStore, ObjectStream};

/// Object name of the checksum file stored under each version.
pub const SHASUM_OBJECT: &str = "shasum";

/// Object name of the checksum file's detached signature.
pub const SHASUM_SIGNATURE_OBJECT: &str = "shasum.sig";

/// Canonical artifact filename for a provider build.
pub fn artifact_filename(provider_type: &str, version: &str, os: &str, arch: &str) -> String {
    format!("terraform-provider-{provider_type}_{version}_{os}_{arch}.zip")
}

/// Pick the hash out of checksum-file content.
///
/// Each line is `<hash> <label>`, where the label may carry the `*`
/// binary-mode marker.  The line labelled `filename` wins when present;
/// otherwise the first token of the first non-blank line is used.
pub fn parse_shasum(content: &str, filename: &str) -> Result<String, RegistryError> {
    let mut first = None;
    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        let Some(hash) = tokens.next() else {
            continue;
        };
        let label = tokens.next().map(|l| l.strip_prefix('*').unwrap_or(l));
        if label == Some(filename) {
            return Ok(hash.to_string());
        }
        first.get_or_insert(hash);
    }

    first.map(str::to_string).ok_or_else(|| RegistryError::Parse {
        message: "checksum file is empty".to_string(),
    })
}

/// Answers registry protocol queries from a bucket.
pub struct RegistryClient {
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeyMaterialProvider>,
    index: Option<Arc<BucketIndex>>,
    /// Public host name used to build download URLs.
    hostname: String,
}

impl RegistryClient {
    /// Create a client that lists the bucket directly on every request.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeyMaterialProvider>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            store,
            keys,
            index: None,
            hostname: hostname.into(),
        }
    }

    /// Serve version listings from `index` instead of listing the bucket.
    pub fn with_index(mut self, index: Arc<BucketIndex>) -> Self {
        self.index = Some(index);
        self
    }

    fn proxy_url(&self, namespace: &str, provider_type: &str, version: &str, name: &str) -> String {
        format!(
            "https://{}/proxy/{namespace}/{provider_type}/{version}/{name}",
            self.hostname
        )
    }

    /// List the published versions of `namespace/provider_type`.
    pub async fn list_versions(
        &self,
        namespace: &str,
        provider_type: &str,
    ) -> Result<ProviderVersions, RegistryError> {
        let coordinate = Coordinate::new(namespace, provider_type);

        let versions = match self.index {
            Some(ref index) => index.lookup(namespace, provider_type),
            None => self.list_versions_direct(&coordinate).await?,
        }
        .filter(|versions| !versions.is_empty())
        .ok_or_else(|| RegistryError::not_found(format!("provider {coordinate}")))?;

        let warnings: Vec<String> = versions
            .iter()
            .filter(|v| v.platforms.is_empty())
            .map(|v| format!("version {} has no platform artifacts", v.version))
            .collect();

        Ok(ProviderVersions {
            id: coordinate.to_string(),
            versions,
            warnings: (!warnings.is_empty()).then_some(warnings),
        })
    }

    async fn list_versions_direct(
        &self,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<ProviderVersion>>, RegistryError> {
        let prefix = coordinate.prefix();
        debug!("Listing {} directly", prefix);

        let mut builder = SnapshotBuilder::new();
        let mut continuation = None;
        loop {
            let page = self.store.list_page(&prefix, continuation).await?;
            for key in &page.keys {
                builder.add_key(key);
            }
            match page.next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(builder.take(coordinate))
    }

    /// Assemble download metadata for one platform build.
    pub async fn get_download_data(
        &self,
        namespace: &str,
        provider_type: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<DownloadData, RegistryError> {
        let filename = artifact_filename(provider_type, version, os, arch);

        let shasum_key = format!("{namespace}/{provider_type}/{version}/{SHASUM_OBJECT}");
        let (content, key) = futures::try_join!(
            async {
                read_text(self.store.as_ref(), &shasum_key)
                    .await
                    .map_err(RegistryError::from)
            },
            self.keys.resolve(namespace, provider_type, version),
        )?;
        let shasum = parse_shasum(&content, &filename)?;

        Ok(DownloadData {
            protocols: protocols(),
            os: os.to_string(),
            arch: arch.to_string(),
            download_url: self.proxy_url(namespace, provider_type, version, &filename),
            shasums_url: self.proxy_url(namespace, provider_type, version, SHASUM_OBJECT),
            shasums_signature_url: self.proxy_url(
                namespace,
                provider_type,
                version,
                SHASUM_SIGNATURE_OBJECT,
            ),
            filename,
            shasum,
            signing_keys: SigningKeys {
                gpg_public_keys: vec![key],
            },
        })
    }

    /// Open the object at `namespace/type/version/filename` for streaming.
    pub async fn proxy(
        &self,
        namespace: &str,
        provider_type: &str,
        version: &str,
        filename: &str,
    ) -> Result<ObjectStream, RegistryError> {
        let key = format!("{namespace}/{provider_type}/{version}/{filename}");
        Ok(self.store.get(&key).await?)
    }
}
