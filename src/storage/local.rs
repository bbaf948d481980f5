//! Local filesystem object store.
//!
//! Treats a directory tree as a bucket: the path of each file relative to
//! the root is its key, and every sub-directory is reported as a
//! directory-marker key ending in `/`, mirroring what S3 consoles create.
//! Intended for development and air-gapped mirrors.

use bytes::Bytes;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::backend::{with_timeout, ByteStream, ListPage, ObjectStore, ObjectStream, StoreError};

/// Keys returned per listing page.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Read buffer size for streamed bodies.
const CHUNK_SIZE: usize = 64 * 1024;

/// Serves objects from a local directory.
pub struct LocalStore {
    root: PathBuf,
    timeout: Duration,
    page_size: usize,
}

impl LocalStore {
    /// Create a store rooted at `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> anyhow::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("local bucket root {} is not a directory", root.display());
        }
        Ok(Self {
            root,
            timeout,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Return at most `page_size` keys per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean || key.is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

/// Collects one page of keys from an in-order tree walk.
///
/// Siblings are visited sorted by their key (directories carry the trailing
/// `/`), so a depth-first walk yields keys in lexicographic order. Subtrees
/// that sort entirely before the continuation key or outside the prefix are
/// never read, and the walk stops once `limit` keys are collected.
struct PageWalk<'a> {
    prefix: &'a str,
    after: Option<&'a str>,
    limit: usize,
    keys: Vec<String>,
    dirs_read: usize,
}

impl PageWalk<'_> {
    fn full(&self) -> bool {
        self.keys.len() >= self.limit
    }

    fn visit(&mut self, dir: &Path, base: &str) -> std::io::Result<()> {
        self.dirs_read += 1;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if is_dir {
                format!("{base}{name}/")
            } else {
                format!("{base}{name}")
            };
            entries.push((key, is_dir, entry.path()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, is_dir, path) in entries {
            if self.full() {
                return Ok(());
            }

            let in_prefix = key.starts_with(self.prefix);
            let leads_to_prefix = is_dir && self.prefix.starts_with(key.as_str());
            if !in_prefix && !leads_to_prefix {
                continue;
            }

            if in_prefix && self.after.map_or(true, |after| key.as_str() > after) {
                self.keys.push(key.clone());
            }

            if is_dir {
                // Everything under `key` sorts before the continuation key.
                let passed = self
                    .after
                    .is_some_and(|after| after > key.as_str() && !after.starts_with(key.as_str()));
                if !passed {
                    self.visit(&path, &key)?;
                }
            }
        }
        Ok(())
    }
}

/// Guess a content type from the file extension.
fn content_type_for(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("asc") | Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn file_stream(file: tokio::fs::File) -> ByteStream {
    Box::pin(futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), file)))
    }))
}

impl ObjectStore for LocalStore {
    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(with_timeout(self.timeout, "local list", async move {
            let root = self.root.clone();
            let page_size = self.page_size;
            let mut keys = tokio::task::spawn_blocking(move || {
                let mut walk = PageWalk {
                    prefix: &prefix,
                    after: continuation.as_deref(),
                    limit: page_size + 1,
                    keys: Vec::new(),
                    dirs_read: 0,
                };
                walk.visit(&root, "")?;
                debug!(
                    "local list: {} keys after reading {} directories",
                    walk.keys.len(),
                    walk.dirs_read
                );
                Ok::<_, std::io::Error>(walk.keys)
            })
            .await
            .map_err(|e| StoreError::Backend(e.into()))?
            .map_err(|e| StoreError::Backend(e.into()))?;

            let next = if keys.len() > page_size {
                keys.truncate(page_size);
                keys.last().cloned()
            } else {
                None
            };

            Ok(ListPage { keys, next })
        }))
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectStream, StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(with_timeout(self.timeout, "local get", async move {
            let path = self
                .resolve(&key)
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StoreError::NotFound { key });
                }
                Err(e) => return Err(StoreError::Backend(e.into())),
            };
            let metadata = file
                .metadata()
                .await
                .map_err(|e| StoreError::Backend(e.into()))?;
            if metadata.is_dir() {
                return Err(StoreError::NotFound { key });
            }

            Ok(ObjectStream {
                body: file_stream(file),
                content_length: Some(metadata.len()),
                content_type: content_type_for(&key).to_string(),
            })
        }))
    }
}
