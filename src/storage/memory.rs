//! In-memory object store.
//!
//! Objects live in a `BTreeMap` behind a `tokio::sync::RwLock`, so
//! listings come back in lexicographic key order exactly like S3.  The
//! page size is configurable, which lets tests exercise pagination with a
//! handful of keys.  Used as the bucket double throughout the test suite.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::pin::Pin;

use super::backend::{single_chunk, ListPage, ObjectStore, ObjectStream, StoreError};

/// Default number of keys returned per listing page (matches S3).
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// Object store holding everything in process memory.
pub struct MemoryStore {
    objects: tokio::sync::RwLock<BTreeMap<String, MemoryObject>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store that returns at most `page_size` keys per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: tokio::sync::RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Store `data` at `key`, replacing any previous object.
    pub async fn insert(&self, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.objects.write().await.insert(
            key.to_string(),
            MemoryObject {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Store an empty directory-marker object at `key`.
    pub async fn insert_marker(&self, key: &str) {
        self.insert(key, Bytes::new(), "application/x-directory").await;
    }

    pub async fn remove(&self, key: &str) {
        self.objects.write().await.remove(key);
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            // The continuation token is the last key of the previous page.
            let lower = match continuation {
                Some(ref after) => Bound::Excluded(after.clone()),
                None => Bound::Included(prefix.clone()),
            };

            let mut keys: Vec<String> = objects
                .range((lower, Bound::Unbounded))
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(&prefix))
                .take(self.page_size + 1)
                .cloned()
                .collect();

            let next = if keys.len() > self.page_size {
                keys.truncate(self.page_size);
                keys.last().cloned()
            } else {
                None
            };

            Ok(ListPage { keys, next })
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectStream, StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let object = self
                .objects
                .read()
                .await
                .get(&key)
                .cloned()
                .ok_or(StoreError::NotFound { key })?;

            Ok(ObjectStream {
                content_length: Some(object.data.len() as u64),
                content_type: object.content_type,
                body: single_chunk(object.data),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(page_size: usize) -> MemoryStore {
        let store = MemoryStore::with_page_size(page_size);
        for key in [
            "black/lodge/1.0.0/a_linux_amd64.zip",
            "black/lodge/1.0.1/a_linux_amd64.zip",
            "black/lodge/1.0.1/shasum",
            "red/room/2.0.0/b_darwin_arm64.zip",
        ] {
            store.insert(key, "x", "application/zip").await;
        }
        store
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = seeded(1000).await;
        let keys = store.list("black/lodge/").await.unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k.starts_with("black/lodge/")));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let store = seeded(2).await;

        let first = store.list_page("", None).await.unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(first.next.is_some());

        let second = store.list_page("", first.next).await.unwrap();
        assert_eq!(second.keys.len(), 2);
        assert!(second.next.is_none());

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_list_exact_page_boundary_has_no_next() {
        let store = seeded(4).await;
        let page = store.list_page("", None).await.unwrap();
        assert_eq!(page.keys.len(), 4);
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn test_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .insert("black/lodge/1.0.1/file", "315 coffee provider", "text/plain")
            .await;

        let object = store.get("black/lodge/1.0.1/file").await.unwrap();
        assert_eq!(object.content_length, Some(19));
        assert_eq!(object.content_type, "text/plain");
        let body = object.into_bytes().await.unwrap();
        assert_eq!(&body[..], b"315 coffee provider");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("no/such/key").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = seeded(1000).await;
        store.remove("black/lodge/1.0.1/shasum").await;
        assert_eq!(store.list("black/").await.unwrap().len(), 2);
    }
}
