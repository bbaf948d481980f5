//! Abstract object store trait.
//!
//! The registry only ever reads from its bucket, so the contract is
//! limited to paginated listing and streaming retrieval.  Implementations
//! must report a missing key as [`StoreError::NotFound`] so callers can
//! tell it apart from transport or permission failures.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// A boxed stream of object body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Errors surfaced by an [`ObjectStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists at the requested key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Any other failure talking to the backing store.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// One page of a bucket listing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListPage {
    /// Keys in this page, in store order.
    pub keys: Vec<String>,
    /// Token to pass back for the next page, `None` on the last page.
    pub next: Option<String>,
}

/// An object opened for reading.
///
/// The body is consumed lazily; dropping the value releases the underlying
/// connection or file handle.
pub struct ObjectStream {
    pub body: ByteStream,
    /// Declared body length, when the backend reports one.
    pub content_length: Option<u64>,
    pub content_type: String,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl ObjectStream {
    /// Drain the body into memory.
    ///
    /// Only meant for small control objects (checksum files, key material).
    pub async fn into_bytes(self) -> Result<Bytes, StoreError> {
        let chunks: Vec<Bytes> = self
            .body
            .try_collect()
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(Bytes::from(chunks.concat()))
    }
}

/// Read-only async object store contract.
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of keys starting with `prefix`.
    ///
    /// `continuation` is the `next` token of the previous page, or `None`
    /// to start from the beginning.
    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>>;

    /// Open the object at `key` for streaming.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectStream, StoreError>> + Send + '_>>;

    /// List every key starting with `prefix`, following pagination.
    fn list(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut keys = Vec::new();
            let mut continuation = None;
            loop {
                let page = self.list_page(&prefix, continuation).await?;
                keys.extend(page.keys);
                match page.next {
                    Some(token) => continuation = Some(token),
                    None => return Ok(keys),
                }
            }
        })
    }
}

/// Fetch a small object and decode it as UTF-8 text.
pub async fn read_text(store: &dyn ObjectStore, key: &str) -> Result<String, StoreError> {
    let bytes = store.get(key).await?.into_bytes().await?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("object {key} is not valid UTF-8: {e}")))
}

/// Bound a store call by `timeout`, reporting expiry as a backend error
/// that names the call.
pub async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Backend(anyhow::anyhow!("{what} timed out after {timeout:?}")))?
}

/// Build a [`ByteStream`] that yields a single in-memory chunk.
pub fn single_chunk(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}
