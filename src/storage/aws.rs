//! AWS S3 object store.
//!
//! Reads the registry bucket through the AWS SDK.  Works against any
//! S3-compatible endpoint (MinIO, LocalStack, Ceph RGW) when an
//! `endpoint_url` and path-style addressing are configured.
//!
//! Key mapping: registry key `k` lives at `{prefix}{k}` in the bucket.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::Client;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{with_timeout, ByteStream, ListPage, ObjectStore, ObjectStream, StoreError};

/// Object store backed by a single S3 bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Key prefix for all registry objects in the bucket.
    prefix: String,
    /// Upper bound on each SDK call.
    timeout: Duration,
}

impl S3Store {
    /// Create a new S3 store.
    ///
    /// Loads AWS configuration from the default chain and initializes the
    /// S3 client for the specified region.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        bucket: String,
        region: String,
        prefix: String,
        endpoint_url: Option<String>,
        use_path_style: bool,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));

        if let Some(ref endpoint) = endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if let (Some(ref ak), Some(ref sk)) = (&access_key_id, &secret_access_key) {
            let creds = aws_sdk_s3::config::Credentials::new(
                ak,
                sk,
                None, // session_token
                None, // expiry
                "bucket-registry-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!("S3 object store initialized: bucket={} prefix='{}'", bucket, prefix);

        Ok(Self {
            client,
            bucket,
            prefix,
            timeout,
        })
    }

    /// Map a registry key to an upstream S3 key.
    fn s3_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Map an upstream S3 key back to a registry key.
    fn registry_key<'a>(&self, s3_key: &'a str) -> Option<&'a str> {
        s3_key.strip_prefix(self.prefix.as_str())
    }

    /// Map an AWS SDK error to a backend error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> StoreError {
        StoreError::Backend(anyhow::anyhow!("AWS S3 {context}: {err}"))
    }
}

/// Adapt an SDK body into a [`ByteStream`] without buffering it.
fn body_stream(body: aws_sdk_s3::primitives::ByteStream) -> ByteStream {
    Box::pin(futures::stream::try_unfold(body, |mut body| async move {
        match body.next().await {
            Some(Ok(chunk)) => Ok(Some((chunk, body))),
            Some(Err(e)) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
            None => Ok(None),
        }
    }))
}

impl ObjectStore for S3Store {
    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let s3_prefix = self.s3_key(prefix);
        Box::pin(async move {
            debug!(
                "AWS list_objects_v2: bucket={} prefix={} continuation={:?}",
                self.bucket, s3_prefix, continuation
            );

            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&s3_prefix);
            if let Some(ref token) = continuation {
                req = req.continuation_token(token);
            }

            let resp = with_timeout(self.timeout, "AWS S3 list_objects_v2", async {
                req.send()
                    .await
                    .map_err(|e| Self::map_sdk_error("list_objects_v2", e))
            })
            .await?;

            let keys = resp
                .contents()
                .iter()
                .filter_map(|obj| obj.key())
                .filter_map(|k| self.registry_key(k))
                .map(str::to_string)
                .collect();

            let next = if resp.is_truncated().unwrap_or(false) {
                resp.next_continuation_token().map(str::to_string)
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
            let s3_key = self.s3_key(&key);

            debug!("AWS get_object: bucket={} key={}", self.bucket, s3_key);

            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send();

            let resp = with_timeout(self.timeout, "AWS S3 get_object", async {
                request.await.map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        StoreError::NotFound { key: key.clone() }
                    } else {
                        Self::map_sdk_error("get_object", service_err)
                    }
                })
            })
            .await?;

            let content_length = resp
                .content_length()
                .and_then(|len| u64::try_from(len).ok());
            let content_type = resp
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            Ok(ObjectStream {
                body: body_stream(resp.body),
                content_length,
                content_type,
            })
        })
    }
}

// -- Tests -------------------------------------------------------------------
