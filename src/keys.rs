//! Signing-key material.
//!
//! The registry serves, but never verifies, the GPG public key used to
//! sign each provider's checksum file.  [`KeyMaterialProvider`] abstracts
//! where that key comes from so the registry client does not care which
//! strategy is configured.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::errors::RegistryError;
use crate::schema::GpgPublicKey;
use crate::storage::backend::read_text;
use crate::storage::ObjectStore;

/// Object name holding the key id, stored next to each version.
pub const KEY_ID_OBJECT: &str = "key_id";

/// Object name holding the ASCII-armored public key.
pub const KEYFILE_OBJECT: &str = "keyfile";

/// Resolves the public key for a provider version.
pub trait KeyMaterialProvider: Send + Sync + 'static {
    fn resolve(
        &self,
        namespace: &str,
        provider_type: &str,
        version: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GpgPublicKey, RegistryError>> + Send + '_>>;
}

/// One key for every provider, loaded from a local file at startup.
#[derive(Debug, Clone)]
pub struct GlobalKeys {
    key: GpgPublicKey,
}

impl GlobalKeys {
    pub fn new(key_id: impl Into<String>, ascii_armor: impl Into<String>) -> Self {
        Self {
            key: GpgPublicKey::new(key_id, ascii_armor),
        }
    }

    /// Read the armored key from `keyfile`.
    pub fn from_file(key_id: impl Into<String>, keyfile: impl AsRef<Path>) -> anyhow::Result<Self> {
        let keyfile = keyfile.as_ref();
        let armor = std::fs::read_to_string(keyfile)
            .with_context(|| format!("reading key file {}", keyfile.display()))?;
        Ok(Self::new(key_id, armor))
    }
}

impl KeyMaterialProvider for GlobalKeys {
    fn resolve(
        &self,
        _namespace: &str,
        _provider_type: &str,
        _version: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GpgPublicKey, RegistryError>> + Send + '_>> {
        Box::pin(async move { Ok(self.key.clone()) })
    }
}

/// Key id and key file stored as objects alongside each version.
pub struct PerArtifactKeys {
    store: Arc<dyn ObjectStore>,
}

impl PerArtifactKeys {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl KeyMaterialProvider for PerArtifactKeys {
    fn resolve(
        &self,
        namespace: &str,
        provider_type: &str,
        version: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GpgPublicKey, RegistryError>> + Send + '_>> {
        let base = format!("{namespace}/{provider_type}/{version}");
        Box::pin(async move {
            let key_id_key = format!("{base}/{KEY_ID_OBJECT}");
            let keyfile_key = format!("{base}/{KEYFILE_OBJECT}");
            debug!("Resolving per-artifact key material under {}", base);

            let (key_id, armor) = futures::try_join!(
                read_text(self.store.as_ref(), &key_id_key),
                read_text(self.store.as_ref(), &keyfile_key),
            )?;

            Ok(GpgPublicKey::new(key_id.trim(), armor))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    const ARMOR: &str = "Great Northern Hotel Room Key";

    #[tokio::test]
    async fn test_global_keys_ignore_coordinates() {
        let keys = GlobalKeys::new("315", ARMOR);
        let a = keys.resolve("black", "lodge", "1.0.0").await.unwrap();
        let b = keys.resolve("red", "room", "9.9.9").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key_id, "315");
        assert_eq!(a.ascii_armor, ARMOR);
        assert_eq!(a.trust_signature, "");
    }

    #[tokio::test]
    async fn test_global_keys_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("keyfile");
        std::fs::write(&keyfile, ARMOR).unwrap();

        let keys = GlobalKeys::from_file("315", &keyfile).unwrap();
        let key = keys.resolve("black", "lodge", "1.0.1").await.unwrap();
        assert_eq!(key.ascii_armor, ARMOR);
    }

    #[test]
    fn test_global_keys_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = GlobalKeys::from_file("315", dir.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("reading key file"));
    }

    #[tokio::test]
    async fn test_per_artifact_keys() {
        let store = MemoryStore::new();
        store.insert("black/lodge/1.0.1/key_id", "315\n", "text/plain").await;
        store.insert("black/lodge/1.0.1/keyfile", ARMOR, "text/plain").await;
        let keys = PerArtifactKeys::new(Arc::new(store));

        let key = keys.resolve("black", "lodge", "1.0.1").await.unwrap();
        assert_eq!(key, GpgPublicKey::new("315", ARMOR));
    }

    #[tokio::test]
    async fn test_per_artifact_missing_keyfile() {
        let store = MemoryStore::new();
        store.insert("black/lodge/1.0.1/key_id", "315", "text/plain").await;
        let keys = PerArtifactKeys::new(Arc::new(store));

        let err = keys.resolve("black", "lodge", "1.0.1").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_per_artifact_missing_key_id() {
        let store = MemoryStore::new();
        store.insert("black/lodge/1.0.1/keyfile", ARMOR, "text/plain").await;
        let keys = PerArtifactKeys::new(Arc::new(store));

        let err = keys.resolve("black", "lodge", "1.0.1").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
