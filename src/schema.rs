//! Wire types of the provider registry protocol.
//!
//! Field names follow the protocol's JSON exactly; these structs are what
//! the handlers serialise and what tests deserialise.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plugin protocol versions advertised for every provider version.
pub const PROTOCOLS: [&str; 2] = ["4.0", "5.0"];

/// Protocol version list as owned strings.
pub fn protocols() -> Vec<String> {
    PROTOCOLS.iter().map(|p| p.to_string()).collect()
}

/// Service discovery document served at `/.well-known/terraform.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Discovery {
    #[serde(rename = "providers.v1")]
    pub providers_v1: String,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            providers_v1: "/v1/providers/".to_string(),
        }
    }
}

/// An operating system / architecture pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

/// One published version of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderVersion {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<Platform>,
}

/// Response of the list-versions operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderVersions {
    /// Canonical `namespace/type` coordinate.
    pub id: String,
    pub versions: Vec<ProviderVersion>,
    pub warnings: Option<Vec<String>>,
}

/// A GPG public key used to verify a checksum-file signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
    pub trust_signature: String,
    pub source: String,
    pub source_url: String,
}

impl GpgPublicKey {
    pub fn new(key_id: impl Into<String>, ascii_armor: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            ascii_armor: ascii_armor.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

/// Response of the download-metadata operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DownloadData {
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_json() {
        let json = serde_json::to_string(&Discovery::default()).unwrap();
        assert_eq!(json, r#"{"providers.v1":"/v1/providers/"}"#);
    }

    #[test]
    fn test_versions_json_shape() {
        let versions = ProviderVersions {
            id: "black/lodge".to_string(),
            versions: vec![ProviderVersion {
                version: "1.0.0".to_string(),
                protocols: protocols(),
                platforms: vec![Platform::new("linux", "amd64")],
            }],
            warnings: None,
        };
        let json = serde_json::to_value(&versions).unwrap();
        assert_eq!(json["id"], "black/lodge");
        assert_eq!(json["versions"][0]["protocols"][1], "5.0");
        assert_eq!(json["versions"][0]["platforms"][0]["arch"], "amd64");
        assert!(json["warnings"].is_null());
    }

    #[test]
    fn test_gpg_key_defaults_to_empty_optional_fields() {
        let key = GpgPublicKey::new("315", "Great Northern Hotel Room Key");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["trust_signature"], "");
        assert_eq!(json["source"], "");
        assert_eq!(json["source_url"], "");
    }
}
