//! Read access to Helm 3 release storage
//!
//! Helm keeps one object per revision, named `sh.helm.release.v1.NAME.vREV`
//! and labelled `owner=helm,name=NAME`. The `release` payload is
//! `base64(gzip(json))`; older or hand-written objects may carry plain JSON.
//!
//! - **Secrets** (Helm's default driver)
//! - **ConfigMaps**
//! - **Mock** (in-memory, for tests)

mod configmap;
mod mock;
mod secrets;

pub use configmap::{ConfigMapDriver, build_configmap};
pub use mock::{MockStorage, OperationCounts};
pub use secrets::{SecretsDriver, build_secret};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::error::{KubeError, Result};
use crate::release::ReleaseRecord;

/// Key of the release payload inside the storage object
pub const RELEASE_DATA_KEY: &str = "release";

/// Secret type Helm uses for release objects
pub const RELEASE_SECRET_TYPE: &str = "helm.sh/release.v1";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read-only access to stored releases
#[async_trait]
pub trait ReleaseStorage: Send + Sync {
    /// A specific revision
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<ReleaseRecord>;

    /// The highest revision of a release
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<ReleaseRecord> {
        let history = self.history(namespace, name).await?;
        history.into_iter().next().ok_or_else(|| KubeError::ReleaseNotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// The latest revision of every release in a namespace, sorted by name
    async fn list(&self, namespace: &str) -> Result<Vec<ReleaseRecord>>;

    /// Every revision of a release, newest first
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<ReleaseRecord>>;

    /// Whether any revision exists
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.get_latest(namespace, name).await {
            Ok(_) => Ok(true),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Which object kind holds releases (`HELM_DRIVER`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    #[default]
    Secrets,
    ConfigMaps,
}

impl FromStr for DriverKind {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "secret" | "secrets" => Ok(DriverKind::Secrets),
            "configmap" | "configmaps" => Ok(DriverKind::ConfigMaps),
            other => Err(KubeError::InvalidConfig(format!(
                "unsupported storage driver '{}' (expected secret or configmap)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Secrets => write!(f, "secrets"),
            DriverKind::ConfigMaps => write!(f, "configmaps"),
        }
    }
}

/// Build the storage driver for `kind`
pub fn driver(kind: DriverKind, client: kube::Client) -> Box<dyn ReleaseStorage> {
    match kind {
        DriverKind::Secrets => Box::new(SecretsDriver::with_client(client)),
        DriverKind::ConfigMaps => Box::new(ConfigMapDriver::with_client(client)),
    }
}

/// Encode a release the way Helm stores it: JSON, gzip, base64
#[must_use = "encoded data should be used for storage"]
pub fn encode_release(release: &ReleaseRecord) -> Result<String> {
    let json = serde_json::to_vec(release)?;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder
        .write_all(&json)
        .map_err(|e| KubeError::Serialization(format!("gzip error: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| KubeError::Serialization(format!("gzip error: {}", e)))?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        &compressed,
    ))
}

/// Decode a stored payload, accepting gzipped or plain JSON
#[must_use = "decoded release should be used"]
pub fn decode_release(data: &str) -> Result<ReleaseRecord> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data.trim())
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;

    let json = if decoded.starts_with(&GZIP_MAGIC) {
        let mut decoder = flate2::read::GzDecoder::new(decoded.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| KubeError::Serialization(format!("gzip error: {}", e)))?;
        out
    } else {
        decoded
    };

    Ok(serde_json::from_slice(&json)?)
}

/// Labels Helm puts on every release storage object
#[must_use = "labels should be applied to resources"]
pub fn storage_labels(release: &ReleaseRecord) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("name".to_string(), release.name.clone());
    labels.insert("owner".to_string(), "helm".to_string());
    labels.insert("status".to_string(), release.info.status.to_string());
    labels.insert("version".to_string(), release.version.to_string());
    labels
}

/// Label selector matching every revision of `name`
pub fn release_selector(name: &str) -> String {
    format!("owner=helm,name={}", name)
}

/// Newest revision first; per-release latest when `latest_only`
fn order_records(mut records: Vec<ReleaseRecord>, latest_only: bool) -> Vec<ReleaseRecord> {
    records.sort_by(|a, b| a.name.cmp(&b.name).then(b.version.cmp(&a.version)));
    if latest_only {
        records.dedup_by(|later, earlier| later.name == earlier.name);
    }
    records
}

fn not_found(namespace: &str, name: &str) -> KubeError {
    KubeError::ReleaseNotFound {
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}
