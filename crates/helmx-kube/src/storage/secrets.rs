//! Kubernetes Secrets storage driver
//!
//! Helm 3's default. Secret data is base64 on the wire, so the payload is
//! base64 twice when viewed through `kubectl get -o yaml`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, ListParams};
use std::collections::BTreeMap;

use super::{
    RELEASE_DATA_KEY, RELEASE_SECRET_TYPE, ReleaseStorage, decode_release, encode_release,
    not_found, order_records, release_selector, storage_labels,
};
use crate::error::{KubeError, Result};
use crate::release::ReleaseRecord;

/// Reads releases from Secrets
pub struct SecretsDriver {
    client: Client,
}

impl SecretsDriver {
    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_matching(&self, namespace: &str, selector: &str) -> Result<Vec<ReleaseRecord>> {
        let lp = ListParams::default().labels(selector);
        let secrets = self.secrets_api(namespace).list(&lp).await?;

        let mut releases = Vec::with_capacity(secrets.items.len());
        for secret in &secrets.items {
            match parse_secret(secret) {
                Ok(release) => releases.push(release),
                Err(e) => tracing::warn!(
                    secret = secret.metadata.name.as_deref().unwrap_or("unnamed"),
                    error = %e,
                    "skipping unreadable release secret"
                ),
            }
        }
        Ok(releases)
    }
}

/// Build the Secret Helm would write for a release
pub fn build_secret(release: &ReleaseRecord) -> Result<Secret> {
    let encoded = encode_release(release)?;

    let mut data = BTreeMap::new();
    data.insert(
        RELEASE_DATA_KEY.to_string(),
        k8s_openapi::ByteString(encoded.into_bytes()),
    );

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(release.storage_key()),
            namespace: Some(release.namespace.clone()),
            labels: Some(storage_labels(release)),
            ..Default::default()
        },
        type_: Some(RELEASE_SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    })
}

/// Decode the release held by a Secret
fn parse_secret(secret: &Secret) -> Result<ReleaseRecord> {
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(RELEASE_DATA_KEY))
        .ok_or_else(|| KubeError::Storage("Secret missing 'release' data".to_string()))?;

    let encoded = std::str::from_utf8(&data.0)
        .map_err(|e| KubeError::Storage(format!("Invalid UTF-8 in secret: {}", e)))?;

    decode_release(encoded)
}

#[async_trait]
impl ReleaseStorage for SecretsDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<ReleaseRecord> {
        let key = crate::release::storage_key(name, revision);
        tracing::debug!(namespace, key = %key, "reading release secret");

        match self.secrets_api(namespace).get(&key).await {
            Ok(secret) => parse_secret(&secret),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(not_found(namespace, name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<ReleaseRecord>> {
        let releases = self.list_matching(namespace, "owner=helm").await?;
        Ok(order_records(releases, true))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<ReleaseRecord>> {
        let releases = self
            .list_matching(namespace, &release_selector(name))
            .await?;
        Ok(order_records(releases, false))
    }
}
