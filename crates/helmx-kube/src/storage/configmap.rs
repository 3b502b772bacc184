//! Kubernetes ConfigMap storage driver (`HELM_DRIVER=configmap`)

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, ListParams};
use std::collections::BTreeMap;

use super::{
    RELEASE_DATA_KEY, ReleaseStorage, decode_release, encode_release, not_found, order_records,
    release_selector, storage_labels,
};
use crate::error::{KubeError, Result};
use crate::release::ReleaseRecord;

/// Reads releases from ConfigMaps
pub struct ConfigMapDriver {
    client: Client,
}

impl ConfigMapDriver {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn configmaps_api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_matching(&self, namespace: &str, selector: &str) -> Result<Vec<ReleaseRecord>> {
        let lp = ListParams::default().labels(selector);
        let configmaps = self.configmaps_api(namespace).list(&lp).await?;

        let mut releases = Vec::with_capacity(configmaps.items.len());
        for cm in &configmaps.items {
            match parse_configmap(cm) {
                Ok(release) => releases.push(release),
                Err(e) => tracing::warn!(
                    configmap = cm.metadata.name.as_deref().unwrap_or("unnamed"),
                    error = %e,
                    "skipping unreadable release configmap"
                ),
            }
        }
        Ok(releases)
    }
}

/// Build the ConfigMap Helm would write for a release
pub fn build_configmap(release: &ReleaseRecord) -> Result<ConfigMap> {
    let mut data = BTreeMap::new();
    data.insert(RELEASE_DATA_KEY.to_string(), encode_release(release)?);

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(release.storage_key()),
            namespace: Some(release.namespace.clone()),
            labels: Some(storage_labels(release)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

fn parse_configmap(cm: &ConfigMap) -> Result<ReleaseRecord> {
    let encoded = cm
        .data
        .as_ref()
        .and_then(|d| d.get(RELEASE_DATA_KEY))
        .ok_or_else(|| KubeError::Storage("ConfigMap missing 'release' data".to_string()))?;
    decode_release(encoded)
}

#[async_trait]
impl ReleaseStorage for ConfigMapDriver {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<ReleaseRecord> {
        let key = crate::release::storage_key(name, revision);
        tracing::debug!(namespace, key = %key, "reading release configmap");

        match self.configmaps_api(namespace).get(&key).await {
            Ok(cm) => parse_configmap(&cm),
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
