//! Cluster connection settings

use kube::Client;
use kube::config::{Config, KubeConfigOptions};

use crate::error::{KubeError, Result};
use crate::storage::{self, DriverKind, ReleaseStorage};

/// How to reach the cluster and where releases are stored
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Kubeconfig context, the current one when `None`
    pub kube_context: Option<String>,
    pub driver: DriverKind,
}

impl ClientOptions {
    /// Kubeconfig for the configured context (or in-cluster config without one)
    async fn config(&self) -> Result<Config> {
        match &self.kube_context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| KubeError::InvalidConfig(e.to_string()))
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::InvalidConfig(e.to_string())),
        }
    }

    /// Build a client from kubeconfig (or in-cluster config without a context)
    pub async fn connect(&self) -> Result<Client> {
        let config = self.config().await?;
        tracing::debug!(cluster = %config.cluster_url, context = ?self.kube_context, "connecting");
        Ok(Client::try_from(config)?)
    }

    /// `explicit`, else the namespace of the kubeconfig context
    ///
    /// Helm falls back the same way, so releases are stored and adopted
    /// where `helm upgrade` puts them.
    pub async fn resolve_namespace(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(namespace) = explicit {
            return Ok(namespace.to_string());
        }
        let config = self.config().await?;
        Ok(effective_namespace(None, &config))
    }

    /// Release storage for the configured driver
    pub async fn storage(&self) -> Result<Box<dyn ReleaseStorage>> {
        let client = self.connect().await?;
        Ok(storage::driver(self.driver, client))
    }
}

fn effective_namespace(explicit: Option<&str>, config: &Config) -> String {
    explicit.map_or_else(|| config.default_namespace.clone(), str::to_string)
}
