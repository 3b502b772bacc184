//! Adopting existing cluster objects into a Helm release
//!
//! Helm 3 refuses to install over objects it does not own. Ownership is the
//! pair of `meta.helm.sh/release-*` annotations plus the `managed-by` label,
//! so adoption is a metadata merge patch on each live object.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    discovery::{ApiResource, Discovery, Scope},
};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{KubeError, Result};

pub const RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";
pub const RELEASE_NAMESPACE_ANNOTATION: &str = "meta.helm.sh/release-namespace";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// A `kind/name` reference to a live object
///
/// The kind may be qualified with its group (`deployment.apps/web`). Names
/// may contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: String,
    pub group: Option<String>,
    pub name: String,
}

impl FromStr for ResourceRef {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KubeError::InvalidResourceRef {
            reference: s.to_string(),
        };
        let (kind, name) = s.split_once('/').ok_or_else(invalid)?;
        if kind.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        let (kind, group) = match kind.split_once('.') {
            Some((kind, group)) if !group.is_empty() => (kind, Some(group.to_string())),
            _ => (kind, None),
        };
        Ok(Self {
            kind: kind.to_string(),
            group,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}.{}/{}", self.kind, group, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Merge patch marking an object as owned by a release
pub fn adoption_patch(release: &str, release_namespace: &str) -> Value {
    json!({
        "metadata": {
            "annotations": {
                RELEASE_NAME_ANNOTATION: release,
                RELEASE_NAMESPACE_ANNOTATION: release_namespace,
            },
            "labels": {
                MANAGED_BY_LABEL: "Helm",
            },
        }
    })
}

/// Applies a metadata patch to one live object
#[async_trait]
pub trait ResourceAnnotator: Send + Sync {
    async fn annotate(&self, namespace: &str, resource: &ResourceRef, patch: &Value) -> Result<()>;
}

/// Patch each resource in order, stopping at the first failure
///
/// Resources adopted before a failure stay adopted. Returns the adopted
/// references.
pub async fn adopt(
    annotator: &dyn ResourceAnnotator,
    release: &str,
    release_namespace: &str,
    resource_namespace: &str,
    resources: &[ResourceRef],
) -> Result<Vec<String>> {
    let patch = adoption_patch(release, release_namespace);
    let mut adopted = Vec::with_capacity(resources.len());

    for (index, resource) in resources.iter().enumerate() {
        tracing::debug!(resource = %resource, namespace = resource_namespace, release, "adopting");
        if let Err(e) = annotator.annotate(resource_namespace, resource, &patch).await {
            return Err(KubeError::AdoptionPartialFailure {
                adopted,
                failed: resource.to_string(),
                reason: e.to_string(),
                remaining: resources[index + 1..].iter().map(ToString::to_string).collect(),
            });
        }
        adopted.push(resource.to_string());
    }

    Ok(adopted)
}

/// Annotator backed by the cluster's discovery data
pub struct KubeAnnotator {
    client: Client,
    discovery: Discovery,
}

impl KubeAnnotator {
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        Ok(Self { client, discovery })
    }

    /// Find the API resource for a kind, plural or lowercase name
    fn resolve(&self, resource: &ResourceRef) -> Result<(ApiResource, Scope)> {
        let wanted = resource.kind.to_ascii_lowercase();
        for group in self.discovery.groups() {
            if resource
                .group
                .as_deref()
                .is_some_and(|g| g != group.name())
            {
                continue;
            }
            for (ar, caps) in group.recommended_resources() {
                if ar.kind.to_ascii_lowercase() == wanted || ar.plural == wanted {
                    return Ok((ar, caps.scope));
                }
            }
        }
        Err(KubeError::UnknownResourceKind {
            kind: resource.kind.clone(),
        })
    }
}

#[async_trait]
impl ResourceAnnotator for KubeAnnotator {
    async fn annotate(&self, namespace: &str, resource: &ResourceRef, patch: &Value) -> Result<()> {
        let (ar, scope) = self.resolve(resource)?;
        let api: Api<DynamicObject> = match scope {
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, &ar),
            Scope::Cluster => Api::all_with(self.client.clone(), &ar),
        };
        api.patch(&resource.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}
