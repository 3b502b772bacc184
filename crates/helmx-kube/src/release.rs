//! Helm 3 release records as persisted by `helm upgrade --install`
//!
//! Only the fields helm-x reads are typed. Everything else a release carries
//! (chart templates, files, lock, labels) is kept in `extra` so a decoded
//! record can be dumped without losing data.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use helmx_core::ChartMetadata;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Storage object name prefix used by Helm 3
pub const STORAGE_KEY_PREFIX: &str = "sh.helm.release.v1";

/// A decoded Helm 3 release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Revision number, starting at 1
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub info: ReleaseInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ReleaseChart>,

    /// User-supplied values
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,

    #[serde(default)]
    pub manifest: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Release status as Helm writes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
            ReleaseStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Release status and timestamps
///
/// Helm writes zero timestamps as empty strings; those decode to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub status: ReleaseStatus,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub first_deployed: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReleaseInfo {
    pub fn first_deployed_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(self.first_deployed.as_deref())
    }

    pub fn last_deployed_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(self.last_deployed.as_deref())
    }
}

/// The chart a release was installed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChartSummary>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chart.yaml fields recorded in a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChartSummary {
    pub fn from_metadata(metadata: &ChartMetadata) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::to_value(metadata)?)?)
    }
}

impl ReleaseRecord {
    /// The record `helm install` would write for a first revision
    ///
    /// Used to emit a release storage object next to rendered manifests so
    /// that applying both yields a release helm recognizes.
    pub fn first_revision(
        name: &str,
        namespace: &str,
        chart: &ChartMetadata,
        config: Value,
        manifest: String,
    ) -> Result<Self> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        Ok(Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            version: 1,
            info: ReleaseInfo {
                status: ReleaseStatus::Deployed,
                first_deployed: Some(now.clone()),
                last_deployed: Some(now),
                description: Some("Install complete".to_string()),
                ..Default::default()
            },
            chart: Some(ReleaseChart {
                metadata: Some(ChartSummary::from_metadata(chart)?),
                extra: Map::new(),
            }),
            config,
            manifest,
            hooks: Vec::new(),
            extra: Map::new(),
        })
    }

    /// Name of the Secret or ConfigMap holding this revision
    pub fn storage_key(&self) -> String {
        storage_key(&self.name, self.version)
    }

    /// `NAME-VERSION` of the chart, when recorded
    pub fn chart_label(&self) -> Option<String> {
        self.chart
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .map(|m| format!("{}-{}", m.name, m.version))
    }
}

/// Storage object name for a release revision
pub fn storage_key(name: &str, version: u32) -> String {
    format!("{}.{}.v{}", STORAGE_KEY_PREFIX, name, version)
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HELM_RELEASE: &str = r#"{
        "name": "web",
        "info": {
            "first_deployed": "2024-03-01T10:00:00.123456789Z",
            "last_deployed": "2024-03-02T11:30:00Z",
            "deleted": "",
            "description": "Upgrade complete",
            "status": "deployed"
        },
        "chart": {
            "metadata": {"name": "web", "version": "0.3.0", "apiVersion": "v2", "appVersion": "1.4"},
            "templates": [{"name": "templates/svc.yaml", "data": "YQ=="}],
            "values": {"replicas": 1}
        },
        "config": {"replicas": 3},
        "manifest": "---\napiVersion: v1\nkind: Service\nmetadata:\n  name: web\n",
        "hooks": [{"name": "migrate", "kind": "Job"}],
        "version": 4,
        "namespace": "prod",
        "labels": {"team": "core"}
    }"#;

    #[test]
    fn test_decode_helm_release() {
        let record: ReleaseRecord = serde_json::from_str(HELM_RELEASE).unwrap();

        assert_eq!(record.name, "web");
        assert_eq!(record.namespace, "prod");
        assert_eq!(record.version, 4);
        assert_eq!(record.info.status, ReleaseStatus::Deployed);
        assert_eq!(record.info.deleted, None);
        assert_eq!(record.info.description.as_deref(), Some("Upgrade complete"));
        assert_eq!(record.chart_label().as_deref(), Some("web-0.3.0"));
        assert_eq!(record.config, json!({"replicas": 3}));
        assert_eq!(record.hooks.len(), 1);
        assert_eq!(record.extra["labels"], json!({"team": "core"}));
        assert_eq!(record.storage_key(), "sh.helm.release.v1.web.v4");
    }

    #[test]
    fn test_timestamps_parse() {
        let record: ReleaseRecord = serde_json::from_str(HELM_RELEASE).unwrap();
        let first = record.info.first_deployed_at().unwrap();
        let last = record.info.last_deployed_at().unwrap();
        assert!(first < last);
    }

    #[test]
    fn test_unknown_fields_survive_reencoding() {
        let record: ReleaseRecord = serde_json::from_str(HELM_RELEASE).unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["chart"]["templates"][0]["name"], json!("templates/svc.yaml"));
        assert_eq!(value["chart"]["metadata"]["apiVersion"], json!("v2"));
        assert!(value["info"].get("deleted").is_none());
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let record: ReleaseRecord =
            serde_json::from_str(r#"{"name": "x", "info": {"status": "exploded"}}"#).unwrap();
        assert_eq!(record.info.status, ReleaseStatus::Unknown);
    }

    #[test]
    fn test_first_revision() {
        let chart = ChartMetadata::generated("web", Some("1.0.0")).unwrap();
        let record = ReleaseRecord::first_revision(
            "web",
            "prod",
            &chart,
            json!({"image": "nginx"}),
            "---\nkind: Service\n".to_string(),
        )
        .unwrap();

        assert_eq!(record.version, 1);
        assert_eq!(record.info.status, ReleaseStatus::Deployed);
        assert!(record.info.first_deployed_at().is_some());
        assert_eq!(record.chart_label().as_deref(), Some("web-1.0.0"));
        assert!(record.hooks.is_empty());
    }
}
