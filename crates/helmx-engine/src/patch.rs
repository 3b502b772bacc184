//! JSON patches and strategic merge patches over a manifest set

use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use helmx_core::{ManifestSet, ResourceIdentity};

use crate::error::{ChartifyError, Result};
use crate::options::{PatchFile, PatchKind};
use crate::strategic;

/// Selects the documents a JSON patch entry applies to
///
/// Absent fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Selector {
    pub group: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl Selector {
    pub fn matches(&self, id: &ResourceIdentity) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        field(&self.group, id.group())
            && field(&self.version, id.version())
            && field(&self.kind, &id.kind)
            && field(&self.name, &id.name)
            && field(&self.namespace, id.namespace.as_deref().unwrap_or_default())
    }
}

/// One `{target, patch}` entry of a JSON patch file
#[derive(Debug, Clone, Deserialize)]
pub struct JsonPatchEntry {
    #[serde(default)]
    pub target: Selector,
    pub patch: Vec<json_patch::PatchOperation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPatchFile {
    Many(Vec<JsonPatchEntry>),
    One(JsonPatchEntry),
}

/// A loaded patch, ready to apply
#[derive(Debug, Clone)]
pub enum PatchSpec {
    JsonPatch {
        file: PathBuf,
        entries: Vec<JsonPatchEntry>,
    },
    StrategicMerge {
        file: PathBuf,
        documents: Vec<Value>,
    },
}

impl PatchSpec {
    /// Read and parse a patch file
    pub fn load(patch: &PatchFile) -> Result<Self> {
        let content = std::fs::read_to_string(&patch.path).map_err(|e| {
            ChartifyError::stage(stage_label(patch.kind, &patch.path), None, e)
        })?;
        match patch.kind {
            PatchKind::Json => Self::parse_json(&patch.path, &content),
            PatchKind::StrategicMerge => Self::parse_strategic_merge(&patch.path, &content),
        }
    }

    /// Parse a JSON patch file (YAML or JSON syntax)
    pub fn parse_json(file: &Path, content: &str) -> Result<Self> {
        let parsed: JsonPatchFile = serde_yaml::from_str(content).map_err(|e| {
            ChartifyError::stage(
                stage_label(PatchKind::Json, file),
                None,
                format!("malformed patch file: {}", e),
            )
        })?;
        let entries = match parsed {
            JsonPatchFile::Many(entries) => entries,
            JsonPatchFile::One(entry) => vec![entry],
        };
        Ok(Self::JsonPatch {
            file: file.to_path_buf(),
            entries,
        })
    }

    /// Parse a strategic merge patch file (one or more YAML documents)
    pub fn parse_strategic_merge(file: &Path, content: &str) -> Result<Self> {
        let malformed = |cause: String| {
            ChartifyError::stage(
                stage_label(PatchKind::StrategicMerge, file),
                None,
                format!("malformed patch file: {}", cause),
            )
        };

        let mut documents = Vec::new();
        for de in serde_yaml::Deserializer::from_str(content) {
            let doc = Value::deserialize(de).map_err(|e| malformed(e.to_string()))?;
            if doc.is_null() {
                continue;
            }
            if doc.get("kind").and_then(Value::as_str).is_none()
                || doc
                    .get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(Value::as_str)
                    .is_none()
            {
                return Err(malformed(
                    "every document needs 'kind' and 'metadata.name'".to_string(),
                ));
            }
            documents.push(doc);
        }

        Ok(Self::StrategicMerge {
            file: file.to_path_buf(),
            documents,
        })
    }

    pub fn label(&self) -> String {
        match self {
            Self::JsonPatch { file, .. } => stage_label(PatchKind::Json, file),
            Self::StrategicMerge { file, .. } => stage_label(PatchKind::StrategicMerge, file),
        }
    }

    /// Apply to a manifest set
    ///
    /// A patch that matches nothing is skipped, or rejected when `strict`.
    pub fn apply(&self, set: ManifestSet, strict: bool) -> Result<ManifestSet> {
        match self {
            Self::JsonPatch { entries, .. } => self.apply_json(set, entries, strict),
            Self::StrategicMerge { documents, .. } => {
                self.apply_strategic_merge(set, documents, strict)
            }
        }
    }

    fn apply_json(
        &self,
        mut set: ManifestSet,
        entries: &[JsonPatchEntry],
        strict: bool,
    ) -> Result<ManifestSet> {
        for (index, entry) in entries.iter().enumerate() {
            let mut matched = 0;
            for doc in set.iter_mut() {
                if !entry.target.matches(doc.identity()) {
                    continue;
                }
                matched += 1;

                let id = doc.identity().to_string();
                let mut json = serde_json::to_value(doc.body()).map_err(|e| self.fail(&id, e))?;
                json_patch::patch(&mut json, &entry.patch).map_err(|e| self.fail(&id, e))?;
                let body = serde_yaml::to_value(&json).map_err(|e| self.fail(&id, e))?;
                doc.replace_body(body).map_err(|e| self.fail(&id, e))?;
            }
            self.check_matched(matched, strict, || format!("entry {} ({:?})", index, entry.target))?;
        }
        Ok(set)
    }

    fn apply_strategic_merge(
        &self,
        set: ManifestSet,
        patches: &[Value],
        strict: bool,
    ) -> Result<ManifestSet> {
        let mut documents = set.into_documents();

        for patch in patches {
            let kind = patch.get("kind").and_then(Value::as_str).unwrap_or_default();
            let metadata = patch.get("metadata");
            let name = metadata
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let namespace = metadata
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str);

            let targets = |id: &ResourceIdentity| {
                id.kind == kind
                    && id.name == name
                    && namespace.is_none_or(|ns| id.namespace.as_deref() == Some(ns))
            };

            let before = documents.len();
            let mut matched = 0;
            if strategic::directive(patch) == Some("delete") {
                documents.retain(|d| !targets(d.identity()));
                matched = before - documents.len();
            } else {
                for doc in documents.iter_mut().filter(|d| targets(d.identity())) {
                    matched += 1;
                    let id = doc.identity().to_string();
                    let mut body = doc.body().clone();
                    strategic::merge(&mut body, patch);
                    doc.replace_body(body).map_err(|e| self.fail(&id, e))?;
                }
            }
            self.check_matched(matched, strict, || format!("{}/{}", kind, name))?;
        }

        Ok(ManifestSet::from_documents(documents))
    }

    fn check_matched(
        &self,
        matched: usize,
        strict: bool,
        describe: impl FnOnce() -> String,
    ) -> Result<()> {
        if matched > 0 {
            return Ok(());
        }
        let target = describe();
        if strict {
            return Err(ChartifyError::stage(
                self.label(),
                None,
                format!("{} matched no documents", target),
            ));
        }
        tracing::warn!(patch = %self.label(), %target, "patch matched no documents, skipping");
        Ok(())
    }

    fn fail(&self, document: &str, cause: impl ToString) -> ChartifyError {
        ChartifyError::stage(self.label(), Some(document.to_string()), cause)
    }
}

fn stage_label(kind: PatchKind, file: &Path) -> String {
    format!("{} {}", kind.flag(), file.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFESTS: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: prod
spec:
  replicas: 1
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.0
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: slow
"#;

    fn set() -> ManifestSet {
        ManifestSet::parse(MANIFESTS, None).unwrap()
    }

    #[test]
    fn test_json_patch_list_form() {
        let patch = PatchSpec::parse_json(
            Path::new("p.yaml"),
            r#"
- target:
    kind: Deployment
    name: web
  patch:
    - op: replace
      path: /spec/replicas
      value: 3
    - op: add
      path: /metadata/labels
      value:
        tier: frontend
"#,
        )
        .unwrap();

        let out = patch.apply(set(), false).unwrap();
        let deploy = &out.documents()[0];
        assert_eq!(deploy.body()["spec"]["replicas"], Value::from(3));
        assert_eq!(deploy.body()["metadata"]["labels"]["tier"], Value::from("frontend"));
    }

    #[test]
    fn test_json_patch_single_mapping_and_group_selector() {
        let patch = PatchSpec::parse_json(
            Path::new("p.json"),
            r#"{"target": {"group": "", "kind": "ConfigMap"}, "patch": [{"op": "replace", "path": "/data/mode", "value": "fast"}]}"#,
        )
        .unwrap();

        let out = patch.apply(set(), false).unwrap();
        assert_eq!(out.documents()[1].body()["data"]["mode"], Value::from("fast"));
        assert_eq!(out.documents()[0].body()["spec"]["replicas"], Value::from(1));
    }

    #[test]
    fn test_json_patch_failed_test_op() {
        let patch = PatchSpec::parse_json(
            Path::new("p.yaml"),
            r#"
target:
  kind: ConfigMap
patch:
  - op: test
    path: /data/mode
    value: fast
"#,
        )
        .unwrap();

        match patch.apply(set(), false).unwrap_err() {
            ChartifyError::PipelineStage { stage, document, .. } => {
                assert_eq!(stage, "json-patch p.yaml");
                assert!(document.unwrap().contains("ConfigMap/settings"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_matches_strict_and_lenient() {
        let patch = PatchSpec::parse_json(
            Path::new("p.yaml"),
            "target:\n  kind: Secret\npatch:\n  - op: remove\n    path: /data\n",
        )
        .unwrap();

        let out = patch.apply(set(), false).unwrap();
        assert_eq!(out, set());

        assert!(matches!(
            patch.apply(set(), true),
            Err(ChartifyError::PipelineStage { .. })
        ));
    }

    #[test]
    fn test_repeated_json_patch_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("sidecar.yaml");
        std::fs::write(
            &file,
            "target:\n  kind: Deployment\npatch:\n  - op: add\n    path: /spec/template/spec/containers/-\n    value:\n      name: proxy\n      image: envoy\n",
        )
        .unwrap();
        let patch = PatchSpec::load(&PatchFile::json(&file)).unwrap();

        let twice = |set: ManifestSet| {
            let once = patch.apply(set, true).unwrap();
            patch.apply(once, true).unwrap()
        };
        let a = twice(set());
        let b = twice(set());
        assert_eq!(a.to_yaml_stream().unwrap(), b.to_yaml_stream().unwrap());

        let deployment = a.iter().find(|d| d.identity().kind == "Deployment").unwrap();
        let containers = deployment.body()["spec"]["template"]["spec"]["containers"]
            .as_sequence()
            .unwrap();
        assert_eq!(containers.len(), 3);
    }

    #[test]
    fn test_malformed_json_patch() {
        let err = PatchSpec::parse_json(Path::new("p.yaml"), "- target: {}\n  patch: 3\n").unwrap_err();
        assert!(matches!(err, ChartifyError::PipelineStage { .. }));
    }

    #[test]
    fn test_strategic_merge_respects_namespace() {
        let patch = PatchSpec::parse_strategic_merge(
            Path::new("smp.yaml"),
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: prod
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: web
          image: nginx:2.0
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: staging
spec:
  replicas: 9
"#,
        )
        .unwrap();

        let out = patch.apply(set(), false).unwrap();
        let deploy = &out.documents()[0];
        assert_eq!(deploy.body()["spec"]["replicas"], Value::from(2));
        assert_eq!(
            deploy.body()["spec"]["template"]["spec"]["containers"][0]["image"],
            Value::from("nginx:2.0")
        );
        assert!(patch.apply(set(), true).is_err());
    }

    #[test]
    fn test_strategic_merge_delete_document() {
        let patch = PatchSpec::parse_strategic_merge(
            Path::new("smp.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n$patch: delete\n",
        )
        .unwrap();
        let out = patch.apply(set(), true).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.documents()[0].identity().kind, "Deployment");
    }

    #[test]
    fn test_strategic_merge_requires_name() {
        let err = PatchSpec::parse_strategic_merge(Path::new("s.yaml"), "kind: ConfigMap\n").unwrap_err();
        assert!(matches!(err, ChartifyError::PipelineStage { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = PatchSpec::load(&PatchFile::json(tmp.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ChartifyError::PipelineStage { .. }));
    }
}
