//! Compare a freshly rendered chart with the manifest of a stored release
//!
//! Both sides are parsed into identity-keyed documents, Helm hooks are
//! dropped, and each document is reported as added, removed or modified with
//! the field paths that changed and a line diff of its YAML.

use helmx_core::{ManifestDocument, ManifestSet};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use similar::{ChangeTag, TextDiff};

use crate::error::Result;
use crate::release::ReleaseRecord;

/// Diff engine for release comparison
pub struct DiffEngine {
    /// Context lines kept around each change
    pub context_lines: usize,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self { context_lines: 3 }
    }

    pub fn with_context(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Compare a rendered manifest stream against a release
    ///
    /// A missing release compares against an empty manifest, so everything
    /// shows up as added.
    pub fn diff_release(&self, release: Option<&ReleaseRecord>, rendered: &str) -> Result<DiffResult> {
        let old = match release {
            Some(r) => ManifestSet::parse(&r.manifest, Some("release"))?,
            None => ManifestSet::new(),
        };
        let new = ManifestSet::parse(rendered, Some("rendered"))?;

        let mut result = self.diff_manifests(&old, &new)?;
        result.release_version = release.map(|r| r.version);
        Ok(result)
    }

    /// Compare two manifest sets, ignoring hooks
    pub fn diff_manifests(&self, old: &ManifestSet, new: &ManifestSet) -> Result<DiffResult> {
        let old = old.without_hooks();
        let new = new.without_hooks();
        let mut changes = Vec::new();

        for doc in new.iter() {
            match old.get(doc.identity()) {
                Some(previous) if previous.body() != doc.body() => {
                    let mut fields = Vec::new();
                    field_changes(previous.body(), doc.body(), String::new(), &mut fields);
                    changes.push(ResourceChange::new(
                        doc,
                        ChangeType::Modified,
                        fields,
                        self.compute_text_diff(&previous.to_yaml()?, &doc.to_yaml()?),
                    ));
                }
                Some(_) => {}
                None => changes.push(ResourceChange::new(
                    doc,
                    ChangeType::Added,
                    Vec::new(),
                    DiffContent::new_addition(&doc.to_yaml()?),
                )),
            }
        }

        for doc in old.iter() {
            if new.get(doc.identity()).is_none() {
                changes.push(ResourceChange::new(
                    doc,
                    ChangeType::Removed,
                    Vec::new(),
                    DiffContent::new_removal(&doc.to_yaml()?),
                ));
            }
        }

        Ok(DiffResult {
            release_version: None,
            changes,
        })
    }

    /// Line diff limited to hunks with `context_lines` of context
    fn compute_text_diff(&self, old: &str, new: &str) -> DiffContent {
        let diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();

        for (index, group) in diff.grouped_ops(self.context_lines).iter().enumerate() {
            if index > 0 {
                lines.push(DiffLine {
                    line_type: LineType::Separator,
                    content: String::new(),
                    old_line_no: None,
                    new_line_no: None,
                });
            }
            for op in group {
                for change in diff.iter_changes(op) {
                    let line_type = match change.tag() {
                        ChangeTag::Delete => LineType::Removed,
                        ChangeTag::Insert => LineType::Added,
                        ChangeTag::Equal => LineType::Context,
                    };
                    lines.push(DiffLine {
                        line_type,
                        content: change.value().trim_end().to_string(),
                        old_line_no: change.old_index(),
                        new_line_no: change.new_index(),
                    });
                }
            }
        }

        DiffContent { lines }
    }

    /// Generate a human-readable summary
    pub fn summary(&self, result: &DiffResult) -> String {
        let mut parts = Vec::with_capacity(3);
        for change_type in [ChangeType::Added, ChangeType::Modified, ChangeType::Removed] {
            let count = result.changes_by_type(change_type).len();
            if count > 0 {
                parts.push(format!("{} {}", count, change_type));
            }
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of comparing a rendered chart with a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    /// Revision compared against, `None` when the release does not exist
    pub release_version: Option<u32>,

    pub changes: Vec<ResourceChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&ResourceChange> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }
}

/// A change to a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: Option<String>,
    pub change_type: ChangeType,

    /// Changed field paths, only for modifications
    pub fields: Vec<FieldChange>,

    pub diff: DiffContent,
}

impl ResourceChange {
    fn new(
        doc: &ManifestDocument,
        change_type: ChangeType,
        fields: Vec<FieldChange>,
        diff: DiffContent,
    ) -> Self {
        let id = doc.identity();
        Self {
            kind: id.kind.clone(),
            api_version: id.api_version.clone(),
            name: id.name.clone(),
            namespace: id.namespace.clone(),
            change_type,
            fields,
            diff,
        }
    }

    /// `namespace/Kind/name` or `Kind/name`
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}

/// A field that differs between two versions of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Dotted path, with `[i]` for list elements
    pub path: String,
    pub change_type: ChangeType,
}

/// Detailed diff content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffContent {
    pub lines: Vec<DiffLine>,
}

impl DiffContent {
    fn new_addition(content: &str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| DiffLine {
                line_type: LineType::Added,
                content: line.to_string(),
                old_line_no: None,
                new_line_no: Some(i),
            })
            .collect();

        Self { lines }
    }

    fn new_removal(content: &str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| DiffLine {
                line_type: LineType::Removed,
                content: line.to_string(),
                old_line_no: Some(i),
                new_line_no: None,
            })
            .collect();

        Self { lines }
    }

    /// Generate a unified diff string
    pub fn to_unified_diff(&self) -> String {
        let mut output = String::new();

        for line in &self.lines {
            let prefix = match line.line_type {
                LineType::Added => "+",
                LineType::Removed => "-",
                LineType::Context => " ",
                LineType::Separator => "...",
            };
            output.push_str(prefix);
            output.push_str(&line.content);
            output.push('\n');
        }

        output
    }
}

/// A single line in a diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: LineType,
    pub content: String,
    pub old_line_no: Option<usize>,
    pub new_line_no: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Added,
    Removed,
    Context,
    /// Gap between two hunks
    Separator,
}

/// Collect the paths at which `old` and `new` differ
fn field_changes(old: &Value, new: &Value, path: String, out: &mut Vec<FieldChange>) {
    match (old, new) {
        (Value::Mapping(a), Value::Mapping(b)) => {
            for (key, value) in b {
                let child = join_path(&path, key);
                match a.get(key) {
                    Some(previous) => field_changes(previous, value, child, out),
                    None => out.push(FieldChange {
                        path: child,
                        change_type: ChangeType::Added,
                    }),
                }
            }
            for (key, _) in a {
                if !b.contains_key(key) {
                    out.push(FieldChange {
                        path: join_path(&path, key),
                        change_type: ChangeType::Removed,
                    });
                }
            }
        }
        (Value::Sequence(a), Value::Sequence(b)) => {
            for (i, value) in b.iter().enumerate() {
                let child = format!("{}[{}]", path, i);
                match a.get(i) {
                    Some(previous) => field_changes(previous, value, child, out),
                    None => out.push(FieldChange {
                        path: child,
                        change_type: ChangeType::Added,
                    }),
                }
            }
            for i in b.len()..a.len() {
                out.push(FieldChange {
                    path: format!("{}[{}]", path, i),
                    change_type: ChangeType::Removed,
                });
            }
        }
        (a, b) if a != b => out.push(FieldChange {
            path,
            change_type: ChangeType::Modified,
        }),
        _ => {}
    }
}

fn join_path(parent: &str, key: &Value) -> String {
    let key = match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    };
    if parent.is_empty() {
        key
    } else {
        format!("{}.{}", parent, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::record;

    const RELEASED: &str = r#"---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: slow
  legacy: "true"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.25
---
apiVersion: v1
kind: Service
metadata:
  name: old-svc
"#;

    const RENDERED: &str = r#"---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: slow
  legacy: "true"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 3
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.27
          ports:
            - containerPort: 80
---
apiVersion: v1
kind: Service
metadata:
  name: web
---
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  annotations:
    helm.sh/hook: pre-upgrade
"#;

    fn diff() -> DiffResult {
        let release = record("web", 5, RELEASED);
        DiffEngine::new().diff_release(Some(&release), RENDERED).unwrap()
    }

    #[test]
    fn test_classifies_documents() {
        let result = diff();

        assert_eq!(result.release_version, Some(5));
        let names = |t: ChangeType| -> Vec<String> {
            result
                .changes_by_type(t)
                .iter()
                .map(|c| c.display_name())
                .collect()
        };
        assert_eq!(names(ChangeType::Modified), vec!["Deployment/web"]);
        assert_eq!(names(ChangeType::Added), vec!["Service/web"]);
        assert_eq!(names(ChangeType::Removed), vec!["Service/old-svc"]);
    }

    #[test]
    fn test_hooks_are_ignored() {
        let result = diff();
        assert!(result.changes.iter().all(|c| c.kind != "Job"));
    }

    #[test]
    fn test_field_paths() {
        let result = diff();
        let deployment = result.changes_by_type(ChangeType::Modified)[0];
        let paths: Vec<_> = deployment
            .fields
            .iter()
            .map(|f| (f.path.as_str(), f.change_type))
            .collect();

        assert_eq!(
            paths,
            vec![
                ("spec.replicas", ChangeType::Modified),
                ("spec.template.spec.containers[0].image", ChangeType::Modified),
                ("spec.template.spec.containers[0].ports", ChangeType::Added),
            ]
        );
    }

    #[test]
    fn test_unified_text() {
        let result = diff();
        let deployment = result.changes_by_type(ChangeType::Modified)[0];
        let text = deployment.diff.to_unified_diff();
        assert!(text.contains("-  replicas: 1"));
        assert!(text.contains("+  replicas: 3"));
        assert!(text.contains("+      - containerPort: 80") || text.contains("+        - containerPort: 80"));
    }

    #[test]
    fn test_missing_release_diffs_against_empty() {
        let result = DiffEngine::new().diff_release(None, RENDERED).unwrap();
        assert_eq!(result.release_version, None);
        assert_eq!(result.changes_by_type(ChangeType::Added).len(), 3);
        assert!(result.changes_by_type(ChangeType::Removed).is_empty());
    }

    #[test]
    fn test_identical_manifests() {
        let release = record("web", 1, RELEASED);
        let result = DiffEngine::new().diff_release(Some(&release), RELEASED).unwrap();
        assert!(!result.has_changes());
        assert_eq!(DiffEngine::new().summary(&result), "No changes");
    }

    #[test]
    fn test_summary() {
        let result = diff();
        assert_eq!(DiffEngine::new().summary(&result), "1 added, 1 modified, 1 removed");
    }

    #[test]
    fn test_context_limits_hunks() {
        let old: String = (0..40).map(|i| format!("line{}\n", i)).collect();
        let new = old.replace("line5\n", "line5b\n").replace("line30\n", "line30b\n");
        let content = DiffEngine::new().with_context(1).compute_text_diff(&old, &new);

        assert!(content.lines.iter().any(|l| l.line_type == LineType::Separator));
        assert!(content.lines.len() < 15);
    }
}
