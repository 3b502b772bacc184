//! Kubernetes manifest documents and ordered manifest sets
//!
//! A manifest set is the unit every pipeline stage consumes and produces.
//! Documents keep their position in the set, and each one is identified by
//! `(kind, apiVersion, namespace, name)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, Result};

/// Annotation marking a document as a Helm hook
pub const HELM_HOOK_ANNOTATION: &str = "helm.sh/hook";

static FILE_NAME_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9.-]+").expect("static regex is valid"));

/// Identity of a Kubernetes object within a manifest set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub kind: String,
    pub api_version: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    /// API group part of `apiVersion` (empty for the core group)
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// Version part of `apiVersion`
    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.api_version)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{} ({})", ns, self.kind, self.name, self.api_version),
            None => write!(f, "{}/{} ({})", self.kind, self.name, self.api_version),
        }
    }
}

/// A single Kubernetes object
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    identity: ResourceIdentity,
    body: Value,
    source: Option<String>,
}

impl ManifestDocument {
    /// Build a document from a parsed YAML body, extracting its identity
    pub fn from_value(body: Value) -> std::result::Result<Self, String> {
        let identity = identity_of(&body)?;
        Ok(Self {
            identity,
            body,
            source: None,
        })
    }

    /// Attach the file or command this document came from
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Replace the body, recomputing identity
    ///
    /// Patches may legitimately rename an object, so identity always follows
    /// the body rather than being pinned.
    pub fn replace_body(&mut self, body: Value) -> std::result::Result<(), String> {
        self.identity = identity_of(&body)?;
        self.body = body;
        Ok(())
    }

    /// Whether this document is a Helm hook
    pub fn is_hook(&self) -> bool {
        self.body
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(HELM_HOOK_ANNOTATION))
            .is_some()
    }

    /// Serialize the body back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.body)?)
    }

    /// Stable file name for writing this document into a templates directory
    pub fn file_name(&self, index: usize) -> String {
        let stem = format!("{}-{}", self.identity.kind, self.identity.name).to_lowercase();
        let stem = FILE_NAME_UNSAFE.replace_all(&stem, "-");
        format!("{:03}-{}.yaml", index, stem.trim_matches('-'))
    }
}

/// Extract the identity tuple from a document body
fn identity_of(body: &Value) -> std::result::Result<ResourceIdentity, String> {
    if !body.is_mapping() {
        return Err("document is not a YAML mapping".to_string());
    }

    let kind = body
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'kind'".to_string())?;
    let api_version = body
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} is missing 'apiVersion'", kind))?;

    let metadata = body.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name").or_else(|| m.get("generateName")))
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} is missing 'metadata.name'", kind))?;
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(String::from);

    Ok(ResourceIdentity {
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        namespace,
        name: name.to_string(),
    })
}

/// An ordered sequence of manifest documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestSet {
    documents: Vec<ManifestDocument>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<ManifestDocument>) -> Self {
        Self { documents }
    }

    /// Parse a multi-document YAML stream
    ///
    /// Empty and comment-only documents are skipped. `List` objects are
    /// flattened into their items.
    pub fn parse(stream: &str, source: Option<&str>) -> Result<Self> {
        let mut documents = Vec::new();

        for (index, de) in serde_yaml::Deserializer::from_str(stream).enumerate() {
            let value = Value::deserialize(de).map_err(|e| CoreError::InvalidDocument {
                index,
                message: e.to_string(),
            })?;

            if value.is_null() {
                continue;
            }

            for item in flatten_lists(value) {
                let mut doc = ManifestDocument::from_value(item)
                    .map_err(|message| CoreError::InvalidDocument { index, message })?;
                if let Some(source) = source {
                    doc = doc.with_source(source);
                }
                documents.push(doc);
            }
        }

        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn push(&mut self, document: ManifestDocument) {
        self.documents.push(document);
    }

    pub fn extend(&mut self, other: ManifestSet) {
        self.documents.extend(other.documents);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestDocument> {
        self.documents.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ManifestDocument> {
        self.documents.iter_mut()
    }

    pub fn documents(&self) -> &[ManifestDocument] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<ManifestDocument> {
        self.documents
    }

    /// Find a document by identity
    pub fn get(&self, identity: &ResourceIdentity) -> Option<&ManifestDocument> {
        self.documents.iter().find(|d| d.identity() == identity)
    }

    /// Fail on the first identity that appears twice
    pub fn validate_unique(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.documents.len());
        for doc in &self.documents {
            if !seen.insert(doc.identity()) {
                return Err(CoreError::DuplicateDocument {
                    identity: doc.identity().to_string(),
                });
            }
        }
        Ok(())
    }

    /// A copy of this set with Helm hooks removed
    pub fn without_hooks(&self) -> ManifestSet {
        Self {
            documents: self
                .documents
                .iter()
                .filter(|d| !d.is_hook())
                .cloned()
                .collect(),
        }
    }

    /// Serialize as a multi-document YAML stream
    pub fn to_yaml_stream(&self) -> Result<String> {
        let mut out = String::new();
        for doc in &self.documents {
            out.push_str("---\n");
            out.push_str(&doc.to_yaml()?);
        }
        Ok(out)
    }
}

impl IntoIterator for ManifestSet {
    type Item = ManifestDocument;
    type IntoIter = std::vec::IntoIter<ManifestDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a ManifestSet {
    type Item = &'a ManifestDocument;
    type IntoIter = std::slice::Iter<'a, ManifestDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

fn flatten_lists(value: Value) -> Vec<Value> {
    let is_list = value
        .get("kind")
        .and_then(Value::as_str)
        .map(|k| k.ends_with("List"))
        .unwrap_or(false);

    match value.get("items") {
        Some(Value::Sequence(items)) if is_list => items
            .iter()
            .filter(|i| !i.is_null())
            .cloned()
            .flat_map(flatten_lists)
            .collect(),
        _ => vec![value],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOCS: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: my-config
  namespace: default
data:
  key: value
---
# just a comment
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: my-app
spec:
  replicas: 1
"#;

    #[test]
    fn test_parse_multi_document_stream() {
        let set = ManifestSet::parse(TWO_DOCS, Some("app.yaml")).unwrap();
        assert_eq!(set.len(), 2);

        let cm = &set.documents()[0];
        assert_eq!(cm.identity().kind, "ConfigMap");
        assert_eq!(cm.identity().namespace.as_deref(), Some("default"));
        assert_eq!(cm.source(), Some("app.yaml"));

        let deploy = &set.documents()[1];
        assert_eq!(deploy.identity().group(), "apps");
        assert_eq!(deploy.identity().version(), "v1");
        assert!(deploy.identity().namespace.is_none());
    }

    #[test]
    fn test_parse_flattens_lists() {
        let stream = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: Service
    metadata:
      name: a
  - apiVersion: v1
    kind: Service
    metadata:
      name: b
"#;
        let set = ManifestSet::parse(stream, None).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.documents()[1].identity().name, "b");
    }

    #[test]
    fn test_parse_rejects_missing_kind() {
        let err = ManifestSet::parse("apiVersion: v1\nmetadata:\n  name: x\n", None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDocument { index: 0, .. }));
    }

    #[test]
    fn test_validate_unique_detects_duplicates() {
        let doc = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: s\n";
        let set = ManifestSet::parse(&format!("{doc}---\n{doc}"), None).unwrap();
        let err = set.validate_unique().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateDocument { .. }));
    }

    #[test]
    fn test_same_name_different_namespace_is_unique() {
        let stream = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: s\n  namespace: a\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: s\n  namespace: b\n";
        let set = ManifestSet::parse(stream, None).unwrap();
        assert!(set.validate_unique().is_ok());
    }

    #[test]
    fn test_without_hooks() {
        let stream = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  annotations:
    helm.sh/hook: pre-install
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;
        let set = ManifestSet::parse(stream, None).unwrap();
        let filtered = set.without_hooks();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.documents()[0].identity().kind, "Service");
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let doc = ManifestDocument::from_value(
            serde_yaml::from_str("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: Foo_Bar:v1\n")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(doc.file_name(3), "003-configmap-foo-bar-v1.yaml");
    }

    #[test]
    fn test_replace_body_updates_identity() {
        let mut set = ManifestSet::parse(TWO_DOCS, None).unwrap();
        let doc = set.iter_mut().next().unwrap();
        let body: Value = serde_yaml::from_str(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: renamed\n",
        )
        .unwrap();
        doc.replace_body(body).unwrap();
        assert_eq!(doc.identity().name, "renamed");
    }

    #[test]
    fn test_yaml_stream_reparses_identically() {
        let set = ManifestSet::parse(TWO_DOCS, None).unwrap();
        let stream = set.to_yaml_stream().unwrap();
        let reparsed = ManifestSet::parse(&stream, None).unwrap();
        let ids: Vec<_> = reparsed.iter().map(|d| d.identity().clone()).collect();
        let original: Vec<_> = set.iter().map(|d| d.identity().clone()).collect();
        assert_eq!(ids, original);
    }
}
