//! Human-readable dump of a stored release

use crate::error::Result;
use crate::release::ReleaseRecord;
use crate::storage::ReleaseStorage;

/// Fetch a revision (the latest when `revision` is `None`) and render it
pub async fn dump(
    storage: &dyn ReleaseStorage,
    namespace: &str,
    name: &str,
    revision: Option<u32>,
) -> Result<String> {
    let record = match revision {
        Some(rev) => storage.get(namespace, name, rev).await?,
        None => storage.get_latest(namespace, name).await?,
    };
    render(&record)
}

/// The release as YAML without its manifest, then `manifest:` and the raw
/// manifest text so it stays readable
pub fn render(record: &ReleaseRecord) -> Result<String> {
    let mut value = serde_json::to_value(record)?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("manifest");
    }

    let mut out = serde_yaml::to_string(&value)?;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("manifest:\n");
    out.push_str(&record.manifest);
    if !record.manifest.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}
