//! Writing the generated chart to disk

use std::path::{Path, PathBuf};

use helmx_core::chart::CHART_FILE;
use helmx_core::{ChartMetadata, CoreError, ManifestSet};

use crate::error::{ChartifyError, Result};

pub const TEMPLATES_DIR: &str = "templates";
pub const CHARTS_DIR: &str = "charts";
pub const VALUES_FILE: &str = "values.yaml";
const LOCK_FILES: &[&str] = &["Chart.lock", "requirements.lock"];

/// What goes into the chart body
#[derive(Debug, Clone, Copy)]
pub enum ChartBody<'a> {
    /// A fresh chart holding these manifests
    Generated(&'a ManifestSet),
    /// A copied chart whose templates are replaced by its rendered manifests
    Rendered(&'a ManifestSet),
    /// A copied chart kept as-is
    Copied,
}

/// Write Chart.yaml, values.yaml and templates into `dir`
pub fn materialize(dir: &Path, metadata: &ChartMetadata, body: ChartBody<'_>) -> Result<()> {
    create_dir(dir)?;

    match body {
        ChartBody::Generated(manifests) => {
            write_file(&dir.join(VALUES_FILE), "{}\n")?;
            write_templates(dir, manifests)?;
        }
        ChartBody::Rendered(manifests) => {
            remove_dir(&dir.join(CHARTS_DIR))?;
            for lock in LOCK_FILES {
                remove_file(&dir.join(lock))?;
            }
            write_templates(dir, manifests)?;
        }
        ChartBody::Copied => {}
    }

    let mut metadata = metadata.clone();
    if metadata.app_version.is_none() {
        metadata.app_version = Some(metadata.version.clone());
    }
    metadata.save(dir).map_err(|e| match e {
        CoreError::Io(source) => ChartifyError::Materialization {
            path: dir.join(CHART_FILE),
            source,
        },
        other => other.into(),
    })?;

    tracing::debug!(path = %dir.display(), chart = %metadata.name, "materialized chart");
    Ok(())
}

/// Replace the templates directory with one file per document
fn write_templates(dir: &Path, manifests: &ManifestSet) -> Result<()> {
    let templates = dir.join(TEMPLATES_DIR);
    remove_dir(&templates)?;
    create_dir(&templates)?;

    for (index, doc) in manifests.iter().enumerate() {
        let path = templates.join(doc.file_name(index));
        write_file(&path, &doc.to_yaml()?)?;
    }
    Ok(())
}

fn materialization(path: &Path) -> impl FnOnce(std::io::Error) -> ChartifyError {
    let path: PathBuf = path.to_path_buf();
    move |source| ChartifyError::Materialization { path, source }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(materialization(path))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(materialization(path))
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(materialization(path))?;
    }
    Ok(())
}

fn remove_file(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(materialization(path))?;
    }
    Ok(())
}
