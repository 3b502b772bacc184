//! Chart.yaml model
//!
//! Charts are either generated (plain manifests, kustomize output) or loaded
//! from a chart directory. Fields helm-x does not care about are preserved
//! verbatim so a copied chart round-trips without loss.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Version and appVersion used when no `--version` is given
pub const DEFAULT_CHART_VERSION: &str = "1.0.0";

/// File name of the chart metadata
pub const CHART_FILE: &str = "Chart.yaml";

/// Legacy dependency file used by `apiVersion: v1` charts
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";

/// Helm chart metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version (v1 or v2)
    pub api_version: String,

    /// Chart name
    pub name: String,

    /// Chart version (SemVer)
    pub version: String,

    /// Application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Chart description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Chart type (application or library)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    /// Chart dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,

    /// Everything else (maintainers, keywords, annotations, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,

    /// Dependencies live in requirements.yaml rather than Chart.yaml
    #[serde(skip)]
    pub legacy_requirements: bool,
}

/// A dependency entry in Chart.yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    /// Chart name
    pub name: String,

    /// Version constraint
    #[serde(default)]
    pub version: String,

    /// Repository URL or `@name` reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Alias name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Condition, tags, import-values and anything else
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartDependency {
    /// Name the dependency is addressed by in values (alias if set)
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<ChartDependency>,
}

impl ChartMetadata {
    /// Metadata for a chart synthesized from plain manifests
    ///
    /// Both `version` and `appVersion` are set to `version`, or to
    /// [`DEFAULT_CHART_VERSION`] when none is given.
    pub fn generated(name: &str, version: Option<&str>) -> Result<Self> {
        let version = version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_CHART_VERSION);
        validate_chart_version(version)?;

        Ok(Self {
            api_version: "v2".to_string(),
            name: sanitize_chart_name(name),
            version: version.to_string(),
            app_version: Some(version.to_string()),
            description: Some(format!("Generated by helm-x from {}", name)),
            chart_type: None,
            dependencies: Vec::new(),
            extra: BTreeMap::new(),
            legacy_requirements: false,
        })
    }

    /// Parse a Chart.yaml string
    pub fn parse(content: &str) -> Result<Self> {
        let chart: ChartMetadata = serde_yaml::from_str(content)?;

        if chart.name.is_empty() {
            return Err(CoreError::InvalidChart {
                message: "missing required field 'name'".to_string(),
            });
        }
        if chart.version.is_empty() {
            return Err(CoreError::InvalidChart {
                message: "missing required field 'version'".to_string(),
            });
        }

        Ok(chart)
    }

    /// Load Chart.yaml (and requirements.yaml for v1 charts) from a chart directory
    pub fn load(chart_dir: &Path) -> Result<Self> {
        let chart_file = chart_dir.join(CHART_FILE);
        if !chart_file.exists() {
            return Err(CoreError::ChartNotFound {
                path: chart_dir.display().to_string(),
            });
        }

        let mut chart = Self::parse(&std::fs::read_to_string(&chart_file)?)?;

        let requirements_file = chart_dir.join(REQUIREMENTS_FILE);
        if chart.api_version == "v1" && requirements_file.exists() {
            let requirements: Requirements =
                serde_yaml::from_str(&std::fs::read_to_string(&requirements_file)?)?;
            chart.dependencies = requirements.dependencies;
            chart.legacy_requirements = true;
        }

        Ok(chart)
    }

    /// Write Chart.yaml (and requirements.yaml for legacy charts) into a chart directory
    pub fn save(&self, chart_dir: &Path) -> Result<()> {
        if self.legacy_requirements {
            let mut chart = self.clone();
            let requirements = Requirements {
                dependencies: std::mem::take(&mut chart.dependencies),
            };
            std::fs::write(chart_dir.join(CHART_FILE), serde_yaml::to_string(&chart)?)?;
            std::fs::write(
                chart_dir.join(REQUIREMENTS_FILE),
                serde_yaml::to_string(&requirements)?,
            )?;
        } else {
            std::fs::write(chart_dir.join(CHART_FILE), self.to_yaml()?)?;
        }
        Ok(())
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Reject chart versions helm would refuse to package
fn validate_chart_version(version: &str) -> Result<()> {
    let candidate = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(candidate).map_err(|e| CoreError::InvalidChart {
        message: format!("chart version '{}' is not valid SemVer: {}", version, e),
    })?;
    Ok(())
}

/// Turn an arbitrary directory basename into a valid chart name
pub fn sanitize_chart_name(raw: &str) -> String {
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();

    while name.contains("--") {
        name = name.replace("--", "-");
    }

    let name = name.trim_matches('-');
    if name.is_empty() {
        "chart".to_string()
    } else {
        name.to_string()
    }
}
