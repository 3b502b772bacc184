//! Ad-hoc chart dependencies
//!
//! Declared on the command line as `ALIAS=REPO/CHART[:VERSION]`, e.g.
//! `mydb=stable/mysql:1.2.3` or `cache=https://charts.bitnami.com/bitnami/redis:17.0.0`.

use std::fmt;
use std::str::FromStr;

use crate::chart::ChartDependency;
use crate::error::CoreError;

/// A dependency to be added to the generated chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub alias: String,
    pub repository: String,
    pub chart_name: String,
    pub version: String,
}

impl DependencySpec {
    /// Repository in the form helm expects inside Chart.yaml
    ///
    /// Bare repository names become `@name` references; URLs are kept.
    pub fn repository_reference(&self) -> String {
        let repo = self.repository.as_str();
        if repo.contains("://") || repo.starts_with('@') || repo.starts_with("alias:") {
            repo.to_string()
        } else {
            format!("@{}", repo)
        }
    }

    /// Convert to a Chart.yaml dependency entry
    pub fn to_chart_dependency(&self) -> ChartDependency {
        ChartDependency {
            name: self.chart_name.clone(),
            version: self.version.clone(),
            repository: Some(self.repository_reference()),
            alias: Some(self.alias.clone()),
            extra: Default::default(),
        }
    }
}

impl FromStr for DependencySpec {
    type Err = CoreError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| CoreError::InvalidDependency {
            spec: spec.to_string(),
            message: message.to_string(),
        };

        let (alias, reference) = spec
            .split_once('=')
            .ok_or_else(|| invalid("expected ALIAS=REPO/CHART[:VERSION]"))?;
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(invalid("alias must not be empty"));
        }

        // A version suffix never contains '/', which keeps `https://` intact
        let (reference, version) = match reference.rsplit_once(':') {
            Some((head, tail)) if !tail.contains('/') && !tail.is_empty() => (head, tail),
            _ => (reference, "*"),
        };

        let (repository, chart_name) = reference
            .rsplit_once('/')
            .ok_or_else(|| invalid("expected REPO/CHART"))?;
        if repository.is_empty() || chart_name.is_empty() {
            return Err(invalid("repository and chart name must not be empty"));
        }

        Ok(Self {
            alias: alias.to_string(),
            repository: repository.to_string(),
            chart_name: chart_name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}/{}:{}",
            self.alias, self.repository, self.chart_name, self.version
        )
    }
}
