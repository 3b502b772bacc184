//! Merging ad-hoc dependencies into chart metadata

use std::collections::HashSet;

use helmx_core::{ChartMetadata, DependencySpec};

use crate::error::{ChartifyError, Result};

/// Append ad-hoc dependencies to a chart
///
/// Aliases must be unique among the new entries and must not shadow a
/// dependency the chart already declares. On conflict the chart is left
/// untouched.
pub fn merge_dependencies(chart: &mut ChartMetadata, adhoc: &[DependencySpec]) -> Result<()> {
    let mut taken: HashSet<&str> = chart
        .dependencies
        .iter()
        .map(|d| d.effective_name())
        .collect();

    for dep in adhoc {
        if !taken.insert(dep.alias.as_str()) {
            return Err(ChartifyError::DependencyConflict {
                alias: dep.alias.clone(),
            });
        }
    }

    for dep in adhoc {
        tracing::debug!(dependency = %dep, "adding ad-hoc dependency");
        chart.dependencies.push(dep.to_chart_dependency());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ChartMetadata {
        ChartMetadata::generated("app", None).unwrap()
    }

    fn dep(spec: &str) -> DependencySpec {
        spec.parse().unwrap()
    }

    #[test]
    fn test_merge_appends_entries() {
        let mut chart = chart();
        merge_dependencies(
            &mut chart,
            &[dep("db=stable/mysql:1.2.3"), dep("cache=https://charts.example.com/redis")],
        )
        .unwrap();

        assert_eq!(chart.dependencies.len(), 2);
        assert_eq!(chart.dependencies[0].name, "mysql");
        assert_eq!(chart.dependencies[0].alias.as_deref(), Some("db"));
        assert_eq!(chart.dependencies[0].repository.as_deref(), Some("@stable"));
        assert_eq!(chart.dependencies[1].version, "*");
    }

    #[test]
    fn test_duplicate_alias_is_conflict() {
        let mut chart = chart();
        let err = merge_dependencies(
            &mut chart,
            &[dep("db=stable/mysql:1.0.0"), dep("db=bitnami/postgresql:2.0.0")],
        )
        .unwrap_err();
        assert!(matches!(err, ChartifyError::DependencyConflict { alias } if alias == "db"));
        assert!(chart.dependencies.is_empty());
    }

    #[test]
    fn test_alias_clashing_with_existing_dependency() {
        let mut chart = chart();
        chart.dependencies.push(dep("redis=bitnami/redis:17.0.0").to_chart_dependency());
        chart.dependencies[0].alias = None;

        let err = merge_dependencies(&mut chart, &[dep("redis=stable/redis:1.0.0")]).unwrap_err();
        assert!(matches!(err, ChartifyError::DependencyConflict { .. }));
        assert_eq!(chart.dependencies.len(), 1);
    }
}
