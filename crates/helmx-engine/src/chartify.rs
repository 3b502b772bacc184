//! Source -> pipeline -> dependencies -> chart

use std::path::PathBuf;

use helmx_core::{ChartMetadata, ManifestSet};

use crate::dependency::merge_dependencies;
use crate::error::Result;
use crate::materialize::{ChartBody, materialize};
use crate::options::{ChartifyOptions, ValuesLayers};
use crate::pipeline::Pipeline;
use crate::runner::CommandRunner;
use crate::source::{ManifestSource, SourceContent, resolve};
use crate::workspace::Workspace;

/// A chart written into a workspace, ready for helm
#[derive(Debug)]
pub struct GeneratedChart {
    pub dir: PathBuf,
    pub metadata: ChartMetadata,
    pub values: ValuesLayers,
    /// Manifests written as templates; `None` when a chart was copied as-is
    pub manifests: Option<ManifestSet>,
    pub source: ManifestSource,
}

impl GeneratedChart {
    /// Whether helm has to fetch dependencies before using the chart
    pub fn needs_dependency_update(&self) -> bool {
        !self.metadata.dependencies.is_empty()
    }
}

/// Turns any supported source into a chart
pub struct Chartifier<'a> {
    opts: &'a ChartifyOptions,
    runner: &'a dyn CommandRunner,
}

impl<'a> Chartifier<'a> {
    pub fn new(opts: &'a ChartifyOptions, runner: &'a dyn CommandRunner) -> Self {
        Self { opts, runner }
    }

    /// Build a chart from `input` inside `workspace`
    ///
    /// Nothing is written to the chart directory unless every step before
    /// materialization succeeded.
    pub fn chartify(&self, input: &str, workspace: &Workspace) -> Result<GeneratedChart> {
        let resolved = resolve(input, self.opts, workspace, self.runner)?;
        let mut metadata = resolved.metadata;

        tracing::debug!(
            source = %resolved.source,
            injectors = self.opts.injectors().count(),
            patches = self.opts.patches().count(),
            "chartifying"
        );
        let pipeline = Pipeline::new(&self.opts.stages, self.opts.strict_patches);
        let scratch = workspace.scratch_dir("pipeline")?;

        let (manifests, rendered) = match resolved.content {
            SourceContent::Manifests(set) => (Some(pipeline.run(set, self.runner, &scratch)?), false),
            SourceContent::Rendered(set) => {
                // Subcharts are already part of the rendered output
                metadata.dependencies.clear();
                (Some(pipeline.run(set, self.runner, &scratch)?), true)
            }
            SourceContent::Chart => (None, false),
        };

        merge_dependencies(&mut metadata, &self.opts.dependencies)?;

        let body = match (&manifests, rendered) {
            (Some(set), true) => ChartBody::Rendered(set),
            (Some(set), false) => ChartBody::Generated(set),
            (None, _) => ChartBody::Copied,
        };
        let dir = workspace.chart_dir();
        materialize(&dir, &metadata, body)?;

        Ok(GeneratedChart {
            dir,
            metadata,
            values: self.opts.values.clone(),
            manifests,
            source: resolved.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChartifyError;
    use crate::inject::InjectorSpec;
    use crate::options::{PatchFile, Stage};
    use crate::runner::fake::{FakeRunner, stdout};
    use helmx_core::DEFAULT_CHART_VERSION;
    use tempfile::TempDir;

    const CONFIGMAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  mode: slow\n";
    const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";

    fn manifest_dir(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("manifests");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("a.yaml"), CONFIGMAP).unwrap();
        std::fs::write(dir.join("b.yaml"), SERVICE).unwrap();
        dir
    }

    fn local_chart(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("web");
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::create_dir_all(dir.join("charts/redis")).unwrap();
        std::fs::write(
            dir.join("Chart.yaml"),
            "apiVersion: v2\nname: web\nversion: 0.3.0\ndependencies:\n  - name: redis\n    version: 17.x\n    repository: https://charts.bitnami.com/bitnami\n",
        )
        .unwrap();
        std::fs::write(dir.join("values.yaml"), "replicas: 1\n").unwrap();
        std::fs::write(dir.join("templates/svc.yaml"), SERVICE).unwrap();
        dir
    }

    #[test]
    fn test_plain_directory_becomes_chart() {
        let tmp = TempDir::new().unwrap();
        let input = manifest_dir(&tmp);
        let patch = tmp.path().join("patch.yaml");
        std::fs::write(
            &patch,
            "target:\n  kind: ConfigMap\npatch:\n  - op: replace\n    path: /data/mode\n    value: fast\n",
        )
        .unwrap();

        let opts = ChartifyOptions {
            chart_version: Some("1.2.3".to_string()),
            stages: vec![Stage::Patch(PatchFile::json(&patch))],
            dependencies: vec!["db=stable/mysql:1.0.0".parse().unwrap()],
            ..Default::default()
        };
        let ws = Workspace::new(false).unwrap();
        let chart = Chartifier::new(&opts, &FakeRunner::ok())
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap();

        assert_eq!(chart.metadata.name, "manifests");
        assert_eq!(chart.metadata.version, "1.2.3");
        assert!(chart.needs_dependency_update());

        let templates = chart.dir.join("templates");
        let cm = std::fs::read_to_string(templates.join("000-configmap-settings.yaml")).unwrap();
        assert!(cm.contains("mode: fast"));
        assert!(templates.join("001-service-web.yaml").exists());

        let on_disk = ChartMetadata::load(&chart.dir).unwrap();
        assert_eq!(on_disk.dependencies[0].alias.as_deref(), Some("db"));
    }

    #[test]
    fn test_deployment_and_service_yield_two_templates() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("web");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(
            input.join("deployment.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 1\n",
        )
        .unwrap();
        std::fs::write(input.join("service.yaml"), SERVICE).unwrap();

        let ws = Workspace::new(false).unwrap();
        let chart = Chartifier::new(&ChartifyOptions::default(), &FakeRunner::ok())
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap();

        let templates: Vec<_> = std::fs::read_dir(chart.dir.join("templates"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(templates.len(), 2);

        let raw = std::fs::read_to_string(chart.dir.join("Chart.yaml")).unwrap();
        let chart_yaml: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(chart_yaml["apiVersion"].as_str(), Some("v2"));
        assert_eq!(chart_yaml["name"].as_str(), Some("web"));
        assert_eq!(chart_yaml["version"].as_str(), Some(DEFAULT_CHART_VERSION));
        assert_eq!(chart_yaml["appVersion"].as_str(), Some(DEFAULT_CHART_VERSION));
    }

    #[test]
    fn test_local_chart_without_pipeline_is_copied() {
        let tmp = TempDir::new().unwrap();
        let input = local_chart(&tmp);
        let runner = FakeRunner::ok();

        let ws = Workspace::new(false).unwrap();
        let chart = Chartifier::new(&ChartifyOptions::default(), &runner)
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap();

        assert!(chart.manifests.is_none());
        assert!(runner.calls().is_empty());
        assert!(chart.dir.join("templates/svc.yaml").exists());
        assert!(chart.dir.join("charts/redis").exists());
        assert_eq!(chart.metadata.dependencies.len(), 1);
    }

    #[test]
    fn test_local_chart_with_injector_is_rendered() {
        let tmp = TempDir::new().unwrap();
        let input = local_chart(&tmp);
        let runner = FakeRunner::new(|spec| match spec.args[0].as_str() {
            "template" => stdout(&format!("{CONFIGMAP}---\n{SERVICE}")),
            _ => stdout(&std::fs::read_to_string(spec.args.last().unwrap()).unwrap()),
        });

        let opts = ChartifyOptions {
            release_name: "web".to_string(),
            namespace: Some("prod".to_string()),
            stages: vec![Stage::Inject(InjectorSpec::parse("inject -f FILE").unwrap())],
            dependencies: vec!["db=stable/mysql".parse().unwrap()],
            ..Default::default()
        };
        let ws = Workspace::new(false).unwrap();
        let chart = Chartifier::new(&opts, &runner)
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap();

        assert_eq!(chart.manifests.as_ref().unwrap().len(), 2);
        assert!(!chart.dir.join("charts").exists());
        assert!(!chart.dir.join("templates/svc.yaml").exists());
        assert!(chart.dir.join("values.yaml").exists());

        let names: Vec<_> = chart.metadata.dependencies.iter().map(|d| d.effective_name()).collect();
        assert_eq!(names, vec!["db"]);

        let template = &runner.calls()[0];
        assert!(template.args.contains(&"--dependency-update".to_string()));
        assert!(template.args.contains(&"prod".to_string()));
    }

    #[test]
    fn test_failed_stage_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let input = manifest_dir(&tmp);
        let patch = tmp.path().join("patch.yaml");
        std::fs::write(
            &patch,
            "target:\n  kind: Secret\npatch:\n  - op: remove\n    path: /data\n",
        )
        .unwrap();

        let opts = ChartifyOptions {
            stages: vec![Stage::Patch(PatchFile::json(&patch))],
            strict_patches: true,
            ..Default::default()
        };
        let ws = Workspace::new(false).unwrap();
        let err = Chartifier::new(&opts, &FakeRunner::ok())
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap_err();

        assert!(matches!(err, ChartifyError::PipelineStage { .. }));
        assert!(!ws.chart_dir().join("Chart.yaml").exists());
    }

    #[test]
    fn test_dependency_conflict_with_chart_dependency() {
        let tmp = TempDir::new().unwrap();
        let input = local_chart(&tmp);
        let opts = ChartifyOptions {
            dependencies: vec!["redis=stable/redis:1.0.0".parse().unwrap()],
            ..Default::default()
        };
        let ws = Workspace::new(false).unwrap();
        let err = Chartifier::new(&opts, &FakeRunner::ok())
            .chartify(input.to_str().unwrap(), &ws)
            .unwrap_err();
        assert!(matches!(err, ChartifyError::DependencyConflict { .. }));
    }

    #[test]
    fn test_unknown_input() {
        let ws = Workspace::new(false).unwrap();
        let err = Chartifier::new(&ChartifyOptions::default(), &FakeRunner::ok())
            .chartify("not a chart", &ws)
            .unwrap_err();
        assert!(matches!(err, ChartifyError::SourceResolution { .. }));
        assert!(!ws.chart_dir().exists());
    }
}
