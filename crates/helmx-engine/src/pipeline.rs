//! Ordered patch and injection pipeline

use std::path::Path;

use helmx_core::ManifestSet;

use crate::error::Result;
use crate::inject::run_injector;
use crate::options::Stage;
use crate::patch::PatchSpec;
use crate::runner::CommandRunner;

/// Runs stages in order, each one seeing the previous stage's output
pub struct Pipeline<'a> {
    stages: &'a [Stage],
    strict: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(stages: &'a [Stage], strict: bool) -> Self {
        Self { stages, strict }
    }

    /// Run every stage over `set`
    ///
    /// Injectors write their input files under `scratch`. The first failing
    /// stage aborts the run. The result is checked for duplicate identities.
    pub fn run(
        &self,
        set: ManifestSet,
        runner: &dyn CommandRunner,
        scratch: &Path,
    ) -> Result<ManifestSet> {
        // Patch files are read up front so a malformed one fails before any injector runs
        let patches = self
            .stages
            .iter()
            .filter_map(|stage| match stage {
                Stage::Patch(file) => Some(PatchSpec::load(file)),
                Stage::Inject(_) => None,
            })
            .collect::<Result<Vec<_>>>()?;
        let mut patches = patches.into_iter();

        let mut set = set;
        for (index, stage) in self.stages.iter().enumerate() {
            set = match stage {
                Stage::Inject(injector) => {
                    let dir = scratch.join(format!("stage-{index}"));
                    std::fs::create_dir_all(&dir)?;
                    tracing::debug!(stage = index, injector = %injector.program, "injecting");
                    run_injector(set, injector, runner, &dir)?
                }
                Stage::Patch(_) => match patches.next() {
                    Some(patch) => {
                        tracing::debug!(stage = index, patch = %patch.label(), "patching");
                        patch.apply(set, self.strict)?
                    }
                    None => set,
                },
            };
        }

        set.validate_unique()?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChartifyError;
    use crate::inject::InjectorSpec;
    use crate::options::PatchFile;
    use crate::runner::fake::{FakeRunner, stdout};
    use tempfile::TempDir;

    const MANIFESTS: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: slow
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;

    #[test]
    fn test_empty_pipeline_is_identity() {
        let tmp = TempDir::new().unwrap();
        let set = ManifestSet::parse(MANIFESTS, None).unwrap();
        let out = Pipeline::new(&[], false)
            .run(set.clone(), &FakeRunner::ok(), tmp.path())
            .unwrap();
        assert_eq!(out, set);
    }

    #[test]
    fn test_stages_apply_in_declaration_order() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first.yaml");
        let second = tmp.path().join("second.yaml");
        std::fs::write(
            &first,
            "target:\n  kind: ConfigMap\npatch:\n  - op: replace\n    path: /data/mode\n    value: fast\n",
        )
        .unwrap();
        std::fs::write(
            &second,
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  mode: fastest\n",
        )
        .unwrap();

        let stages = vec![
            Stage::Patch(PatchFile::json(&first)),
            Stage::Patch(PatchFile::strategic_merge(&second)),
        ];
        let set = ManifestSet::parse(MANIFESTS, None).unwrap();
        let out = Pipeline::new(&stages, true)
            .run(set, &FakeRunner::ok(), tmp.path())
            .unwrap();
        assert_eq!(
            out.documents()[0].body()["data"]["mode"],
            serde_yaml::Value::from("fastest")
        );
    }

    #[test]
    fn test_patch_sees_injector_output() {
        let tmp = TempDir::new().unwrap();
        let patch = tmp.path().join("p.yaml");
        std::fs::write(
            &patch,
            "target:\n  name: web-injected\npatch:\n  - op: add\n    path: /metadata/labels\n    value: {patched: \"yes\"}\n",
        )
        .unwrap();

        let runner = FakeRunner::new(|spec| {
            let body = std::fs::read_to_string(spec.args.last().unwrap()).unwrap();
            stdout(&body.replace("name: web", "name: web-injected"))
        });
        let stages = vec![
            Stage::Inject(InjectorSpec::parse("inject FILE").unwrap()),
            Stage::Patch(PatchFile::json(&patch)),
        ];

        let set = ManifestSet::parse(MANIFESTS, None).unwrap();
        let out = Pipeline::new(&stages, true)
            .run(set, &runner, tmp.path())
            .unwrap();
        let service = &out.documents()[1];
        assert_eq!(service.identity().name, "web-injected");
        assert_eq!(
            service.body()["metadata"]["labels"]["patched"],
            serde_yaml::Value::from("yes")
        );
    }

    #[test]
    fn test_duplicates_after_pipeline_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new(|_| {
            stdout("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: same\n")
        });
        let stages = vec![Stage::Inject(InjectorSpec::parse("inject FILE").unwrap())];

        let set = ManifestSet::parse(MANIFESTS, None).unwrap();
        let err = Pipeline::new(&stages, false)
            .run(set, &runner, tmp.path())
            .unwrap_err();
        assert!(matches!(err, ChartifyError::DuplicateDocument { .. }));
    }

    #[test]
    fn test_malformed_patch_aborts_before_injection() {
        let tmp = TempDir::new().unwrap();
        let patch = tmp.path().join("bad.yaml");
        std::fs::write(&patch, "patch: nope\n").unwrap();

        let runner = FakeRunner::ok();
        let stages = vec![
            Stage::Inject(InjectorSpec::parse("inject FILE").unwrap()),
            Stage::Patch(PatchFile::json(&patch)),
        ];
        let set = ManifestSet::parse(MANIFESTS, None).unwrap();
        let err = Pipeline::new(&stages, false)
            .run(set, &runner, tmp.path())
            .unwrap_err();
        assert!(matches!(err, ChartifyError::PipelineStage { .. }));
        assert!(runner.calls().is_empty());
    }
}
