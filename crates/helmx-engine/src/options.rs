//! Immutable per-invocation options

use std::path::PathBuf;

use helmx_core::DependencySpec;

use crate::inject::InjectorSpec;

/// Release name used by `template` when none is given
pub const DEFAULT_RELEASE_NAME: &str = "release-name";

/// Values files followed by `--set` / `--set-string` overrides, in that order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuesLayers {
    pub files: Vec<PathBuf>,
    pub set: Vec<String>,
    pub set_string: Vec<String>,
}

impl ValuesLayers {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.set.is_empty() && self.set_string.is_empty()
    }

    /// Flags passed to `helm template` / `helm upgrade`
    pub fn to_helm_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for file in &self.files {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        for set in &self.set {
            args.push("--set".to_string());
            args.push(set.clone());
        }
        for set in &self.set_string {
            args.push("--set-string".to_string());
            args.push(set.clone());
        }
        args
    }
}

/// Which patch format a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Json,
    StrategicMerge,
}

impl PatchKind {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Json => "json-patch",
            Self::StrategicMerge => "strategic-merge-patch",
        }
    }
}

/// A patch file given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    pub kind: PatchKind,
    pub path: PathBuf,
}

impl PatchFile {
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: PatchKind::Json,
            path: path.into(),
        }
    }

    pub fn strategic_merge(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: PatchKind::StrategicMerge,
            path: path.into(),
        }
    }
}

/// One step of the patch and injection pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Inject(InjectorSpec),
    Patch(PatchFile),
}

/// External binaries the engine shells out to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    pub helm: String,
    pub kustomize: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            helm: "helm".to_string(),
            kustomize: "kustomize".to_string(),
        }
    }
}

/// Everything one chartify call needs, built once from the command line
#[derive(Debug, Clone, Default)]
pub struct ChartifyOptions {
    pub release_name: String,
    pub namespace: Option<String>,
    /// Version of the remote chart to fetch, and of the generated chart
    pub chart_version: Option<String>,
    /// Repository URL for remote chart references
    pub repository: Option<String>,
    pub values: ValuesLayers,
    /// Injectors and patches, in declaration order
    pub stages: Vec<Stage>,
    pub dependencies: Vec<DependencySpec>,
    pub strict_patches: bool,
    pub retain_workspace: bool,
    pub include_crds: bool,
    pub kube_context: Option<String>,
    pub binaries: Binaries,
}

impl ChartifyOptions {
    /// Release name, falling back to [`DEFAULT_RELEASE_NAME`]
    pub fn release_name(&self) -> &str {
        if self.release_name.is_empty() {
            DEFAULT_RELEASE_NAME
        } else {
            &self.release_name
        }
    }

    pub fn has_pipeline(&self) -> bool {
        !self.stages.is_empty()
    }

    pub fn injectors(&self) -> impl Iterator<Item = &InjectorSpec> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Inject(injector) => Some(injector),
            Stage::Patch(_) => None,
        })
    }

    pub fn patches(&self) -> impl Iterator<Item = &PatchFile> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Patch(patch) => Some(patch),
            Stage::Inject(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_layers_order() {
        let layers = ValuesLayers {
            files: vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")],
            set: vec!["x=1".to_string()],
            set_string: vec!["y=2".to_string()],
        };
        assert_eq!(
            layers.to_helm_args(),
            vec!["-f", "a.yaml", "-f", "b.yaml", "--set", "x=1", "--set-string", "y=2"]
        );
    }

    #[test]
    fn test_stages_keep_interleaving() {
        let inject = InjectorSpec::parse("istioctl kube-inject -f FILE").unwrap();
        let opts = ChartifyOptions {
            stages: vec![
                Stage::Patch(PatchFile::json("j.yaml")),
                Stage::Inject(inject.clone()),
                Stage::Patch(PatchFile::strategic_merge("s.yaml")),
            ],
            ..Default::default()
        };
        assert!(opts.has_pipeline());
        assert_eq!(opts.injectors().collect::<Vec<_>>(), vec![&inject]);
        assert_eq!(
            opts.patches().cloned().collect::<Vec<_>>(),
            vec![PatchFile::json("j.yaml"), PatchFile::strategic_merge("s.yaml")]
        );
        assert!(matches!(opts.stages[1], Stage::Inject(_)));
        assert!(!ChartifyOptions::default().has_pipeline());
    }

    #[test]
    fn test_default_release_name() {
        assert_eq!(ChartifyOptions::default().release_name(), DEFAULT_RELEASE_NAME);
    }
}
