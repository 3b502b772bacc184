//! CLI commands and the flags they share

pub mod adopt;
pub mod apply;
pub mod diff;
pub mod dump;
pub mod template;

use clap::{ArgMatches, Args};
use console::style;
use helmx_core::DependencySpec;
use helmx_engine::{
    Binaries, Chartifier, ChartifyOptions, GeneratedChart, Helm, InjectorSpec, PatchFile,
    ProcessRunner, Stage, TemplateRequest, ValuesLayers, Workspace,
};
use helmx_kube::{ClientOptions, DriverKind};
use std::path::PathBuf;

use crate::error::{CliError, Result};
use crate::interrupt;

/// Flags describing the chart source and how to turn it into a chart
#[derive(Args, Debug, Clone, Default)]
pub struct ChartArgs {
    /// Namespace to render for and install into
    #[arg(short, long, env = "HELM_NAMESPACE")]
    pub namespace: Option<String>,

    /// Values file(s) passed to helm
    #[arg(short = 'f', long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Set values on command line (key=value)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Set string values on command line (key=value)
    #[arg(long = "set-string", value_name = "KEY=VALUE")]
    pub set_string: Vec<String>,

    /// Chart version to fetch, or to give a generated chart
    #[arg(long = "version", value_name = "VERSION")]
    pub chart_version: Option<String>,

    /// Chart repository URL for a bare chart name
    #[arg(long)]
    pub repo: Option<String>,

    /// Injector command; FILE is replaced by each manifest's path
    #[arg(long = "inject", value_name = "COMMAND")]
    pub inject: Vec<String>,

    /// Injector in comma form: CMD,flag=value,flag
    #[arg(long = "injector", value_name = "CMD,K=V,...")]
    pub injector: Vec<String>,

    /// JSON Patch file with targets
    #[arg(long = "json-patch", value_name = "FILE")]
    pub json_patch: Vec<PathBuf>,

    /// Strategic merge patch file
    #[arg(long = "strategic-merge-patch", value_name = "FILE")]
    pub strategic_merge_patch: Vec<PathBuf>,

    /// Extra chart dependency: ALIAS=REPO/CHART[:VERSION]
    #[arg(long = "adhoc-dependency", value_name = "SPEC")]
    pub adhoc_dependency: Vec<String>,

    /// Fail when a patch matches no document
    #[arg(long)]
    pub strict_patches: bool,

    /// Include CRDs in rendered output
    #[arg(long)]
    pub include_crds: bool,

    /// helm binary
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    pub helm_bin: String,

    /// kustomize binary
    #[arg(long, env = "KUSTOMIZE_BIN", default_value = "kustomize")]
    pub kustomize_bin: String,
}

/// Flags for reaching the cluster
#[derive(Args, Debug, Clone, Default)]
pub struct ClientArgs {
    /// Kubeconfig context to use
    #[arg(long = "kube-context", alias = "kubecontext", env = "HELM_KUBECONTEXT")]
    pub kube_context: Option<String>,

    /// Release storage: secret or configmap
    #[arg(long, env = "HELM_DRIVER", default_value = "secret")]
    pub driver: DriverKind,
}

impl ClientArgs {
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            kube_context: self.kube_context.clone(),
            driver: self.driver,
        }
    }

    /// `explicit`, else the namespace of the kubeconfig context
    pub fn namespace(&self, explicit: Option<&str>) -> Result<String> {
        let options = self.options();
        Ok(runtime()?.block_on(options.resolve_namespace(explicit))?)
    }
}

/// Namespace of offline output when none is given
pub const DEFAULT_NAMESPACE: &str = "default";

impl ChartArgs {
    /// Convert flags into engine options
    ///
    /// `matches` are the subcommand's matches; they give the command-line
    /// positions used to keep injectors and patches in declaration order.
    pub fn chartify_options(
        &self,
        release_name: &str,
        kube_context: Option<&str>,
        matches: &ArgMatches,
        debug: bool,
    ) -> Result<ChartifyOptions> {
        let mut stages: Vec<(usize, Stage)> = Vec::new();
        for (index, raw) in with_indices(matches, "inject", &self.inject) {
            stages.push((index, Stage::Inject(InjectorSpec::parse(raw)?)));
        }
        for (index, raw) in with_indices(matches, "injector", &self.injector) {
            stages.push((index, Stage::Inject(InjectorSpec::parse_legacy(raw)?)));
        }
        for (index, path) in with_indices(matches, "json_patch", &self.json_patch) {
            stages.push((index, Stage::Patch(PatchFile::json(path))));
        }
        for (index, path) in
            with_indices(matches, "strategic_merge_patch", &self.strategic_merge_patch)
        {
            stages.push((index, Stage::Patch(PatchFile::strategic_merge(path))));
        }
        // Stable sort keeps flag-local order when indices are unavailable
        stages.sort_by_key(|(index, _)| *index);
        let stages = stages.into_iter().map(|(_, stage)| stage).collect();

        let dependencies = self
            .adhoc_dependency
            .iter()
            .map(|raw| raw.parse::<DependencySpec>())
            .collect::<helmx_core::Result<Vec<_>>>()?;

        Ok(ChartifyOptions {
            release_name: release_name.to_string(),
            namespace: self.namespace.clone(),
            chart_version: self.chart_version.clone(),
            repository: self.repo.clone(),
            values: self.values_layers(),
            stages,
            dependencies,
            strict_patches: self.strict_patches,
            retain_workspace: debug,
            include_crds: self.include_crds,
            kube_context: kube_context.map(str::to_string),
            binaries: Binaries {
                helm: self.helm_bin.clone(),
                kustomize: self.kustomize_bin.clone(),
            },
        })
    }

    pub fn values_layers(&self) -> ValuesLayers {
        ValuesLayers {
            files: self.values.clone(),
            set: self.set.clone(),
            set_string: self.set_string.clone(),
        }
    }

    /// Namespace for output rendered without a cluster
    pub fn offline_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Pair each value of a repeated flag with its position on the command line
fn with_indices<'a, T>(matches: &ArgMatches, id: &str, values: &'a [T]) -> Vec<(usize, &'a T)> {
    let indices: Vec<usize> = matches
        .indices_of(id)
        .map(|i| i.collect())
        .unwrap_or_default();
    values
        .iter()
        .enumerate()
        .map(|(position, value)| (indices.get(position).copied().unwrap_or(usize::MAX), value))
        .collect()
}

/// A chart built for one command, with its workspace kept alive
pub struct Prepared {
    pub chart: GeneratedChart,
    pub options: ChartifyOptions,
    // Field order matters: the registration is cleared before the workspace is removed
    _registration: interrupt::Registration,
    _workspace: Workspace,
}

/// Chartify `input` inside a fresh workspace
pub fn prepare(input: &str, options: ChartifyOptions) -> Result<Prepared> {
    let workspace = Workspace::new(options.retain_workspace)?;
    let registration = interrupt::register(workspace.path());

    eprintln!(
        "{} Preparing chart from {}",
        style("→").blue().bold(),
        style(input).cyan()
    );
    let chart = Chartifier::new(&options, &ProcessRunner).chartify(input, &workspace)?;
    tracing::debug!(
        dir = %chart.dir.display(),
        chart = %chart.metadata.name,
        source = %chart.source,
        "chart ready"
    );
    if workspace.is_retained() {
        eprintln!(
            "{} Generated chart kept at {}",
            style("DEBUG").dim(),
            chart.dir.display()
        );
    }

    Ok(Prepared {
        chart,
        options,
        _registration: registration,
        _workspace: workspace,
    })
}

impl Prepared {
    /// Render the chart with `helm template`
    pub fn render(&self) -> Result<String> {
        let helm = Helm::new(&self.options.binaries.helm, &ProcessRunner);
        let rendered = helm.template(&TemplateRequest {
            release: self.options.release_name(),
            chart: &self.chart.dir,
            namespace: self.options.namespace.as_deref(),
            values: Some(&self.chart.values),
            include_crds: self.options.include_crds,
            dependency_update: self.chart.needs_dependency_update(),
            kube_context: self.options.kube_context.as_deref(),
        })?;
        Ok(rendered)
    }
}

/// Runtime for the commands that talk to the cluster
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| CliError::Other {
        message: format!("failed to start async runtime: {}", e),
    })
}
