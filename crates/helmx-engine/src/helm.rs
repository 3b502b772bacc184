//! helm and kustomize command lines

use std::path::Path;

use crate::error::Result;
use crate::options::ValuesLayers;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, run_checked};

/// Arguments of a `helm template` call
#[derive(Debug, Clone)]
pub struct TemplateRequest<'a> {
    pub release: &'a str,
    pub chart: &'a Path,
    pub namespace: Option<&'a str>,
    pub values: Option<&'a ValuesLayers>,
    pub include_crds: bool,
    pub dependency_update: bool,
    pub kube_context: Option<&'a str>,
}

/// Arguments of a `helm upgrade` call
#[derive(Debug, Clone)]
pub struct UpgradeRequest<'a> {
    pub release: &'a str,
    pub chart: &'a Path,
    pub namespace: Option<&'a str>,
    pub values: &'a ValuesLayers,
    pub install: bool,
    pub dry_run: bool,
    pub timeout_secs: u64,
    pub dependency_update: bool,
    pub kube_context: Option<&'a str>,
}

/// Arguments of a `helm pull` call
#[derive(Debug, Clone)]
pub struct PullRequest<'a> {
    pub reference: &'a str,
    pub dest: &'a Path,
    pub version: Option<&'a str>,
    pub repo_url: Option<&'a str>,
}

/// The helm binary
pub struct Helm<'a> {
    bin: &'a str,
    runner: &'a dyn CommandRunner,
}

impl<'a> Helm<'a> {
    pub fn new(bin: &'a str, runner: &'a dyn CommandRunner) -> Self {
        Self { bin, runner }
    }

    pub fn template_command(&self, req: &TemplateRequest<'_>) -> CommandSpec {
        CommandSpec::new(self.bin)
            .arg("template")
            .arg(req.release)
            .arg(req.chart.display().to_string())
            .opt("--namespace", req.namespace)
            .args(req.values.map(ValuesLayers::to_helm_args).unwrap_or_default())
            .flag("--include-crds", req.include_crds)
            .flag("--dependency-update", req.dependency_update)
            .opt("--kube-context", req.kube_context)
    }

    /// Render a chart, returning the manifest stream
    pub fn template(&self, req: &TemplateRequest<'_>) -> Result<String> {
        Ok(run_checked(self.runner, &self.template_command(req))?.stdout)
    }

    pub fn upgrade_command(&self, req: &UpgradeRequest<'_>) -> CommandSpec {
        CommandSpec::new(self.bin)
            .arg("upgrade")
            .arg(req.release)
            .arg(req.chart.display().to_string())
            .flag("--install", req.install)
            .opt("--namespace", req.namespace)
            .arg("--timeout")
            .arg(format!("{}s", req.timeout_secs))
            .flag("--dry-run", req.dry_run)
            .args(req.values.to_helm_args())
            .flag("--dependency-update", req.dependency_update)
            .opt("--kube-context", req.kube_context)
    }

    /// Install or upgrade a release; the output is helm's transcript
    pub fn upgrade(&self, req: &UpgradeRequest<'_>) -> Result<CommandOutput> {
        run_checked(self.runner, &self.upgrade_command(req))
    }

    pub fn pull_command(&self, req: &PullRequest<'_>) -> CommandSpec {
        CommandSpec::new(self.bin)
            .arg("pull")
            .arg(req.reference)
            .arg("--untar")
            .arg("--untardir")
            .arg(req.dest.display().to_string())
            .opt("--version", req.version)
            .opt("--repo", req.repo_url)
    }

    /// Fetch and unpack a chart into `dest`
    pub fn pull(&self, req: &PullRequest<'_>) -> Result<()> {
        run_checked(self.runner, &self.pull_command(req))?;
        Ok(())
    }
}

/// The kustomize binary
pub struct Kustomize<'a> {
    bin: &'a str,
    runner: &'a dyn CommandRunner,
}

impl<'a> Kustomize<'a> {
    pub fn new(bin: &'a str, runner: &'a dyn CommandRunner) -> Self {
        Self { bin, runner }
    }

    /// `kustomize build .` inside the overlay directory
    pub fn build(&self, overlay: &Path) -> Result<String> {
        let spec = CommandSpec::new(self.bin)
            .arg("build")
            .arg(".")
            .current_dir(overlay);
        Ok(run_checked(self.runner, &spec)?.stdout)
    }
}
