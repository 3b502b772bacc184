//! Manifest source resolution
//!
//! An input is inspected once and classified as a plain manifest directory, a
//! kustomize overlay, a local chart or a remote chart reference. Resolving
//! it yields the chart metadata plus either a manifest set or a chart copied
//! into the workspace.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use helmx_core::chart::CHART_FILE;
use helmx_core::{ChartMetadata, ManifestSet};

use crate::error::{ChartifyError, Result};
use crate::helm::{Helm, Kustomize, PullRequest, TemplateRequest};
use crate::options::ChartifyOptions;
use crate::runner::CommandRunner;
use crate::workspace::Workspace;

/// Files marking a directory as a kustomize overlay
pub const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

static CHART_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("static regex is valid")
});

static CHART_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex is valid"));

/// Coordinates of a chart held in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    /// `stable/mysql`, `oci://registry/charts/app` or a bare name used with `--repo`
    pub reference: String,
    pub repository: Option<String>,
    pub version: Option<String>,
}

impl ChartRef {
    /// Name of the chart, the last path segment of the reference
    pub fn name(&self) -> &str {
        self.reference
            .rsplit('/')
            .next()
            .unwrap_or(&self.reference)
    }

    /// Content address of this reference in the chart cache
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repository.as_deref().unwrap_or_default());
        hasher.update([0u8]);
        hasher.update(&self.reference);
        hasher.update([0u8]);
        hasher.update(self.version.as_deref().unwrap_or_default());
        hex::encode(hasher.finalize())
    }
}

/// Where manifests come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    PlainDirectory { path: PathBuf },
    KustomizeOverlay { path: PathBuf },
    LocalChart { path: PathBuf },
    RemoteChartRef { chart: ChartRef },
}

impl ManifestSource {
    /// Classify an input
    ///
    /// `Chart.yaml` wins over a kustomization file. Anything that is not an
    /// existing path must look like `REPO/CHART` or a chart URL; a bare chart
    /// name is accepted when a repository URL is given.
    pub fn detect(input: &str, opts: &ChartifyOptions) -> Result<Self> {
        let path = Path::new(input);

        if path.exists() {
            if !path.is_dir() {
                return Err(ChartifyError::SourceResolution {
                    input: input.to_string(),
                    variant: "a directory".to_string(),
                    missing: "a directory, got a file".to_string(),
                });
            }
            let path = path.canonicalize()?;

            return Ok(if path.join(CHART_FILE).is_file() {
                Self::LocalChart { path }
            } else if KUSTOMIZATION_FILES.iter().any(|f| path.join(f).is_file()) {
                Self::KustomizeOverlay { path }
            } else {
                Self::PlainDirectory { path }
            });
        }

        let is_url = ["oci://", "https://", "http://"]
            .iter()
            .any(|scheme| input.starts_with(scheme));
        if is_url
            || CHART_REF.is_match(input)
            || (opts.repository.is_some() && CHART_NAME.is_match(input))
        {
            return Ok(Self::RemoteChartRef {
                chart: ChartRef {
                    reference: input.to_string(),
                    repository: opts.repository.clone(),
                    version: opts.chart_version.clone(),
                },
            });
        }

        Err(ChartifyError::SourceResolution {
            input: input.to_string(),
            variant: "a local path or chart reference".to_string(),
            missing: "an existing directory or a REPO/CHART reference".to_string(),
        })
    }

    pub fn variant(&self) -> &'static str {
        match self {
            Self::PlainDirectory { .. } => "plain directory",
            Self::KustomizeOverlay { .. } => "kustomize overlay",
            Self::LocalChart { .. } => "local chart",
            Self::RemoteChartRef { .. } => "remote chart",
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainDirectory { path }
            | Self::KustomizeOverlay { path }
            | Self::LocalChart { path } => write!(f, "{} {}", self.variant(), path.display()),
            Self::RemoteChartRef { chart } => write!(f, "{} {}", self.variant(), chart.reference),
        }
    }
}

/// What resolution produced
#[derive(Debug)]
pub enum SourceContent {
    /// Manifests for a generated chart
    Manifests(ManifestSet),
    /// A chart copied into the workspace and rendered; its templates are
    /// replaced by these manifests
    Rendered(ManifestSet),
    /// A chart copied into the workspace, kept as-is
    Chart,
}

impl SourceContent {
    pub fn manifests(&self) -> Option<&ManifestSet> {
        match self {
            Self::Manifests(set) | Self::Rendered(set) => Some(set),
            Self::Chart => None,
        }
    }
}

/// A source resolved into chart metadata and content
#[derive(Debug)]
pub struct ResolvedSource {
    pub source: ManifestSource,
    /// Absolute location of the source after any fetch
    pub origin: PathBuf,
    pub metadata: ChartMetadata,
    pub content: SourceContent,
}

/// Resolve `input` into chart metadata and content
pub fn resolve(
    input: &str,
    opts: &ChartifyOptions,
    workspace: &Workspace,
    runner: &dyn CommandRunner,
) -> Result<ResolvedSource> {
    let source = ManifestSource::detect(input, opts)?;
    tracing::debug!(%source, "resolved source");

    match &source {
        ManifestSource::PlainDirectory { path } => {
            let manifests = read_manifest_dir(path)?;
            let metadata = generated_metadata(path, opts)?;
            Ok(ResolvedSource {
                origin: path.clone(),
                source,
                metadata,
                content: SourceContent::Manifests(manifests),
            })
        }
        ManifestSource::KustomizeOverlay { path } => {
            let stream = Kustomize::new(&opts.binaries.kustomize, runner).build(path)?;
            let manifests = ManifestSet::parse(&stream, Some("kustomize build"))?;
            let metadata = generated_metadata(path, opts)?;
            Ok(ResolvedSource {
                origin: path.clone(),
                source,
                metadata,
                content: SourceContent::Manifests(manifests),
            })
        }
        ManifestSource::LocalChart { path } => {
            let path = path.clone();
            resolve_chart(source, path, opts, workspace, runner)
        }
        ManifestSource::RemoteChartRef { chart } => {
            let path = fetch_chart(chart, opts, workspace, runner)?;
            resolve_chart(source, path, opts, workspace, runner)
        }
    }
}

fn resolve_chart(
    source: ManifestSource,
    origin: PathBuf,
    opts: &ChartifyOptions,
    workspace: &Workspace,
    runner: &dyn CommandRunner,
) -> Result<ResolvedSource> {
    let chart_dir = workspace.chart_dir();
    copy_dir(&origin, &chart_dir)?;
    let metadata = ChartMetadata::load(&chart_dir)?;

    let content = if opts.has_pipeline() {
        let helm = Helm::new(&opts.binaries.helm, runner);
        let stream = helm.template(&TemplateRequest {
            release: opts.release_name(),
            chart: &chart_dir,
            namespace: opts.namespace.as_deref(),
            values: Some(&opts.values),
            include_crds: opts.include_crds,
            dependency_update: !metadata.dependencies.is_empty(),
            kube_context: opts.kube_context.as_deref(),
        })?;
        SourceContent::Rendered(ManifestSet::parse(&stream, Some("helm template"))?)
    } else {
        SourceContent::Chart
    };

    Ok(ResolvedSource {
        source,
        origin,
        metadata,
        content,
    })
}

/// Chart.yaml for a chart synthesized from a directory
fn generated_metadata(dir: &Path, opts: &ChartifyOptions) -> Result<ChartMetadata> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ChartMetadata::generated(&name, opts.chart_version.as_deref())?)
}

/// Parse every top-level manifest file of a directory, in file name order
pub fn read_manifest_dir(dir: &Path) -> Result<ManifestSet> {
    let mut manifests = ManifestSet::new();
    let mut files = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let is_manifest = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext));
        if !is_manifest {
            continue;
        }

        let label = entry.file_name().to_string_lossy().into_owned();
        let content = std::fs::read_to_string(entry.path())?;
        manifests.extend(ManifestSet::parse(&content, Some(&label))?);
        files += 1;
    }

    if files == 0 {
        return Err(ChartifyError::SourceResolution {
            input: dir.display().to_string(),
            variant: "plain directory".to_string(),
            missing: "*.yaml manifests".to_string(),
        });
    }

    Ok(manifests)
}

/// Fetch a remote chart, reusing the cache for pinned versions
fn fetch_chart(
    chart: &ChartRef,
    opts: &ChartifyOptions,
    workspace: &Workspace,
    runner: &dyn CommandRunner,
) -> Result<PathBuf> {
    let cache_root = dirs::cache_dir().map(|d| d.join("helm-x").join("charts"));
    fetch_chart_with_cache(chart, opts, workspace, runner, cache_root.as_deref())
}

fn fetch_chart_with_cache(
    chart: &ChartRef,
    opts: &ChartifyOptions,
    workspace: &Workspace,
    runner: &dyn CommandRunner,
    cache_root: Option<&Path>,
) -> Result<PathBuf> {
    // Only pinned versions are ever read back from the cache
    let cache_dir = cache_root
        .filter(|_| chart.version.is_some())
        .map(|root| root.join(chart.cache_key()));

    if let Some(found) = cache_dir.as_deref().and_then(find_chart_dir) {
        tracing::debug!(chart = %chart.reference, path = %found.display(), "using cached chart");
        return Ok(found);
    }

    // Pulls land in the workspace; the shared cache only ever sees complete charts
    let dest = workspace.scratch_dir("fetch")?;
    Helm::new(&opts.binaries.helm, runner).pull(&PullRequest {
        reference: &chart.reference,
        dest: &dest,
        version: chart.version.as_deref(),
        repo_url: chart.repository.as_deref(),
    })?;

    let found = find_chart_dir(&dest).ok_or_else(|| ChartifyError::SourceResolution {
        input: chart.reference.clone(),
        variant: "remote chart".to_string(),
        missing: format!("{} in the fetched archive", CHART_FILE),
    })?;

    if let Some(cache_dir) = &cache_dir
        && let Err(e) = publish_to_cache(&found, cache_dir)
    {
        tracing::warn!(chart = %chart.reference, error = %e, "could not cache chart");
    }
    Ok(found)
}

/// Copy `chart` into `cache_dir` through a staging directory and a rename
///
/// Readers see either no entry or a complete one. When another run
/// published the same entry first, its copy is kept.
fn publish_to_cache(chart: &Path, cache_dir: &Path) -> Result<()> {
    let Some(root) = cache_dir.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(root)?;

    let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(root)?;
    let name = chart.file_name().unwrap_or_else(|| OsStr::new("chart"));
    let entry = staging.path().join("entry");
    copy_dir(chart, &entry.join(name))?;

    match std::fs::rename(&entry, cache_dir) {
        Ok(()) => {
            tracing::debug!(path = %cache_dir.display(), "cached chart");
            Ok(())
        }
        Err(_) if find_chart_dir(cache_dir).is_some() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// First directory directly below `dir` holding a Chart.yaml
fn find_chart_dir(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(CHART_FILE).is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Recursively copy a directory
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    let materialize = |path: &Path, source: std::io::Error| ChartifyError::Materialization {
        path: path.to_path_buf(),
        source,
    };

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| materialize(&target, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| materialize(&target, e))?;
        }
    }
    Ok(())
}
