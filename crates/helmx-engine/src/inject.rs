//! Sidecar injectors
//!
//! An injector is an external command (typically `istioctl kube-inject`)
//! run once per manifest file. The token `FILE` in its arguments is replaced
//! with the file path and its stdout replaces the document.

use std::num::NonZeroUsize;
use std::path::Path;

use helmx_core::{ManifestDocument, ManifestSet};

use crate::error::{ChartifyError, Result};
use crate::runner::{CommandRunner, CommandSpec, run_checked};

/// Placeholder substituted with the manifest path
pub const FILE_TOKEN: &str = "FILE";

/// A parsed injector command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl InjectorSpec {
    /// Parse the `--inject "istioctl kube-inject -f FILE"` form
    pub fn parse(command: &str) -> Result<Self> {
        let words = shell_words::split(command).map_err(|e| invalid(command, e))?;
        Self::from_words(command, words)
    }

    /// Parse the legacy `--injector "istioctl kube-inject f=FILE,k=v"` form
    ///
    /// The first comma segment holds the command and subcommand, optionally
    /// followed by the first flag (`kube-inject f=FILE`). Every `k=v` becomes
    /// `--k v` and a bare segment after the first becomes `--word`.
    pub fn parse_legacy(command: &str) -> Result<Self> {
        let mut segments = command.split(',');
        let head = segments.next().unwrap_or_default();
        let head_words = shell_words::split(head).map_err(|e| invalid(command, e))?;

        let mut words = Vec::with_capacity(head_words.len());
        for (index, word) in head_words.into_iter().enumerate() {
            match word.split_once('=') {
                Some((key, value)) if index > 0 && !key.is_empty() => {
                    push_flag(&mut words, key, Some(value))
                }
                _ => words.push(word),
            }
        }

        for segment in segments.map(str::trim).filter(|s| !s.is_empty()) {
            match segment.split_once('=') {
                Some((key, value)) => push_flag(&mut words, key, Some(value)),
                None => push_flag(&mut words, segment, None),
            }
        }

        Self::from_words(command, words)
    }

    fn from_words(command: &str, mut words: Vec<String>) -> Result<Self> {
        if words.is_empty() {
            return Err(invalid(command, "empty injector command"));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// Command line for one manifest file
    pub fn command_for(&self, file: &Path) -> CommandSpec {
        let path = file.display().to_string();
        CommandSpec::new(&self.program).args(self.args.iter().map(|a| a.replace(FILE_TOKEN, &path)))
    }

    /// Human-readable stage label
    pub fn label(&self) -> String {
        format!("inject `{}`", self.program)
    }
}

fn invalid(command: &str, cause: impl ToString) -> ChartifyError {
    ChartifyError::stage(format!("inject `{}`", command), None, cause)
}

fn push_flag(words: &mut Vec<String>, key: &str, value: Option<&str>) {
    words.push(format!("--{}", key.trim_start_matches('-')));
    if let Some(value) = value {
        words.push(value.to_string());
    }
}

/// Run one injector over every document of a set
///
/// Each document is written to its own file under `scratch`; the injector
/// runs on the files concurrently and the output of each run replaces the
/// corresponding document in place.
pub fn run_injector(
    set: ManifestSet,
    injector: &InjectorSpec,
    runner: &dyn CommandRunner,
    scratch: &Path,
) -> Result<ManifestSet> {
    let documents = set.into_documents();
    if documents.is_empty() {
        return Ok(ManifestSet::new());
    }

    let mut files = Vec::with_capacity(documents.len());
    for (index, doc) in documents.iter().enumerate() {
        let path = scratch.join(doc.file_name(index));
        std::fs::write(&path, doc.to_yaml()?)?;
        files.push(path);
    }

    let workers = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(files.len());
    let chunk_size = files.len().div_ceil(workers);
    tracing::debug!(
        injector = %injector.program,
        files = files.len(),
        workers,
        "running injector"
    );

    let outputs: Vec<Result<ManifestSet>> = std::thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|file| inject_file(injector, runner, file))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(_) => vec![Err(ChartifyError::stage(
                    injector.label(),
                    None,
                    "injector worker panicked",
                ))],
            })
            .collect()
    });

    let mut injected = ManifestSet::new();
    for (doc, output) in documents.iter().zip(outputs) {
        let output = output.map_err(|e| attach_document(e, doc))?;
        injected.extend(output);
    }
    Ok(injected)
}

fn inject_file(injector: &InjectorSpec, runner: &dyn CommandRunner, file: &Path) -> Result<ManifestSet> {
    let spec = injector.command_for(file);
    let output = run_checked(runner, &spec)
        .map_err(|e| ChartifyError::stage(injector.label(), None, e))?;

    let set = ManifestSet::parse(&output.stdout, Some(&file.display().to_string()))
        .map_err(|e| ChartifyError::stage(injector.label(), None, format!("unparsable output: {}", e)))?;
    if set.is_empty() {
        return Err(ChartifyError::stage(
            injector.label(),
            None,
            "injector produced no documents",
        ));
    }
    Ok(set)
}

fn attach_document(err: ChartifyError, doc: &ManifestDocument) -> ChartifyError {
    match err {
        ChartifyError::PipelineStage {
            stage,
            document: None,
            cause,
        } => ChartifyError::PipelineStage {
            stage,
            document: Some(doc.identity().to_string()),
            cause,
        },
        other => other,
    }
}
