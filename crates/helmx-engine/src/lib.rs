//! helm-x Engine - turn manifests, kustomizations and charts into a Helm chart
//!
//! The engine resolves an input into one of four sources, runs the ordered
//! injector/patch pipeline over its manifests, merges ad-hoc dependencies and
//! writes the result as a chart inside a temporary [`Workspace`].
//!
//! Every external program (helm, kustomize, injectors) is reached through
//! [`CommandRunner`].

pub mod chartify;
pub mod dependency;
pub mod error;
pub mod helm;
pub mod inject;
pub mod materialize;
pub mod options;
pub mod patch;
pub mod pipeline;
pub mod runner;
pub mod source;
pub mod strategic;
pub mod workspace;

pub use chartify::{Chartifier, GeneratedChart};
pub use dependency::merge_dependencies;
pub use error::{ChartifyError, Result};
pub use helm::{Helm, Kustomize, PullRequest, TemplateRequest, UpgradeRequest};
pub use inject::InjectorSpec;
pub use options::{
    Binaries, ChartifyOptions, DEFAULT_RELEASE_NAME, PatchFile, PatchKind, Stage, ValuesLayers,
};
pub use patch::PatchSpec;
pub use pipeline::Pipeline;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use source::{ManifestSource, ResolvedSource, SourceContent};
pub use workspace::Workspace;
