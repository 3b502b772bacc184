//! Chartify error types

use std::path::PathBuf;
use thiserror::Error;

use helmx_core::CoreError;

/// Result type for chartify operations
pub type Result<T> = std::result::Result<T, ChartifyError>;

/// Errors raised while turning a source into a chart
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChartifyError {
    /// The input could not be resolved to any manifest source
    #[error("cannot resolve '{input}' as {variant}: missing {missing}")]
    SourceResolution {
        input: String,
        variant: String,
        missing: String,
    },

    /// A patch or injector stage failed
    #[error("{stage} failed{}: {cause}", on_document(.document))]
    PipelineStage {
        stage: String,
        document: Option<String>,
        cause: String,
    },

    /// Two ad-hoc dependencies (or one and an existing chart dependency) share an alias
    #[error("dependency alias '{alias}' is declared more than once")]
    DependencyConflict { alias: String },

    /// The same resource appears twice after the pipeline ran
    #[error("duplicate resource {identity} in generated chart")]
    DuplicateDocument { identity: String },

    /// Writing the chart to disk failed
    #[error("failed to write {}: {source}", .path.display())]
    Materialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external command (helm, kustomize, an injector) failed
    #[error("`{command}` {}: {stderr}", describe_status(.status))]
    CollaboratorExecution {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An ad-hoc dependency could not be parsed
    #[error("invalid dependency '{spec}': {message}")]
    InvalidDependency { spec: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(CoreError),
}

fn on_document(document: &Option<String>) -> String {
    document
        .as_ref()
        .map(|d| format!(" on {}", d))
        .unwrap_or_default()
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {}", code),
        None => "could not be run".to_string(),
    }
}

impl From<CoreError> for ChartifyError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateDocument { identity } => Self::DuplicateDocument { identity },
            CoreError::InvalidDependency { spec, message } => {
                Self::InvalidDependency { spec, message }
            }
            other => Self::Core(other),
        }
    }
}

impl ChartifyError {
    pub(crate) fn stage(
        stage: impl Into<String>,
        document: Option<String>,
        cause: impl ToString,
    ) -> Self {
        Self::PipelineStage {
            stage: stage.into(),
            document,
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_duplicate_maps_to_engine_variant() {
        let err: ChartifyError = CoreError::DuplicateDocument {
            identity: "Secret/s (v1)".to_string(),
        }
        .into();
        assert!(matches!(err, ChartifyError::DuplicateDocument { .. }));
    }

    #[test]
    fn test_collaborator_message() {
        let err = ChartifyError::CollaboratorExecution {
            command: "helm template x ./chart".to_string(),
            status: Some(1),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`helm template x ./chart` exited with status 1: boom"
        );
    }

    #[test]
    fn test_stage_message_names_document() {
        let err = ChartifyError::stage("json-patch p.yaml", Some("ConfigMap/c".into()), "no such path");
        assert_eq!(err.to_string(), "json-patch p.yaml failed on ConfigMap/c: no such path");
    }
}
