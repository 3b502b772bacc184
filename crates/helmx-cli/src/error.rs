//! CLI error type with exit code mapping

use helmx_engine::ChartifyError;
use helmx_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(code(helmx::chartify))]
    Chartify(#[from] ChartifyError),

    #[error(transparent)]
    #[diagnostic(code(helmx::kube))]
    Kube(KubeError),

    #[error("Adoption incomplete: {source}")]
    #[diagnostic(
        code(helmx::adopt),
        help("resources adopted so far keep their Helm ownership metadata; fix the failing one and re-run with the remaining resources")
    )]
    Adoption {
        #[source]
        source: KubeError,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(helmx::cli::io))]
    Io { message: String },

    #[error("{message}")]
    #[diagnostic(code(helmx::cli::error))]
    Other { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Chartify(e) => match e {
                ChartifyError::SourceResolution { .. } => exit_codes::CHART_ERROR,
                ChartifyError::PipelineStage { .. } => exit_codes::TEMPLATE_ERROR,
                ChartifyError::DependencyConflict { .. }
                | ChartifyError::DuplicateDocument { .. }
                | ChartifyError::InvalidDependency { .. } => exit_codes::VALIDATION_ERROR,
                ChartifyError::Materialization { .. } | ChartifyError::Io(_) => {
                    exit_codes::IO_ERROR
                }
                _ => exit_codes::ERROR,
            },
            CliError::Kube(KubeError::InvalidResourceRef { .. }) => exit_codes::USAGE_ERROR,
            CliError::Kube(_) | CliError::Adoption { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Collapse to a plain error so the exit code cannot be confused with
    /// `diff --detailed-exitcode`'s "changes" status
    pub fn generic(self) -> Self {
        match self {
            CliError::Other { .. } => self,
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::AdoptionPartialFailure { .. } => CliError::Adoption { source: err },
            other => CliError::Kube(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<helmx_core::CoreError> for CliError {
    fn from(err: helmx_core::CoreError) -> Self {
        CliError::Chartify(err.into())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Other {
            message: format!("YAML error: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
