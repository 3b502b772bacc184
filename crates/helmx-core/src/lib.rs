//! helm-x Core - shared types for turning manifests into Helm charts
//!
//! This crate provides the foundational types used throughout helm-x:
//! - `ManifestDocument` / `ManifestSet`: Kubernetes objects with identity tracking
//! - `ChartMetadata`: The `Chart.yaml` model, generated or loaded from a chart
//! - `DependencySpec`: Ad-hoc chart dependencies declared on the command line
//! - `Values`: Configuration values with deep merge support

pub mod chart;
pub mod dependency;
pub mod error;
pub mod manifest;
pub mod values;

pub use chart::{ChartDependency, ChartMetadata, DEFAULT_CHART_VERSION};
pub use dependency::DependencySpec;
pub use error::{CoreError, Result};
pub use manifest::{ManifestDocument, ManifestSet, ResourceIdentity};
pub use values::{Values, parse_set_string_values, parse_set_values};
