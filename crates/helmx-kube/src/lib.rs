//! helm-x Kubernetes integration
//!
//! Read-only access to Helm 3 release storage, diffing of rendered charts
//! against stored releases, release dumps, and adoption of existing objects.
//!
//! ## Storage
//!
//! Releases are read from Secrets (Helm's default) or ConfigMaps through the
//! [`ReleaseStorage`] trait. [`MockStorage`] serves tests.

pub mod adopt;
pub mod client;
pub mod diff;
pub mod dump;
pub mod error;
pub mod release;
pub mod storage;

pub use adopt::{KubeAnnotator, ResourceAnnotator, ResourceRef, adopt};
pub use client::ClientOptions;
pub use diff::{ChangeType, DiffEngine, DiffResult, FieldChange, LineType, ResourceChange};
pub use error::{KubeError, Result};
pub use release::{ReleaseRecord, ReleaseStatus};
pub use storage::{
    ConfigMapDriver, DriverKind, MockStorage, ReleaseStorage, SecretsDriver, build_configmap,
    build_secret, decode_release, encode_release,
};
