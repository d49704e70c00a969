//! Common types for binder: errors, Kubernetes helpers, and logging

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on objects written by binder
pub const FIELD_MANAGER: &str = "binder";

/// Standard Kubernetes managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on objects written by binder
pub const LABEL_MANAGED_BY_BINDER: &str = "binder";
