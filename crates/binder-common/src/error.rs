//! Error types for binding data retrieval
//!
//! Errors are structured with fields to aid debugging without logs.
//! Each variant carries the section, path, resource kind or resource name
//! that was being processed when the failure occurred.

use thiserror::Error;

/// Main error type for binder operations
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor path segment is missing from the custom resource
    #[error("field '{segment}' not found in {section} (path '{path}')")]
    FieldNotFound {
        /// CR section being read ("spec" or "status")
        section: String,
        /// Full descriptor path
        path: String,
        /// First segment that could not be found
        segment: String,
    },

    /// A referenced secret or config map does not exist
    #[error("{kind} '{namespace}/{name}' not found")]
    ResourceNotFound {
        /// Resource kind (Secret, ConfigMap)
        kind: String,
        /// Namespace the resource was looked up in
        namespace: String,
        /// Resource name
        name: String,
    },

    /// A resource does not have the expected shape
    #[error("malformed {kind} '{name}': {message}")]
    MalformedResource {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Description of what's wrong
        message: String,
    },

    /// A secret value is not valid base64
    #[error("failed to decode key '{key}' of secret '{name}': {source}")]
    Decode {
        /// Secret name
        name: String,
        /// Data key holding the invalid value
        key: String,
        /// The underlying decode error
        #[source]
        source: base64::DecodeError,
    },

    /// Kubernetes API error other than not-found
    #[error("kubernetes error [{context}]: {source}")]
    Kube {
        /// Operation that failed
        context: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Create failed because the resource already exists
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource namespace
        namespace: String,
        /// Resource name
        name: String,
    },

    /// Update was rejected because the resource changed concurrently
    #[error("conflict updating {kind} '{namespace}/{name}'")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource namespace
        namespace: String,
        /// Resource name
        name: String,
    },

    /// The run was cancelled before completing
    #[error("cancelled during {stage}")]
    Cancelled {
        /// Stage that observed the cancellation
        stage: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Client or process configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// A plan could not be loaded
    #[error("invalid plan: {message}")]
    Plan {
        /// Description of what's wrong
        message: String,
    },
}

impl Error {
    /// Create a field-not-found error
    pub fn field_not_found(
        section: impl Into<String>,
        path: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        Self::FieldNotFound {
            section: section.into(),
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Create a resource-not-found error
    pub fn resource_not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::ResourceNotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a malformed-resource error
    pub fn malformed(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::MalformedResource {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a decode error for a secret key
    pub fn decode(
        name: impl Into<String>,
        key: impl Into<String>,
        source: base64::DecodeError,
    ) -> Self {
        Self::Decode {
            name: name.into(),
            key: key.into(),
            source,
        }
    }

    /// Wrap a kube-rs error with the operation that produced it
    pub fn kube(context: impl Into<String>, source: kube::Error) -> Self {
        Self::Kube {
            context: context.into(),
            source,
        }
    }

    /// Create an already-exists error
    pub fn already_exists(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an update-conflict error
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a cancellation error for the given stage
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a plan loading error
    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan {
            message: msg.into(),
        }
    }

    /// Whether this error means something referenced does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::FieldNotFound { .. } | Error::ResourceNotFound { .. }
        )
    }

    /// Whether this error is a create-time name collision
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Whether this error comes from a cancelled run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Name of the resource involved, if the error is tied to one
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Error::ResourceNotFound { name, .. }
            | Error::MalformedResource { name, .. }
            | Error::Decode { name, .. }
            | Error::AlreadyExists { name, .. }
            | Error::Conflict { name, .. } => Some(name),
            _ => None,
        }
    }
}
