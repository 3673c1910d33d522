//! Error types for the replication orchestrator
//!
//! "Not yet ready" is never an error here: waiting for a secret, a sync, or an
//! unmounted volume is reported through [`crate::volsync::Readiness`]. Every
//! variant below is something the caller must either retry or escalate.

use thiserror::Error;

/// Main error type for replication operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration or descriptor error
    #[error("validation error: {0}")]
    Validation(String),

    /// Scheduling interval could not be translated into a cron spec
    #[error("invalid scheduling interval '{interval}': {reason}")]
    Schedule {
        /// The interval as supplied by the caller
        interval: String,
        /// What was wrong with it
        reason: String,
    },

    /// No volume snapshot class matches a storage provisioner
    #[error("no volume snapshot class found for storage provisioner {provisioner}")]
    SnapshotClassNotFound {
        /// Provisioner of the volume's storage class
        provisioner: String,
    },

    /// An object that must exist for this operation is absent
    #[error("{kind} {name} not found")]
    MissingResource {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Destination has not produced a usable snapshot
    #[error("no latest image available from replication destination {volume}")]
    NoLatestImage {
        /// Volume (and destination) name
        volume: String,
    },

    /// An immutable field differs from desired state; the object was deleted
    #[error("{kind} {name} has an immutable field mismatch and was deleted, retry to recreate")]
    RecreationRequired {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// One or more best-effort deletions failed
    #[error("cleanup incomplete: {}", failures.join("; "))]
    Cleanup {
        /// One message per failed deletion
        failures: Vec<String>,
    },

    /// Conversion between typed and dynamic objects failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a scheduling interval error
    pub fn schedule(interval: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schedule {
            interval: interval.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing resource error
    pub fn missing(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingResource {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a recreation-required error
    pub fn recreation_required(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::RecreationRequired {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether re-invoking the same operation later can succeed without a
    /// change to configuration or inputs
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(_) | Error::RecreationRequired { .. } | Error::Cleanup { .. } => true,
            Error::Validation(_)
            | Error::Schedule { .. }
            | Error::SnapshotClassNotFound { .. }
            | Error::MissingResource { .. }
            | Error::NoLatestImage { .. }
            | Error::Serialization(_) => false,
        }
    }

    /// True if this is a Kubernetes API 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}
