//! Error taxonomy
//!
//! Three classes of failure exist while building an inventory snapshot:
//!
//! - [`CredentialError`] - a token could not be obtained. Delegation failures are
//!   absorbed by the token broker, which falls back to an ambient identity.
//! - [`ItemProcessingError`] - one resource group or resource could not be turned
//!   into a record. The item is logged and skipped.
//! - [`AggregateEnumerationError`] - a top-level listing failed. Always propagated
//!   to the caller.

use std::fmt;
use thiserror::Error;

/// Token acquisition failure (delegated or ambient)
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no signed-in user session is available")]
    NoSession,

    #[error("user consent has not been granted for scope {0}")]
    ConsentRequired(String),

    #[error("token endpoint rejected the request: {0}")]
    Rejected(String),

    #[error("token request failed: {0}")]
    Transport(String),

    #[error("no ambient credential is available ({0})")]
    Unavailable(String),
}

/// Kind of inventory item, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    ResourceGroup,
    Resource,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::ResourceGroup => write!(f, "resource group"),
            ItemKind::Resource => write!(f, "resource"),
        }
    }
}

/// A single item could not be converted into a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemProcessingError {
    #[error("{kind} is missing required field '{field}'")]
    MissingField { kind: ItemKind, field: &'static str },

    #[error("duplicate {kind} name '{name}'")]
    Duplicate { kind: ItemKind, name: String },

    #[error("{kind} '{name}' belongs to resource group '{actual}', expected '{expected}'")]
    ForeignItem {
        kind: ItemKind,
        name: String,
        expected: String,
        actual: String,
    },
}

/// A top-level listing failed; no partial result is returned
#[derive(Debug, Error)]
pub enum AggregateEnumerationError {
    #[error("failed to list subscriptions")]
    Subscriptions(#[source] anyhow::Error),

    #[error("failed to list resource groups in subscription {subscription_id}")]
    ResourceGroups {
        subscription_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve resource group {name} in subscription {subscription_id}")]
    ResolveResourceGroup {
        subscription_id: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to list resources in resource group {name}")]
    Resources {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AggregateEnumerationError {
    /// Underlying collaborator failure, if any
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Subscriptions(source) => Some(source),
            Self::ResourceGroups { source, .. }
            | Self::ResolveResourceGroup { source, .. }
            | Self::Resources { source, .. } => Some(source),
            Self::InvalidRequest(_) => None,
        }
    }
}
