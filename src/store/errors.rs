//! Remote store error taxonomy
//!
//! Every backend maps its failures onto these three cases so callers can
//! decide between "report", "404" and "refresh then let the client retry".

/// Errors surfaced by a [`RemoteStore`](super::RemoteStore)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Revision conflict on '{0}': cached revision is stale")]
    RevisionConflict(String),
}

impl StoreError {
    /// Whether the remote no longer has the path
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
