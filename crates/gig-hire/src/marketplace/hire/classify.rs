use serde::Serialize;
use tracing::{debug, error};

use crate::marketplace::domain::{BidId, BidStatus, GigId, GigStatus};
use crate::marketplace::store::{EntityKey, StoreError};

/// Entity a hire attempt could not locate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Bid(BidId),
    Gig(GigId),
}

/// Why a hire attempt lost a race or targeted an ineligible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    GigNotOpen(GigStatus),
    BidNotPending(BidStatus),
    AlreadyHired,
    /// The store aborted the commit because a concurrent transaction touched the same rows.
    WriteConflict,
    TimedOut,
}

impl ConflictReason {
    /// Conflicts a fresh attempt may succeed on; business conflicts never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConflictReason::WriteConflict | ConflictReason::TimedOut)
    }
}

/// Closed outcome taxonomy for every failed exit of the hire committer.
#[derive(Debug, thiserror::Error)]
pub enum HireError {
    #[error("{}", missing_message(.0))]
    NotFound(Missing),
    #[error("Not authorized to hire for this gig")]
    Unauthorized,
    #[error("{}", conflict_message(.0))]
    Conflict(ConflictReason),
    #[error("hire could not be completed")]
    Internal(#[source] StoreError),
}

impl HireError {
    pub fn kind(&self) -> HireErrorKind {
        match self {
            HireError::NotFound(_) => HireErrorKind::NotFound,
            HireError::Unauthorized => HireErrorKind::Unauthorized,
            HireError::Conflict(_) => HireErrorKind::Conflict,
            HireError::Internal(_) => HireErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, HireError::Conflict(reason) if reason.is_transient())
    }
}

/// Fieldless view of [`HireError`] for tallies and response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HireErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    Internal,
}

fn missing_message(missing: &Missing) -> String {
    match missing {
        Missing::Bid(_) => "Bid not found".to_string(),
        Missing::Gig(_) => "Gig not found".to_string(),
    }
}

fn conflict_message(reason: &ConflictReason) -> String {
    match reason {
        ConflictReason::GigNotOpen(status) => {
            format!("Cannot hire for this gig. Current status: {status}")
        }
        ConflictReason::BidNotPending(status) => {
            format!("This bid has already been processed. Current status: {status}")
        }
        ConflictReason::AlreadyHired => {
            "Another freelancer has already been hired for this gig".to_string()
        }
        ConflictReason::WriteConflict => {
            "Concurrent modification detected. Please try again.".to_string()
        }
        ConflictReason::TimedOut => "Hire attempt timed out. Please try again.".to_string(),
    }
}

/// Map a structured storage failure onto the hire taxonomy.
///
/// Authorization and lookup decisions are made explicitly by the committer; this only
/// ever sees failures raised by the store itself.
pub fn classify(error: StoreError) -> HireError {
    match error {
        StoreError::SerializationFailure { ref entity }
        | StoreError::VersionMismatch { ref entity, .. } => {
            debug!(%entity, "hire aborted by write conflict");
            HireError::Conflict(ConflictReason::WriteConflict)
        }
        StoreError::DuplicateKey { constraint } => {
            debug!(constraint, "hire aborted by unique constraint");
            HireError::Conflict(ConflictReason::WriteConflict)
        }
        StoreError::TimedOut { elapsed } => {
            debug!(?elapsed, "hire transaction deadline exceeded");
            HireError::Conflict(ConflictReason::TimedOut)
        }
        StoreError::MissingRow { entity } => match entity {
            EntityKey::Bid(id) => HireError::NotFound(Missing::Bid(id)),
            EntityKey::Gig(id) | EntityKey::BidsOfGig(id) => HireError::NotFound(Missing::Gig(id)),
        },
        other @ StoreError::Unavailable(_) => {
            error!(error = %other, "hire failed on unclassified store error");
            HireError::Internal(other)
        }
    }
}

impl From<StoreError> for HireError {
    fn from(value: StoreError) -> Self {
        classify(value)
    }
}
