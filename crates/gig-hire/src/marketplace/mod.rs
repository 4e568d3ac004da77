//! Gig marketplace hiring: intake of gigs and bids, and the hire transaction engine
//! that selects one winning bid per gig under concurrent callers.

pub mod admission;
pub mod domain;
pub mod hire;
pub(crate) mod intake;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use admission::{
    Admission, AdmissionGate, AdmissionKey, OpenGate, OriginPolicy, SlidingWindowGate,
};
pub use domain::{
    Bid, BidId, BidStatus, BidSubmission, BudgetRange, Gig, GigDraft, GigId, GigStatus, UserId,
    SIBLING_REJECTION_REASON,
};
pub use hire::{
    classify, ConflictReason, Eligibility, EligibilityPrechecker, HireCandidate, HireCommitter,
    HireError, HireErrorKind, HireOutcome, IneligibleReason, Missing,
};
pub use intake::{IntakeGuard, IntakePolicy, IntakeViolation};
pub use router::{marketplace_router, Admissions, Caller, CALLER_HEADER};
pub use service::{MarketplaceService, MarketplaceServiceError};
pub use store::{
    EntityKey, EntityStore, InMemoryEntityStore, MemoryTransaction, StoreError, UnitOfWork,
};
