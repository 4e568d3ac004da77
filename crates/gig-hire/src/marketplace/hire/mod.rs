//! The hire transaction engine.
//!
//! A hire request flows through the [`EligibilityPrechecker`] for a cheap advisory
//! verdict, then through the [`HireCommitter`] which performs the authoritative
//! transition in one unit of work. Storage failures reach callers only after
//! [`classify`] has mapped them onto [`HireError`].

mod classify;
mod committer;
mod precheck;

pub use classify::{classify, ConflictReason, HireError, HireErrorKind, Missing};
pub use committer::{HireCommitter, HireOutcome};
pub use precheck::{
    CandidateBid, CandidateGig, Eligibility, EligibilityPrechecker, HireCandidate,
    IneligibleReason,
};
