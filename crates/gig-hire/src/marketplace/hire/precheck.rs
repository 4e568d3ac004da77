use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::classify::HireErrorKind;
use crate::marketplace::domain::{BidId, BidStatus, GigId, GigStatus, UserId};
use crate::marketplace::store::{EntityStore, StoreError};

/// Display snapshot returned when a bid looks hireable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HireCandidate {
    pub bid: CandidateBid,
    pub gig: CandidateGig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateBid {
    pub id: BidId,
    pub freelancer: UserId,
    pub amount: u32,
    pub delivery_days: u16,
    pub proposal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateGig {
    pub id: GigId,
    pub title: String,
    pub status: GigStatus,
}

/// First failed check, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    BidNotFound,
    GigNotFound,
    NotGigOwner,
    GigNotOpen(GigStatus),
    BidNotPending(BidStatus),
    AlreadyHired,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::BidNotFound => f.write_str("Bid not found"),
            IneligibleReason::GigNotFound => f.write_str("Gig not found"),
            IneligibleReason::NotGigOwner => f.write_str("Not authorized to hire for this gig"),
            IneligibleReason::GigNotOpen(status) => {
                write!(f, "Gig is {status}, not accepting hires")
            }
            IneligibleReason::BidNotPending(status) => {
                write!(f, "Bid is {status}, cannot be hired")
            }
            IneligibleReason::AlreadyHired => {
                f.write_str("Another freelancer has already been hired")
            }
        }
    }
}

impl IneligibleReason {
    /// The committer outcome this verdict anticipates.
    pub fn kind(&self) -> HireErrorKind {
        match self {
            IneligibleReason::BidNotFound | IneligibleReason::GigNotFound => {
                HireErrorKind::NotFound
            }
            IneligibleReason::NotGigOwner => HireErrorKind::Unauthorized,
            IneligibleReason::GigNotOpen(_)
            | IneligibleReason::BidNotPending(_)
            | IneligibleReason::AlreadyHired => HireErrorKind::Conflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(HireCandidate),
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible(_))
    }
}

/// Advisory, lock-free check run before paying for a transaction.
///
/// The verdict may be stale by the time the committer runs; the committer re-checks
/// everything authoritatively.
pub struct EligibilityPrechecker<S> {
    store: Arc<S>,
}

impl<S> EligibilityPrechecker<S>
where
    S: EntityStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn check(&self, bid_id: &BidId, requester: &UserId) -> Result<Eligibility, StoreError> {
        use Eligibility::Ineligible;

        let Some(bid) = self.store.bid(bid_id)? else {
            return Ok(Ineligible(IneligibleReason::BidNotFound));
        };
        let Some(gig) = self.store.gig(&bid.gig)? else {
            return Ok(Ineligible(IneligibleReason::GigNotFound));
        };

        if !gig.is_owned_by(requester) {
            return Ok(Ineligible(IneligibleReason::NotGigOwner));
        }
        if gig.status != GigStatus::Open {
            return Ok(Ineligible(IneligibleReason::GigNotOpen(gig.status)));
        }
        if bid.status != BidStatus::Pending {
            return Ok(Ineligible(IneligibleReason::BidNotPending(bid.status)));
        }

        let sibling_accepted = self
            .store
            .bids_for_gig(&gig.id)?
            .iter()
            .any(|sibling| sibling.status == BidStatus::Accepted);
        if sibling_accepted {
            return Ok(Ineligible(IneligibleReason::AlreadyHired));
        }

        Ok(Eligibility::Eligible(HireCandidate {
            bid: CandidateBid {
                id: bid.id,
                freelancer: bid.freelancer,
                amount: bid.amount,
                delivery_days: bid.delivery_days,
                proposal: bid.proposal,
            },
            gig: CandidateGig {
                id: gig.id,
                title: gig.title,
                status: gig.status,
            },
        }))
    }
}
