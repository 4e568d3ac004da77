use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::classify::{ConflictReason, HireError, Missing};
use crate::marketplace::domain::{
    Bid, BidId, BidStatus, Gig, GigStatus, UserId, SIBLING_REJECTION_REASON,
};
use crate::marketplace::store::{EntityStore, UnitOfWork};

/// State committed by a successful hire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HireOutcome {
    pub bid: Bid,
    pub gig: Gig,
    pub rejected_count: usize,
}

/// Authoritative hire transition: accept one bid, move the gig to in progress and
/// reject every pending sibling, all inside one unit of work.
///
/// At most one hire commits per gig no matter how many callers race. Failed attempts
/// leave no writes behind and are never retried here; retrying is a caller decision
/// made with a fresh invocation.
pub struct HireCommitter<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S> HireCommitter<S>
where
    S: EntityStore,
{
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn hire(&self, bid_id: &BidId, requester: &UserId) -> Result<HireOutcome, HireError> {
        let mut tx = self.store.begin(self.timeout)?;
        let now = Utc::now();

        let outcome = match stage_hire(&mut tx, bid_id, requester, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                tx.rollback();
                log_rejection(bid_id, &err);
                return Err(err);
            }
        };

        if let Err(err) = tx.commit() {
            let err = HireError::from(err);
            log_rejection(bid_id, &err);
            return Err(err);
        }

        info!(
            bid = %outcome.bid.id,
            gig = %outcome.gig.id,
            rejected = outcome.rejected_count,
            "hire committed"
        );
        Ok(outcome)
    }
}

fn log_rejection(bid_id: &BidId, err: &HireError) {
    match err {
        HireError::Internal(_) => {}
        HireError::Conflict(reason) if reason.is_transient() => {
            warn!(bid = %bid_id, error = %err, "hire lost a concurrent race")
        }
        _ => info!(bid = %bid_id, error = %err, "hire rejected"),
    }
}

/// Runs every read and staged write of a hire against `tx`. Nothing is visible to
/// other transactions until the caller commits.
fn stage_hire<T>(
    tx: &mut T,
    bid_id: &BidId,
    requester: &UserId,
    now: DateTime<Utc>,
) -> Result<HireOutcome, HireError>
where
    T: UnitOfWork,
{
    let mut bid = tx
        .bid(bid_id)?
        .ok_or_else(|| HireError::NotFound(Missing::Bid(bid_id.clone())))?;
    let mut gig = tx
        .gig(&bid.gig)?
        .ok_or_else(|| HireError::NotFound(Missing::Gig(bid.gig.clone())))?;

    if !gig.is_owned_by(requester) {
        return Err(HireError::Unauthorized);
    }
    // Primary race guard: the gig row read here is validated again at commit.
    if gig.status != GigStatus::Open {
        return Err(HireError::Conflict(ConflictReason::GigNotOpen(gig.status)));
    }
    if bid.status != BidStatus::Pending {
        return Err(HireError::Conflict(ConflictReason::BidNotPending(
            bid.status,
        )));
    }

    let siblings: Vec<Bid> = tx
        .bids_for_gig(&gig.id)?
        .into_iter()
        .filter(|sibling| sibling.id != bid.id)
        .collect();
    if siblings
        .iter()
        .any(|sibling| sibling.status == BidStatus::Accepted)
    {
        return Err(HireError::Conflict(ConflictReason::AlreadyHired));
    }

    bid.accept(now);
    tx.update_bid(bid.clone())?;

    gig.status = GigStatus::InProgress;
    gig.selected_bid = Some(bid.id.clone());
    gig.hired_at = Some(now);
    tx.update_gig(gig.clone())?;

    let mut rejected_count = 0;
    for mut sibling in siblings {
        if sibling.status != BidStatus::Pending {
            continue;
        }
        sibling.reject(now, SIBLING_REJECTION_REASON);
        tx.update_bid(sibling)?;
        rejected_count += 1;
    }

    Ok(HireOutcome {
        bid,
        gig,
        rejected_count,
    })
}
