use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use super::domain::{
    Bid, BidId, BidStatus, BidSubmission, Gig, GigDraft, GigId, GigStatus, UserId,
};
use super::hire::{
    Eligibility, EligibilityPrechecker, HireCommitter, HireError, HireOutcome, IneligibleReason,
};
use super::intake::{IntakeGuard, IntakeViolation};
use super::store::{
    EntityStore, StoreError, UnitOfWork, BID_PER_FREELANCER_CONSTRAINT, BID_PRIMARY_KEY,
    GIG_PRIMARY_KEY,
};
use crate::config::HiringConfig;

/// Service composing intake validation, the entity store and the hire engine.
pub struct MarketplaceService<S> {
    guard: IntakeGuard,
    store: Arc<S>,
    prechecker: EligibilityPrechecker<S>,
    committer: HireCommitter<S>,
    timeout: Duration,
}

impl<S> MarketplaceService<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>, config: &HiringConfig) -> Self {
        Self::with_guard(IntakeGuard::default(), store, config)
    }

    pub fn with_guard(guard: IntakeGuard, store: Arc<S>, config: &HiringConfig) -> Self {
        Self {
            guard,
            prechecker: EligibilityPrechecker::new(Arc::clone(&store)),
            committer: HireCommitter::new(Arc::clone(&store), config.transaction_timeout),
            store,
            timeout: config.transaction_timeout,
        }
    }

    /// Post a new gig owned by `client`. Gigs always start open.
    pub fn create_gig(
        &self,
        client: &UserId,
        draft: GigDraft,
    ) -> Result<Gig, MarketplaceServiceError> {
        let now = Utc::now();
        let draft = self.guard.gig_draft(draft, now)?;

        let gig = Gig {
            id: self.store.next_gig_id()?,
            client: client.clone(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            budget: draft.budget,
            deadline: draft.deadline,
            skills: draft.skills,
            status: GigStatus::Open,
            selected_bid: None,
            hired_at: None,
            created_at: now,
        };

        let mut tx = self.store.begin(self.timeout)?;
        tx.insert_gig(gig.clone())?;
        tx.commit()?;

        info!(gig = %gig.id, client = %client, "gig posted");
        Ok(gig)
    }

    pub fn get_gig(&self, gig_id: &GigId) -> Result<Gig, MarketplaceServiceError> {
        self.store
            .gig(gig_id)?
            .ok_or(MarketplaceServiceError::NotFound("Gig"))
    }

    /// Submit a pending bid. The gig is read inside the same unit of work, so a
    /// submission racing a hire on that gig cannot both commit.
    pub fn submit_bid(
        &self,
        freelancer: &UserId,
        submission: BidSubmission,
    ) -> Result<Bid, MarketplaceServiceError> {
        let mut tx = self.store.begin(self.timeout)?;
        let gig = tx
            .gig(&submission.gig_id)?
            .ok_or(MarketplaceServiceError::NotFound("Gig"))?;

        if gig.status != GigStatus::Open {
            return Err(MarketplaceServiceError::GigClosed);
        }
        if gig.is_owned_by(freelancer) {
            return Err(MarketplaceServiceError::OwnGig);
        }

        let submission = self.guard.bid_submission(submission, gig.budget)?;
        let bid = Bid {
            id: self.store.next_bid_id()?,
            gig: gig.id,
            freelancer: freelancer.clone(),
            proposal: submission.proposal,
            amount: submission.amount,
            delivery_days: submission.delivery_days,
            status: BidStatus::Pending,
            accepted_at: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
        };

        tx.insert_bid(bid.clone())?;
        tx.commit()?;

        info!(bid = %bid.id, gig = %bid.gig, freelancer = %freelancer, "bid submitted");
        Ok(bid)
    }

    /// Every bid on a gig, newest first. Only the owning client may look.
    pub fn bids_for_gig(
        &self,
        owner: &UserId,
        gig_id: &GigId,
    ) -> Result<Vec<Bid>, MarketplaceServiceError> {
        let gig = self.get_gig(gig_id)?;
        if !gig.is_owned_by(owner) {
            return Err(MarketplaceServiceError::Forbidden);
        }
        Ok(self.store.bids_for_gig(gig_id)?)
    }

    pub fn bids_by_freelancer(
        &self,
        freelancer: &UserId,
    ) -> Result<Vec<Bid>, MarketplaceServiceError> {
        Ok(self.store.bids_by_freelancer(freelancer)?)
    }

    /// Gigs posted by `client`, newest first.
    pub fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, MarketplaceServiceError> {
        Ok(self.store.gigs_by_client(client)?)
    }

    pub fn check_eligibility(
        &self,
        bid_id: &BidId,
        requester: &UserId,
    ) -> Result<Eligibility, MarketplaceServiceError> {
        Ok(self.prechecker.check(bid_id, requester)?)
    }

    /// Precheck, then commit. Precheck rejections never open a unit of work.
    pub fn hire(
        &self,
        bid_id: &BidId,
        requester: &UserId,
    ) -> Result<HireOutcome, MarketplaceServiceError> {
        if let Eligibility::Ineligible(reason) = self.prechecker.check(bid_id, requester)? {
            return Err(MarketplaceServiceError::Ineligible(reason));
        }
        Ok(self.committer.hire(bid_id, requester)?)
    }
}

/// Error raised by the marketplace service.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceServiceError {
    #[error(transparent)]
    Intake(#[from] IntakeViolation),
    #[error("{0}")]
    Ineligible(IneligibleReason),
    #[error(transparent)]
    Hire(#[from] HireError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Not authorized to view bids for this gig")]
    Forbidden,
    #[error("This gig is no longer accepting bids")]
    GigClosed,
    #[error("You cannot bid on your own gig")]
    OwnGig,
    #[error("You have already submitted a bid for this gig")]
    DuplicateBid,
    #[error("Concurrent modification detected. Please try again.")]
    Contention,
    #[error("marketplace store failure")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for MarketplaceServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateKey {
                constraint: BID_PER_FREELANCER_CONSTRAINT,
            } => Self::DuplicateBid,
            // allocated id already taken
            StoreError::DuplicateKey {
                constraint: GIG_PRIMARY_KEY | BID_PRIMARY_KEY,
            } => {
                error!(error = %value, "identifier allocation collided with a stored row");
                Self::Internal(value)
            }
            StoreError::SerializationFailure { .. }
            | StoreError::VersionMismatch { .. }
            | StoreError::DuplicateKey { .. }
            | StoreError::TimedOut { .. } => Self::Contention,
            StoreError::MissingRow { .. } => Self::NotFound("Gig"),
            other @ StoreError::Unavailable(_) => {
                error!(error = %other, "marketplace store failure");
                Self::Internal(other)
            }
        }
    }
}
