use std::sync::{Arc, Barrier};
use std::time::Duration;

use axum::response::Response;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;

use crate::config::{AdmissionConfig, HiringConfig};
use crate::marketplace::domain::{
    Bid, BidId, BidStatus, BidSubmission, BudgetRange, Gig, GigDraft, GigId, GigStatus, UserId,
};
use crate::marketplace::store::{
    EntityStore, InMemoryEntityStore, MemoryTransaction, StoreError, UnitOfWork,
};
use crate::marketplace::{
    marketplace_router, AdmissionGate, Admissions, MarketplaceService, OpenGate, OriginPolicy,
};

pub(super) const TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn client() -> UserId {
    UserId("client-1".to_string())
}

pub(super) fn freelancer(n: usize) -> UserId {
    UserId(format!("freelancer-{n}"))
}

pub(super) fn hiring_config() -> HiringConfig {
    HiringConfig {
        transaction_timeout: TIMEOUT,
        admission: AdmissionConfig {
            max_attempts: 5,
            window: Duration::from_secs(60),
        },
        ..HiringConfig::default()
    }
}

pub(super) fn draft() -> GigDraft {
    GigDraft {
        title: "Build a landing page".to_string(),
        description: "Responsive landing page for a product launch, with analytics".to_string(),
        category: "web-development".to_string(),
        budget: BudgetRange { min: 100, max: 500 },
        deadline: Utc::now() + ChronoDuration::days(14),
        skills: vec!["html".to_string(), "css".to_string()],
    }
}

pub(super) fn submission(gig_id: &GigId, amount: u32) -> BidSubmission {
    BidSubmission {
        gig_id: gig_id.clone(),
        proposal: "I can ship this within a week.".to_string(),
        amount,
        delivery_days: 7,
    }
}

pub(super) fn gig_row(id: &str, client: &UserId) -> Gig {
    let now = Utc::now();
    Gig {
        id: GigId(id.to_string()),
        client: client.clone(),
        title: "Logo refresh".to_string(),
        description: "Refresh the company logo and deliver vector assets".to_string(),
        category: "design".to_string(),
        budget: BudgetRange { min: 100, max: 500 },
        deadline: now + ChronoDuration::days(30),
        skills: vec!["illustrator".to_string()],
        status: GigStatus::Open,
        selected_bid: None,
        hired_at: None,
        created_at: now,
    }
}

pub(super) fn bid_row(id: &str, gig: &GigId, freelancer: &UserId) -> Bid {
    Bid {
        id: BidId(id.to_string()),
        gig: gig.clone(),
        freelancer: freelancer.clone(),
        proposal: "Vector assets in three variants.".to_string(),
        amount: 250,
        delivery_days: 5,
        status: BidStatus::Pending,
        accepted_at: None,
        rejected_at: None,
        rejection_reason: None,
        created_at: Utc::now(),
    }
}

/// Store holding gig `G1` owned by [`client`] with pending bids `B1..=Bn`.
pub(super) fn seeded_store(bids: usize) -> Arc<InMemoryEntityStore> {
    let store = Arc::new(InMemoryEntityStore::new());
    seed(store.as_ref(), bids);
    store
}

pub(super) fn seed<S: EntityStore>(store: &S, bids: usize) {
    let gig = gig_row("G1", &client());
    let mut tx = store.begin(TIMEOUT).expect("begin");
    tx.insert_gig(gig.clone()).expect("insert gig");
    for n in 1..=bids {
        tx.insert_bid(bid_row(&format!("B{n}"), &gig.id, &freelancer(n)))
            .expect("insert bid");
    }
    tx.commit().expect("seed commit");
}

pub(super) fn gig_id() -> GigId {
    GigId("G1".to_string())
}

pub(super) fn bid_id(n: usize) -> BidId {
    BidId(format!("B{n}"))
}

pub(super) fn set_gig_status<S: EntityStore>(store: &S, status: GigStatus) {
    let mut tx = store.begin(TIMEOUT).expect("begin");
    let mut gig = tx.gig(&gig_id()).expect("read").expect("gig exists");
    gig.status = status;
    tx.update_gig(gig).expect("stage");
    tx.commit().expect("commit");
}

pub(super) fn set_bid_status<S: EntityStore>(store: &S, n: usize, status: BidStatus) {
    let mut tx = store.begin(TIMEOUT).expect("begin");
    let mut bid = tx.bid(&bid_id(n)).expect("read").expect("bid exists");
    bid.status = status;
    if status == BidStatus::Rejected {
        bid.rejected_at = Some(Utc::now());
        bid.rejection_reason = Some("Budget too high".to_string());
    }
    if status == BidStatus::Accepted {
        bid.accepted_at = Some(Utc::now());
    }
    tx.update_bid(bid).expect("stage");
    tx.commit().expect("commit");
}

/// Gig and every bid on it, for before/after comparisons.
pub(super) fn snapshot<S: EntityStore>(store: &S) -> (Gig, Vec<Bid>) {
    let gig = store.gig(&gig_id()).expect("read").expect("gig exists");
    let bids = store.bids_for_gig(&gig_id()).expect("read bids");
    (gig, bids)
}

pub(super) fn build_service() -> (
    MarketplaceService<InMemoryEntityStore>,
    Arc<InMemoryEntityStore>,
) {
    let store = Arc::new(InMemoryEntityStore::new());
    let service = MarketplaceService::new(Arc::clone(&store), &hiring_config());
    (service, store)
}

/// Router with `gate` in front of hires, bid submissions unlimited and origins taken
/// from the socket peer.
pub(super) fn router_for<S, G>(service: MarketplaceService<S>, gate: G) -> axum::Router
where
    S: EntityStore + 'static,
    G: AdmissionGate + 'static,
{
    marketplace_router(
        Arc::new(service),
        Admissions::new(Arc::new(gate), Arc::new(OpenGate), OriginPolicy::SocketPeer),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose transactions all wait on one barrier before committing, so every
/// participant has staged its writes before any of them validates.
#[derive(Clone)]
pub(super) struct BarrierStore {
    pub(super) inner: InMemoryEntityStore,
    barrier: Arc<Barrier>,
}

impl BarrierStore {
    pub(super) fn new(inner: InMemoryEntityStore, parties: usize) -> Self {
        Self {
            inner,
            barrier: Arc::new(Barrier::new(parties)),
        }
    }
}

pub(super) struct BarrierTransaction {
    inner: MemoryTransaction,
    barrier: Arc<Barrier>,
}

impl EntityStore for BarrierStore {
    type Transaction = BarrierTransaction;

    fn begin(&self, timeout: Duration) -> Result<Self::Transaction, StoreError> {
        Ok(BarrierTransaction {
            inner: self.inner.begin(timeout)?,
            barrier: Arc::clone(&self.barrier),
        })
    }

    fn next_gig_id(&self) -> Result<GigId, StoreError> {
        self.inner.next_gig_id()
    }

    fn next_bid_id(&self) -> Result<BidId, StoreError> {
        self.inner.next_bid_id()
    }

    fn gig(&self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        self.inner.gig(id)
    }

    fn bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id)
    }

    fn bids_for_gig(&self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_gig(gig)
    }

    fn bids_by_freelancer(&self, freelancer: &UserId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_by_freelancer(freelancer)
    }

    fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, StoreError> {
        self.inner.gigs_by_client(client)
    }
}

impl UnitOfWork for BarrierTransaction {
    fn gig(&mut self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        self.inner.gig(id)
    }

    fn bid(&mut self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id)
    }

    fn bids_for_gig(&mut self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_gig(gig)
    }

    fn insert_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.inner.insert_gig(gig)
    }

    fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.inner.insert_bid(bid)
    }

    fn update_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.inner.update_gig(gig)
    }

    fn update_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.inner.update_bid(bid)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.barrier.wait();
        self.inner.commit()
    }

    fn rollback(self) {
        self.inner.rollback()
    }
}

/// Store whose commits always fail with a fixed error after discarding the staged
/// writes; reads pass through.
pub(super) struct FailingCommitStore {
    pub(super) inner: InMemoryEntityStore,
    error: StoreError,
}

impl FailingCommitStore {
    pub(super) fn new(inner: InMemoryEntityStore, error: StoreError) -> Self {
        Self { inner, error }
    }
}

pub(super) struct FailingTransaction {
    inner: MemoryTransaction,
    error: StoreError,
}

impl EntityStore for FailingCommitStore {
    type Transaction = FailingTransaction;

    fn begin(&self, timeout: Duration) -> Result<Self::Transaction, StoreError> {
        Ok(FailingTransaction {
            inner: self.inner.begin(timeout)?,
            error: self.error.clone(),
        })
    }

    fn next_gig_id(&self) -> Result<GigId, StoreError> {
        self.inner.next_gig_id()
    }

    fn next_bid_id(&self) -> Result<BidId, StoreError> {
        self.inner.next_bid_id()
    }

    fn gig(&self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        self.inner.gig(id)
    }

    fn bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id)
    }

    fn bids_for_gig(&self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_gig(gig)
    }

    fn bids_by_freelancer(&self, freelancer: &UserId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_by_freelancer(freelancer)
    }

    fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, StoreError> {
        self.inner.gigs_by_client(client)
    }
}

impl UnitOfWork for FailingTransaction {
    fn gig(&mut self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        self.inner.gig(id)
    }

    fn bid(&mut self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id)
    }

    fn bids_for_gig(&mut self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_gig(gig)
    }

    fn insert_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.inner.insert_gig(gig)
    }

    fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.inner.insert_bid(bid)
    }

    fn update_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.inner.update_gig(gig)
    }

    fn update_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.inner.update_bid(bid)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.inner.rollback();
        Err(self.error)
    }
}

/// Store that answers snapshot reads from memory but refuses to open a unit of work.
pub(super) struct ReadOnlyStore {
    pub(super) inner: InMemoryEntityStore,
}

impl EntityStore for ReadOnlyStore {
    type Transaction = MemoryTransaction;

    fn begin(&self, _timeout: Duration) -> Result<Self::Transaction, StoreError> {
        panic!("unit of work opened against a read-only store")
    }

    fn next_gig_id(&self) -> Result<GigId, StoreError> {
        self.inner.next_gig_id()
    }

    fn next_bid_id(&self) -> Result<BidId, StoreError> {
        self.inner.next_bid_id()
    }

    fn gig(&self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        self.inner.gig(id)
    }

    fn bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id)
    }

    fn bids_for_gig(&self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_gig(gig)
    }

    fn bids_by_freelancer(&self, freelancer: &UserId) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_by_freelancer(freelancer)
    }

    fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, StoreError> {
        self.inner.gigs_by_client(client)
    }
}

pub(super) struct UnavailableStore;

impl EntityStore for UnavailableStore {
    type Transaction = MemoryTransaction;

    fn begin(&self, _timeout: Duration) -> Result<Self::Transaction, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn next_gig_id(&self) -> Result<GigId, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn next_bid_id(&self) -> Result<BidId, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn gig(&self, _id: &GigId) -> Result<Option<Gig>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn bid(&self, _id: &BidId) -> Result<Option<Bid>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn bids_for_gig(&self, _gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn bids_by_freelancer(&self, _freelancer: &UserId) -> Result<Vec<Bid>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn gigs_by_client(&self, _client: &UserId) -> Result<Vec<Gig>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}
