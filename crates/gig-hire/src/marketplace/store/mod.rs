//! Entity store seam for gigs and bids.
//!
//! Reads outside a unit of work are snapshot reads with no isolation guarantees; they
//! back the eligibility precheck and listings. Every mutation goes through a
//! [`UnitOfWork`], which must provide at least snapshot isolation with write-conflict
//! detection on the rows and predicates it touched.

mod memory;

use std::fmt;
use std::time::Duration;

pub use memory::{InMemoryEntityStore, MemoryTransaction};

use super::domain::{Bid, BidId, Gig, GigId, UserId};

/// Uniqueness constraint guarding one bid per freelancer per gig.
pub const BID_PER_FREELANCER_CONSTRAINT: &str = "bids_gig_freelancer_key";
pub const GIG_PRIMARY_KEY: &str = "gigs_pkey";
pub const BID_PRIMARY_KEY: &str = "bids_pkey";

/// Storage abstraction so the hire engine can be exercised against any backend.
pub trait EntityStore: Send + Sync {
    type Transaction: UnitOfWork;

    /// Open a unit of work that must commit before `timeout` elapses.
    fn begin(&self, timeout: Duration) -> Result<Self::Transaction, StoreError>;

    /// Identifiers come from the store so they stay unique for as long as its rows do.
    fn next_gig_id(&self) -> Result<GigId, StoreError>;
    fn next_bid_id(&self) -> Result<BidId, StoreError>;

    fn gig(&self, id: &GigId) -> Result<Option<Gig>, StoreError>;
    fn bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError>;
    fn bids_for_gig(&self, gig: &GigId) -> Result<Vec<Bid>, StoreError>;
    fn bids_by_freelancer(&self, freelancer: &UserId) -> Result<Vec<Bid>, StoreError>;
    fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, StoreError>;
}

/// Transaction handle threaded through every read and write of one operation.
///
/// Dropping a handle without calling [`UnitOfWork::commit`] discards all staged writes.
pub trait UnitOfWork {
    fn gig(&mut self, id: &GigId) -> Result<Option<Gig>, StoreError>;
    fn bid(&mut self, id: &BidId) -> Result<Option<Bid>, StoreError>;
    /// Predicate read over every bid on `gig`; a concurrent insert or status change
    /// on that set invalidates the transaction.
    fn bids_for_gig(&mut self, gig: &GigId) -> Result<Vec<Bid>, StoreError>;

    fn insert_gig(&mut self, gig: Gig) -> Result<(), StoreError>;
    fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError>;
    fn update_gig(&mut self, gig: Gig) -> Result<(), StoreError>;
    fn update_bid(&mut self, bid: Bid) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;

    fn rollback(self)
    where
        Self: Sized,
    {
    }
}

/// Row or predicate a store failure refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Gig(GigId),
    Bid(BidId),
    BidsOfGig(GigId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Gig(id) => write!(f, "gig {id}"),
            EntityKey::Bid(id) => write!(f, "bid {id}"),
            EntityKey::BidsOfGig(id) => write!(f, "bids of gig {id}"),
        }
    }
}

/// Structured failure signal raised at the point a storage operation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("serialization failure: {entity} changed after it was read")]
    SerializationFailure { entity: EntityKey },
    #[error("version mismatch on {entity}: expected {expected}, found {found}")]
    VersionMismatch {
        entity: EntityKey,
        expected: u64,
        found: u64,
    },
    #[error("duplicate key violates unique constraint {constraint}")]
    DuplicateKey { constraint: &'static str },
    #[error("{entity} does not exist")]
    MissingRow { entity: EntityKey },
    #[error("transaction exceeded its deadline after {elapsed:?}")]
    TimedOut { elapsed: Duration },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
