use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{
    EntityKey, EntityStore, StoreError, UnitOfWork, BID_PER_FREELANCER_CONSTRAINT,
    BID_PRIMARY_KEY, GIG_PRIMARY_KEY,
};
use crate::marketplace::domain::{Bid, BidId, Gig, GigId, UserId};

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

#[derive(Debug, Default)]
struct Tables {
    gigs: HashMap<GigId, Versioned<Gig>>,
    bids: HashMap<BidId, Versioned<Bid>>,
    bid_sets: HashMap<GigId, u64>,
    freelancer_bids: HashSet<(GigId, UserId)>,
    gig_sequence: u64,
    bid_sequence: u64,
}

impl Tables {
    /// Absent rows report version 0 so reads of missing rows are validated too.
    fn version(&self, key: &EntityKey) -> u64 {
        match key {
            EntityKey::Gig(id) => self.gigs.get(id).map_or(0, |row| row.version),
            EntityKey::Bid(id) => self.bids.get(id).map_or(0, |row| row.version),
            EntityKey::BidsOfGig(id) => self.bid_sets.get(id).copied().unwrap_or(0),
        }
    }

    fn bids_of(&self, gig: &GigId) -> impl Iterator<Item = &Versioned<Bid>> + '_ {
        let gig = gig.clone();
        self.bids.values().filter(move |row| row.value.gig == gig)
    }
}

fn newest_first(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, StoreError> {
    tables
        .lock()
        .map_err(|_| StoreError::Unavailable("entity store mutex poisoned".to_string()))
}

/// Process-local entity store using optimistic concurrency control.
///
/// Every row, and every gig's bid set, carries a version. Transactions record the
/// versions they read and stage their writes; commit validates the read set and
/// applies all writes under a single lock, which yields serializable histories.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEntityStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryEntityStore {
    type Transaction = MemoryTransaction;

    fn begin(&self, timeout: Duration) -> Result<Self::Transaction, StoreError> {
        Ok(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            started: Instant::now(),
            timeout,
            reads: HashMap::new(),
            gig_writes: BTreeMap::new(),
            bid_writes: BTreeMap::new(),
            finished: false,
        })
    }

    fn next_gig_id(&self) -> Result<GigId, StoreError> {
        let mut tables = lock(&self.tables)?;
        tables.gig_sequence += 1;
        Ok(GigId(format!("gig-{:06}", tables.gig_sequence)))
    }

    fn next_bid_id(&self) -> Result<BidId, StoreError> {
        let mut tables = lock(&self.tables)?;
        tables.bid_sequence += 1;
        Ok(BidId(format!("bid-{:06}", tables.bid_sequence)))
    }

    fn gig(&self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables.gigs.get(id).map(|row| row.value.clone()))
    }

    fn bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables.bids.get(id).map(|row| row.value.clone()))
    }

    fn bids_for_gig(&self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut bids: Vec<Bid> = tables.bids_of(gig).map(|row| row.value.clone()).collect();
        newest_first(&mut bids);
        Ok(bids)
    }

    fn bids_by_freelancer(&self, freelancer: &UserId) -> Result<Vec<Bid>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|row| &row.value.freelancer == freelancer)
            .map(|row| row.value.clone())
            .collect();
        newest_first(&mut bids);
        Ok(bids)
    }

    fn gigs_by_client(&self, client: &UserId) -> Result<Vec<Gig>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut gigs: Vec<Gig> = tables
            .gigs
            .values()
            .filter(|row| &row.value.client == client)
            .map(|row| row.value.clone())
            .collect();
        gigs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(gigs)
    }
}

#[derive(Debug)]
enum Staged<T> {
    Insert(T),
    Update { expected: u64, value: T },
}

impl<T> Staged<T> {
    fn value(&self) -> &T {
        match self {
            Staged::Insert(value) | Staged::Update { value, .. } => value,
        }
    }
}

/// Unit of work over [`InMemoryEntityStore`]. Holds no lock between calls.
#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    started: Instant,
    timeout: Duration,
    reads: HashMap<EntityKey, u64>,
    gig_writes: BTreeMap<GigId, Staged<Gig>>,
    bid_writes: BTreeMap<BidId, Staged<Bid>>,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_live(&self) -> Result<(), StoreError> {
        let elapsed = self.started.elapsed();
        if elapsed > self.timeout {
            return Err(StoreError::TimedOut { elapsed });
        }
        Ok(())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.ensure_live()?;
        lock(&self.tables)
    }

    /// The first observed version wins; a later re-read must not hide a concurrent commit.
    fn record_read(reads: &mut HashMap<EntityKey, u64>, key: EntityKey, version: u64) {
        reads.entry(key).or_insert(version);
    }

    fn expected_version(&mut self, key: EntityKey) -> Result<u64, StoreError> {
        if let Some(version) = self.reads.get(&key) {
            return Ok(*version);
        }
        let version = self.tables()?.version(&key);
        if version == 0 {
            return Err(StoreError::MissingRow { entity: key });
        }
        Ok(version)
    }

    fn staged_writes(&self) -> usize {
        self.gig_writes.len() + self.bid_writes.len()
    }

    fn validate(&self, tables: &Tables) -> Result<(), StoreError> {
        for (key, seen) in &self.reads {
            if tables.version(key) != *seen {
                return Err(StoreError::SerializationFailure {
                    entity: key.clone(),
                });
            }
        }

        for (id, staged) in &self.gig_writes {
            let current = tables.version(&EntityKey::Gig(id.clone()));
            match staged {
                Staged::Insert(_) if current != 0 => {
                    return Err(StoreError::DuplicateKey {
                        constraint: GIG_PRIMARY_KEY,
                    })
                }
                Staged::Update { expected, .. } => {
                    check_version(EntityKey::Gig(id.clone()), *expected, current)?
                }
                Staged::Insert(_) => {}
            }
        }

        for (id, staged) in &self.bid_writes {
            let current = tables.version(&EntityKey::Bid(id.clone()));
            match staged {
                Staged::Insert(bid) => {
                    if current != 0 {
                        return Err(StoreError::DuplicateKey {
                            constraint: BID_PRIMARY_KEY,
                        });
                    }
                    let parent = EntityKey::Gig(bid.gig.clone());
                    if tables.version(&parent) == 0 && !self.gig_writes.contains_key(&bid.gig) {
                        return Err(StoreError::MissingRow { entity: parent });
                    }
                    if tables
                        .freelancer_bids
                        .contains(&(bid.gig.clone(), bid.freelancer.clone()))
                    {
                        return Err(StoreError::DuplicateKey {
                            constraint: BID_PER_FREELANCER_CONSTRAINT,
                        });
                    }
                }
                Staged::Update { expected, .. } => {
                    check_version(EntityKey::Bid(id.clone()), *expected, current)?
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, tables: &mut Tables) {
        for (id, staged) in std::mem::take(&mut self.gig_writes) {
            let version = tables.version(&EntityKey::Gig(id.clone())) + 1;
            let value = match staged {
                Staged::Insert(value) | Staged::Update { value, .. } => value,
            };
            tables.gigs.insert(id, Versioned { version, value });
        }

        for (id, staged) in std::mem::take(&mut self.bid_writes) {
            let version = tables.version(&EntityKey::Bid(id.clone())) + 1;
            let value = match staged {
                Staged::Insert(value) => {
                    tables
                        .freelancer_bids
                        .insert((value.gig.clone(), value.freelancer.clone()));
                    value
                }
                Staged::Update { value, .. } => value,
            };
            *tables.bid_sets.entry(value.gig.clone()).or_insert(0) += 1;
            tables.bids.insert(id, Versioned { version, value });
        }
    }
}

fn check_version(entity: EntityKey, expected: u64, found: u64) -> Result<(), StoreError> {
    match found {
        0 => Err(StoreError::MissingRow { entity }),
        found if found != expected => Err(StoreError::VersionMismatch {
            entity,
            expected,
            found,
        }),
        _ => Ok(()),
    }
}

impl UnitOfWork for MemoryTransaction {
    fn gig(&mut self, id: &GigId) -> Result<Option<Gig>, StoreError> {
        if let Some(staged) = self.gig_writes.get(id) {
            return Ok(Some(staged.value().clone()));
        }
        let tables = self.tables()?;
        let key = EntityKey::Gig(id.clone());
        let version = tables.version(&key);
        let gig = tables.gigs.get(id).map(|row| row.value.clone());
        drop(tables);
        Self::record_read(&mut self.reads, key, version);
        Ok(gig)
    }

    fn bid(&mut self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        if let Some(staged) = self.bid_writes.get(id) {
            return Ok(Some(staged.value().clone()));
        }
        let tables = self.tables()?;
        let key = EntityKey::Bid(id.clone());
        let version = tables.version(&key);
        let bid = tables.bids.get(id).map(|row| row.value.clone());
        drop(tables);
        Self::record_read(&mut self.reads, key, version);
        Ok(bid)
    }

    fn bids_for_gig(&mut self, gig: &GigId) -> Result<Vec<Bid>, StoreError> {
        let tables = self.tables()?;
        let set_version = tables.version(&EntityKey::BidsOfGig(gig.clone()));
        let stored: Vec<(u64, Bid)> = tables
            .bids_of(gig)
            .map(|row| (row.version, row.value.clone()))
            .collect();
        drop(tables);

        Self::record_read(&mut self.reads, EntityKey::BidsOfGig(gig.clone()), set_version);
        let mut bids = Vec::with_capacity(stored.len());
        for (version, bid) in stored {
            Self::record_read(&mut self.reads, EntityKey::Bid(bid.id.clone()), version);
            match self.bid_writes.get(&bid.id) {
                Some(staged) => bids.push(staged.value().clone()),
                None => bids.push(bid),
            }
        }
        for staged in self.bid_writes.values() {
            if let Staged::Insert(bid) = staged {
                if &bid.gig == gig {
                    bids.push(bid.clone());
                }
            }
        }
        newest_first(&mut bids);
        Ok(bids)
    }

    fn insert_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.ensure_live()?;
        if self.gig_writes.contains_key(&gig.id) {
            return Err(StoreError::DuplicateKey {
                constraint: GIG_PRIMARY_KEY,
            });
        }
        self.gig_writes.insert(gig.id.clone(), Staged::Insert(gig));
        Ok(())
    }

    fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.ensure_live()?;
        if self.bid_writes.contains_key(&bid.id) {
            return Err(StoreError::DuplicateKey {
                constraint: BID_PRIMARY_KEY,
            });
        }
        let duplicate = self.bid_writes.values().any(|staged| match staged {
            Staged::Insert(other) => other.gig == bid.gig && other.freelancer == bid.freelancer,
            Staged::Update { .. } => false,
        });
        if duplicate {
            return Err(StoreError::DuplicateKey {
                constraint: BID_PER_FREELANCER_CONSTRAINT,
            });
        }
        self.bid_writes.insert(bid.id.clone(), Staged::Insert(bid));
        Ok(())
    }

    fn update_gig(&mut self, gig: Gig) -> Result<(), StoreError> {
        self.ensure_live()?;
        if let Some(Staged::Insert(pending)) = self.gig_writes.get_mut(&gig.id) {
            *pending = gig;
            return Ok(());
        }
        let expected = self.expected_version(EntityKey::Gig(gig.id.clone()))?;
        self.gig_writes.insert(
            gig.id.clone(),
            Staged::Update {
                expected,
                value: gig,
            },
        );
        Ok(())
    }

    fn update_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.ensure_live()?;
        if let Some(Staged::Insert(pending)) = self.bid_writes.get_mut(&bid.id) {
            *pending = bid;
            return Ok(());
        }
        let expected = self.expected_version(EntityKey::Bid(bid.id.clone()))?;
        self.bid_writes.insert(
            bid.id.clone(),
            Staged::Update {
                expected,
                value: bid,
            },
        );
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        let tables_handle = Arc::clone(&self.tables);
        let mut tables = lock(&tables_handle)?;
        self.ensure_live()?;
        self.validate(&tables)?;

        let writes = self.staged_writes();
        self.apply(&mut tables);
        self.finished = true;
        debug!(writes, "unit of work committed");
        Ok(())
    }

    fn rollback(mut self) {
        self.finished = true;
        debug!(discarded = self.staged_writes(), "unit of work rolled back");
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && self.staged_writes() > 0 {
            debug!(
                discarded = self.staged_writes(),
                "unit of work dropped before commit"
            );
        }
    }
}
