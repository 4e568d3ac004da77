use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason stamped on every sibling bid rejected by a successful hire.
pub const SIBLING_REJECTION_REASON: &str = "Another freelancer was selected";

/// Identifier wrapper for posted gigs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GigId(pub String);

/// Identifier wrapper for submitted bids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidId(pub String);

/// Authenticated marketplace account, either the posting client or a bidding freelancer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for GigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a gig. Only `Open -> InProgress` is driven by the hire engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GigStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl GigStatus {
    pub const fn label(self) -> &'static str {
        match self {
            GigStatus::Open => "open",
            GigStatus::InProgress => "in_progress",
            GigStatus::Completed => "completed",
            GigStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for GigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        }
    }

    /// Accepted and rejected bids never transition again.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, BidStatus::Pending)
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive budget bounds in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: u32,
    pub max: u32,
}

impl BudgetRange {
    pub fn contains(&self, amount: u32) -> bool {
        (self.min..=self.max).contains(&amount)
    }
}

/// A job posting open for bids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gig {
    pub id: GigId,
    pub client: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: BudgetRange,
    pub deadline: DateTime<Utc>,
    pub skills: Vec<String>,
    pub status: GigStatus,
    pub selected_bid: Option<BidId>,
    pub hired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Gig {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.client == user
    }
}

/// A freelancer's offer against a gig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub gig: GigId,
    pub freelancer: UserId,
    pub proposal: String,
    pub amount: u32,
    pub delivery_days: u16,
    pub status: BidStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    pub(crate) fn accept(&mut self, now: DateTime<Utc>) {
        self.status = BidStatus::Accepted;
        self.accepted_at = Some(now);
    }

    pub(crate) fn reject(&mut self, now: DateTime<Utc>, reason: &str) {
        self.status = BidStatus::Rejected;
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason.to_string());
    }
}

/// Client supplied fields for a new gig, validated by intake before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: BudgetRange,
    pub deadline: DateTime<Utc>,
    pub skills: Vec<String>,
}

/// Freelancer supplied fields for a new bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidSubmission {
    pub gig_id: GigId,
    pub proposal: String,
    pub amount: u32,
    pub delivery_days: u16,
}
