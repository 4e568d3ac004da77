use chrono::{DateTime, Utc};

use super::domain::{BidSubmission, BudgetRange, GigDraft};

/// Validation errors raised before a gig or bid reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeViolation {
    #[error("Title must be between {min} and {max} characters")]
    TitleLength { min: usize, max: usize },
    #[error("Description must be between {min} and {max} characters")]
    DescriptionLength { min: usize, max: usize },
    #[error("Category is required")]
    MissingCategory,
    #[error("Invalid budget range (min {min}, max {max})")]
    InvalidBudget { min: u32, max: u32 },
    #[error("Deadline must be in the future")]
    DeadlineInPast,
    #[error("At least one non-empty skill is required")]
    MissingSkills,
    #[error("Proposal must be between {min} and {max} characters")]
    ProposalLength { min: usize, max: usize },
    #[error("Bid amount must be between ${} and ${}", .budget.min, .budget.max)]
    AmountOutsideBudget { budget: BudgetRange },
    #[error("Delivery time must be between {min} and {max} days")]
    DeliveryTime { min: u16, max: u16 },
}

/// Length and range bounds applied at intake.
#[derive(Debug, Clone)]
pub struct IntakePolicy {
    pub title_chars: (usize, usize),
    pub description_chars: (usize, usize),
    pub proposal_chars: (usize, usize),
    pub delivery_days: (u16, u16),
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            title_chars: (5, 100),
            description_chars: (20, 2000),
            proposal_chars: (10, 1000),
            delivery_days: (1, 365),
        }
    }
}

fn within(text: &str, (min, max): (usize, usize)) -> bool {
    (min..=max).contains(&text.chars().count())
}

/// Guard producing sanitized gig drafts and bid submissions.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard {
    policy: IntakePolicy,
}

impl IntakeGuard {
    pub fn with_policy(policy: IntakePolicy) -> Self {
        Self { policy }
    }

    /// Trim and validate a draft. Skills are trimmed and any blank skill rejects the draft.
    pub fn gig_draft(
        &self,
        draft: GigDraft,
        now: DateTime<Utc>,
    ) -> Result<GigDraft, IntakeViolation> {
        let title = draft.title.trim().to_string();
        if !within(&title, self.policy.title_chars) {
            let (min, max) = self.policy.title_chars;
            return Err(IntakeViolation::TitleLength { min, max });
        }

        let description = draft.description.trim().to_string();
        if !within(&description, self.policy.description_chars) {
            let (min, max) = self.policy.description_chars;
            return Err(IntakeViolation::DescriptionLength { min, max });
        }

        let category = draft.category.trim().to_string();
        if category.is_empty() {
            return Err(IntakeViolation::MissingCategory);
        }

        let BudgetRange { min, max } = draft.budget;
        if min == 0 || min > max {
            return Err(IntakeViolation::InvalidBudget { min, max });
        }

        if draft.deadline <= now {
            return Err(IntakeViolation::DeadlineInPast);
        }

        let skills: Vec<String> = draft
            .skills
            .iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect();
        if skills.is_empty() || skills.len() != draft.skills.len() {
            return Err(IntakeViolation::MissingSkills);
        }

        Ok(GigDraft {
            title,
            description,
            category,
            budget: draft.budget,
            deadline: draft.deadline,
            skills,
        })
    }

    /// Validate a bid against the budget of the gig it targets.
    pub fn bid_submission(
        &self,
        submission: BidSubmission,
        budget: BudgetRange,
    ) -> Result<BidSubmission, IntakeViolation> {
        let proposal = submission.proposal.trim().to_string();
        if !within(&proposal, self.policy.proposal_chars) {
            let (min, max) = self.policy.proposal_chars;
            return Err(IntakeViolation::ProposalLength { min, max });
        }

        let (min, max) = self.policy.delivery_days;
        if !(min..=max).contains(&submission.delivery_days) {
            return Err(IntakeViolation::DeliveryTime { min, max });
        }

        if !budget.contains(submission.amount) {
            return Err(IntakeViolation::AmountOutsideBudget { budget });
        }

        Ok(BidSubmission {
            proposal,
            ..submission
        })
    }
}
