use crate::infra::in_memory_marketplace;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Args;
use gig_hire::config::HiringConfig;
use gig_hire::error::AppError;
use gig_hire::marketplace::{
    BidId, BidStatus, BidSubmission, BudgetRange, EntityStore, GigDraft, GigStatus,
    HireErrorKind, MarketplaceServiceError, UserId,
};
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of pending bids to place on the demo gig
    #[arg(long, default_value_t = 5)]
    pub(crate) bids: usize,
    /// Send every concurrent attempt at the first bid instead of one per bid
    #[arg(long)]
    pub(crate) same_bid: bool,
    /// Unit-of-work deadline for each hire attempt, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub(crate) timeout_ms: u64,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    if args.bids < 2 {
        return Err(AppError::Demo(
            "at least two bids are needed to race".to_string(),
        ));
    }

    let config = HiringConfig {
        transaction_timeout: Duration::from_millis(args.timeout_ms),
        ..HiringConfig::default()
    };
    let (service, store) = in_memory_marketplace(&config);
    let client = UserId("demo-client".to_string());

    let gig = service
        .create_gig(&client, demo_draft())
        .map_err(|err| AppError::Demo(format!("could not post gig: {err}")))?;

    let mut bids = Vec::with_capacity(args.bids);
    for n in 1..=args.bids {
        let submission = BidSubmission {
            gig_id: gig.id.clone(),
            proposal: format!("Proposal {n}: delivered with tests and docs."),
            amount: 150 + (n as u32 * 25) % 300,
            delivery_days: 3 + n as u16,
        };
        let bid = service
            .submit_bid(&UserId(format!("demo-freelancer-{n}")), submission)
            .map_err(|err| AppError::Demo(format!("could not submit bid {n}: {err}")))?;
        bids.push(bid.id);
    }

    let targets: Vec<BidId> = if args.same_bid {
        vec![bids[0].clone(); bids.len()]
    } else {
        bids.clone()
    };

    println!("Concurrent hire demo");
    println!(
        "Gig {} ({}) with {} pending bids; {} simultaneous hire attempts",
        gig.id,
        gig.title,
        bids.len(),
        targets.len()
    );

    let results = thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|bid| {
                let service = &service;
                let client = &client;
                scope.spawn(move || (bid.clone(), service.hire(bid, client)))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Result<Vec<_>, _>>()
    })
    .map_err(|_| AppError::Demo("a hire thread panicked".to_string()))?;

    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    println!("\nAttempts");
    for (bid, result) in &results {
        let label = outcome_label(result.as_ref().err());
        *tally.entry(label).or_default() += 1;
        match result {
            Ok(outcome) => println!(
                "  {bid}: hired, {} sibling bids rejected",
                outcome.rejected_count
            ),
            Err(err) => println!("  {bid}: {label} ({err})"),
        }
    }

    println!("\nOutcome distribution");
    for (label, count) in &tally {
        println!("  {label:<12} {count}");
    }

    let gig = store
        .gig(&gig.id)
        .map_err(|err| AppError::Demo(err.to_string()))?
        .ok_or_else(|| AppError::Demo("demo gig disappeared".to_string()))?;
    let final_bids = store
        .bids_for_gig(&gig.id)
        .map_err(|err| AppError::Demo(err.to_string()))?;

    println!("\nFinal state");
    println!(
        "  Gig {}: {} (selected bid: {})",
        gig.id,
        gig.status,
        gig.selected_bid
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string())
    );
    for bid in &final_bids {
        match &bid.rejection_reason {
            Some(reason) => println!("  {} {}: {} ({reason})", bid.id, bid.freelancer, bid.status),
            None => println!("  {} {}: {}", bid.id, bid.freelancer, bid.status),
        }
    }

    let accepted = final_bids
        .iter()
        .filter(|bid| bid.status == BidStatus::Accepted)
        .count();
    let pending = final_bids
        .iter()
        .filter(|bid| bid.status == BidStatus::Pending)
        .count();
    let hired = tally.get("hired").copied().unwrap_or(0);

    if hired != 1 || accepted != 1 || pending != 0 || gig.status != GigStatus::InProgress {
        return Err(AppError::Demo(format!(
            "invariant violated: {hired} commits, {accepted} accepted, {pending} pending, gig {}",
            gig.status
        )));
    }

    println!("\nInvariant held: one commit, one accepted bid, no pending siblings");
    Ok(())
}

fn outcome_label(error: Option<&MarketplaceServiceError>) -> &'static str {
    let Some(error) = error else {
        return "hired";
    };
    match error {
        MarketplaceServiceError::Ineligible(_) => "precheck",
        MarketplaceServiceError::Hire(err) if err.is_transient() => "write race",
        MarketplaceServiceError::Hire(err) => match err.kind() {
            HireErrorKind::NotFound => "not found",
            HireErrorKind::Unauthorized => "unauthorized",
            HireErrorKind::Conflict => "conflict",
            HireErrorKind::Internal => "internal",
        },
        _ => "other",
    }
}

fn demo_draft() -> GigDraft {
    GigDraft {
        title: "Payment webhook hardening".to_string(),
        description: "Make the payment webhook idempotent and add replay protection".to_string(),
        category: "backend".to_string(),
        budget: BudgetRange { min: 100, max: 500 },
        deadline: Utc::now() + ChronoDuration::days(7),
        skills: vec!["rust".to_string(), "http".to_string()],
    }
}
