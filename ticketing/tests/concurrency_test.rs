//! Concurrency integration tests.
//!
//! Many buyers race for a handful of seats through independent sessions
//! sharing one catalog and ledger. No event may be oversold, and every issued
//! ticket must match exactly one counted sale.
//!
//! Run with: `cargo test --test concurrency_test`

#![allow(clippy::unwrap_used)]

use chainpass_runtime::RetryPolicy;
use chainpass_ticketing::payment::PaymentPolicy;
use chainpass_ticketing::{
    Address, Event, EventCatalog, EventId, InMemoryTicketLedger, MockWallet, PurchaseAttempt,
    PurchaseEnvironment, PurchaseError, PurchaseSession, PurchaseStatus,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const GALA: EventId = EventId::new(11);

fn catalog(max_tickets: u32) -> Arc<EventCatalog> {
    let event = Event {
        id: GALA,
        max_tickets,
        sold_tickets: 0,
        ..EventCatalog::demo().get(EventId::new(2)).unwrap()
    };
    Arc::new(EventCatalog::new(vec![event]).unwrap())
}

/// One session per buyer, each with its own wallet
fn sessions(catalog: &Arc<EventCatalog>, ledger: &Arc<InMemoryTicketLedger>, buyers: u32) -> Vec<PurchaseSession> {
    let payee = Address::parse("0x742e9d9b1e2a4e7b8f3c2a1d9e8f7b6a5c4d3e2f").unwrap();
    let policy = PaymentPolicy::new(Duration::from_secs(5), RetryPolicy::none());

    (0..buyers)
        .map(|n| {
            let address = Address::parse(&format!("0x{n:040x}")).unwrap();
            let wallet = MockWallet::new(address.clone(), "10".parse().unwrap())
                .with_latency(Duration::from_millis(10));
            let env = PurchaseEnvironment::new(
                Arc::clone(catalog),
                wallet.shared(),
                ledger.clone(),
                payee.clone(),
            )
            .with_payment_policy(policy.clone());
            PurchaseSession::new(address, env)
        })
        .collect()
}

fn is_sold_out(outcome: &Result<PurchaseAttempt, PurchaseError>) -> bool {
    match outcome {
        Err(PurchaseError::SoldOut(_)) => true,
        Ok(attempt) => {
            attempt.status == PurchaseStatus::Failed
                && matches!(attempt.error, Some(PurchaseError::SoldOut(_)))
        },
        Err(_) => false,
    }
}

async fn race(capacity: u32, buyers: u32) -> (Arc<EventCatalog>, Arc<InMemoryTicketLedger>, Vec<Result<PurchaseAttempt, PurchaseError>>) {
    let catalog = catalog(capacity);
    let ledger = Arc::new(InMemoryTicketLedger::new());
    let sessions = sessions(&catalog, &ledger, buyers);

    let outcomes = join_all(sessions.iter().map(|s| s.confirm_payment(GALA))).await;
    (catalog, ledger, outcomes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_seat_has_exactly_one_winner() {
    let (catalog, ledger, outcomes) = race(1, 16).await;

    let winners = outcomes
        .iter()
        .filter(|r| matches!(r, Ok(a) if a.status == PurchaseStatus::Succeeded))
        .count();
    let losers = outcomes.iter().filter(|r| is_sold_out(r)).count();

    assert_eq!(winners, 1);
    assert_eq!(losers, 15);
    assert_eq!(catalog.get(GALA).unwrap().sold_tickets, 1);
    assert_eq!(catalog.available(GALA).unwrap(), 0);
    assert_eq!(ledger.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_is_never_exceeded() {
    let (catalog, ledger, outcomes) = race(5, 40).await;

    let hashes: HashSet<String> = outcomes
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|a| a.status == PurchaseStatus::Succeeded)
        .map(|a| a.ticket_hash.as_ref().unwrap().as_str().to_string())
        .collect();

    assert_eq!(hashes.len(), 5);
    assert_eq!(outcomes.iter().filter(|r| is_sold_out(r)).count(), 35);

    let event = catalog.get(GALA).unwrap();
    assert_eq!(event.sold_tickets, 5);
    assert!(event.is_sold_out());
    assert_eq!(ledger.len(), 5);
}
