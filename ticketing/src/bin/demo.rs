//! chainpass Demo
//!
//! Walks one buyer through the purchase flow against the mock wallet:
//! - Wallet connect and balance
//! - Event catalog listing
//! - Payment request QR payload
//! - Ticket purchase (awaiting payment → processing → succeeded)
//! - A second purchase issuing a distinct ticket hash
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//!
//! # Simulate a flaky provider
//! CHAINPASS_WALLET_FAILURE_MODE=flaky:1 cargo run --bin demo
//! ```

use chainpass_ticketing::{
    Config, EventCatalog, EventId, InMemoryTicketLedger, PurchaseAttempt, PurchaseEnvironment,
    PurchaseSession, PurchaseStatus, TicketLedger, WalletSession,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(config.log_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n🎫 ============================================");
    println!("   chainpass - Live Demo");
    println!("============================================\n");

    config.validate()?;
    chainpass_ticketing::metrics::register_business_metrics();

    tracing::info!(
        network = %config.payment.network,
        payee = %config.payment.payee_address,
        failure_mode = %config.wallet.mock_failure_mode,
        "Configuration loaded"
    );

    // ========== Wallet ==========

    let mock = config.mock_wallet()?;
    let provider = mock.clone().shared();
    let wallet = WalletSession::new(Arc::clone(&provider), config.payment.network);

    println!("👛 Connecting wallet...");
    let connected = wallet.connect().await?;
    println!("   Address: {}", connected.address);
    println!("   Balance: {} ETH\n", connected.display_balance());

    // ========== Catalog ==========

    let catalog = Arc::new(EventCatalog::demo());
    println!("📋 Upcoming events:");
    for event in catalog.list() {
        println!(
            "   [{}] {} | {} {} | {} | {} ETH | {}/{} sold",
            event.id,
            event.name,
            event.date,
            event.display_time(),
            event.location,
            event.price,
            event.sold_tickets,
            event.max_tickets,
        );
    }
    println!();

    // ========== Purchase ==========

    let ledger = Arc::new(InMemoryTicketLedger::new());
    let env = PurchaseEnvironment::new(
        Arc::clone(&catalog),
        provider,
        Arc::clone(&ledger) as Arc<dyn TicketLedger>,
        config.payee()?,
    )
    .with_network(config.payment.network)
    .with_payment_policy(config.payment_policy());
    let session = PurchaseSession::new(connected.address.clone(), env);

    let event_id = EventId::new(1);
    println!("1️⃣  Selecting event {event_id}...");
    let attempt = session.initiate(event_id).await?;
    println!("   Status: {}", attempt.status);

    if let Some(request) = session.payment_request().await {
        println!("   Scan to pay: {}", request.qr_payload()?);
    }
    println!();

    println!("2️⃣  Confirming payment...");
    let first = session.confirm_payment(event_id).await?;
    print_outcome(&first);

    if first.status == PurchaseStatus::Succeeded {
        println!("3️⃣  Buying a second ticket...");
        session.reset().await?;
        let second = session.confirm_payment(event_id).await?;
        print_outcome(&second);

        if first.ticket_hash != second.ticket_hash {
            println!("   ✓ Each ticket carries its own hash");
        }
    }

    // ========== Summary ==========

    let event = catalog.get(event_id)?;
    let tickets = ledger.tickets_for(event_id, &connected.address).await;
    println!("\n📊 Summary");
    println!("   {}: {}/{} sold", event.name, event.sold_tickets, event.max_tickets);
    println!("   Tickets held by buyer: {}", tickets.len());
    println!("   Wallet balance: {} ETH", mock.balance().format_eth(5));

    session.shutdown();
    println!("\n✓ Demo complete\n");
    Ok(())
}

fn print_outcome(attempt: &PurchaseAttempt) {
    match attempt.status {
        PurchaseStatus::Succeeded => {
            println!("   ✓ Purchase succeeded");
            if let Some(hash) = &attempt.ticket_hash {
                println!("   Ticket: {hash}");
            }
            if let Some(reference) = &attempt.transaction_reference {
                println!("   Transaction: {reference}");
            }
        },
        PurchaseStatus::Failed => {
            println!(
                "   ✗ Purchase failed: {}",
                attempt.error_detail().unwrap_or_default()
            );
        },
        other => println!("   Status: {other}"),
    }
    println!();
}
