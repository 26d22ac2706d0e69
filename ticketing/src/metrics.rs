//! Business metrics for the purchase flow.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the host application.
//!
//! # Exported Metrics
//!
//! - `chainpass_purchases_total{status}` - Purchase outcomes (succeeded, failed, cancelled)
//! - `chainpass_tickets_sold_total` - Committed ticket sales
//! - `chainpass_payment_retries_total` - Payment submissions retried after a transient error

use metrics::describe_counter;

/// Register descriptions for all business metrics.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "chainpass_purchases_total",
        "Total purchase attempts by outcome (succeeded, failed, cancelled)"
    );
    describe_counter!(
        "chainpass_tickets_sold_total",
        "Total number of tickets sold"
    );
    describe_counter!(
        "chainpass_payment_retries_total",
        "Payment submissions retried after a transient wallet error"
    );

    tracing::info!("Business metrics registered");
}

/// Record a purchase that issued a ticket.
pub fn record_purchase_succeeded() {
    metrics::counter!("chainpass_purchases_total", "status" => "succeeded").increment(1);
}

/// Record a purchase that ended in `Failed`.
///
/// # Arguments
///
/// * `reason` - Short failure class (e.g. `sold_out`, `payment_failed`)
pub fn record_purchase_failed(reason: &'static str) {
    metrics::counter!("chainpass_purchases_total", "status" => "failed", "reason" => reason)
        .increment(1);
    tracing::debug!(reason, "Recorded purchase_failed metric");
}

/// Record a purchase cancelled while processing.
pub fn record_purchase_cancelled() {
    metrics::counter!("chainpass_purchases_total", "status" => "cancelled").increment(1);
}

/// Record a committed sale.
pub fn record_ticket_sold() {
    metrics::counter!("chainpass_tickets_sold_total").increment(1);
}

/// Record a retried payment submission.
pub fn record_payment_retry() {
    metrics::counter!("chainpass_payment_retries_total").increment(1);
}
