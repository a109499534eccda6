// src/services/monitor.rs
use log::info;

use crate::models::ReferenceRate;
use super::comparator::{
    evaluate_batch, initial_target_state, is_rising_edge, resolve_reference_rate, target_met_notification,
    BatchEvaluation,
};
use super::db::DbStore;
use super::notifications::Notifier;

/// Evaluate a broker's book against the latest stored quote for `term_years`
/// and notify the broker of clients whose target was newly met.
pub async fn evaluate_broker(
    store: &DbStore,
    notifier: &dyn Notifier,
    broker_id: &str,
    term_years: u32,
    fallback_rate: f64,
) -> BatchEvaluation {
    let quote = store.get_latest_rate_quote(term_years).await;
    let reference: ReferenceRate = resolve_reference_rate(quote.as_ref(), fallback_rate);
    let clients = store.get_client_mortgages(broker_id).await;

    let batch = evaluate_batch(&clients, reference);

    // Fallback-derived results neither notify nor overwrite the known state
    if reference.is_fallback {
        return batch;
    }

    let mut notified = 0;
    for client in &clients {
        let Some(result) = batch.rate_statuses.get(&client.client_id) else {
            continue;
        };
        let previous = match store.last_target_state(&client.client_id).await {
            Some(state) => state,
            None => initial_target_state(client),
        };
        if is_rising_edge(previous, result) {
            notifier.notify(target_met_notification(broker_id, client, reference.rate_percent));
            notified += 1;
        }
        store.record_target_state(&client.client_id, result.is_target_met).await;
    }

    if notified > 0 {
        info!("Sent {} rate target notifications to broker {}", notified, broker_id);
    }
    batch
}
