// src/services/comparator.rs
use std::collections::HashMap;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::models::{
    ClientMortgage, NotificationRequest, NotificationType, RateComparisonResult, RateQuote, ReferenceRate,
};
use super::calculations::{calculate_monthly_payment, round3};
use super::error::{RateError, RateResult};

/// Long-run average used when no quote exists. Results derived from it are
/// flagged and never raise notifications.
pub const DEFAULT_FALLBACK_RATE: f64 = 6.5;

pub const TARGET_MET_TITLE: &str = "Rate Target Met";

/// Pick a reference rate from the latest quote, substituting `fallback_rate`
/// when the quote is missing or non-positive.
pub fn resolve_reference_rate(quote: Option<&RateQuote>, fallback_rate: f64) -> ReferenceRate {
    match quote {
        Some(q) if q.rate_percent.is_finite() && q.rate_percent > 0.0 => ReferenceRate {
            rate_percent: q.rate_percent,
            is_fallback: false,
        },
        _ => ReferenceRate {
            rate_percent: fallback_rate,
            is_fallback: true,
        },
    }
}

/// True when `rate` is at or below `target` once both are rounded to 3 places.
pub fn compare_rates(rate: f64, target: f64) -> bool {
    round3(rate) <= round3(target)
}

fn validate_rate(name: &str, value: f64) -> RateResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RateError::invalid(format!("{} must be a non-negative number, got {}", name, value)));
    }
    Ok(())
}

pub fn evaluate(
    client_current_rate: f64,
    client_target_rate: f64,
    reference: ReferenceRate,
    loan_amount: f64,
    term_years: u32,
) -> RateResult<RateComparisonResult> {
    validate_rate("current rate", client_current_rate)?;
    validate_rate("target rate", client_target_rate)?;
    validate_rate("reference rate", reference.rate_percent)?;

    let is_target_met = compare_rates(reference.rate_percent, client_target_rate);

    let current_payment = calculate_monthly_payment(loan_amount, client_current_rate, term_years)?;
    let reference_payment = calculate_monthly_payment(loan_amount, reference.rate_percent, term_years)?;
    let savings_amount = (current_payment - reference_payment).max(0.0);

    let spread = client_current_rate - client_target_rate;
    let percentage_to_target = if spread <= 0.0 {
        if is_target_met { 100.0 } else { 0.0 }
    } else {
        let progress = client_current_rate - reference.rate_percent;
        (progress / spread * 100.0).clamp(0.0, 100.0)
    };

    Ok(RateComparisonResult {
        is_target_met,
        savings_amount,
        percentage_to_target,
        reference_rate: reference.rate_percent,
        reference_is_fallback: reference.is_fallback,
    })
}

pub fn evaluate_client(client: &ClientMortgage, reference: ReferenceRate) -> RateResult<RateComparisonResult> {
    evaluate(
        client.current_rate,
        client.target_rate,
        reference,
        client.loan_amount,
        client.term_years,
    )
}

/// False-to-true transition of `is_target_met`. A result computed from a
/// fallback reference is never an edge.
pub fn is_rising_edge(previous_target_met: bool, current: &RateComparisonResult) -> bool {
    !previous_target_met && current.is_target_met && !current.reference_is_fallback
}

/// Previous state for a client with no recorded evaluation: whether the
/// contracted rate already satisfied the target.
pub fn initial_target_state(client: &ClientMortgage) -> bool {
    compare_rates(client.current_rate, client.target_rate)
}

pub fn target_met_notification(user_id: &str, client: &ClientMortgage, reference_rate: f64) -> NotificationRequest {
    NotificationRequest {
        user_id: user_id.to_string(),
        title: TARGET_MET_TITLE.to_string(),
        message: format!(
            "Current market rate ({:.3}%) has met the target rate for {}",
            reference_rate,
            client.full_name()
        ),
        kind: NotificationType::Rate,
        created_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedClient {
    pub client_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEvaluation {
    pub reference: ReferenceRate,
    pub rate_statuses: HashMap<String, RateComparisonResult>,
    pub clients_at_target_rate: usize,
    pub clients_above_rate: usize,
    pub total_savings: f64,
    pub excluded: Vec<ExcludedClient>,
}

/// Evaluate every client against one reference rate. A client whose inputs
/// fail is excluded and reported; the rest of the batch is unaffected.
pub fn evaluate_batch(clients: &[ClientMortgage], reference: ReferenceRate) -> BatchEvaluation {
    if reference.is_fallback {
        warn!(
            "No market quote available, evaluating {} clients against fallback rate {}",
            clients.len(),
            reference.rate_percent
        );
    }

    let mut batch = BatchEvaluation {
        reference,
        rate_statuses: HashMap::with_capacity(clients.len()),
        clients_at_target_rate: 0,
        clients_above_rate: 0,
        total_savings: 0.0,
        excluded: Vec::new(),
    };

    for client in clients {
        match evaluate_client(client, reference) {
            Ok(result) => {
                if result.is_target_met {
                    batch.clients_at_target_rate += 1;
                }
                if client.current_rate > reference.rate_percent {
                    batch.clients_above_rate += 1;
                    batch.total_savings += result.savings_amount;
                }
                batch.rate_statuses.insert(client.client_id.clone(), result);
            }
            Err(e) => {
                warn!("Excluding client {} from rate evaluation: {}", client.client_id, e);
                batch.excluded.push(ExcludedClient {
                    client_id: client.client_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Evaluated {} clients ({} excluded): {} at target, {} above market",
        clients.len(),
        batch.excluded.len(),
        batch.clients_at_target_rate,
        batch.clients_above_rate
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn real(rate: f64) -> ReferenceRate {
        ReferenceRate { rate_percent: rate, is_fallback: false }
    }

    fn client(id: &str, current: f64, target: f64, amount: f64) -> ClientMortgage {
        ClientMortgage {
            client_id: id.to_string(),
            broker_id: "broker-1".to_string(),
            first_name: "Dana".to_string(),
            last_name: "Reyes".to_string(),
            current_rate: current,
            target_rate: target,
            loan_amount: amount,
            term_years: 30,
        }
    }

    #[test]
    fn test_target_met_boundary() {
        let at = evaluate(7.5, 6.25, real(6.25), 300000.0, 30).unwrap();
        assert!(at.is_target_met);
        let above = evaluate(7.5, 6.25, real(6.251), 300000.0, 30).unwrap();
        assert!(!above.is_target_met);
        // Sub-thousandth noise rounds away
        let noisy = evaluate(7.5, 6.25, real(6.2500004), 300000.0, 30).unwrap();
        assert!(noisy.is_target_met);
    }

    #[test]
    fn test_savings_never_negative() {
        let result = evaluate(5.0, 4.5, real(7.0), 300000.0, 30).unwrap();
        assert_eq!(result.savings_amount, 0.0);
        assert_eq!(result.percentage_to_target, 0.0);
    }

    #[test]
    fn test_savings_is_payment_delta() {
        let result = evaluate(7.5, 6.0, real(6.5), 300000.0, 30).unwrap();
        let expected = calculate_monthly_payment(300000.0, 7.5, 30).unwrap()
            - calculate_monthly_payment(300000.0, 6.5, 30).unwrap();
        assert!((result.savings_amount - expected).abs() < 1e-9);
    }

    #[test]
    fn test_percentage_to_target() {
        let halfway = evaluate(8.0, 6.0, real(7.0), 200000.0, 30).unwrap();
        assert!((halfway.percentage_to_target - 50.0).abs() < 1e-9);

        let past_target = evaluate(8.0, 6.0, real(5.0), 200000.0, 30).unwrap();
        assert_eq!(past_target.percentage_to_target, 100.0);

        let no_spread_met = evaluate(6.0, 6.0, real(5.5), 200000.0, 30).unwrap();
        assert_eq!(no_spread_met.percentage_to_target, 100.0);

        let no_spread_unmet = evaluate(5.0, 6.0, real(6.5), 200000.0, 30).unwrap();
        assert_eq!(no_spread_unmet.percentage_to_target, 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(evaluate(f64::NAN, 6.0, real(6.5), 100.0, 30), Err(RateError::InvalidArgument(_))));
        assert!(matches!(evaluate(7.0, 6.0, real(6.5), -100.0, 30), Err(RateError::InvalidArgument(_))));
        assert!(matches!(evaluate(7.0, 6.0, real(6.5), 100.0, 0), Err(RateError::InvalidArgument(_))));
    }

    #[test]
    fn test_reference_fallback_is_flagged() {
        let missing = resolve_reference_rate(None, DEFAULT_FALLBACK_RATE);
        assert!(missing.is_fallback);
        assert_eq!(missing.rate_percent, 6.5);

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let zero = RateQuote::fixed(date, 30, 0.0);
        assert!(resolve_reference_rate(Some(&zero), DEFAULT_FALLBACK_RATE).is_fallback);

        let quote = RateQuote::fixed(date, 30, 6.875);
        let reference = resolve_reference_rate(Some(&quote), DEFAULT_FALLBACK_RATE);
        assert!(!reference.is_fallback);
        assert_eq!(reference.rate_percent, 6.875);
    }

    #[test]
    fn test_rising_edge_only_on_real_quotes() {
        let met = evaluate(7.5, 6.5, real(6.4), 300000.0, 30).unwrap();
        assert!(is_rising_edge(false, &met));
        assert!(!is_rising_edge(true, &met));

        let guessed = evaluate(7.5, 6.5, ReferenceRate { rate_percent: 6.5, is_fallback: true }, 300000.0, 30).unwrap();
        assert!(guessed.is_target_met);
        assert!(guessed.reference_is_fallback);
        assert!(!is_rising_edge(false, &guessed));

        let unmet = evaluate(7.5, 6.5, real(6.9), 300000.0, 30).unwrap();
        assert!(!is_rising_edge(false, &unmet));
    }

    #[test]
    fn test_batch_isolates_bad_clients() {
        let clients = vec![
            client("a", 7.5, 6.5, 300000.0),
            client("b", 7.0, 6.0, -5.0),
            client("c", 5.0, 4.5, 200000.0),
            client("d", 6.75, 6.5, 250000.0),
        ];
        let batch = evaluate_batch(&clients, real(6.5));

        assert_eq!(batch.rate_statuses.len(), 3);
        assert_eq!(batch.excluded.len(), 1);
        assert_eq!(batch.excluded[0].client_id, "b");
        assert_eq!(batch.clients_at_target_rate, 2);
        assert_eq!(batch.clients_above_rate, 2);

        let expected = batch.rate_statuses["a"].savings_amount + batch.rate_statuses["d"].savings_amount;
        assert!((batch.total_savings - expected).abs() < 1e-9);
    }

    #[test]
    fn test_notification_message() {
        let c = client("a", 7.5, 6.5, 300000.0);
        let n = target_met_notification("broker-1", &c, 6.4);
        assert_eq!(n.title, "Rate Target Met");
        assert_eq!(n.message, "Current market rate (6.400%) has met the target rate for Dana Reyes");
        assert_eq!(n.kind, NotificationType::Rate);
    }
}
