// src/services/calculations.rs
use crate::models::{AmortizationEntry, MortgageTerms};
use super::error::{RateError, RateResult};

const APR_MAX_ITERATIONS: usize = 100;
const APR_TOLERANCE: f64 = 0.0001;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round3(value: f64) -> f64 {
    round_to(value, 3)
}

fn validate_terms(principal: f64, annual_rate_percent: f64, term_years: u32) -> RateResult<()> {
    if !principal.is_finite() || principal <= 0.0 {
        return Err(RateError::invalid(format!("principal must be a positive number, got {}", principal)));
    }
    if !annual_rate_percent.is_finite() || annual_rate_percent < 0.0 {
        return Err(RateError::invalid(format!(
            "annual rate must be a non-negative number, got {}",
            annual_rate_percent
        )));
    }
    if term_years == 0 {
        return Err(RateError::invalid("term must be a positive number of years"));
    }
    Ok(())
}

fn monthly_rate(annual_rate_percent: f64) -> f64 {
    annual_rate_percent / 100.0 / 12.0
}

fn payment_count(term_years: u32) -> u64 {
    u64::from(term_years) * 12
}

/// Fixed monthly payment for a fully amortizing loan, rounded to cents.
pub fn calculate_monthly_payment(principal: f64, annual_rate_percent: f64, term_years: u32) -> RateResult<f64> {
    validate_terms(principal, annual_rate_percent, term_years)?;

    let r = monthly_rate(annual_rate_percent);
    let n = payment_count(term_years) as f64;

    let payment = if r == 0.0 {
        principal / n
    } else {
        // (1+r)^n - 1 via ln_1p/exp_m1 keeps precision for tiny monthly rates
        let growth_minus_one = (n * r.ln_1p()).exp_m1();
        principal * r * (growth_minus_one + 1.0) / growth_minus_one
    };

    let rounded = round2(payment);
    if !rounded.is_finite() {
        return Err(RateError::calculation(format!(
            "monthly payment is not finite for principal {}, rate {}, term {}",
            principal, annual_rate_percent, term_years
        )));
    }
    Ok(rounded)
}

pub fn calculate_total_interest(principal: f64, annual_rate_percent: f64, term_years: u32) -> RateResult<f64> {
    let payment = calculate_monthly_payment(principal, annual_rate_percent, term_years)?;
    let total_paid = payment * payment_count(term_years) as f64;
    Ok(round2(total_paid - principal))
}

fn present_value(payment: f64, monthly: f64, n: f64) -> f64 {
    if monthly == 0.0 {
        payment * n
    } else {
        payment * (1.0 - (1.0 + monthly).powf(-n)) / monthly
    }
}

// d(PV)/d(apr percent); the monthly rate is apr / 1200.
fn present_value_slope(payment: f64, monthly: f64, n: f64) -> f64 {
    if monthly == 0.0 {
        return -payment * n * (n + 1.0) / 2.0 / 1200.0;
    }
    let discount = (1.0 + monthly).powf(-n);
    let d_monthly = payment * (n * (1.0 + monthly).powf(-n - 1.0) / monthly - (1.0 - discount) / (monthly * monthly));
    d_monthly / 1200.0
}

/// Newton's method on the rate that discounts the nominal payment stream to
/// the amount actually received (principal minus fees). Returns the last
/// estimate when the iteration cap is hit.
pub fn calculate_apr(principal: f64, annual_rate_percent: f64, term_years: u32, fees: f64) -> RateResult<f64> {
    validate_terms(principal, annual_rate_percent, term_years)?;
    if !fees.is_finite() || fees < 0.0 {
        return Err(RateError::invalid(format!("fees must be a non-negative number, got {}", fees)));
    }
    if fees >= principal {
        return Err(RateError::invalid(format!(
            "fees ({}) must be less than the principal ({})",
            fees, principal
        )));
    }

    let payment = calculate_monthly_payment(principal, annual_rate_percent, term_years)?;
    let received = principal - fees;
    let n = payment_count(term_years) as f64;

    let mut apr = annual_rate_percent;
    for _ in 0..APR_MAX_ITERATIONS {
        let monthly = apr / 1200.0;
        let diff = present_value(payment, monthly, n) - received;
        if diff.abs() < APR_TOLERANCE {
            break;
        }

        let slope = present_value_slope(payment, monthly, n);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let next = apr - diff / slope;
        if !next.is_finite() {
            break;
        }
        apr = next;
    }

    Ok(round3(apr))
}

/// Month-by-month breakdown of a loan. Consumed once, in chronological order.
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    payment: f64,
    monthly_rate: f64,
    balance: f64,
    remaining_payments: u64,
}

impl AmortizationSchedule {
    pub fn monthly_payment(&self) -> f64 {
        self.payment
    }
}

impl Iterator for AmortizationSchedule {
    type Item = AmortizationEntry;

    fn next(&mut self) -> Option<AmortizationEntry> {
        if self.remaining_payments == 0 {
            return None;
        }
        self.remaining_payments -= 1;

        let interest_portion = self.balance * self.monthly_rate;
        let mut payment = self.payment;
        let mut principal_portion = payment - interest_portion;

        // The rounded payment leaves drift; the final payment settles the balance exactly.
        if self.remaining_payments == 0 || principal_portion > self.balance {
            principal_portion = self.balance;
            payment = principal_portion + interest_portion;
        }

        self.balance = (self.balance - principal_portion).max(0.0);

        Some(AmortizationEntry {
            payment,
            principal_portion,
            interest_portion,
            remaining_balance: self.balance,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining_payments as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AmortizationSchedule {}

pub fn calculate_amortization_schedule(
    principal: f64,
    annual_rate_percent: f64,
    term_years: u32,
) -> RateResult<AmortizationSchedule> {
    let payment = calculate_monthly_payment(principal, annual_rate_percent, term_years)?;
    Ok(AmortizationSchedule {
        payment,
        monthly_rate: monthly_rate(annual_rate_percent),
        balance: principal,
        remaining_payments: payment_count(term_years),
    })
}

impl MortgageTerms {
    pub fn monthly_payment(&self) -> RateResult<f64> {
        calculate_monthly_payment(self.principal, self.annual_rate_percent, self.term_years)
    }

    pub fn total_interest(&self) -> RateResult<f64> {
        calculate_total_interest(self.principal, self.annual_rate_percent, self.term_years)
    }

    pub fn apr(&self, fees: f64) -> RateResult<f64> {
        calculate_apr(self.principal, self.annual_rate_percent, self.term_years, fees)
    }

    pub fn schedule(&self) -> RateResult<AmortizationSchedule> {
        calculate_amortization_schedule(self.principal, self.annual_rate_percent, self.term_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_payment_and_interest() {
        assert_eq!(calculate_monthly_payment(300000.0, 6.5, 30).unwrap(), 1896.20);
        let interest = calculate_total_interest(300000.0, 6.5, 30).unwrap();
        assert!((interest - 382632.00).abs() <= 1.0, "interest was {}", interest);
    }

    #[test]
    fn test_zero_rate_is_straight_line() {
        assert_eq!(calculate_monthly_payment(360000.0, 0.0, 30).unwrap(), 1000.0);
        assert_eq!(calculate_monthly_payment(100000.0, 0.0, 15).unwrap(), round2(100000.0 / 180.0));
        assert_eq!(calculate_total_interest(360000.0, 0.0, 30).unwrap(), 0.0);
    }

    #[test]
    fn test_payment_increases_with_rate() {
        let mut previous = calculate_monthly_payment(250000.0, 0.0, 30).unwrap();
        for step in 1..=40 {
            let rate = step as f64 * 0.25;
            let payment = calculate_monthly_payment(250000.0, rate, 30).unwrap();
            assert!(payment > previous, "payment at {}% did not increase", rate);
            previous = payment;
        }
    }

    #[test]
    fn test_tiny_rates_stay_near_straight_line() {
        let straight = calculate_monthly_payment(100000.0, 0.0, 30).unwrap();
        for rate in [1e-14, 1e-12, 1e-9] {
            assert_eq!(calculate_monthly_payment(100000.0, rate, 30).unwrap(), straight, "rate {}", rate);
        }
    }

    #[test]
    fn test_invalid_arguments_are_rejected() {
        for result in [
            calculate_monthly_payment(0.0, 6.5, 30),
            calculate_monthly_payment(-1.0, 6.5, 30),
            calculate_monthly_payment(f64::NAN, 6.5, 30),
            calculate_monthly_payment(1000.0, -0.1, 30),
            calculate_monthly_payment(1000.0, f64::INFINITY, 30),
            calculate_monthly_payment(1000.0, 6.5, 0),
        ] {
            assert!(matches!(result, Err(RateError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_overflowing_inputs_are_calculation_errors() {
        let result = calculate_monthly_payment(1.0e308, 99.0, 30);
        assert!(matches!(result, Err(RateError::CalculationError(_))));
    }

    #[test]
    fn test_apr_with_and_without_fees() {
        let no_fees = calculate_apr(300000.0, 6.5, 30, 0.0).unwrap();
        assert!((no_fees - 6.5).abs() < 0.01, "apr was {}", no_fees);

        let with_fees = calculate_apr(300000.0, 6.5, 30, 3000.0).unwrap();
        assert!(with_fees > 6.5 && with_fees < 6.7, "apr was {}", with_fees);

        let zero_rate = calculate_apr(120000.0, 0.0, 10, 1200.0).unwrap();
        assert!(zero_rate > 0.0 && zero_rate < 0.5, "apr was {}", zero_rate);
    }

    #[test]
    fn test_apr_rejects_bad_fees() {
        assert!(matches!(calculate_apr(1000.0, 5.0, 30, -1.0), Err(RateError::InvalidArgument(_))));
        assert!(matches!(calculate_apr(1000.0, 5.0, 30, 1000.0), Err(RateError::InvalidArgument(_))));
    }

    #[test]
    fn test_schedule_pays_off_the_loan() {
        for (principal, rate, years) in [
            (300000.0, 6.5, 30),
            (150000.0, 3.125, 15),
            (425000.0, 7.875, 20),
            (50000.0, 0.0, 15),
            (1234.56, 12.0, 30),
        ] {
            let schedule: Vec<_> = calculate_amortization_schedule(principal, rate, years).unwrap().collect();
            assert_eq!(schedule.len(), years as usize * 12);

            let last = schedule.last().unwrap();
            assert!(last.remaining_balance.abs() <= 0.01);

            let paid: f64 = schedule.iter().map(|e| e.principal_portion).sum();
            assert!((paid - principal).abs() <= 0.01, "principal paid {} vs {}", paid, principal);
        }
    }

    #[test]
    fn test_schedule_first_month_split() {
        let mut schedule = calculate_amortization_schedule(300000.0, 6.5, 30).unwrap();
        assert_eq!(schedule.len(), 360);
        let first = schedule.next().unwrap();
        assert_eq!(first.payment, 1896.20);
        assert!((first.interest_portion - 1625.0).abs() < 1e-9);
        assert!((first.principal_portion - 271.20).abs() < 1e-6);
        assert!((first.remaining_balance - 299728.80).abs() < 1e-6);
        assert_eq!(schedule.len(), 359);
    }
}
