// src/models.rs
use serde::{Serialize, Deserialize};
use chrono::{DateTime, NaiveDate, Utc};

/// One loan's economic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MortgageTerms {
    pub principal: f64,
    pub annual_rate_percent: f64,
    pub term_years: u32,
}

impl MortgageTerms {
    pub fn new(principal: f64, annual_rate_percent: f64, term_years: u32) -> Self {
        MortgageTerms {
            principal,
            annual_rate_percent,
            term_years,
        }
    }
}

/// One observed market rate. At most one per (observed_date, term_years) in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub observed_date: NaiveDate,
    pub term_years: u32,
    pub rate_percent: f64,
    pub rate_type: String,
}

impl RateQuote {
    pub fn fixed(observed_date: NaiveDate, term_years: u32, rate_percent: f64) -> Self {
        RateQuote {
            observed_date,
            term_years,
            rate_percent,
            rate_type: "Fixed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmortizationEntry {
    pub payment: f64,
    pub principal_portion: f64,
    pub interest_portion: f64,
    pub remaining_balance: f64,
}

/// Market rate a comparison was made against. `is_fallback` is set when no real
/// quote was available and the configured default was substituted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRate {
    pub rate_percent: f64,
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateComparisonResult {
    pub is_target_met: bool,
    pub savings_amount: f64,
    pub percentage_to_target: f64,
    pub reference_rate: f64,
    pub reference_is_fallback: bool,
}

/// A broker's client together with the client's primary mortgage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMortgage {
    pub client_id: String,
    pub broker_id: String,
    pub first_name: String,
    pub last_name: String,
    pub current_rate: f64,
    pub target_rate: f64,
    pub loan_amount: f64,
    pub term_years: u32,
}

impl ClientMortgage {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub created_at: DateTime<Utc>,
}
