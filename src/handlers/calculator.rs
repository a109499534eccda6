// src/handlers/calculator.rs
use serde::{Deserialize, Serialize};
use warp::reply::Json;
use warp::Rejection;

use crate::models::{AmortizationEntry, MortgageTerms};
use super::error::{reject, ApiError};

/// Longest term the HTTP calculator accepts.
pub const MAX_TERM_YEARS: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct CalculatorQuery {
    pub principal: f64,
    pub rate: f64,
    pub term_years: u32,
    #[serde(default)]
    pub fees: f64,
}

impl CalculatorQuery {
    fn terms(&self) -> Result<MortgageTerms, Rejection> {
        if self.term_years > MAX_TERM_YEARS {
            return Err(reject(ApiError::invalid_argument(format!(
                "term_years must be at most {}, got {}",
                MAX_TERM_YEARS, self.term_years
            ))));
        }
        Ok(MortgageTerms::new(self.principal, self.rate, self.term_years))
    }
}

#[derive(Debug, Serialize)]
struct PaymentSummary {
    monthly_payment: f64,
    total_interest: f64,
    apr: f64,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    monthly_payment: f64,
    entries: Vec<AmortizationEntry>,
}

pub async fn get_payment_summary(query: CalculatorQuery) -> Result<Json, Rejection> {
    let terms = query.terms()?;
    let summary = PaymentSummary {
        monthly_payment: terms.monthly_payment().map_err(reject)?,
        total_interest: terms.total_interest().map_err(reject)?,
        apr: terms.apr(query.fees).map_err(reject)?,
    };
    Ok(warp::reply::json(&summary))
}

pub async fn get_schedule(query: CalculatorQuery) -> Result<Json, Rejection> {
    let schedule = query.terms()?.schedule().map_err(reject)?;
    let monthly_payment = schedule.monthly_payment();
    Ok(warp::reply::json(&ScheduleResponse {
        monthly_payment,
        entries: schedule.collect(),
    }))
}
