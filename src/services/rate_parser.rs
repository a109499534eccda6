// src/services/rate_parser.rs
use chrono::NaiveDate;
use log::debug;
use regex::Regex;
use scraper::{Html, Selector};

use crate::models::RateQuote;
use super::error::{RateError, RateResult};

/// Spread of the 15-year rate below the 30-year rate.
pub const FIFTEEN_YEAR_SPREAD: f64 = 0.625;
/// Spread of the 20-year rate below the 30-year rate.
pub const TWENTY_YEAR_SPREAD: f64 = 0.3125;

const PRIMARY_RATE_SELECTOR: &str = ".current-mtg-rate .rate";
const RATE_DATE_SELECTOR: &str = ".current-mtg-rate .rate-date";
const FALLBACK_RATE_PATTERN: &str = r#"<div class="rate">\s*(\d+\.\d+)%\s*</div>"#;
const PERCENT_PATTERN: &str = r"^(\d+\.\d+)%$";

fn selector(css: &str) -> RateResult<Selector> {
    Selector::parse(css).map_err(|e| RateError::extraction(format!("invalid selector {}: {:?}", css, e)))
}

fn percent_value(text: &str) -> RateResult<Option<f64>> {
    let re = Regex::new(PERCENT_PATTERN).map_err(|e| RateError::extraction(e.to_string()))?;
    Ok(re
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok()))
}

/// Text of the rate element nested inside the current-rate block.
fn primary_match(document: &Html) -> RateResult<Option<f64>> {
    let rate_selector = selector(PRIMARY_RATE_SELECTOR)?;
    match document.select(&rate_selector).next() {
        Some(element) => {
            let text: String = element.text().collect();
            percent_value(&text)
        }
        None => Ok(None),
    }
}

/// Bare rate divs anywhere in the raw text: the first plausible one, else
/// the first one found.
fn fallback_match(raw: &str) -> RateResult<Option<f64>> {
    let re = Regex::new(FALLBACK_RATE_PATTERN).map_err(|e| RateError::extraction(e.to_string()))?;
    let values: Vec<f64> = re
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    Ok(values
        .iter()
        .copied()
        .find(|rate| is_plausible_rate(*rate))
        .or_else(|| values.first().copied()))
}

/// Date printed next to the rate as `M/D/YYYY`, if any.
fn published_date(document: &Html) -> Option<NaiveDate> {
    let date_selector = selector(RATE_DATE_SELECTOR).ok()?;
    let text: String = document.select(&date_selector).next()?.text().collect();
    NaiveDate::parse_from_str(text.trim(), "%m/%d/%Y").ok()
}

pub fn is_plausible_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0 && rate < 15.0
}

/// The 30/20/15-year quotes derived from one 30-year observation.
pub fn derive_quotes(observed_date: NaiveDate, rate30: f64) -> Vec<RateQuote> {
    vec![
        RateQuote::fixed(observed_date, 30, rate30),
        RateQuote::fixed(observed_date, 20, (rate30 - TWENTY_YEAR_SPREAD).max(0.0)),
        RateQuote::fixed(observed_date, 15, (rate30 - FIFTEEN_YEAR_SPREAD).max(0.0)),
    ]
}

/// Extract the 30-year fixed rate from a rate page and derive the 20 and
/// 15-year quotes. `today` dates the quotes when the page carries no date.
pub fn parse(document: &str, today: NaiveDate) -> RateResult<Vec<RateQuote>> {
    let html = Html::parse_document(document);

    let primary = primary_match(&html)?;
    if let Some(rate) = primary {
        debug!("Primary rate pattern matched: {}", rate);
    }

    let rate30 = match primary.filter(|rate| is_plausible_rate(*rate)) {
        Some(rate) => rate,
        None => match fallback_match(document)? {
            Some(rate) if is_plausible_rate(rate) => {
                debug!("Fallback rate pattern matched: {}", rate);
                rate
            }
            Some(rate) => {
                return Err(RateError::extraction(format!("rate {} is outside (0, 15)", rate)));
            }
            None => match primary {
                Some(rate) => {
                    return Err(RateError::extraction(format!("rate {} is outside (0, 15)", rate)));
                }
                None => return Err(RateError::extraction("rate not found in document")),
            },
        },
    };

    let observed_date = published_date(&html).unwrap_or(today);
    Ok(derive_quotes(observed_date, rate30))
}
