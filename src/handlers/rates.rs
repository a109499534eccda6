// src/handlers/rates.rs
use std::sync::Arc;

use chrono::NaiveDate;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use warp::reply::Json;
use warp::Rejection;

use crate::services::rate_source::DocumentSource;
use super::error::{reject, ApiError};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn get_current_rates<S: DocumentSource>(state: Arc<AppState<S>>) -> Result<Json, Rejection> {
    info!("Handling request to get current rates");

    let rates = state.ingestor.current_rates(false).await.map_err(|e| {
        error!("No rates available: {}", e);
        reject(e)
    })?;

    Ok(warp::reply::json(&rates))
}

pub async fn get_rate_history<S: DocumentSource>(
    term_years: u32,
    query: HistoryQuery,
    state: Arc<AppState<S>>,
) -> Result<Json, Rejection> {
    info!("Handling request for {}-year rate history", term_years);

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(reject(ApiError::invalid_argument("'from' must not be after 'to'")));
        }
    }

    let history = state.store.rate_history(term_years, query.from, query.to).await;
    Ok(warp::reply::json(&json!({
        "term_years": term_years,
        "rates": history,
    })))
}
