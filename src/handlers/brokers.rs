// src/handlers/brokers.rs
use std::sync::Arc;

use log::info;
use serde::Deserialize;
use warp::reply::Json;
use warp::Rejection;

use crate::services::monitor::evaluate_broker;
use crate::services::rate_source::DocumentSource;
use super::error::{reject, ApiError};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RateStatusQuery {
    pub term_years: Option<u32>,
}

pub async fn get_rate_status<S: DocumentSource>(
    broker_id: String,
    query: RateStatusQuery,
    state: Arc<AppState<S>>,
) -> Result<Json, Rejection> {
    let term_years = query.term_years.unwrap_or(30);
    info!("Handling rate status request for broker {} ({}y)", broker_id, term_years);

    if state.store.get_client_mortgages(&broker_id).await.is_empty() {
        return Err(reject(ApiError::not_found(format!("no clients for broker {}", broker_id))));
    }

    let batch = evaluate_broker(
        &state.store,
        &state.notifier,
        &broker_id,
        term_years,
        state.config.fallback_market_rate,
    )
    .await;
    Ok(warp::reply::json(&batch))
}

pub async fn get_notifications<S: DocumentSource>(
    user_id: String,
    state: Arc<AppState<S>>,
) -> Result<Json, Rejection> {
    Ok(warp::reply::json(&state.notifier.for_user(&user_id)))
}
