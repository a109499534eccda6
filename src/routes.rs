// src/routes.rs
use std::convert::Infallible;
use std::sync::Arc;

use log::info;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::brokers::{get_notifications, get_rate_status, RateStatusQuery};
use crate::handlers::calculator::{get_payment_summary, get_schedule, CalculatorQuery};
use crate::handlers::error::ApiError;
use crate::handlers::rates::{get_current_rates, get_rate_history, HistoryQuery};
use crate::handlers::AppState;
use crate::services::rate_source::DocumentSource;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status();
        message = api_error.message.clone();
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = e.to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes<S>(state: Arc<AppState<S>>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone
where
    S: DocumentSource + 'static,
{
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let current_rates_route = warp::path!("api" / "v1" / "rates")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_current_rates::<S>);

    let rate_history_route = warp::path!("api" / "v1" / "rates" / "history" / u32)
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(state_filter.clone())
        .and_then(get_rate_history::<S>);

    let calculator_route = warp::path!("api" / "v1" / "calculator")
        .and(warp::get())
        .and(warp::query::<CalculatorQuery>())
        .and_then(get_payment_summary);

    let schedule_route = warp::path!("api" / "v1" / "calculator" / "schedule")
        .and(warp::get())
        .and(warp::query::<CalculatorQuery>())
        .and_then(get_schedule);

    let rate_status_route = warp::path!("api" / "v1" / "brokers" / String / "rate_status")
        .and(warp::get())
        .and(warp::query::<RateStatusQuery>())
        .and(state_filter.clone())
        .and_then(get_rate_status::<S>);

    let notifications_route = warp::path!("api" / "v1" / "notifications" / String)
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_notifications::<S>);

    info!("All routes configured successfully.");

    current_rates_route
        .or(rate_history_route)
        .or(calculator_route)
        .or(schedule_route)
        .or(rate_status_route)
        .or(notifications_route)
        .recover(handle_rejection)
}
