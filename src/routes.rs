use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::analytics::{compute_volatility, predict_next, FORECAST_DAYS, HEATMAP_SYMBOLS, VOLATILITY_DAYS};
use crate::engine::DetectRequest;
use crate::error::ApiError;
use crate::history::{load_pair_series, trailing_window};
use crate::models::{
    AppState, ArbitrageQuery, ArbitrageResponse, Currency, OpportunityView, PredictQuery,
    PredictResponse,
};
use crate::utils::{parse_currency, parse_currency_list};

type SharedAppState = Arc<AppState>;

/// API routes plus the static frontend as fallback.
pub fn router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/api/arbitrage", get(arbitrage_handler))
        .route("/api/volatility", get(volatility_handler))
        .route("/api/predict", get(predict_handler))
        .route("/api/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// GET /api/arbitrage?base=USD&target=JPY&currencies=USD,EUR,GBP&min_profit=0.3
/// `base`/`target` are always scanned and rank first.
pub async fn arbitrage_handler(
    State(state): State<SharedAppState>,
    Query(q): Query<ArbitrageQuery>,
) -> Result<Json<ArbitrageResponse>, ApiError> {
    let min_profit_pct = q.min_profit.unwrap_or(state.min_profit);
    if !min_profit_pct.is_finite() {
        return Err(ApiError::BadRequest(format!(
            "min_profit must be a finite number, got {}",
            min_profit_pct
        )));
    }

    let must_include: Vec<Currency> = [q.base.as_deref(), q.target.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(parse_currency)
        .collect();
    let universe = q
        .currencies
        .as_deref()
        .map(parse_currency_list)
        .filter(|list| !list.is_empty());

    let detection = state
        .engine
        .detect(&DetectRequest {
            universe,
            must_include,
            min_profit_pct,
        })
        .await;

    let opportunities: Vec<OpportunityView> =
        detection.opportunities.iter().map(OpportunityView::from).collect();
    info!("arbitrage: returning {} opportunities", opportunities.len());

    Ok(Json(ArbitrageResponse {
        count: opportunities.len(),
        opportunities,
        degraded: detection.is_degraded(),
    }))
}

/// GET /api/volatility -> {"EUR": 0.231, ...}
pub async fn volatility_handler(
    State(state): State<SharedAppState>,
) -> Result<Json<BTreeMap<Currency, f64>>, ApiError> {
    let symbols: Vec<Currency> = HEATMAP_SYMBOLS.iter().map(|c| Currency::from(*c)).collect();
    let (start, end) = trailing_window(VOLATILITY_DAYS);
    let series = state
        .history
        .fetch_series(&Currency::from("USD"), &symbols, start, end)
        .await?;
    Ok(Json(compute_volatility(&series)))
}

/// GET /api/predict?base=USD&target=EUR
pub async fn predict_handler(
    State(state): State<SharedAppState>,
    Query(q): Query<PredictQuery>,
) -> Result<Json<PredictResponse>, ApiError> {
    let base = q
        .base
        .as_deref()
        .map_or(Some(Currency::from("USD")), parse_currency)
        .ok_or_else(|| ApiError::BadRequest("base must not be blank".into()))?;
    let target = q
        .target
        .as_deref()
        .map_or(Some(Currency::from("EUR")), parse_currency)
        .ok_or_else(|| ApiError::BadRequest("target must not be blank".into()))?;

    let series = load_pair_series(state.history.as_ref(), &base, &target).await;
    let predictions = predict_next(&series, FORECAST_DAYS);
    Ok(Json(PredictResponse {
        base,
        target,
        predictions,
    }))
}
