use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub markets: usize,
    pub loans: usize,
    pub daily_snapshots: usize,
    pub hourly_snapshots: usize,
}

pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        markets: state.store.markets.len(),
        loans: state.store.loans.len(),
        daily_snapshots: state.store.market_daily_snapshots.len(),
        hourly_snapshots: state.store.market_hourly_snapshots.len(),
    })
}
