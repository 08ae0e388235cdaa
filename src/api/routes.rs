use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::get_health;
use crate::entities::{FinancialsDailySnapshot, Market, MarketSnapshot, Protocol, SnapshotInterval};
use crate::error::AppError;
use crate::manifest::ManifestLoader;
use crate::store::{EntityStore, KeyedStore};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<EntityStore>,
    pub manifest: Arc<ManifestLoader>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/protocol", get(get_protocol))
        .route("/financials", get(get_financials))
        .route("/markets", get(get_markets))
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/snapshots", get(get_market_snapshots))
        .route("/deployments.json", get(get_deployments))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MarketsQuery {
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct SnapshotsQuery {
    pub interval: Option<SnapshotInterval>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types: decimals serialized as strings
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ProtocolResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub network: String,
    pub total_value_locked_usd: String,
    pub total_deposit_balance_usd: String,
    pub cumulative_deposit_usd: String,
    pub total_borrow_balance_usd: String,
    pub cumulative_borrow_usd: String,
    pub cumulative_liquidate_usd: String,
    pub cumulative_supply_side_revenue_usd: String,
    pub cumulative_protocol_side_revenue_usd: String,
    pub cumulative_total_revenue_usd: String,
    pub markets: usize,
}

impl ProtocolResponse {
    fn from_entity(protocol: &Protocol, markets: usize) -> Self {
        Self {
            id: protocol.id.clone(),
            name: protocol.name.clone(),
            slug: protocol.slug.clone(),
            network: protocol.network.clone(),
            total_value_locked_usd: protocol.total_value_locked_usd.to_string(),
            total_deposit_balance_usd: protocol.total_deposit_balance_usd.to_string(),
            cumulative_deposit_usd: protocol.cumulative_deposit_usd.to_string(),
            total_borrow_balance_usd: protocol.total_borrow_balance_usd.to_string(),
            cumulative_borrow_usd: protocol.cumulative_borrow_usd.to_string(),
            cumulative_liquidate_usd: protocol.cumulative_liquidate_usd.to_string(),
            cumulative_supply_side_revenue_usd: protocol
                .cumulative_supply_side_revenue_usd
                .to_string(),
            cumulative_protocol_side_revenue_usd: protocol
                .cumulative_protocol_side_revenue_usd
                .to_string(),
            cumulative_total_revenue_usd: protocol.cumulative_total_revenue_usd.to_string(),
            markets,
        }
    }
}

#[derive(Serialize)]
pub struct MarketResponse {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub can_borrow_from: bool,
    pub input_token: String,
    pub output_token: String,
    pub total_value_locked_usd: String,
    pub total_deposit_balance_usd: String,
    pub cumulative_deposit_usd: String,
    pub total_borrow_balance_usd: String,
    pub cumulative_borrow_usd: String,
    pub cumulative_liquidate_usd: String,
    pub input_token_price_usd: String,
    pub output_token_price_usd: String,
    pub exchange_rate: String,
    pub supply_side_revenue_usd: String,
    pub protocol_side_revenue_usd: String,
    pub total_revenue_usd: String,
    pub reward_tokens: Vec<String>,
    pub reward_token_emissions_usd: Vec<String>,
}

impl From<&Market> for MarketResponse {
    fn from(market: &Market) -> Self {
        Self {
            id: market.id.clone(),
            name: market.name.clone(),
            is_active: market.is_active,
            can_borrow_from: market.can_borrow_from,
            input_token: market.input_token.clone(),
            output_token: market.output_token.clone(),
            total_value_locked_usd: market.total_value_locked_usd.to_string(),
            total_deposit_balance_usd: market.total_deposit_balance_usd.to_string(),
            cumulative_deposit_usd: market.cumulative_deposit_usd.to_string(),
            total_borrow_balance_usd: market.total_borrow_balance_usd.to_string(),
            cumulative_borrow_usd: market.cumulative_borrow_usd.to_string(),
            cumulative_liquidate_usd: market.cumulative_liquidate_usd.to_string(),
            input_token_price_usd: market.input_token_price_usd.to_string(),
            output_token_price_usd: market.output_token_price_usd.to_string(),
            exchange_rate: market.exchange_rate.to_string(),
            supply_side_revenue_usd: market.supply_side_revenue_usd.to_string(),
            protocol_side_revenue_usd: market.protocol_side_revenue_usd.to_string(),
            total_revenue_usd: market.total_revenue_usd.to_string(),
            reward_tokens: market.reward_tokens.clone(),
            reward_token_emissions_usd: market
                .reward_token_emissions_usd
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub id: String,
    pub interval: String,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_count: u64,
    pub total_value_locked_usd: String,
    pub total_deposit_balance_usd: String,
    pub input_token_price_usd: String,
    pub exchange_rate: String,
    pub period_deposit_usd: String,
    pub period_borrow_usd: String,
    pub period_liquidate_usd: String,
}

impl From<&MarketSnapshot> for SnapshotResponse {
    fn from(snapshot: &MarketSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            interval: snapshot.interval.to_string(),
            timestamp: snapshot.timestamp,
            block_number: snapshot.block_number,
            tx_count: snapshot.tx_count,
            total_value_locked_usd: snapshot.total_value_locked_usd.to_string(),
            total_deposit_balance_usd: snapshot.total_deposit_balance_usd.to_string(),
            input_token_price_usd: snapshot.input_token_price_usd.to_string(),
            exchange_rate: snapshot.exchange_rate.to_string(),
            period_deposit_usd: snapshot.period_deposit_usd.to_string(),
            period_borrow_usd: snapshot.period_borrow_usd.to_string(),
            period_liquidate_usd: snapshot.period_liquidate_usd.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct FinancialsResponse {
    pub id: String,
    pub timestamp: u64,
    pub total_value_locked_usd: String,
    pub total_deposit_balance_usd: String,
    pub total_borrow_balance_usd: String,
    pub daily_supply_side_revenue_usd: String,
    pub daily_protocol_side_revenue_usd: String,
    pub daily_total_revenue_usd: String,
    pub daily_deposit_usd: String,
    pub daily_borrow_usd: String,
    pub daily_liquidate_usd: String,
}

impl From<&FinancialsDailySnapshot> for FinancialsResponse {
    fn from(snapshot: &FinancialsDailySnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            timestamp: snapshot.timestamp,
            total_value_locked_usd: snapshot.total_value_locked_usd.to_string(),
            total_deposit_balance_usd: snapshot.total_deposit_balance_usd.to_string(),
            total_borrow_balance_usd: snapshot.total_borrow_balance_usd.to_string(),
            daily_supply_side_revenue_usd: snapshot.daily_supply_side_revenue_usd.to_string(),
            daily_protocol_side_revenue_usd: snapshot
                .daily_protocol_side_revenue_usd
                .to_string(),
            daily_total_revenue_usd: snapshot.daily_total_revenue_usd.to_string(),
            daily_deposit_usd: snapshot.daily_deposit_usd.to_string(),
            daily_borrow_usd: snapshot.daily_borrow_usd.to_string(),
            daily_liquidate_usd: snapshot.daily_liquidate_usd.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_protocol(State(state): State<ApiState>) -> Json<Vec<ProtocolResponse>> {
    let markets = state.store.markets.len();
    let protocols = state
        .store
        .protocols
        .values()
        .iter()
        .map(|p| ProtocolResponse::from_entity(p, markets))
        .collect();
    Json(protocols)
}

async fn get_financials(State(state): State<ApiState>) -> Json<Vec<FinancialsResponse>> {
    let mut snapshots = state.store.financials_daily_snapshots.values();
    snapshots.sort_by_key(|s| s.timestamp);
    Json(snapshots.iter().map(FinancialsResponse::from).collect())
}

async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<MarketsQuery>,
) -> Json<Vec<MarketResponse>> {
    let mut markets = state.store.markets.values();
    if let Some(active) = params.active {
        markets.retain(|m| m.is_active == active);
    }
    markets.sort_by(|a, b| a.id.cmp(&b.id));
    Json(markets.iter().map(MarketResponse::from).collect())
}

async fn get_market(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
) -> Result<Json<MarketResponse>, StatusCode> {
    state
        .store
        .markets
        .load(&market_id)
        .map(|m| Json(MarketResponse::from(&m)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_market_snapshots(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
    Query(params): Query<SnapshotsQuery>,
) -> Json<Vec<SnapshotResponse>> {
    let interval = params.interval.unwrap_or(SnapshotInterval::Daily);
    let limit = params.limit.unwrap_or(30);

    let map = match interval {
        SnapshotInterval::Daily => &state.store.market_daily_snapshots,
        SnapshotInterval::Hourly => &state.store.market_hourly_snapshots,
    };
    let mut snapshots: Vec<MarketSnapshot> = map
        .values()
        .into_iter()
        .filter(|s| s.market == market_id)
        .collect();
    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    snapshots.truncate(limit);

    Json(snapshots.iter().map(SnapshotResponse::from).collect())
}

async fn get_deployments(
    State(state): State<ApiState>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(state.manifest.get().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::entities::PoolState;
    use crate::events::{ChainEvent, EventContext, EventKind};
    use crate::handlers::EventProcessor;
    use crate::prices::{PriceResolver, StaticQuoteSource};
    use crate::entities::PriceSourceKind;
    use bigdecimal::BigDecimal;
    use num_bigint::BigInt;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn populated_state() -> ApiState {
        let store = Arc::new(EntityStore::new());
        let mut quotes = HashMap::new();
        quotes.insert("0xusdc".to_string(), BigDecimal::from_str("1.00").unwrap());
        let resolver = PriceResolver::new(vec![Box::new(StaticQuoteSource::new(
            PriceSourceKind::ProtocolOracle,
            quotes,
        ))]);
        let aggregator = Aggregator::new(Arc::clone(&store), resolver);
        let mut processor = EventProcessor::new(Arc::clone(&store), aggregator);

        let t = 1_650_000_000u64;
        let ctx = |block, timestamp| EventContext {
            block_number: block,
            timestamp,
            tx_sender: "0xlender".to_string(),
        };
        processor.apply(&ChainEvent {
            ctx: ctx(100, t),
            kind: EventKind::PoolCreated {
                pool: "0xpool".to_string(),
                pool_factory: "0xfactory".to_string(),
                name: "Pool".to_string(),
                symbol: "LP".to_string(),
                delegate: "0xdelegate".to_string(),
                stake_locker: "0xlocker".to_string(),
                stake_token: "0xbpt".to_string(),
                liquidity_asset: "0xusdc".to_string(),
                liquidity_asset_symbol: "USDC".to_string(),
                liquidity_asset_decimals: 6,
            },
        });
        processor.apply(&ChainEvent {
            ctx: ctx(101, t + 10),
            kind: EventKind::PoolStateChanged {
                pool: "0xpool".to_string(),
                state: PoolState::Finalized,
            },
        });
        processor.apply(&ChainEvent {
            ctx: ctx(102, t + 20),
            kind: EventKind::Deposit {
                pool: "0xpool".to_string(),
                liquidity_amount: BigInt::from(1_000_000u64),
                pool_tokens_minted: BigInt::from(10u64.pow(18)),
            },
        });

        ApiState {
            store,
            manifest: Arc::new(ManifestLoader::new(None)),
        }
    }

    #[tokio::test]
    async fn markets_route_serves_materialized_entities() {
        let state = populated_state();
        let Json(markets) =
            get_markets(State(state), Query(MarketsQuery { active: Some(true) })).await;
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].id, "0xpool");
        // Compare as decimals: the string scale depends on the computation.
        assert_eq!(
            BigDecimal::from_str(&markets[0].total_deposit_balance_usd).unwrap(),
            BigDecimal::from(1)
        );
    }

    #[tokio::test]
    async fn market_route_404s_on_unknown_id() {
        let state = populated_state();
        let result = get_market(State(state), Path("0xmissing".to_string())).await;
        assert!(matches!(result, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn snapshots_route_filters_by_interval_and_market() {
        let state = populated_state();
        let Json(snapshots) = get_market_snapshots(
            State(state),
            Path("0xpool".to_string()),
            Query(SnapshotsQuery {
                interval: Some(SnapshotInterval::Hourly),
                limit: None,
            }),
        )
        .await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].interval, "hourly");
        assert_eq!(snapshots[0].tx_count, 3);
    }

    #[tokio::test]
    async fn deployments_route_serves_the_manifest() {
        let state = populated_state();
        let result = get_deployments(State(state)).await;
        assert!(result.is_ok());
    }
}
