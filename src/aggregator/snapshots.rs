use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::entities::{Market, MarketSnapshot, SnapshotInterval};
use crate::events::EventContext;
use crate::store::{EntityStore, KeyedStore, MemoryStore};
use crate::units::{big_decimal_to_big_int, compute_new_average};

fn snapshot_map(store: &EntityStore, interval: SnapshotInterval) -> &MemoryStore<MarketSnapshot> {
    match interval {
        SnapshotInterval::Daily => &store.market_daily_snapshots,
        SnapshotInterval::Hourly => &store.market_hourly_snapshots,
    }
}

/// Fresh snapshot for the bucket containing `ctx.timestamp`. Captures the
/// market's then-current cumulative fields as the bucket's baselines, so
/// period deltas start at zero.
fn new_snapshot(
    market: &Market,
    interval: SnapshotInterval,
    bucket: u64,
    ctx: &EventContext,
) -> MarketSnapshot {
    MarketSnapshot {
        id: format!("{}-{}", market.id, bucket),
        market: market.id.clone(),
        interval,
        block_number: ctx.block_number,
        timestamp: bucket * interval.seconds(),
        tx_count: 0,
        total_value_locked_usd: market.total_value_locked_usd.clone(),
        total_deposit_balance_usd: market.total_deposit_balance_usd.clone(),
        cumulative_deposit_usd: market.cumulative_deposit_usd.clone(),
        cumulative_borrow_usd: market.cumulative_borrow_usd.clone(),
        cumulative_liquidate_usd: market.cumulative_liquidate_usd.clone(),
        input_token_balance: market.input_token_balance.clone(),
        input_token_price_usd: market.input_token_price_usd.clone(),
        output_token_supply: market.output_token_supply.clone(),
        output_token_price_usd: market.output_token_price_usd.clone(),
        exchange_rate: market.exchange_rate.clone(),
        reward_token_emissions_amount: market.reward_token_emissions_amount.clone(),
        reward_token_emissions_usd: market.reward_token_emissions_usd.clone(),
        period_deposit_usd: BigDecimal::zero(),
        period_borrow_usd: BigDecimal::zero(),
        period_liquidate_usd: BigDecimal::zero(),
        initial_deposit_usd: market.total_deposit_balance_usd.clone(),
        initial_borrow_usd: market.total_borrow_balance_usd.clone(),
        initial_liquidate_usd: market.cumulative_liquidate_usd.clone(),
    }
}

/// Roll the market's state into its (market, bucket) snapshot: create the
/// bucket lazily on first sight, advance the windowed averages, recompute the
/// period deltas against the stored baselines. A bucket that never sees a
/// tick is never created.
pub(crate) fn update_market_snapshot(
    store: &EntityStore,
    market: &Market,
    interval: SnapshotInterval,
    ctx: &EventContext,
) {
    let bucket = ctx.timestamp / interval.seconds();
    let id = format!("{}-{}", market.id, bucket);
    let map = snapshot_map(store, interval);

    let mut snapshot = map
        .load(&id)
        .unwrap_or_else(|| new_snapshot(market, interval, bucket, ctx));

    // Direct copies
    snapshot.reward_token_emissions_amount = market.reward_token_emissions_amount.clone();
    snapshot.reward_token_emissions_usd = market.reward_token_emissions_usd.clone();

    // Windowed averages over the ticks seen in this bucket
    let n = snapshot.tx_count;
    snapshot.total_value_locked_usd = compute_new_average(
        &snapshot.total_value_locked_usd,
        n,
        &market.total_value_locked_usd,
    );
    snapshot.total_deposit_balance_usd = compute_new_average(
        &snapshot.total_deposit_balance_usd,
        n,
        &market.total_deposit_balance_usd,
    );
    snapshot.cumulative_deposit_usd = compute_new_average(
        &snapshot.cumulative_deposit_usd,
        n,
        &market.cumulative_deposit_usd,
    );
    snapshot.cumulative_borrow_usd = compute_new_average(
        &snapshot.cumulative_borrow_usd,
        n,
        &market.cumulative_borrow_usd,
    );
    snapshot.cumulative_liquidate_usd = compute_new_average(
        &snapshot.cumulative_liquidate_usd,
        n,
        &market.cumulative_liquidate_usd,
    );
    snapshot.input_token_balance = big_decimal_to_big_int(&compute_new_average(
        &BigDecimal::from(snapshot.input_token_balance.clone()),
        n,
        &BigDecimal::from(market.input_token_balance.clone()),
    ));
    snapshot.input_token_price_usd = compute_new_average(
        &snapshot.input_token_price_usd,
        n,
        &market.input_token_price_usd,
    );
    snapshot.output_token_supply = big_decimal_to_big_int(&compute_new_average(
        &BigDecimal::from(snapshot.output_token_supply.clone()),
        n,
        &BigDecimal::from(market.output_token_supply.clone()),
    ));
    snapshot.output_token_price_usd = compute_new_average(
        &snapshot.output_token_price_usd,
        n,
        &market.output_token_price_usd,
    );
    snapshot.exchange_rate =
        compute_new_average(&snapshot.exchange_rate, n, &market.exchange_rate);

    // Period deltas against the bucket baselines
    snapshot.period_deposit_usd =
        &market.total_deposit_balance_usd - &snapshot.initial_deposit_usd;
    snapshot.period_borrow_usd = &market.total_borrow_balance_usd - &snapshot.initial_borrow_usd;
    snapshot.period_liquidate_usd =
        &market.cumulative_liquidate_usd - &snapshot.initial_liquidate_usd;

    snapshot.tx_count = n + 1;
    map.save(&id, snapshot);
}
