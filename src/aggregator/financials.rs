use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::config::SEC_PER_DAY;
use crate::entities::{FinancialsDailySnapshot, Protocol};
use crate::events::EventContext;
use crate::store::{EntityStore, KeyedStore};
use crate::units::compute_new_average;

fn new_snapshot(protocol: &Protocol, day: u64, ctx: &EventContext) -> FinancialsDailySnapshot {
    FinancialsDailySnapshot {
        id: day.to_string(),
        protocol: protocol.id.clone(),
        block_number: ctx.block_number,
        timestamp: day * SEC_PER_DAY,
        tx_count: 0,
        total_value_locked_usd: protocol.total_value_locked_usd.clone(),
        total_deposit_balance_usd: protocol.total_deposit_balance_usd.clone(),
        total_borrow_balance_usd: protocol.total_borrow_balance_usd.clone(),
        cumulative_deposit_usd: protocol.cumulative_deposit_usd.clone(),
        cumulative_borrow_usd: protocol.cumulative_borrow_usd.clone(),
        cumulative_liquidate_usd: protocol.cumulative_liquidate_usd.clone(),
        cumulative_supply_side_revenue_usd: protocol.cumulative_supply_side_revenue_usd.clone(),
        cumulative_protocol_side_revenue_usd: protocol
            .cumulative_protocol_side_revenue_usd
            .clone(),
        cumulative_total_revenue_usd: protocol.cumulative_total_revenue_usd.clone(),
        daily_supply_side_revenue_usd: BigDecimal::zero(),
        daily_protocol_side_revenue_usd: BigDecimal::zero(),
        daily_total_revenue_usd: BigDecimal::zero(),
        daily_deposit_usd: BigDecimal::zero(),
        daily_borrow_usd: BigDecimal::zero(),
        daily_liquidate_usd: BigDecimal::zero(),
        initial_supply_side_revenue_usd: protocol.cumulative_supply_side_revenue_usd.clone(),
        initial_protocol_side_revenue_usd: protocol.cumulative_protocol_side_revenue_usd.clone(),
        initial_total_revenue_usd: protocol.cumulative_total_revenue_usd.clone(),
        initial_deposit_usd: protocol.cumulative_deposit_usd.clone(),
        initial_borrow_usd: protocol.cumulative_borrow_usd.clone(),
        initial_liquidate_usd: protocol.cumulative_liquidate_usd.clone(),
    }
}

/// Protocol-level daily financials, same rollover laws as the market
/// snapshots. Runs once at the end of every market tick, after the protocol
/// deltas have been folded.
pub(crate) fn update_financials_snapshot(
    store: &EntityStore,
    protocol: &Protocol,
    ctx: &EventContext,
) {
    let day = ctx.timestamp / SEC_PER_DAY;
    let id = day.to_string();

    let mut snapshot = store
        .financials_daily_snapshots
        .load(&id)
        .unwrap_or_else(|| new_snapshot(protocol, day, ctx));

    let n = snapshot.tx_count;
    snapshot.total_value_locked_usd = compute_new_average(
        &snapshot.total_value_locked_usd,
        n,
        &protocol.total_value_locked_usd,
    );
    snapshot.total_deposit_balance_usd = compute_new_average(
        &snapshot.total_deposit_balance_usd,
        n,
        &protocol.total_deposit_balance_usd,
    );
    snapshot.total_borrow_balance_usd = compute_new_average(
        &snapshot.total_borrow_balance_usd,
        n,
        &protocol.total_borrow_balance_usd,
    );

    snapshot.cumulative_deposit_usd = protocol.cumulative_deposit_usd.clone();
    snapshot.cumulative_borrow_usd = protocol.cumulative_borrow_usd.clone();
    snapshot.cumulative_liquidate_usd = protocol.cumulative_liquidate_usd.clone();
    snapshot.cumulative_supply_side_revenue_usd =
        protocol.cumulative_supply_side_revenue_usd.clone();
    snapshot.cumulative_protocol_side_revenue_usd =
        protocol.cumulative_protocol_side_revenue_usd.clone();
    snapshot.cumulative_total_revenue_usd = protocol.cumulative_total_revenue_usd.clone();

    snapshot.daily_supply_side_revenue_usd = &protocol.cumulative_supply_side_revenue_usd
        - &snapshot.initial_supply_side_revenue_usd;
    snapshot.daily_protocol_side_revenue_usd = &protocol.cumulative_protocol_side_revenue_usd
        - &snapshot.initial_protocol_side_revenue_usd;
    snapshot.daily_total_revenue_usd =
        &protocol.cumulative_total_revenue_usd - &snapshot.initial_total_revenue_usd;
    snapshot.daily_deposit_usd =
        &protocol.cumulative_deposit_usd - &snapshot.initial_deposit_usd;
    snapshot.daily_borrow_usd = &protocol.cumulative_borrow_usd - &snapshot.initial_borrow_usd;
    snapshot.daily_liquidate_usd =
        &protocol.cumulative_liquidate_usd - &snapshot.initial_liquidate_usd;

    snapshot.tx_count = n + 1;
    store.financials_daily_snapshots.save(&id, snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(block_number: u64, timestamp: u64) -> EventContext {
        EventContext {
            block_number,
            timestamp,
            tx_sender: "0xsender".to_string(),
        }
    }

    #[test]
    fn daily_revenue_deltas_track_the_baseline() {
        let store = EntityStore::new();
        let mut protocol = Protocol::new();
        let t = 86_400 * 20;

        protocol.cumulative_total_revenue_usd = BigDecimal::from(10);
        update_financials_snapshot(&store, &protocol, &ctx(1, t));

        let snapshot = store.financials_daily_snapshots.load("20").unwrap();
        assert!(snapshot.daily_total_revenue_usd.is_zero());

        protocol.cumulative_total_revenue_usd = BigDecimal::from(25);
        update_financials_snapshot(&store, &protocol, &ctx(2, t + 100));

        let snapshot = store.financials_daily_snapshots.load("20").unwrap();
        assert_eq!(snapshot.daily_total_revenue_usd, BigDecimal::from(15));
        assert_eq!(snapshot.cumulative_total_revenue_usd, BigDecimal::from(25));
        assert_eq!(snapshot.tx_count, 2);
    }
}
