use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::aggregator::financials::update_financials_snapshot;
use crate::aggregator::snapshots::update_market_snapshot;
use crate::aggregator::Aggregator;
use crate::entities::{Market, Protocol, RewardSchedule, SnapshotInterval};
use crate::events::EventContext;
use crate::store::{KeyedStore, StakeLockerSeed, TokenSeed};
use crate::units::{pow10, to_usd};

/// USD fields captured before a tick's recomputation, for the protocol fold.
struct PreTickTotals {
    total_value_locked_usd: BigDecimal,
    total_deposit_balance_usd: BigDecimal,
    cumulative_deposit_usd: BigDecimal,
    total_borrow_balance_usd: BigDecimal,
    cumulative_borrow_usd: BigDecimal,
    cumulative_liquidate_usd: BigDecimal,
    supply_side_revenue_usd: BigDecimal,
    protocol_side_revenue_usd: BigDecimal,
    total_revenue_usd: BigDecimal,
}

impl PreTickTotals {
    fn capture(market: &Market) -> Self {
        Self {
            total_value_locked_usd: market.total_value_locked_usd.clone(),
            total_deposit_balance_usd: market.total_deposit_balance_usd.clone(),
            cumulative_deposit_usd: market.cumulative_deposit_usd.clone(),
            total_borrow_balance_usd: market.total_borrow_balance_usd.clone(),
            cumulative_borrow_usd: market.cumulative_borrow_usd.clone(),
            cumulative_liquidate_usd: market.cumulative_liquidate_usd.clone(),
            supply_side_revenue_usd: market.supply_side_revenue_usd.clone(),
            protocol_side_revenue_usd: market.protocol_side_revenue_usd.clone(),
            total_revenue_usd: market.total_revenue_usd.clone(),
        }
    }
}

impl Aggregator {
    /// The recomputation pass run after any raw-counter mutation. Refreshes
    /// prices and the exchange rate, ticks the attached reward schedules and
    /// stake locker, fully recomputes every USD field from its raw
    /// counterpart, rolls the daily/hourly snapshots, and folds the per-field
    /// deltas into the protocol singleton exactly once.
    ///
    /// The full recomputation (rather than an incremental add) means a later
    /// price correction retroactively corrects all USD fields.
    pub fn market_tick(&self, market: &mut Market, protocol: &mut Protocol, ctx: &EventContext) {
        let store = self.store();
        let input_token = store.get_or_create_token(&market.input_token, TokenSeed::default());
        let output_token = store.get_or_create_token(&market.output_token, TokenSeed::default());

        // 1. Prices and exchange rate. Zero output supply keeps the last
        // rate; a non-positive rate forces the output price to zero instead
        // of propagating a division artifact.
        market.input_token_price_usd = self.resolver.resolve_usd(store, &market.input_token);

        if market.output_token_supply > BigInt::zero() {
            market.exchange_rate = BigDecimal::from(market.input_token_balance.clone())
                / BigDecimal::from(market.output_token_supply.clone());
        }

        if market.exchange_rate > BigDecimal::zero() {
            market.output_token_price_usd = &market.input_token_price_usd
                / pow10(i64::from(input_token.decimals))
                * &market.exchange_rate
                * pow10(i64::from(output_token.decimals));
        } else {
            market.output_token_price_usd = BigDecimal::zero();
        }

        // 2. Attached reward schedules, then the stake locker.
        let mut lp_schedule = self.load_schedule(market.reward_schedule_lp.as_deref());
        if let Some(schedule) = lp_schedule.as_mut() {
            self.schedule_tick(schedule, ctx);
        }
        let mut stake_schedule = self.load_schedule(market.reward_schedule_stake.as_deref());
        if let Some(schedule) = stake_schedule.as_mut() {
            self.schedule_tick(schedule, ctx);
        }

        let mut stake_locker =
            store.get_or_create_stake_locker(&market.stake_locker, StakeLockerSeed::default());
        self.stake_locker_tick(
            &mut stake_locker,
            input_token.decimals,
            &market.input_token_price_usd,
            ctx,
        );

        // 3. Pre-tick totals for the protocol fold.
        let old = PreTickTotals::capture(market);

        // 4. Full USD recomputation from the raw counters.
        let decimals = input_token.decimals;
        let price = market.input_token_price_usd.clone();

        let locked = &market.input_token_balance
            + &stake_locker.stake_token_balance_in_pool_input_tokens;
        market.total_value_locked_usd = to_usd(&locked, decimals, &price);
        market.total_deposit_balance_usd = to_usd(&market.input_token_balance, decimals, &price);
        market.cumulative_deposit_usd = to_usd(&market.cumulative_deposit, decimals, &price);
        market.total_borrow_balance_usd = to_usd(&market.total_borrow_balance, decimals, &price);
        market.cumulative_borrow_usd = to_usd(&market.cumulative_borrow, decimals, &price);

        let cumulative_liquidate = &market.cumulative_pool_default
            + &market.cumulative_collateral_liquidation
            + &stake_locker.cumulative_stake_default_in_pool_input_tokens;
        market.cumulative_liquidate_usd = to_usd(&cumulative_liquidate, decimals, &price);

        market.delegate_revenue_usd = to_usd(&market.delegate_revenue, decimals, &price);
        market.treasury_revenue_usd = to_usd(&market.treasury_revenue, decimals, &price);
        market.supplier_revenue_usd = to_usd(&market.supplier_revenue, decimals, &price);

        market.supply_side_revenue_usd = &market.supplier_revenue_usd
            + &market.delegate_revenue_usd
            + &stake_locker.revenue_usd;
        market.protocol_side_revenue_usd = market.treasury_revenue_usd.clone();
        market.total_revenue_usd =
            &market.protocol_side_revenue_usd + &market.supply_side_revenue_usd;

        // 5. Emission arrays: a reward token emitted by both schedules sums.
        let mut emission_amounts = Vec::with_capacity(market.reward_tokens.len());
        let mut emission_usds = Vec::with_capacity(market.reward_tokens.len());
        for reward_token in &market.reward_tokens {
            let mut amount = BigInt::zero();
            let mut usd = BigDecimal::zero();
            for schedule in [lp_schedule.as_ref(), stake_schedule.as_ref()]
                .into_iter()
                .flatten()
            {
                if &schedule.reward_token == reward_token {
                    amount += &schedule.reward_token_emission_amount_per_day;
                    usd += &schedule.reward_token_emissions_usd_per_day;
                }
            }
            emission_amounts.push(amount);
            emission_usds.push(usd);
        }
        market.reward_token_emissions_amount = emission_amounts;
        market.reward_token_emissions_usd = emission_usds;

        // 6. Persist, roll snapshots, fold deltas upward.
        store.markets.save(&market.id, market.clone());
        update_market_snapshot(store, market, SnapshotInterval::Daily, ctx);
        update_market_snapshot(store, market, SnapshotInterval::Hourly, ctx);

        protocol.total_value_locked_usd = &protocol.total_value_locked_usd
            + (&market.total_value_locked_usd - &old.total_value_locked_usd);
        protocol.total_deposit_balance_usd = &protocol.total_deposit_balance_usd
            + (&market.total_deposit_balance_usd - &old.total_deposit_balance_usd);
        protocol.cumulative_deposit_usd = &protocol.cumulative_deposit_usd
            + (&market.cumulative_deposit_usd - &old.cumulative_deposit_usd);
        protocol.total_borrow_balance_usd = &protocol.total_borrow_balance_usd
            + (&market.total_borrow_balance_usd - &old.total_borrow_balance_usd);
        protocol.cumulative_borrow_usd = &protocol.cumulative_borrow_usd
            + (&market.cumulative_borrow_usd - &old.cumulative_borrow_usd);
        protocol.cumulative_liquidate_usd = &protocol.cumulative_liquidate_usd
            + (&market.cumulative_liquidate_usd - &old.cumulative_liquidate_usd);
        protocol.cumulative_supply_side_revenue_usd = &protocol
            .cumulative_supply_side_revenue_usd
            + (&market.supply_side_revenue_usd - &old.supply_side_revenue_usd);
        protocol.cumulative_protocol_side_revenue_usd = &protocol
            .cumulative_protocol_side_revenue_usd
            + (&market.protocol_side_revenue_usd - &old.protocol_side_revenue_usd);
        protocol.cumulative_total_revenue_usd = &protocol.cumulative_total_revenue_usd
            + (&market.total_revenue_usd - &old.total_revenue_usd);

        update_financials_snapshot(store, protocol, ctx);
        store.protocols.save(&protocol.id, protocol.clone());
    }

    fn load_schedule(&self, id: Option<&str>) -> Option<RewardSchedule> {
        id.and_then(|id| self.store().reward_schedules.load(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PriceSourceKind;
    use crate::prices::{PriceResolver, StaticQuoteSource};
    use crate::store::{EntityStore, MarketSeed};
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;

    fn ctx(block_number: u64, timestamp: u64) -> EventContext {
        EventContext {
            block_number,
            timestamp,
            tx_sender: "0xsender".to_string(),
        }
    }

    fn dollar_resolver(quotes: &[(&str, &str)]) -> PriceResolver {
        let table: HashMap<String, BigDecimal> = quotes
            .iter()
            .map(|(token, price)| {
                (token.to_string(), BigDecimal::from_str(price).unwrap())
            })
            .collect();
        PriceResolver::new(vec![Box::new(StaticQuoteSource::new(
            PriceSourceKind::ProtocolOracle,
            table,
        ))])
    }

    fn seeded_market(store: &EntityStore, id: &str) -> Market {
        store.get_or_create_market(
            id,
            MarketSeed {
                name: format!("Pool {id}"),
                pool_factory: "0xfac".to_string(),
                delegate: "0xdel".to_string(),
                stake_locker: format!("{id}-locker"),
                input_token: "0xusdc".to_string(),
                input_token_seed: crate::store::TokenSeed {
                    symbol: "USDC".to_string(),
                    decimals: 6,
                },
                output_token: id.to_string(),
                output_token_seed: crate::store::TokenSeed {
                    symbol: "LP".to_string(),
                    decimals: 18,
                },
                created_timestamp: 1_650_000_000,
                created_block_number: 14_000_000,
            },
        )
    }

    #[test]
    fn deposit_balance_usd_follows_the_worked_example() {
        let store = Arc::new(EntityStore::new());
        let mut market = seeded_market(&store, "0xpool");
        let aggregator =
            Aggregator::new(Arc::clone(&store), dollar_resolver(&[("0xusdc", "1.00")]));
        let mut protocol = Protocol::new();

        market.input_token_balance = BigInt::from(1_000_000u64);
        aggregator.market_tick(&mut market, &mut protocol, &ctx(100, 1_650_000_000));
        assert_eq!(market.total_deposit_balance_usd, BigDecimal::from(1));

        market.input_token_balance += BigInt::from(500_000u64);
        aggregator.market_tick(&mut market, &mut protocol, &ctx(101, 1_650_000_100));
        assert_eq!(
            market.total_deposit_balance_usd,
            BigDecimal::from_str("1.5").unwrap()
        );
    }

    #[test]
    fn zero_output_supply_keeps_the_exchange_rate() {
        let store = Arc::new(EntityStore::new());
        let mut market = seeded_market(&store, "0xpool");
        let aggregator =
            Aggregator::new(Arc::clone(&store), dollar_resolver(&[("0xusdc", "1.00")]));
        let mut protocol = Protocol::new();

        let initial_rate = market.exchange_rate.clone();
        market.input_token_balance = BigInt::from(1_000_000u64);
        for block in 0..3u64 {
            aggregator.market_tick(&mut market, &mut protocol, &ctx(100 + block, 1_650_000_000));
            assert_eq!(market.exchange_rate, initial_rate);
        }
    }

    #[test]
    fn positive_output_supply_recomputes_rate_and_share_price() {
        let store = Arc::new(EntityStore::new());
        let mut market = seeded_market(&store, "0xpool");
        let aggregator =
            Aggregator::new(Arc::clone(&store), dollar_resolver(&[("0xusdc", "1.00")]));
        let mut protocol = Protocol::new();

        // 1.0 USDC backing 1.0 WAD shares → rate 10^-12, share price $1.
        market.input_token_balance = BigInt::from(1_000_000u64);
        market.output_token_supply = BigInt::from(10u64.pow(18));
        aggregator.market_tick(&mut market, &mut protocol, &ctx(100, 1_650_000_000));

        assert_eq!(
            market.exchange_rate,
            BigDecimal::from_str("0.000000000001").unwrap()
        );
        assert_eq!(market.output_token_price_usd, BigDecimal::from(1));
    }

    #[test]
    fn unpriceable_input_token_zeroes_the_usd_view() {
        let store = Arc::new(EntityStore::new());
        let mut market = seeded_market(&store, "0xpool");
        let aggregator = Aggregator::new(Arc::clone(&store), PriceResolver::new(Vec::new()));
        let mut protocol = Protocol::new();

        market.input_token_balance = BigInt::from(1_000_000u64);
        aggregator.market_tick(&mut market, &mut protocol, &ctx(100, 1_650_000_000));

        assert!(market.total_deposit_balance_usd.is_zero());
        assert!(market.output_token_price_usd.is_zero());
        let token = store.tokens.load("0xusdc").unwrap();
        assert_eq!(token.last_price_source, PriceSourceKind::None);
    }

    #[test]
    fn protocol_fold_matches_direct_resummation() {
        let store = Arc::new(EntityStore::new());
        let aggregator = Aggregator::new(
            Arc::clone(&store),
            dollar_resolver(&[("0xusdc", "1.00")]),
        );
        let mut protocol = Protocol::new();

        let mut market_a = seeded_market(&store, "0xaaa");
        let mut market_b = seeded_market(&store, "0xbbb");

        // Interleaved ticks with drifting balances; deterministic but uneven.
        let mut timestamp = 1_650_000_000u64;
        for round in 1..=25u64 {
            timestamp += 3_000 * round;
            let block = 14_000_000 + round;
            if round % 3 != 0 {
                market_a.input_token_balance += BigInt::from(17_000u64 * round);
                market_a.cumulative_deposit += BigInt::from(17_000u64 * round);
                aggregator.market_tick(&mut market_a, &mut protocol, &ctx(block, timestamp));
            }
            if round % 2 == 0 {
                market_b.input_token_balance += BigInt::from(9_500u64 * round);
                market_b.cumulative_deposit += BigInt::from(9_500u64 * round);
                market_b.total_borrow_balance += BigInt::from(1_000u64 * round);
                aggregator.market_tick(&mut market_b, &mut protocol, &ctx(block, timestamp));
            }
        }

        // Delta folding must never drift from re-summing every market.
        let markets = store.markets.values();
        let sum = |f: fn(&Market) -> &BigDecimal| {
            markets
                .iter()
                .map(f)
                .fold(BigDecimal::zero(), |acc, v| acc + v)
        };
        assert_eq!(
            protocol.total_deposit_balance_usd,
            sum(|m| &m.total_deposit_balance_usd)
        );
        assert_eq!(
            protocol.cumulative_deposit_usd,
            sum(|m| &m.cumulative_deposit_usd)
        );
        assert_eq!(
            protocol.total_borrow_balance_usd,
            sum(|m| &m.total_borrow_balance_usd)
        );
        assert_eq!(
            protocol.total_value_locked_usd,
            sum(|m| &m.total_value_locked_usd)
        );
    }

    #[test]
    fn shared_reward_token_sums_across_both_schedules() {
        let store = Arc::new(EntityStore::new());
        seeded_market(&store, "0xpool");
        store.get_or_create_stake_locker(
            "0xpool-locker",
            crate::store::StakeLockerSeed {
                market: "0xpool".to_string(),
                stake_token: "0xbpt".to_string(),
                creation_timestamp: 1,
                creation_block: 1,
            },
        );
        store.get_or_create_reward_schedule(
            "0xlp-rewards",
            crate::store::RewardScheduleSeed {
                stake_token: "0xpool".to_string(),
                reward_token: "0xmpl".to_string(),
                reward_token_seed: crate::store::TokenSeed {
                    symbol: "MPL".to_string(),
                    decimals: 18,
                },
                creation_block: 1,
            },
        );
        store.get_or_create_reward_schedule(
            "0xstake-rewards",
            crate::store::RewardScheduleSeed {
                stake_token: "0xpool-locker".to_string(),
                reward_token: "0xmpl".to_string(),
                reward_token_seed: Default::default(),
                creation_block: 1,
            },
        );

        // Arm both schedules with live periods.
        let t = 1_650_000_000u64;
        for id in ["0xlp-rewards", "0xstake-rewards"] {
            let mut schedule = store.reward_schedules.load(id).unwrap();
            schedule.reward_rate_per_second = BigInt::from(10);
            schedule.period_finished_timestamp = t + 10_000;
            store.reward_schedules.save(id, schedule);
        }

        // The market copy is taken after the schedules wired themselves in.
        let mut market = store.markets.load("0xpool").unwrap();

        let aggregator = Aggregator::new(
            Arc::clone(&store),
            dollar_resolver(&[("0xusdc", "1.00"), ("0xmpl", "2.00")]),
        );
        let mut protocol = Protocol::new();
        aggregator.market_tick(&mut market, &mut protocol, &ctx(200, t + 1));

        assert_eq!(market.reward_tokens, vec!["0xmpl".to_string()]);
        // 10/sec over 86400s from each side, summed rather than overwritten.
        assert_eq!(
            market.reward_token_emissions_amount,
            vec![BigInt::from(1_728_000)]
        );
        // 1_728_000 raw of an 18-decimal token is dust; USD follows suit.
        assert_eq!(
            market.reward_token_emissions_usd,
            vec![BigDecimal::from_str("0.000000000003456").unwrap()]
        );
    }
}
