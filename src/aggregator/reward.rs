use num_bigint::BigInt;
use num_traits::Zero;

use crate::aggregator::Aggregator;
use crate::config::SEC_PER_DAY;
use crate::entities::RewardSchedule;
use crate::events::EventContext;
use crate::store::{KeyedStore, TokenSeed};
use crate::units::to_usd;

impl Aggregator {
    /// Refresh a reward schedule's per-day emission. At most once per block:
    /// several handlers in one block may tick the same schedule, and repeated
    /// ticks must converge rather than accumulate.
    pub fn schedule_tick(&self, schedule: &mut RewardSchedule, ctx: &EventContext) {
        if schedule.last_updated_block == ctx.block_number {
            return;
        }

        let reward_active = ctx.timestamp < schedule.period_finished_timestamp;
        schedule.reward_token_emission_amount_per_day = if reward_active {
            &schedule.reward_rate_per_second * BigInt::from(SEC_PER_DAY)
        } else {
            BigInt::zero()
        };

        let reward_token = self
            .store()
            .get_or_create_token(&schedule.reward_token, TokenSeed::default());
        let reward_token_price = self.resolver.resolve_usd(self.store(), &schedule.reward_token);
        schedule.reward_token_emissions_usd_per_day = to_usd(
            &schedule.reward_token_emission_amount_per_day,
            reward_token.decimals,
            &reward_token_price,
        );

        schedule.last_updated_block = ctx.block_number;
        self.store()
            .reward_schedules
            .save(&schedule.id, schedule.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceResolver;
    use crate::store::{EntityStore, RewardScheduleSeed};
    use bigdecimal::BigDecimal;
    use std::sync::Arc;

    fn ctx(block_number: u64, timestamp: u64) -> EventContext {
        EventContext {
            block_number,
            timestamp,
            tx_sender: "0xsender".to_string(),
        }
    }

    fn aggregator_with_schedule() -> (Aggregator, RewardSchedule) {
        let store = Arc::new(EntityStore::new());
        let schedule = store.get_or_create_reward_schedule(
            "0xrewards",
            RewardScheduleSeed {
                stake_token: "0xpool".to_string(),
                reward_token: "0xmpl".to_string(),
                reward_token_seed: Default::default(),
                creation_block: 1,
            },
        );
        let aggregator = Aggregator::new(store, PriceResolver::new(Vec::new()));
        (aggregator, schedule)
    }

    #[test]
    fn emission_runs_until_period_finish_then_stops() {
        let (aggregator, mut schedule) = aggregator_with_schedule();
        let t = 1_650_000_000u64;
        schedule.reward_rate_per_second = BigInt::from(10);
        schedule.period_finished_timestamp = t + 1000;

        aggregator.schedule_tick(&mut schedule, &ctx(100, t + 1));
        assert_eq!(
            schedule.reward_token_emission_amount_per_day,
            BigInt::from(864_000)
        );

        aggregator.schedule_tick(&mut schedule, &ctx(101, t + 2000));
        assert!(schedule.reward_token_emission_amount_per_day.is_zero());
    }

    #[test]
    fn second_tick_in_same_block_changes_nothing() {
        let (aggregator, mut schedule) = aggregator_with_schedule();
        let t = 1_650_000_000u64;
        schedule.reward_rate_per_second = BigInt::from(10);
        schedule.period_finished_timestamp = t + 1000;

        aggregator.schedule_tick(&mut schedule, &ctx(100, t + 1));
        let after_first = schedule.clone();

        // Rate changes mid-block must not be re-applied within the block.
        schedule.reward_rate_per_second = BigInt::from(999);
        aggregator.schedule_tick(&mut schedule, &ctx(100, t + 1));
        assert_eq!(
            schedule.reward_token_emission_amount_per_day,
            after_first.reward_token_emission_amount_per_day
        );
        assert_eq!(schedule.last_updated_block, after_first.last_updated_block);
    }

    #[test]
    fn exhausted_price_sources_zero_the_usd_emission() {
        let (aggregator, mut schedule) = aggregator_with_schedule();
        let t = 1_650_000_000u64;
        schedule.reward_rate_per_second = BigInt::from(10);
        schedule.period_finished_timestamp = t + 1000;

        aggregator.schedule_tick(&mut schedule, &ctx(100, t + 1));
        assert_eq!(
            schedule.reward_token_emissions_usd_per_day,
            BigDecimal::from(0)
        );
    }
}
