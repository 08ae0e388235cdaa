use bigdecimal::BigDecimal;

use crate::aggregator::Aggregator;
use crate::entities::StakeLocker;
use crate::events::EventContext;
use crate::store::KeyedStore;
use crate::units::to_usd;

impl Aggregator {
    /// Refresh a stake locker's USD view from its raw input-token counters
    /// and the owning pool's current input token price. Same per-block guard
    /// as `schedule_tick`.
    pub fn stake_locker_tick(
        &self,
        locker: &mut StakeLocker,
        input_token_decimals: u32,
        input_token_price_usd: &BigDecimal,
        ctx: &EventContext,
    ) {
        if locker.last_updated_block == ctx.block_number {
            return;
        }

        locker.staked_balance_usd = to_usd(
            &locker.stake_token_balance_in_pool_input_tokens,
            input_token_decimals,
            input_token_price_usd,
        );
        locker.cumulative_interest_usd = to_usd(
            &locker.cumulative_interest_in_pool_input_tokens,
            input_token_decimals,
            input_token_price_usd,
        );
        locker.cumulative_losses_usd = to_usd(
            &locker.cumulative_stake_default_in_pool_input_tokens,
            input_token_decimals,
            input_token_price_usd,
        );
        locker.revenue_usd = locker.cumulative_interest_usd.clone();

        locker.last_updated_block = ctx.block_number;
        self.store().stake_lockers.save(&locker.id, locker.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceResolver;
    use crate::store::{EntityStore, StakeLockerSeed};
    use num_bigint::BigInt;
    use std::str::FromStr;
    use std::sync::Arc;

    #[test]
    fn usd_fields_follow_raw_counters_and_price() {
        let store = Arc::new(EntityStore::new());
        let mut locker = store.get_or_create_stake_locker(
            "0xlocker",
            StakeLockerSeed {
                market: "0xpool".to_string(),
                stake_token: "0xbpt".to_string(),
                creation_timestamp: 1,
                creation_block: 1,
            },
        );
        let aggregator = Aggregator::new(store, PriceResolver::new(Vec::new()));

        locker.stake_token_balance_in_pool_input_tokens = BigInt::from(2_000_000u64);
        locker.cumulative_interest_in_pool_input_tokens = BigInt::from(500_000u64);

        let ctx = EventContext {
            block_number: 10,
            timestamp: 1_650_000_000,
            tx_sender: "0xsender".to_string(),
        };
        let price = BigDecimal::from_str("1.00").unwrap();
        aggregator.stake_locker_tick(&mut locker, 6, &price, &ctx);

        assert_eq!(locker.staked_balance_usd, BigDecimal::from(2));
        assert_eq!(
            locker.cumulative_interest_usd,
            BigDecimal::from_str("0.5").unwrap()
        );
        assert_eq!(locker.revenue_usd, locker.cumulative_interest_usd);

        // Same block: a raw change must not surface until the next block.
        locker.cumulative_interest_in_pool_input_tokens = BigInt::from(999_999u64);
        aggregator.stake_locker_tick(&mut locker, 6, &price, &ctx);
        assert_eq!(
            locker.cumulative_interest_usd,
            BigDecimal::from_str("0.5").unwrap()
        );
    }
}
