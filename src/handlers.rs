use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::entities::{LoanVersion, PoolState, Protocol};
use crate::events::{ChainEvent, EventContext, EventKind};
use crate::store::{
    EntityStore, KeyedStore, LoanSeed, MarketSeed, RewardScheduleSeed, StakeLockerSeed, TokenSeed,
};
use crate::units::big_decimal_to_big_int;

/// Applies decoded chain events strictly sequentially: mutate the raw
/// counters an event names, then run exactly one market tick before moving
/// on. Owns the protocol singleton and threads it through every tick.
pub struct EventProcessor {
    store: Arc<EntityStore>,
    aggregator: Aggregator,
    protocol: Protocol,
    last_block: u64,
    events_applied: u64,
}

impl EventProcessor {
    pub fn new(store: Arc<EntityStore>, aggregator: Aggregator) -> Self {
        Self {
            store,
            aggregator,
            protocol: Protocol::new(),
            last_block: 0,
            events_applied: 0,
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    pub fn apply(&mut self, event: &ChainEvent) {
        let ctx = &event.ctx;
        if ctx.block_number < self.last_block {
            // The upstream ordering contract says this cannot happen; trust
            // the stream but leave a trace for auditing.
            warn!(
                block = ctx.block_number,
                last_block = self.last_block,
                "block number regressed; applying anyway"
            );
        }
        self.last_block = self.last_block.max(ctx.block_number);

        match event.kind.clone() {
            EventKind::PoolCreated {
                pool,
                pool_factory,
                name,
                symbol,
                delegate,
                stake_locker,
                stake_token,
                liquidity_asset,
                liquidity_asset_symbol,
                liquidity_asset_decimals,
            } => self.handle_pool_created(
                ctx,
                pool,
                pool_factory,
                name,
                symbol,
                delegate,
                stake_locker,
                stake_token,
                liquidity_asset,
                liquidity_asset_symbol,
                liquidity_asset_decimals,
            ),
            EventKind::Deposit {
                pool,
                liquidity_amount,
                pool_tokens_minted,
            } => self.handle_deposit(ctx, &pool, &liquidity_amount, &pool_tokens_minted),
            EventKind::Withdraw {
                pool,
                liquidity_amount,
                pool_tokens_burned,
            } => self.handle_withdraw(ctx, &pool, &liquidity_amount, &pool_tokens_burned),
            EventKind::LossesRecognized {
                pool,
                losses_recognized,
            } => self.handle_losses_recognized(ctx, &pool, &losses_recognized),
            EventKind::PoolStateChanged { pool, state } => {
                self.handle_pool_state_changed(ctx, &pool, state)
            }
            EventKind::LoanFunded {
                pool,
                loan,
                version,
                amount_funded,
            } => self.handle_loan_funded(ctx, &pool, &loan, version, &amount_funded),
            EventKind::Claim {
                pool,
                principal,
                interest,
                pool_delegate_portion,
                stake_locker_portion,
            } => self.handle_claim(
                ctx,
                &pool,
                &principal,
                &interest,
                &pool_delegate_portion,
                &stake_locker_portion,
            ),
            EventKind::DefaultSuffered {
                pool,
                loan,
                default_suffered,
                liquidity_asset_recovered_from_burn,
                stake_tokens_burned,
                stake_tokens_returned,
            } => self.handle_default_suffered(
                ctx,
                &pool,
                &loan,
                &default_suffered,
                &liquidity_asset_recovered_from_burn,
                &stake_tokens_burned,
                &stake_tokens_returned,
            ),
            EventKind::FundsWithdrawn {
                pool,
                funds_withdrawn,
            } => self.handle_funds_withdrawn(ctx, &pool, &funds_withdrawn),
            EventKind::Stake {
                stake_locker,
                amount_in_pool_input_tokens,
            } => self.handle_stake(ctx, &stake_locker, &amount_in_pool_input_tokens, false),
            EventKind::Unstake {
                stake_locker,
                amount_in_pool_input_tokens,
            } => self.handle_stake(ctx, &stake_locker, &amount_in_pool_input_tokens, true),
            EventKind::Drawdown {
                loan,
                drawdown_amount,
            } => self.handle_drawdown(ctx, &loan, &drawdown_amount),
            EventKind::PaymentMade {
                loan,
                principal_paid,
                interest_paid,
            } => self.handle_payment_made(ctx, &loan, &principal_paid, &interest_paid),
            EventKind::Liquidation {
                loan,
                liquidity_asset_returned,
                liquidation_excess,
            } => self.handle_liquidation(ctx, &loan, &liquidity_asset_returned, &liquidation_excess),
            EventKind::RewardsCreated {
                rewards_contract,
                stake_token,
                reward_token,
                reward_token_symbol,
                reward_token_decimals,
            } => self.handle_rewards_created(
                ctx,
                &rewards_contract,
                stake_token,
                reward_token,
                reward_token_symbol,
                reward_token_decimals,
            ),
            EventKind::RewardAdded {
                rewards_contract,
                reward_amount,
            } => self.handle_reward_added(ctx, &rewards_contract, &reward_amount),
        }

        self.events_applied += 1;
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_pool_created(
        &mut self,
        ctx: &EventContext,
        pool: String,
        pool_factory: String,
        name: String,
        symbol: String,
        delegate: String,
        stake_locker: String,
        stake_token: String,
        liquidity_asset: String,
        liquidity_asset_symbol: String,
        liquidity_asset_decimals: u32,
    ) {
        self.store
            .get_or_create_pool_factory(&pool_factory, ctx.timestamp, ctx.block_number);
        self.store.get_or_create_stake_locker(
            &stake_locker,
            StakeLockerSeed {
                market: pool.clone(),
                stake_token,
                creation_timestamp: ctx.timestamp,
                creation_block: ctx.block_number,
            },
        );

        let mut market = self.store.get_or_create_market(
            &pool,
            MarketSeed {
                name,
                pool_factory,
                delegate,
                stake_locker,
                input_token: liquidity_asset,
                input_token_seed: TokenSeed {
                    symbol: liquidity_asset_symbol,
                    decimals: liquidity_asset_decimals,
                },
                output_token: pool.clone(),
                output_token_seed: TokenSeed {
                    symbol,
                    decimals: crate::config::POOL_WAD_DECIMALS,
                },
                created_timestamp: ctx.timestamp,
                created_block_number: ctx.block_number,
            },
        );
        debug!(market = %market.id, "pool created");

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_deposit(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        liquidity_amount: &BigInt,
        pool_tokens_minted: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        market.input_token_balance += liquidity_amount;
        market.cumulative_deposit += liquidity_amount;
        market.output_token_supply += pool_tokens_minted;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_withdraw(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        liquidity_amount: &BigInt,
        pool_tokens_burned: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        // Withdrawal realizes the account's accrued losses.
        let mut position = self
            .store
            .get_or_create_account_market(&ctx.tx_sender, pool);
        let losses = std::mem::replace(&mut position.unrecognized_losses, BigInt::zero());
        position.recognized_losses += &losses;
        self.store.account_markets.save(&position.id.clone(), position);

        market.input_token_balance -= liquidity_amount;
        market.cumulative_withdraw += liquidity_amount;
        market.output_token_supply -= pool_tokens_burned;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_losses_recognized(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        losses_recognized: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        let mut position = self
            .store
            .get_or_create_account_market(&ctx.tx_sender, pool);
        position.unrecognized_losses += losses_recognized;
        self.store.account_markets.save(&position.id.clone(), position);

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_pool_state_changed(&mut self, ctx: &EventContext, pool: &str, state: PoolState) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        let active = state == PoolState::Finalized;
        market.is_active = active;
        market.can_borrow_from = active;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_loan_funded(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        loan: &str,
        version: LoanVersion,
        amount_funded: &BigInt,
    ) {
        let mut loan_entity = self.store.get_or_create_loan(
            loan,
            LoanSeed {
                market: pool.to_string(),
                version,
                creation_timestamp: ctx.timestamp,
                creation_block: ctx.block_number,
            },
        );
        loan_entity.amount_funded += amount_funded;
        self.store.loans.save(loan, loan_entity.clone());

        let mut market = self
            .store
            .get_or_create_market(&loan_entity.market, MarketSeed::default());
        market.cumulative_borrow += amount_funded;
        // Funding moves pool cash into the loan.
        market.input_token_balance -= amount_funded;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_claim(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        principal: &BigInt,
        interest: &BigInt,
        pool_delegate_portion: &BigInt,
        stake_locker_portion: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        let mut locker = self
            .store
            .get_or_create_stake_locker(&market.stake_locker, StakeLockerSeed::default());
        locker.cumulative_interest_in_pool_input_tokens += stake_locker_portion;
        self.store.stake_lockers.save(&locker.id.clone(), locker);

        let supplier_portion = interest - pool_delegate_portion - stake_locker_portion;
        market.cumulative_interest += interest;
        market.supplier_revenue += &supplier_portion;
        market.delegate_revenue += pool_delegate_portion;
        // Principal plus the suppliers' interest share flows back into the pool.
        market.input_token_balance += principal + &supplier_portion;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_default_suffered(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        loan: &str,
        default_suffered: &BigInt,
        liquidity_asset_recovered_from_burn: &BigInt,
        stake_tokens_burned: &BigInt,
        stake_tokens_returned: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        let mut loan_entity = self.store.get_or_create_loan(loan, LoanSeed::default());
        loan_entity.default_suffered += default_suffered;
        self.store.loans.save(loan, loan_entity);

        let default_by_stake_locker = liquidity_asset_recovered_from_burn.clone();
        let default_by_pool = default_suffered - &default_by_stake_locker;

        let mut locker = self
            .store
            .get_or_create_stake_locker(&market.stake_locker, StakeLockerSeed::default());
        locker.cumulative_losses += stake_tokens_burned - stake_tokens_returned;
        locker.cumulative_stake_default_in_pool_input_tokens += &default_by_stake_locker;
        self.store.stake_lockers.save(&locker.id.clone(), locker);

        market.cumulative_pool_default += &default_by_pool;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_funds_withdrawn(
        &mut self,
        ctx: &EventContext,
        pool: &str,
        funds_withdrawn: &BigInt,
    ) {
        let mut market = self.store.get_or_create_market(pool, MarketSeed::default());

        market.cumulative_interest_claimed += funds_withdrawn;
        market.input_token_balance -= funds_withdrawn;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_stake(
        &mut self,
        ctx: &EventContext,
        stake_locker: &str,
        amount_in_pool_input_tokens: &BigInt,
        unstake: bool,
    ) {
        let mut locker = self
            .store
            .get_or_create_stake_locker(stake_locker, StakeLockerSeed::default());
        if unstake {
            locker.stake_token_balance_in_pool_input_tokens -= amount_in_pool_input_tokens;
        } else {
            locker.stake_token_balance_in_pool_input_tokens += amount_in_pool_input_tokens;
        }
        let market_id = locker.market.clone();
        self.store.stake_lockers.save(stake_locker, locker);

        let mut market = self
            .store
            .get_or_create_market(&market_id, MarketSeed::default());
        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_drawdown(&mut self, ctx: &EventContext, loan: &str, drawdown_amount: &BigInt) {
        let mut loan_entity = self.store.get_or_create_loan(loan, LoanSeed::default());
        loan_entity.drawn_down += drawdown_amount;
        let market_id = loan_entity.market.clone();
        let version = loan_entity.version;
        self.store.loans.save(loan, loan_entity);

        let mut market = self
            .store
            .get_or_create_market(&market_id, MarketSeed::default());
        market.total_borrow_balance += drawdown_amount;

        // V1 loans pay the treasury establishment fee at drawdown time.
        if version == LoanVersion::V1 {
            let fee = big_decimal_to_big_int(
                &(bigdecimal::BigDecimal::from(drawdown_amount.clone())
                    * &self.protocol.treasury_fee),
            );
            market.treasury_revenue += fee;
        }

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_payment_made(
        &mut self,
        ctx: &EventContext,
        loan: &str,
        principal_paid: &BigInt,
        interest_paid: &BigInt,
    ) {
        let mut loan_entity = self.store.get_or_create_loan(loan, LoanSeed::default());
        loan_entity.principal_paid += principal_paid;
        loan_entity.interest_paid += interest_paid;
        let market_id = loan_entity.market.clone();
        self.store.loans.save(loan, loan_entity);

        let mut market = self
            .store
            .get_or_create_market(&market_id, MarketSeed::default());
        market.total_borrow_balance -= principal_paid;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_liquidation(
        &mut self,
        ctx: &EventContext,
        loan: &str,
        liquidity_asset_returned: &BigInt,
        liquidation_excess: &BigInt,
    ) {
        // Collateral liquidation accounts as principal recovered.
        let recovered = liquidity_asset_returned - liquidation_excess;

        let mut loan_entity = self.store.get_or_create_loan(loan, LoanSeed::default());
        loan_entity.principal_paid += &recovered;
        let market_id = loan_entity.market.clone();
        self.store.loans.save(loan, loan_entity);

        let mut market = self
            .store
            .get_or_create_market(&market_id, MarketSeed::default());
        market.total_borrow_balance -= &recovered;
        market.cumulative_collateral_liquidation += &recovered;
        market.input_token_balance += &recovered;

        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_rewards_created(
        &mut self,
        ctx: &EventContext,
        rewards_contract: &str,
        stake_token: String,
        reward_token: String,
        reward_token_symbol: String,
        reward_token_decimals: u32,
    ) {
        let schedule = self.store.get_or_create_reward_schedule(
            rewards_contract,
            RewardScheduleSeed {
                stake_token,
                reward_token,
                reward_token_seed: TokenSeed {
                    symbol: reward_token_symbol,
                    decimals: reward_token_decimals,
                },
                creation_block: ctx.block_number,
            },
        );

        // Reload: schedule creation wired itself into the market.
        let mut market = self
            .store
            .get_or_create_market(&schedule.market, MarketSeed::default());
        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }

    fn handle_reward_added(
        &mut self,
        ctx: &EventContext,
        rewards_contract: &str,
        reward_amount: &BigInt,
    ) {
        let mut schedule = self
            .store
            .get_or_create_reward_schedule(rewards_contract, RewardScheduleSeed::default());

        // Distributor-style accrual: the new reward is spread evenly over the
        // schedule's duration, starting now.
        if schedule.reward_duration_sec == 0 {
            warn!(schedule = %schedule.id, "zero reward duration; leaving rate unchanged");
        } else {
            schedule.reward_rate_per_second =
                reward_amount / BigInt::from(schedule.reward_duration_sec);
        }
        schedule.period_finished_timestamp = ctx.timestamp + schedule.reward_duration_sec;
        self.store
            .reward_schedules
            .save(rewards_contract, schedule.clone());

        let mut market = self
            .store
            .get_or_create_market(&schedule.market, MarketSeed::default());
        self.aggregator
            .market_tick(&mut market, &mut self.protocol, ctx);
    }
}
