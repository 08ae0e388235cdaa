use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use tracing::{debug, warn};

use crate::config::{
    DEFAULT_DECIMALS, POOL_WAD_DECIMALS, REWARD_DEFAULT_DURATION_SECS, UNPROVIDED_NAME,
    ZERO_ADDRESS,
};
use crate::entities::{
    AccountMarket, FinancialsDailySnapshot, Loan, LoanVersion, Market, MarketSnapshot, PoolFactory,
    PriceSourceKind, Protocol, RewardSchedule, RewardSide, RewardToken, StakeLocker, Token,
};
use crate::store::{KeyedStore, MemoryStore};
use crate::units::pow10;

// ---------------------------------------------------------------------------
// Creation seeds
// ---------------------------------------------------------------------------
// Event order from the chain is not guaranteed to supply full context on
// first sight of an entity, so every creation parameter has an explicit
// "unset" sentinel default. Creating through a sentinel succeeds and is
// logged as a data-quality warning.

#[derive(Debug, Clone)]
pub struct TokenSeed {
    pub symbol: String,
    pub decimals: u32,
}

impl Default for TokenSeed {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            decimals: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketSeed {
    pub name: String,
    pub pool_factory: String,
    pub delegate: String,
    pub stake_locker: String,
    pub input_token: String,
    pub input_token_seed: TokenSeed,
    pub output_token: String,
    pub output_token_seed: TokenSeed,
    pub created_timestamp: u64,
    pub created_block_number: u64,
}

impl Default for MarketSeed {
    fn default() -> Self {
        Self {
            name: String::new(),
            pool_factory: ZERO_ADDRESS.to_string(),
            delegate: ZERO_ADDRESS.to_string(),
            stake_locker: ZERO_ADDRESS.to_string(),
            input_token: ZERO_ADDRESS.to_string(),
            input_token_seed: TokenSeed::default(),
            output_token: ZERO_ADDRESS.to_string(),
            output_token_seed: TokenSeed::default(),
            created_timestamp: 0,
            created_block_number: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StakeLockerSeed {
    pub market: String,
    pub stake_token: String,
    pub creation_timestamp: u64,
    pub creation_block: u64,
}

impl Default for StakeLockerSeed {
    fn default() -> Self {
        Self {
            market: ZERO_ADDRESS.to_string(),
            stake_token: ZERO_ADDRESS.to_string(),
            creation_timestamp: 0,
            creation_block: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoanSeed {
    pub market: String,
    pub version: LoanVersion,
    pub creation_timestamp: u64,
    pub creation_block: u64,
}

impl Default for LoanSeed {
    fn default() -> Self {
        Self {
            market: ZERO_ADDRESS.to_string(),
            version: LoanVersion::V1,
            creation_timestamp: 0,
            creation_block: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewardScheduleSeed {
    pub stake_token: String,
    pub reward_token: String,
    pub reward_token_seed: TokenSeed,
    pub creation_block: u64,
}

impl Default for RewardScheduleSeed {
    fn default() -> Self {
        Self {
            stake_token: ZERO_ADDRESS.to_string(),
            reward_token: ZERO_ADDRESS.to_string(),
            reward_token_seed: TokenSeed::default(),
            creation_block: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// The facade between the aggregation logic and persistence: get-or-create
/// per keyed entity kind, load/save only. Get-semantics win over
/// create-semantics: re-invoking with different seed values on an existing
/// key returns the stored instance untouched.
pub struct EntityStore {
    pub markets: MemoryStore<Market>,
    pub market_daily_snapshots: MemoryStore<MarketSnapshot>,
    pub market_hourly_snapshots: MemoryStore<MarketSnapshot>,
    pub financials_daily_snapshots: MemoryStore<FinancialsDailySnapshot>,
    pub tokens: MemoryStore<Token>,
    pub reward_tokens: MemoryStore<RewardToken>,
    pub reward_schedules: MemoryStore<RewardSchedule>,
    pub stake_lockers: MemoryStore<StakeLocker>,
    pub loans: MemoryStore<Loan>,
    pub account_markets: MemoryStore<AccountMarket>,
    pub pool_factories: MemoryStore<PoolFactory>,
    /// Published copy of the replay loop's owned singleton, for queries.
    pub protocols: MemoryStore<Protocol>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            markets: MemoryStore::new(),
            market_daily_snapshots: MemoryStore::new(),
            market_hourly_snapshots: MemoryStore::new(),
            financials_daily_snapshots: MemoryStore::new(),
            tokens: MemoryStore::new(),
            reward_tokens: MemoryStore::new(),
            reward_schedules: MemoryStore::new(),
            stake_lockers: MemoryStore::new(),
            loans: MemoryStore::new(),
            account_markets: MemoryStore::new(),
            pool_factories: MemoryStore::new(),
            protocols: MemoryStore::new(),
        }
    }

    pub fn get_or_create_token(&self, id: &str, seed: TokenSeed) -> Token {
        if let Some(token) = self.tokens.load(id) {
            return token;
        }

        let mut missing = Vec::new();
        if id == ZERO_ADDRESS {
            missing.push("id");
        }
        if seed.symbol.is_empty() {
            missing.push("symbol");
        }
        if seed.decimals == 0 {
            missing.push("decimals");
        }

        let token = Token {
            id: id.to_string(),
            symbol: if seed.symbol.is_empty() {
                UNPROVIDED_NAME.to_string()
            } else {
                seed.symbol
            },
            decimals: if seed.decimals == 0 {
                DEFAULT_DECIMALS
            } else {
                seed.decimals
            },
            last_price_usd: BigDecimal::zero(),
            last_price_source: PriceSourceKind::None,
        };
        self.tokens.save(id, token.clone());

        if !missing.is_empty() {
            warn!(entity = "token", id, missing = ?missing, "created with unset params");
        }
        token
    }

    pub fn get_or_create_reward_token(&self, token_id: &str) -> RewardToken {
        if let Some(reward_token) = self.reward_tokens.load(token_id) {
            return reward_token;
        }
        let reward_token = RewardToken {
            id: token_id.to_string(),
            token: token_id.to_string(),
            reward_type: "DEPOSIT".to_string(),
        };
        self.reward_tokens.save(token_id, reward_token.clone());
        reward_token
    }

    pub fn get_or_create_market(&self, id: &str, seed: MarketSeed) -> Market {
        if let Some(market) = self.markets.load(id) {
            return market;
        }

        let mut missing = Vec::new();
        if seed.name.is_empty() {
            missing.push("name");
        }
        if seed.pool_factory == ZERO_ADDRESS {
            missing.push("pool_factory");
        }
        if seed.delegate == ZERO_ADDRESS {
            missing.push("delegate");
        }
        if seed.stake_locker == ZERO_ADDRESS {
            missing.push("stake_locker");
        }
        if seed.input_token == ZERO_ADDRESS {
            missing.push("input_token");
        }
        if seed.output_token == ZERO_ADDRESS {
            missing.push("output_token");
        }
        if seed.created_timestamp == 0 {
            missing.push("created_timestamp");
        }
        if seed.created_block_number == 0 {
            missing.push("created_block_number");
        }

        let input_token = self.get_or_create_token(&seed.input_token, seed.input_token_seed);
        self.get_or_create_token(&seed.output_token, seed.output_token_seed);

        // Pool shares are WAD-scaled, so before any shares exist one share
        // is worth 10^(input_decimals - 18) input units.
        let initial_exchange_rate =
            pow10(i64::from(input_token.decimals)) / pow10(i64::from(POOL_WAD_DECIMALS));

        let market = Market {
            id: id.to_string(),
            name: if seed.name.is_empty() {
                UNPROVIDED_NAME.to_string()
            } else {
                seed.name
            },
            is_active: false,
            can_borrow_from: false,
            input_token: seed.input_token,
            output_token: seed.output_token,
            reward_tokens: Vec::new(),
            total_value_locked_usd: BigDecimal::zero(),
            total_deposit_balance_usd: BigDecimal::zero(),
            cumulative_deposit_usd: BigDecimal::zero(),
            total_borrow_balance_usd: BigDecimal::zero(),
            cumulative_borrow_usd: BigDecimal::zero(),
            cumulative_liquidate_usd: BigDecimal::zero(),
            input_token_price_usd: BigDecimal::zero(),
            output_token_price_usd: BigDecimal::zero(),
            exchange_rate: initial_exchange_rate,
            reward_token_emissions_amount: Vec::new(),
            reward_token_emissions_usd: Vec::new(),
            input_token_balance: BigInt::zero(),
            output_token_supply: BigInt::zero(),
            cumulative_deposit: BigInt::zero(),
            cumulative_withdraw: BigInt::zero(),
            total_borrow_balance: BigInt::zero(),
            cumulative_borrow: BigInt::zero(),
            cumulative_pool_default: BigInt::zero(),
            cumulative_collateral_liquidation: BigInt::zero(),
            cumulative_interest: BigInt::zero(),
            cumulative_interest_claimed: BigInt::zero(),
            supplier_revenue: BigInt::zero(),
            supplier_revenue_usd: BigDecimal::zero(),
            delegate_revenue: BigInt::zero(),
            delegate_revenue_usd: BigDecimal::zero(),
            treasury_revenue: BigInt::zero(),
            treasury_revenue_usd: BigDecimal::zero(),
            supply_side_revenue_usd: BigDecimal::zero(),
            protocol_side_revenue_usd: BigDecimal::zero(),
            total_revenue_usd: BigDecimal::zero(),
            pool_factory: seed.pool_factory,
            delegate: seed.delegate,
            stake_locker: seed.stake_locker,
            reward_schedule_lp: None,
            reward_schedule_stake: None,
            created_timestamp: seed.created_timestamp,
            created_block_number: seed.created_block_number,
        };
        self.markets.save(id, market.clone());

        if !missing.is_empty() {
            warn!(entity = "market", id, missing = ?missing, "created with unset params");
        }
        market
    }

    pub fn get_or_create_stake_locker(&self, id: &str, seed: StakeLockerSeed) -> StakeLocker {
        if let Some(locker) = self.stake_lockers.load(id) {
            return locker;
        }

        let mut missing = Vec::new();
        if seed.market == ZERO_ADDRESS {
            missing.push("market");
        }
        if seed.stake_token == ZERO_ADDRESS {
            missing.push("stake_token");
        }
        if seed.creation_block == 0 {
            missing.push("creation_block");
        }

        let locker = StakeLocker {
            id: id.to_string(),
            market: seed.market,
            stake_token: seed.stake_token,
            stake_token_balance_in_pool_input_tokens: BigInt::zero(),
            cumulative_stake_default_in_pool_input_tokens: BigInt::zero(),
            cumulative_interest_in_pool_input_tokens: BigInt::zero(),
            cumulative_losses: BigInt::zero(),
            staked_balance_usd: BigDecimal::zero(),
            cumulative_losses_usd: BigDecimal::zero(),
            cumulative_interest_usd: BigDecimal::zero(),
            revenue_usd: BigDecimal::zero(),
            last_updated_block: 0,
            creation_timestamp: seed.creation_timestamp,
            creation_block: seed.creation_block,
        };
        self.stake_lockers.save(id, locker.clone());

        if !missing.is_empty() {
            warn!(entity = "stake_locker", id, missing = ?missing, "created with unset params");
        }
        locker
    }

    pub fn get_or_create_loan(&self, id: &str, seed: LoanSeed) -> Loan {
        if let Some(loan) = self.loans.load(id) {
            return loan;
        }

        let mut missing = Vec::new();
        if seed.market == ZERO_ADDRESS {
            missing.push("market");
        }
        if seed.creation_block == 0 {
            missing.push("creation_block");
        }

        let loan = Loan {
            id: id.to_string(),
            market: seed.market,
            version: seed.version,
            amount_funded: BigInt::zero(),
            drawn_down: BigInt::zero(),
            principal_paid: BigInt::zero(),
            interest_paid: BigInt::zero(),
            default_suffered: BigInt::zero(),
            creation_timestamp: seed.creation_timestamp,
            creation_block: seed.creation_block,
        };
        self.loans.save(id, loan.clone());

        if !missing.is_empty() {
            warn!(entity = "loan", id, missing = ?missing, "created with unset params");
        }
        loan
    }

    pub fn get_or_create_account_market(&self, account: &str, market_id: &str) -> AccountMarket {
        let id = format!("{account}-{market_id}");
        if let Some(position) = self.account_markets.load(&id) {
            return position;
        }

        if account == ZERO_ADDRESS || account.is_empty() {
            warn!(entity = "account_market", id = %id, "created with unset account");
        }

        let position = AccountMarket {
            id: id.clone(),
            account: account.to_string(),
            market: market_id.to_string(),
            recognized_losses: BigInt::zero(),
            unrecognized_losses: BigInt::zero(),
        };
        self.account_markets.save(&id, position.clone());
        position
    }

    pub fn get_or_create_pool_factory(
        &self,
        id: &str,
        creation_timestamp: u64,
        creation_block_number: u64,
    ) -> PoolFactory {
        if let Some(factory) = self.pool_factories.load(id) {
            return factory;
        }

        if creation_timestamp == 0 || creation_block_number == 0 {
            warn!(entity = "pool_factory", id, "created with unset creation context");
        }

        let factory = PoolFactory {
            id: id.to_string(),
            creation_timestamp,
            creation_block_number,
        };
        self.pool_factories.save(id, factory.clone());
        factory
    }

    /// Get or create a reward schedule. Creation also wires the schedule into
    /// its market: a stake token that is itself a market attaches as the
    /// LP-side schedule, otherwise the stake token resolves through its stake
    /// locker and attaches stake-side. The reward token is appended to the
    /// market's reward-token list if not already present.
    pub fn get_or_create_reward_schedule(
        &self,
        id: &str,
        seed: RewardScheduleSeed,
    ) -> RewardSchedule {
        if let Some(schedule) = self.reward_schedules.load(id) {
            return schedule;
        }

        let mut missing = Vec::new();
        if seed.stake_token == ZERO_ADDRESS {
            missing.push("stake_token");
        }
        if seed.reward_token == ZERO_ADDRESS {
            missing.push("reward_token");
        }
        if seed.creation_block == 0 {
            missing.push("creation_block");
        }

        let reward_token = self.get_or_create_reward_token(&seed.reward_token);
        self.get_or_create_token(&seed.reward_token, seed.reward_token_seed);
        self.get_or_create_token(&seed.stake_token, TokenSeed::default());

        let (mut market, side) = match self.markets.load(&seed.stake_token) {
            Some(market) => (market, RewardSide::Lp),
            None => {
                let locker =
                    self.get_or_create_stake_locker(&seed.stake_token, StakeLockerSeed::default());
                (
                    self.get_or_create_market(&locker.market, MarketSeed::default()),
                    RewardSide::Stake,
                )
            }
        };

        match side {
            RewardSide::Lp => market.reward_schedule_lp = Some(id.to_string()),
            RewardSide::Stake => market.reward_schedule_stake = Some(id.to_string()),
        }

        if market.reward_tokens.iter().any(|t| t == &reward_token.id) {
            debug!(market = %market.id, reward_token = %reward_token.id, "reward token already tracked");
        } else {
            market.reward_tokens.push(reward_token.id.clone());
        }

        let schedule = RewardSchedule {
            id: id.to_string(),
            market: market.id.clone(),
            side,
            stake_token: seed.stake_token,
            reward_token: seed.reward_token,
            reward_rate_per_second: BigInt::zero(),
            reward_duration_sec: REWARD_DEFAULT_DURATION_SECS,
            period_finished_timestamp: 0,
            reward_token_emission_amount_per_day: BigInt::zero(),
            reward_token_emissions_usd_per_day: BigDecimal::zero(),
            creation_block: seed.creation_block,
            last_updated_block: seed.creation_block,
        };

        let market_id = market.id.clone();
        self.markets.save(&market_id, market);
        self.reward_schedules.save(id, schedule.clone());

        if !missing.is_empty() {
            warn!(entity = "reward_schedule", id, missing = ?missing, "created with unset params");
        }
        schedule
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
