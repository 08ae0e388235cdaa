use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::units::{bigint_str, bigint_vec_str};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which price source last served a token's USD quote. Observability only;
/// correctness never depends on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    ProtocolOracle,
    AggregatorFeed,
    LensOracle,
    CurveCalculations,
    SushiCalculations,
    CurveRouter,
    UniswapRouter,
    SushiRouter,
    /// Every source was exhausted; the quote is zero.
    None,
}

impl std::fmt::Display for PriceSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceSourceKind::ProtocolOracle => "protocol_oracle",
            PriceSourceKind::AggregatorFeed => "aggregator_feed",
            PriceSourceKind::LensOracle => "lens_oracle",
            PriceSourceKind::CurveCalculations => "curve_calculations",
            PriceSourceKind::SushiCalculations => "sushi_calculations",
            PriceSourceKind::CurveRouter => "curve_router",
            PriceSourceKind::UniswapRouter => "uniswap_router",
            PriceSourceKind::SushiRouter => "sushi_router",
            PriceSourceKind::None => "none",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Initialized,
    Finalized,
    Deactivated,
}

/// Selects which loan event ABI variant applies to a loan contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanVersion {
    V1,
    V2,
    V3,
}

impl std::fmt::Display for LoanVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoanVersion::V1 => "v1",
            LoanVersion::V2 => "v2",
            LoanVersion::V3 => "v3",
        };
        write!(f, "{s}")
    }
}

/// Which side of the market a reward distributor pays out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSide {
    Lp,
    Stake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotInterval {
    Daily,
    Hourly,
}

impl SnapshotInterval {
    pub fn seconds(self) -> u64 {
        match self {
            SnapshotInterval::Daily => crate::config::SEC_PER_DAY,
            SnapshotInterval::Hourly => crate::config::SEC_PER_HOUR,
        }
    }
}

impl std::fmt::Display for SnapshotInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotInterval::Daily => write!(f, "daily"),
            SnapshotInterval::Hourly => write!(f, "hourly"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub symbol: String,
    /// Drives the fixed-point scaling of every USD conversion for this token.
    pub decimals: u32,
    pub last_price_usd: BigDecimal,
    pub last_price_source: PriceSourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardToken {
    pub id: String,
    pub token: String,
    pub reward_type: String,
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// One per lending pool. Created on first observation of the pool's event
/// stream, mutated on every relevant event, never deleted.
///
/// Raw counters are kept in native token units; the USD mirrors are fully
/// recomputed from them on every tick so a later price correction corrects
/// the whole history of the USD view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub can_borrow_from: bool,
    pub input_token: String,
    pub output_token: String,
    /// Parallel to `reward_token_emissions_amount` / `_usd`.
    pub reward_tokens: Vec<String>,

    // Instantaneous / cumulative USD views
    pub total_value_locked_usd: BigDecimal,
    pub total_deposit_balance_usd: BigDecimal,
    pub cumulative_deposit_usd: BigDecimal,
    pub total_borrow_balance_usd: BigDecimal,
    pub cumulative_borrow_usd: BigDecimal,
    pub cumulative_liquidate_usd: BigDecimal,
    pub input_token_price_usd: BigDecimal,
    pub output_token_price_usd: BigDecimal,
    /// `input_token_balance / output_token_supply` once supply > 0; before
    /// that, the WAD-derived initial rate.
    pub exchange_rate: BigDecimal,
    #[serde(with = "bigint_vec_str")]
    pub reward_token_emissions_amount: Vec<BigInt>,
    pub reward_token_emissions_usd: Vec<BigDecimal>,

    // Raw counters (native units of the input token unless noted)
    #[serde(with = "bigint_str")]
    pub input_token_balance: BigInt,
    /// Pool share tokens, WAD-scaled.
    #[serde(with = "bigint_str")]
    pub output_token_supply: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_deposit: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_withdraw: BigInt,
    #[serde(with = "bigint_str")]
    pub total_borrow_balance: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_borrow: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_pool_default: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_collateral_liquidation: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_interest: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_interest_claimed: BigInt,

    // Revenue split, raw + USD
    #[serde(with = "bigint_str")]
    pub supplier_revenue: BigInt,
    pub supplier_revenue_usd: BigDecimal,
    #[serde(with = "bigint_str")]
    pub delegate_revenue: BigInt,
    pub delegate_revenue_usd: BigDecimal,
    #[serde(with = "bigint_str")]
    pub treasury_revenue: BigInt,
    pub treasury_revenue_usd: BigDecimal,
    pub supply_side_revenue_usd: BigDecimal,
    pub protocol_side_revenue_usd: BigDecimal,
    pub total_revenue_usd: BigDecimal,

    // Back-references
    pub pool_factory: String,
    pub delegate: String,
    pub stake_locker: String,
    pub reward_schedule_lp: Option<String>,
    pub reward_schedule_stake: Option<String>,

    pub created_timestamp: u64,
    pub created_block_number: u64,
}

// ---------------------------------------------------------------------------
// Market snapshots
// ---------------------------------------------------------------------------

/// Time-bucketed view of one market, keyed `"{market_id}-{bucket}"` where
/// `bucket = timestamp / interval_seconds`. Daily and hourly snapshots share
/// this shape and live in separate keyed maps.
///
/// Average fields hold the windowed average of the market's instantaneous
/// value over the ticks seen in the bucket; `period_*` fields are deltas
/// against the `initial_*` baselines captured when the bucket was first seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub market: String,
    pub interval: SnapshotInterval,
    pub block_number: u64,
    /// Rounded down to the start of the bucket.
    pub timestamp: u64,
    /// Number of ticks folded into the averages so far.
    pub tx_count: u64,

    pub total_value_locked_usd: BigDecimal,
    pub total_deposit_balance_usd: BigDecimal,
    pub cumulative_deposit_usd: BigDecimal,
    pub cumulative_borrow_usd: BigDecimal,
    pub cumulative_liquidate_usd: BigDecimal,
    #[serde(with = "bigint_str")]
    pub input_token_balance: BigInt,
    pub input_token_price_usd: BigDecimal,
    #[serde(with = "bigint_str")]
    pub output_token_supply: BigInt,
    pub output_token_price_usd: BigDecimal,
    pub exchange_rate: BigDecimal,

    #[serde(with = "bigint_vec_str")]
    pub reward_token_emissions_amount: Vec<BigInt>,
    pub reward_token_emissions_usd: Vec<BigDecimal>,

    pub period_deposit_usd: BigDecimal,
    pub period_borrow_usd: BigDecimal,
    pub period_liquidate_usd: BigDecimal,

    pub initial_deposit_usd: BigDecimal,
    pub initial_borrow_usd: BigDecimal,
    pub initial_liquidate_usd: BigDecimal,
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Process-wide singleton. Every field is folded from market-level deltas,
/// never recomputed by re-summing all markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub network: String,
    /// Fraction of each drawdown routed to the treasury.
    pub treasury_fee: BigDecimal,

    pub total_value_locked_usd: BigDecimal,
    pub total_deposit_balance_usd: BigDecimal,
    pub cumulative_deposit_usd: BigDecimal,
    pub total_borrow_balance_usd: BigDecimal,
    pub cumulative_borrow_usd: BigDecimal,
    pub cumulative_liquidate_usd: BigDecimal,
    pub cumulative_supply_side_revenue_usd: BigDecimal,
    pub cumulative_protocol_side_revenue_usd: BigDecimal,
    pub cumulative_total_revenue_usd: BigDecimal,
}

impl Protocol {
    /// The singleton, seeded from the protocol constants. Owned by the replay
    /// loop and threaded through every aggregator call; a copy is published
    /// to the store after each event for the query surface.
    pub fn new() -> Self {
        use num_traits::Zero;
        Self {
            id: crate::config::PROTOCOL_ID.to_string(),
            name: crate::config::PROTOCOL_NAME.to_string(),
            slug: crate::config::PROTOCOL_SLUG.to_string(),
            network: crate::config::PROTOCOL_NETWORK.to_string(),
            // 0.5% of every drawdown goes to the treasury.
            treasury_fee: BigDecimal::new(BigInt::from(5), 3),
            total_value_locked_usd: BigDecimal::zero(),
            total_deposit_balance_usd: BigDecimal::zero(),
            cumulative_deposit_usd: BigDecimal::zero(),
            total_borrow_balance_usd: BigDecimal::zero(),
            cumulative_borrow_usd: BigDecimal::zero(),
            cumulative_liquidate_usd: BigDecimal::zero(),
            cumulative_supply_side_revenue_usd: BigDecimal::zero(),
            cumulative_protocol_side_revenue_usd: BigDecimal::zero(),
            cumulative_total_revenue_usd: BigDecimal::zero(),
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

/// Daily protocol-level financial snapshot, keyed by day number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialsDailySnapshot {
    pub id: String,
    pub protocol: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub tx_count: u64,

    pub total_value_locked_usd: BigDecimal,
    pub total_deposit_balance_usd: BigDecimal,
    pub total_borrow_balance_usd: BigDecimal,

    pub cumulative_deposit_usd: BigDecimal,
    pub cumulative_borrow_usd: BigDecimal,
    pub cumulative_liquidate_usd: BigDecimal,
    pub cumulative_supply_side_revenue_usd: BigDecimal,
    pub cumulative_protocol_side_revenue_usd: BigDecimal,
    pub cumulative_total_revenue_usd: BigDecimal,

    pub daily_supply_side_revenue_usd: BigDecimal,
    pub daily_protocol_side_revenue_usd: BigDecimal,
    pub daily_total_revenue_usd: BigDecimal,
    pub daily_deposit_usd: BigDecimal,
    pub daily_borrow_usd: BigDecimal,
    pub daily_liquidate_usd: BigDecimal,

    pub initial_supply_side_revenue_usd: BigDecimal,
    pub initial_protocol_side_revenue_usd: BigDecimal,
    pub initial_total_revenue_usd: BigDecimal,
    pub initial_deposit_usd: BigDecimal,
    pub initial_borrow_usd: BigDecimal,
    pub initial_liquidate_usd: BigDecimal,
}

// ---------------------------------------------------------------------------
// Reward schedule
// ---------------------------------------------------------------------------

/// Mirror of one on-chain reward distributor's accrual parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub id: String,
    pub market: String,
    pub side: RewardSide,
    pub stake_token: String,
    pub reward_token: String,
    #[serde(with = "bigint_str")]
    pub reward_rate_per_second: BigInt,
    pub reward_duration_sec: u64,
    pub period_finished_timestamp: u64,
    #[serde(with = "bigint_str")]
    pub reward_token_emission_amount_per_day: BigInt,
    pub reward_token_emissions_usd_per_day: BigDecimal,
    pub creation_block: u64,
    /// At-most-once-per-block idempotency guard for `schedule_tick`.
    pub last_updated_block: u64,
}

// ---------------------------------------------------------------------------
// Stake locker
// ---------------------------------------------------------------------------

/// One per staking contract backing a market. Balance and loss/interest
/// counters are denominated in the pool's input token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeLocker {
    pub id: String,
    pub market: String,
    pub stake_token: String,
    #[serde(with = "bigint_str")]
    pub stake_token_balance_in_pool_input_tokens: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_stake_default_in_pool_input_tokens: BigInt,
    #[serde(with = "bigint_str")]
    pub cumulative_interest_in_pool_input_tokens: BigInt,
    /// Stake-token units burned to cover defaults.
    #[serde(with = "bigint_str")]
    pub cumulative_losses: BigInt,

    pub staked_balance_usd: BigDecimal,
    pub cumulative_losses_usd: BigDecimal,
    pub cumulative_interest_usd: BigDecimal,
    /// Interest earned by stakers; feeds the market's supply-side revenue.
    pub revenue_usd: BigDecimal,

    pub last_updated_block: u64,
    pub creation_timestamp: u64,
    pub creation_block: u64,
}

// ---------------------------------------------------------------------------
// Loan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub market: String,
    pub version: LoanVersion,
    #[serde(with = "bigint_str")]
    pub amount_funded: BigInt,
    #[serde(with = "bigint_str")]
    pub drawn_down: BigInt,
    #[serde(with = "bigint_str")]
    pub principal_paid: BigInt,
    #[serde(with = "bigint_str")]
    pub interest_paid: BigInt,
    #[serde(with = "bigint_str")]
    pub default_suffered: BigInt,
    pub creation_timestamp: u64,
    pub creation_block: u64,
}

// ---------------------------------------------------------------------------
// Account position
// ---------------------------------------------------------------------------

/// Per (account, market) position, keyed `"{account}-{market_id}"`.
/// Losses accrue unrecognized and are realized at withdrawal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMarket {
    pub id: String,
    pub account: String,
    pub market: String,
    #[serde(with = "bigint_str")]
    pub recognized_losses: BigInt,
    #[serde(with = "bigint_str")]
    pub unrecognized_losses: BigInt,
}

// ---------------------------------------------------------------------------
// Pool factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolFactory {
    pub id: String,
    pub creation_timestamp: u64,
    pub creation_block_number: u64,
}
