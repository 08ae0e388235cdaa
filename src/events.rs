use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::entities::{LoanVersion, PoolState};
use crate::units::bigint_str;

/// Block/transaction context attached to every decoded event by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub block_number: u64,
    pub timestamp: u64,
    pub tx_sender: String,
}

/// One decoded chain event, as read from the journal. Events arrive in
/// emission order with monotonically non-decreasing block numbers; several
/// events may share a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub ctx: EventContext,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A factory spawned a new pool. Carries the full creation context a
    /// market needs; later events may see the market before this arrives.
    PoolCreated {
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
    },
    /// Pool share mint: a lender deposited into the pool.
    Deposit {
        pool: String,
        #[serde(with = "bigint_str")]
        liquidity_amount: BigInt,
        #[serde(with = "bigint_str")]
        pool_tokens_minted: BigInt,
    },
    /// Pool share burn: a lender withdrew from the pool.
    Withdraw {
        pool: String,
        #[serde(with = "bigint_str")]
        liquidity_amount: BigInt,
        #[serde(with = "bigint_str")]
        pool_tokens_burned: BigInt,
    },
    LossesRecognized {
        pool: String,
        #[serde(with = "bigint_str")]
        losses_recognized: BigInt,
    },
    PoolStateChanged {
        pool: String,
        state: PoolState,
    },
    LoanFunded {
        pool: String,
        loan: String,
        version: LoanVersion,
        #[serde(with = "bigint_str")]
        amount_funded: BigInt,
    },
    /// Pool claimed a loan's payment: principal back plus interest split
    /// between suppliers, the delegate, and the stake locker.
    Claim {
        pool: String,
        #[serde(with = "bigint_str")]
        principal: BigInt,
        #[serde(with = "bigint_str")]
        interest: BigInt,
        #[serde(with = "bigint_str")]
        pool_delegate_portion: BigInt,
        #[serde(with = "bigint_str")]
        stake_locker_portion: BigInt,
    },
    DefaultSuffered {
        pool: String,
        loan: String,
        #[serde(with = "bigint_str")]
        default_suffered: BigInt,
        /// Input-token value recovered by burning locker stake.
        #[serde(with = "bigint_str")]
        liquidity_asset_recovered_from_burn: BigInt,
        #[serde(with = "bigint_str")]
        stake_tokens_burned: BigInt,
        #[serde(with = "bigint_str")]
        stake_tokens_returned: BigInt,
    },
    /// A lender claimed accrued interest out of the pool.
    FundsWithdrawn {
        pool: String,
        #[serde(with = "bigint_str")]
        funds_withdrawn: BigInt,
    },
    Stake {
        stake_locker: String,
        #[serde(with = "bigint_str")]
        amount_in_pool_input_tokens: BigInt,
    },
    Unstake {
        stake_locker: String,
        #[serde(with = "bigint_str")]
        amount_in_pool_input_tokens: BigInt,
    },
    /// Borrower drew funds down from a funded loan.
    Drawdown {
        loan: String,
        #[serde(with = "bigint_str")]
        drawdown_amount: BigInt,
    },
    PaymentMade {
        loan: String,
        #[serde(with = "bigint_str")]
        principal_paid: BigInt,
        #[serde(with = "bigint_str")]
        interest_paid: BigInt,
    },
    /// Collateral liquidation on a defaulted loan; accounted as principal
    /// recovered into the pool.
    Liquidation {
        loan: String,
        #[serde(with = "bigint_str")]
        liquidity_asset_returned: BigInt,
        #[serde(with = "bigint_str")]
        liquidation_excess: BigInt,
    },
    /// A reward distributor contract was deployed for a stake token.
    RewardsCreated {
        rewards_contract: String,
        stake_token: String,
        reward_token: String,
        reward_token_symbol: String,
        reward_token_decimals: u32,
    },
    /// The distributor was funded: a new emission period begins now.
    RewardAdded {
        rewards_contract: String,
        #[serde(with = "bigint_str")]
        reward_amount: BigInt,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_line_round_trips() {
        let line = r#"{"ctx":{"block_number":100,"timestamp":1650000000,"tx_sender":"0xabc"},"kind":{"type":"deposit","pool":"0xpool","liquidity_amount":"1000000","pool_tokens_minted":"1000000000000000000"}}"#;
        let event: ChainEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.ctx.block_number, 100);
        match &event.kind {
            EventKind::Deposit {
                liquidity_amount, ..
            } => assert_eq!(liquidity_amount, &BigInt::from(1_000_000u64)),
            other => panic!("unexpected kind: {other:?}"),
        }
        let back = serde_json::to_string(&event).unwrap();
        let reparsed: ChainEvent = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed.ctx.timestamp, 1_650_000_000);
    }
}
