mod entity_store;
mod memory;

pub use entity_store::{
    EntityStore, LoanSeed, MarketSeed, RewardScheduleSeed, StakeLockerSeed, TokenSeed,
};
pub use memory::{KeyedStore, MemoryStore};
