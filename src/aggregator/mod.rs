mod financials;
mod market;
mod reward;
mod snapshots;
mod stake_locker;

use std::sync::Arc;

use crate::prices::PriceResolver;
use crate::store::EntityStore;

/// The recomputation core. One instance per process; every mutating event
/// handler drives exactly one `market_tick` through it.
pub struct Aggregator {
    store: Arc<EntityStore>,
    resolver: PriceResolver,
}

impl Aggregator {
    pub fn new(store: Arc<EntityStore>, resolver: PriceResolver) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }
}
