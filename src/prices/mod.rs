mod sources;

pub use sources::{PeggedQuoteSource, StaticQuoteSource};

use bigdecimal::BigDecimal;
use num_traits::Zero;
use tracing::{debug, warn};

use crate::entities::{PriceSourceKind, Token};
use crate::store::{EntityStore, KeyedStore, TokenSeed};

/// What a single price source answers: a usable USD price, or an explicit
/// "unavailable" signal.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub usd_price: BigDecimal,
    pub reverted: bool,
}

impl PriceQuote {
    pub fn ok(usd_price: BigDecimal) -> Self {
        Self {
            usd_price,
            reverted: false,
        }
    }

    pub fn reverted() -> Self {
        Self {
            usd_price: BigDecimal::zero(),
            reverted: true,
        }
    }
}

/// One rung of the fallback ladder. Sources are independent and side-effect
/// free; a revert never blocks the next source from being tried.
pub trait PriceSource: Send + Sync {
    fn kind(&self) -> PriceSourceKind;
    fn try_price(&self, token: &Token) -> PriceQuote;
}

/// Walks an ordered list of price sources and returns the first usable USD
/// quote. The serving source's tag (and the price) is recorded on the token
/// record; exhaustion yields a zero price under the `None` tag. Total: every
/// invocation returns a value and leaves the token's tag set.
pub struct PriceResolver {
    sources: Vec<Box<dyn PriceSource>>,
}

impl PriceResolver {
    pub fn new(sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self { sources }
    }

    pub fn resolve_usd(&self, store: &EntityStore, token_id: &str) -> BigDecimal {
        let mut token = store.get_or_create_token(token_id, TokenSeed::default());

        for source in &self.sources {
            let quote = source.try_price(&token);
            if !quote.reverted {
                debug!(
                    token = token_id,
                    source = %source.kind(),
                    price = %quote.usd_price,
                    "price served"
                );
                token.last_price_usd = quote.usd_price.clone();
                token.last_price_source = source.kind();
                store.tokens.save(token_id, token);
                return quote.usd_price;
            }
        }

        warn!(token = token_id, "every price source reverted");
        token.last_price_usd = BigDecimal::zero();
        token.last_price_source = PriceSourceKind::None;
        store.tokens.save(token_id, token);
        BigDecimal::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    /// Source that always serves the same price, or always reverts.
    struct FixedSource {
        kind: PriceSourceKind,
        price: Option<BigDecimal>,
    }

    impl PriceSource for FixedSource {
        fn kind(&self) -> PriceSourceKind {
            self.kind
        }

        fn try_price(&self, _token: &Token) -> PriceQuote {
            match &self.price {
                Some(p) => PriceQuote::ok(p.clone()),
                None => PriceQuote::reverted(),
            }
        }
    }

    #[test]
    fn first_non_reverted_source_wins() {
        let store = EntityStore::new();
        let resolver = PriceResolver::new(vec![
            Box::new(FixedSource {
                kind: PriceSourceKind::ProtocolOracle,
                price: None,
            }),
            Box::new(FixedSource {
                kind: PriceSourceKind::AggregatorFeed,
                price: Some(BigDecimal::from_str("1.01").unwrap()),
            }),
            Box::new(FixedSource {
                kind: PriceSourceKind::UniswapRouter,
                price: Some(BigDecimal::from_str("9.99").unwrap()),
            }),
        ]);

        let price = resolver.resolve_usd(&store, "0xusdc");
        assert_eq!(price, BigDecimal::from_str("1.01").unwrap());

        let token = store.tokens.load("0xusdc").unwrap();
        assert_eq!(token.last_price_source, PriceSourceKind::AggregatorFeed);
        assert_eq!(token.last_price_usd, price);
    }

    #[test]
    fn exhaustion_returns_zero_with_none_tag() {
        let store = EntityStore::new();
        let resolver = PriceResolver::new(vec![Box::new(FixedSource {
            kind: PriceSourceKind::ProtocolOracle,
            price: None,
        })]);

        let price = resolver.resolve_usd(&store, "0xobscure");
        assert!(price.is_zero());

        // Totality: the tag is set even though nothing served a price.
        let token = store.tokens.load("0xobscure").unwrap();
        assert_eq!(token.last_price_source, PriceSourceKind::None);
    }

    #[test]
    fn resolver_with_no_sources_is_still_total() {
        let store = EntityStore::new();
        let resolver = PriceResolver::new(Vec::new());
        assert!(resolver.resolve_usd(&store, "0xany").is_zero());
        assert!(store.tokens.load("0xany").is_some());
    }
}
