use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::One;

use crate::entities::{PriceSourceKind, Token};
use crate::error::{AppError, Result};
use crate::prices::{PriceQuote, PriceSource};

/// Token → USD quote table loaded from a JSON file. The binary's stand-in
/// for the protocol-native oracle: the real oracle chain lives in the host
/// and answers the same shape of request.
pub struct StaticQuoteSource {
    kind: PriceSourceKind,
    quotes: HashMap<String, BigDecimal>,
}

impl StaticQuoteSource {
    pub fn new(kind: PriceSourceKind, quotes: HashMap<String, BigDecimal>) -> Self {
        Self { kind, quotes }
    }

    /// Reads `{"0xtoken": "1.00", ...}` from `path`.
    pub fn from_file(kind: PriceSourceKind, path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let table: HashMap<String, String> = serde_json::from_str(&raw)?;
        let mut quotes = HashMap::with_capacity(table.len());
        for (token, price) in table {
            let parsed = BigDecimal::from_str(&price).map_err(|e| {
                AppError::Config(format!("bad quote for {token} in {path}: {e}"))
            })?;
            quotes.insert(token.to_lowercase(), parsed);
        }
        Ok(Self { kind, quotes })
    }
}

impl PriceSource for StaticQuoteSource {
    fn kind(&self) -> PriceSourceKind {
        self.kind
    }

    fn try_price(&self, token: &Token) -> PriceQuote {
        match self.quotes.get(&token.id.to_lowercase()) {
            Some(price) => PriceQuote::ok(price.clone()),
            None => PriceQuote::reverted(),
        }
    }
}

/// Calculation-based fallback: configured stable tokens are worth 1.00 USD.
pub struct PeggedQuoteSource {
    pegged: HashSet<String>,
}

impl PeggedQuoteSource {
    pub fn new<I: IntoIterator<Item = String>>(token_ids: I) -> Self {
        Self {
            pegged: token_ids.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

impl PriceSource for PeggedQuoteSource {
    fn kind(&self) -> PriceSourceKind {
        PriceSourceKind::CurveCalculations
    }

    fn try_price(&self, token: &Token) -> PriceQuote {
        if self.pegged.contains(&token.id.to_lowercase()) {
            PriceQuote::ok(BigDecimal::one())
        } else {
            PriceQuote::reverted()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;

    fn token(id: &str) -> Token {
        Token {
            id: id.to_string(),
            symbol: "T".to_string(),
            decimals: 18,
            last_price_usd: BigDecimal::zero(),
            last_price_source: PriceSourceKind::None,
        }
    }

    #[test]
    fn static_source_serves_known_tokens_only() {
        let mut quotes = HashMap::new();
        quotes.insert("0xusdc".to_string(), BigDecimal::from_str("1.0").unwrap());
        let source = StaticQuoteSource::new(PriceSourceKind::ProtocolOracle, quotes);

        assert!(!source.try_price(&token("0xUSDC")).reverted);
        assert!(source.try_price(&token("0xother")).reverted);
    }

    #[test]
    fn pegged_source_quotes_one_dollar() {
        let source = PeggedQuoteSource::new(vec!["0xdai".to_string()]);
        let quote = source.try_price(&token("0xdai"));
        assert!(!quote.reverted);
        assert_eq!(quote.usd_price, BigDecimal::one());
        assert!(source.try_price(&token("0xmpl")).reverted);
    }
}
