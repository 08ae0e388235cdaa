use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::One;

/// 10^exp as a decimal. Handles negative exponents.
pub fn pow10(exp: i64) -> BigDecimal {
    BigDecimal::new(BigInt::one(), -exp)
}

/// Scale a raw integer token amount down by the token's decimals:
/// `amount × 10^(−decimals)`.
pub fn parse_units(amount: &BigInt, decimals: u32) -> BigDecimal {
    BigDecimal::new(amount.clone(), i64::from(decimals))
}

/// Raw units → USD: `amount × 10^(−decimals) × price`.
pub fn to_usd(amount: &BigInt, decimals: u32, price_usd: &BigDecimal) -> BigDecimal {
    parse_units(amount, decimals) * price_usd
}

/// Windowed-average update rule: `avg' = (avg*N + new) / (N+1)`.
/// `count` is the number of observations already folded into `current`.
/// The divisor `count + 1` is structurally nonzero.
pub fn compute_new_average(current: &BigDecimal, count: u64, new_value: &BigDecimal) -> BigDecimal {
    (current * BigDecimal::from(count) + new_value) / BigDecimal::from(count + 1)
}

/// Decimal → integer, rounding half-up.
pub fn big_decimal_to_big_int(value: &BigDecimal) -> BigInt {
    value
        .with_scale_round(0, RoundingMode::HalfUp)
        .into_bigint_and_exponent()
        .0
}

/// Serde adapter: `BigInt` as a base-10 string, so journal and API payloads
/// stay human-readable.
pub mod bigint_str {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<BigInt>().map_err(de::Error::custom)
    }
}

/// Serde adapter: `Vec<BigInt>` as base-10 strings.
pub mod bigint_vec_str {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[BigInt], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<BigInt>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse::<BigInt>().map_err(de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;
    use std::str::FromStr;

    #[test]
    fn parse_units_scales_by_decimals() {
        let amount = BigInt::from(1_000_000u64);
        assert_eq!(parse_units(&amount, 6), BigDecimal::from(1));
        assert_eq!(
            parse_units(&amount, 8),
            BigDecimal::from_str("0.01").unwrap()
        );
    }

    #[test]
    fn to_usd_worked_example() {
        // 1_000_000 raw units of a 6-decimal token at $1.00 → $1.00
        let amount = BigInt::from(1_000_000u64);
        let price = BigDecimal::from(1);
        assert_eq!(to_usd(&amount, 6, &price), BigDecimal::from(1));
    }

    #[test]
    fn average_of_first_observation_is_the_observation() {
        let avg = compute_new_average(&BigDecimal::zero(), 0, &BigDecimal::from(42));
        assert_eq!(avg, BigDecimal::from(42));
    }

    #[test]
    fn average_converges_toward_repeated_value() {
        let mut avg = BigDecimal::zero();
        let target = BigDecimal::from(10);
        for n in 0..100u64 {
            avg = compute_new_average(&avg, n, &target);
        }
        let diff = (&avg - &target).abs();
        assert!(diff < BigDecimal::from_str("0.5").unwrap(), "avg={avg}");
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(
            big_decimal_to_big_int(&BigDecimal::from_str("2.5").unwrap()),
            BigInt::from(3)
        );
        assert_eq!(
            big_decimal_to_big_int(&BigDecimal::from_str("2.4").unwrap()),
            BigInt::from(2)
        );
    }
}
