//! Minimum gas price parsing (`0.01photino;0.0001stake`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One `<amount><denom>` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasPrice {
    pub amount: f64,
    pub denom: String,
}

impl FromStr for GasPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing denom in '{s}'"))?;
        let (amount, denom) = s.split_at(split);
        if amount.is_empty() {
            return Err(format!("missing amount in '{s}'"));
        }
        let amount: f64 = amount
            .parse()
            .map_err(|_| format!("invalid amount in '{s}'"))?;
        let valid_denom = denom
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && denom.len() >= 2
            && denom
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
        if !valid_denom {
            return Err(format!("invalid denom '{denom}'"));
        }
        Ok(Self {
            amount,
            denom: denom.to_string(),
        })
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Parse a `;` or `,` separated price list.
pub fn parse_gas_prices(s: &str) -> Result<Vec<GasPrice>, String> {
    s.split([';', ','])
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_lists() {
        let prices = parse_gas_prices("0.01photino;0.0001stake").unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].denom, "photino");
        assert_eq!(prices[1].amount, 0.0001);

        assert_eq!(parse_gas_prices("0stake").unwrap()[0].amount, 0.0);
    }

    #[test]
    fn rejects_malformed_prices() {
        assert!(parse_gas_prices("stake").is_err());
        assert!(parse_gas_prices("1.5").is_err());
        assert!(parse_gas_prices("1x").is_err());
        assert!(parse_gas_prices("1.2.3stake").is_err());
    }
}
