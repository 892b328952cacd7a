//! Currency and rounding rules.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement currency of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Idr,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Idr => "idr",
            Currency::Usd => "usd",
        }
    }

    /// Number of decimal places in the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Idr => 0,
            Currency::Usd => 2,
        }
    }

    /// Round an amount to the currency's minor unit.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.minor_units(), RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idr" => Ok(Currency::Idr),
            "usd" => Ok(Currency::Usd),
            other => Err(anyhow::anyhow!("Unsupported currency: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_to_minor_unit() {
        assert_eq!(Currency::Idr.round(dec!(1234.5)), dec!(1235));
        assert_eq!(Currency::Idr.round(dec!(1234.49)), dec!(1234));
        assert_eq!(Currency::Usd.round(dec!(10.005)), dec!(10.01));
        assert_eq!(Currency::Usd.round(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("IDR".parse::<Currency>().unwrap(), Currency::Idr);
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("eur".parse::<Currency>().is_err());
    }
}
