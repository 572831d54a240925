//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
///
/// Amounts are kept in the currency's standard unit (dollars, not cents);
/// conversion to the smallest unit happens only at the payment-gateway
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from the smallest currency unit (cents for USD).
    #[must_use]
    pub fn from_cents(cents: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(cents, 2),
            currency_code,
        }
    }

    /// The amount in the smallest currency unit, rounded half-up.
    #[must_use]
    pub fn as_cents(&self) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.amount * Decimal::new(100, 0))
            .round()
            .to_i64()
            .unwrap_or(0)
    }

    /// Format for display with two decimal places (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// The display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "\u{20ac}",
            Self::GBP => "\u{a3}",
        }
    }

    /// The ISO 4217 code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    /// The lowercase code the payment gateway expects.
    #[must_use]
    pub const fn gateway_code(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let price = Price::from_cents(6500, CurrencyCode::USD);
        assert_eq!(price.amount, Decimal::new(65, 0));
        assert_eq!(price.as_cents(), 6500);
    }

    #[test]
    fn test_display_rounds_to_two_places() {
        let price = Price::new(Decimal::new(655, 1), CurrencyCode::USD);
        assert_eq!(price.display(), "$65.50");
    }

    #[test]
    fn test_gateway_code_lowercase() {
        assert_eq!(CurrencyCode::USD.gateway_code(), "usd");
        assert_eq!(CurrencyCode::USD.code(), "USD");
    }
}
