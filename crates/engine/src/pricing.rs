//! Tiered quantity pricing.
//!
//! One price applies uniformly to every unit in the cart, chosen by the
//! total unit count across all lines (not per line): 1 unit at the single
//! price, 2-3 units at the pair price, 4 or more at the bulk price. A
//! superseded variant computed discount bundles of four and two with the
//! remainder at full price; the flat formula here is the one the shipped
//! cart used and the one the display copy advertises.

use rust_decimal::Decimal;

/// Per-unit price for a single item, in dollars.
pub const TIER_SINGLE: i64 = 65;
/// Per-unit price once the cart holds two or three items.
pub const TIER_PAIR: i64 = 55;
/// Per-unit price once the cart holds four or more items.
pub const TIER_BULK: i64 = 50;

/// Minimum count for the pair tier.
pub const PAIR_THRESHOLD: u32 = 2;
/// Minimum count for the bulk tier.
pub const BULK_THRESHOLD: u32 = 4;

/// Effective per-unit price for a cart holding `count` units.
///
/// A count of zero yields zero; the cart displays nothing in that case.
#[must_use]
pub fn effective_unit_price(count: u32) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    let dollars = if count >= BULK_THRESHOLD {
        TIER_BULK
    } else if count >= PAIR_THRESHOLD {
        TIER_PAIR
    } else {
        TIER_SINGLE
    };
    Decimal::from(dollars)
}

/// Cart total for `count` units: `count * effective_unit_price(count)`,
/// rounded to two decimal places for display.
#[must_use]
pub fn total_for(count: u32) -> Decimal {
    (Decimal::from(count) * effective_unit_price(count)).round_dp(2)
}

/// Per-unit price for the checkout's single-product mini cart.
///
/// Same tier thresholds as the cart, except a single unit sells at the
/// product's listed price rather than the fixed single tier.
#[must_use]
pub fn unit_price_for_quantity(quantity: u32, list_price: Decimal) -> Decimal {
    if quantity >= BULK_THRESHOLD {
        Decimal::from(TIER_BULK)
    } else if quantity >= PAIR_THRESHOLD {
        Decimal::from(TIER_PAIR)
    } else {
        list_price
    }
}

/// Human-readable tier description shown next to the cart total.
#[must_use]
pub fn tier_label(count: u32) -> Option<String> {
    if count == 0 {
        return None;
    }
    let label = if count >= BULK_THRESHOLD {
        format!("4+ shirts: ${TIER_BULK} each")
    } else if count >= PAIR_THRESHOLD {
        format!("2+ shirts: ${TIER_PAIR} each")
    } else {
        format!("Single shirt: ${TIER_SINGLE}")
    };
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_unit_price_tiers() {
        assert_eq!(effective_unit_price(0), Decimal::ZERO);
        assert_eq!(effective_unit_price(1), Decimal::from(65));
        assert_eq!(effective_unit_price(2), Decimal::from(55));
        assert_eq!(effective_unit_price(3), Decimal::from(55));
        assert_eq!(effective_unit_price(4), Decimal::from(50));
        assert_eq!(effective_unit_price(100), Decimal::from(50));
    }

    #[test]
    fn test_flat_formula_locked_in() {
        // The flat effective-price formula, not the grouped-bundle one:
        // count=5 must be 5 x 50 = 250, never 200 + 65 = 265.
        let table = [
            (1u32, 65i64),
            (2, 110),
            (3, 165),
            (4, 200),
            (5, 250),
            (6, 300),
            (7, 350),
            (8, 400),
        ];
        for (count, expected) in table {
            assert_eq!(total_for(count), Decimal::from(expected), "count={count}");
        }
    }

    #[test]
    fn test_checkout_single_unit_uses_list_price() {
        let list = Decimal::from(80);
        assert_eq!(unit_price_for_quantity(1, list), Decimal::from(80));
        assert_eq!(unit_price_for_quantity(2, list), Decimal::from(55));
        assert_eq!(unit_price_for_quantity(3, list), Decimal::from(55));
        assert_eq!(unit_price_for_quantity(4, list), Decimal::from(50));
        assert_eq!(unit_price_for_quantity(10, list), Decimal::from(50));
    }

    #[test]
    fn test_tier_label() {
        assert_eq!(tier_label(0), None);
        assert_eq!(tier_label(1).as_deref(), Some("Single shirt: $65"));
        assert_eq!(tier_label(3).as_deref(), Some("2+ shirts: $55 each"));
        assert_eq!(tier_label(4).as_deref(), Some("4+ shirts: $50 each"));
    }
}
