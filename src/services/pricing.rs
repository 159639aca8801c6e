//! Order money computation.
//!
//! `OrderTotals::compute` is the only place order amounts are derived, so the
//! money identities hold everywhere the numbers are displayed or stored.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PricingConfig;
use crate::models::FulfillmentMethod;

/// Rounds half-away-from-zero to 2 decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Pricing rates resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct PricingRates {
    pub platform_fee_rate: Decimal,
    pub tax_rate: Decimal,
    pub delivery_fee: Decimal,
    pub free_delivery_threshold: Option<Decimal>,
}

impl From<&PricingConfig> for PricingRates {
    fn from(cfg: &PricingConfig) -> Self {
        Self {
            platform_fee_rate: cfg.platform_fee_rate_decimal(),
            tax_rate: cfg.tax_rate_decimal(),
            delivery_fee: cfg.delivery_fee_decimal(),
            free_delivery_threshold: cfg.free_delivery_threshold_decimal(),
        }
    }
}

impl Default for PricingRates {
    fn default() -> Self {
        Self {
            platform_fee_rate: dec!(0.10),
            tax_rate: dec!(0.08),
            delivery_fee: dec!(5.99),
            free_delivery_threshold: None,
        }
    }
}

/// One priced order line: the snapshot price and the requested quantity.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub price_at_purchase: Decimal,
    pub quantity: i32,
}

impl PricedLine {
    pub fn subtotal(&self) -> Decimal {
        round2(self.price_at_purchase * Decimal::from(self.quantity))
    }
}

/// Derived money amounts for an order.
///
/// Invariants:
/// - `total == subtotal + delivery_fee + tax - discount`
/// - `farmer_amount == subtotal + delivery_fee - platform_fee - tax`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub farmer_amount: Decimal,
}

impl OrderTotals {
    pub fn compute(
        lines: &[PricedLine],
        method: FulfillmentMethod,
        discount: Decimal,
        rates: &PricingRates,
    ) -> Self {
        let subtotal: Decimal = lines.iter().map(PricedLine::subtotal).sum();

        let delivery_fee = match method {
            FulfillmentMethod::Pickup => Decimal::ZERO,
            FulfillmentMethod::Delivery => match rates.free_delivery_threshold {
                Some(threshold) if subtotal >= threshold => Decimal::ZERO,
                _ => rates.delivery_fee,
            },
        };

        let platform_fee = round2(subtotal * rates.platform_fee_rate);
        let tax = round2((subtotal + delivery_fee) * rates.tax_rate);
        let total = subtotal + delivery_fee + tax - discount;
        let farmer_amount = subtotal + delivery_fee - platform_fee - tax;

        Self {
            subtotal,
            delivery_fee,
            platform_fee,
            tax,
            discount,
            total,
            farmer_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(price: Decimal, quantity: i32) -> PricedLine {
        PricedLine {
            price_at_purchase: price,
            quantity,
        }
    }

    #[test]
    fn pickup_order_has_no_delivery_fee() {
        let totals = OrderTotals::compute(
            &[line(dec!(5.99), 5)],
            FulfillmentMethod::Pickup,
            Decimal::ZERO,
            &PricingRates::default(),
        );

        assert_eq!(totals.subtotal, dec!(29.95));
        assert_eq!(totals.delivery_fee, Decimal::ZERO);
        // platform fee 10% of subtotal, tax 8% of subtotal
        assert_eq!(totals.platform_fee, dec!(3.00));
        assert_eq!(totals.tax, dec!(2.40));
        assert_eq!(totals.total, dec!(32.35));
        assert_eq!(totals.farmer_amount, dec!(24.55));
    }

    #[test]
    fn delivery_order_charges_flat_fee_and_taxes_it() {
        let totals = OrderTotals::compute(
            &[line(dec!(10.00), 2)],
            FulfillmentMethod::Delivery,
            Decimal::ZERO,
            &PricingRates::default(),
        );

        assert_eq!(totals.subtotal, dec!(20.00));
        assert_eq!(totals.delivery_fee, dec!(5.99));
        assert_eq!(totals.tax, round2(dec!(25.99) * dec!(0.08)));
        assert_eq!(
            totals.total,
            totals.subtotal + totals.delivery_fee + totals.tax - totals.discount
        );
    }

    #[test]
    fn delivery_fee_waived_above_threshold() {
        let rates = PricingRates {
            free_delivery_threshold: Some(dec!(50.00)),
            ..PricingRates::default()
        };
        let totals = OrderTotals::compute(
            &[line(dec!(25.00), 2)],
            FulfillmentMethod::Delivery,
            Decimal::ZERO,
            &rates,
        );
        assert_eq!(totals.delivery_fee, Decimal::ZERO);

        let below = OrderTotals::compute(
            &[line(dec!(20.00), 2)],
            FulfillmentMethod::Delivery,
            Decimal::ZERO,
            &rates,
        );
        assert_eq!(below.delivery_fee, dec!(5.99));
    }

    #[test]
    fn discount_reduces_total_but_not_farmer_amount() {
        let totals = OrderTotals::compute(
            &[line(dec!(12.50), 4)],
            FulfillmentMethod::Pickup,
            dec!(5.00),
            &PricingRates::default(),
        );
        assert_eq!(
            totals.total,
            totals.subtotal + totals.delivery_fee + totals.tax - dec!(5.00)
        );
        assert_eq!(
            totals.farmer_amount,
            totals.subtotal + totals.delivery_fee - totals.platform_fee - totals.tax
        );
    }

    proptest! {
        #[test]
        fn totals_identities_hold(
            prices in proptest::collection::vec((1u32..10_000u32, 1i32..50i32), 1..8),
            delivery in proptest::bool::ANY,
            discount_cents in 0u32..1_000u32,
        ) {
            let lines: Vec<PricedLine> = prices
                .iter()
                .map(|(cents, qty)| line(Decimal::new(*cents as i64, 2), *qty))
                .collect();
            let method = if delivery {
                FulfillmentMethod::Delivery
            } else {
                FulfillmentMethod::Pickup
            };
            let discount = Decimal::new(discount_cents as i64, 2);
            let rates = PricingRates::default();

            let totals = OrderTotals::compute(&lines, method, discount, &rates);
            let expected_subtotal: Decimal = lines.iter().map(PricedLine::subtotal).sum();

            prop_assert_eq!(totals.subtotal, expected_subtotal);
            prop_assert_eq!(
                totals.total,
                totals.subtotal + totals.delivery_fee + totals.tax - totals.discount
            );
            prop_assert_eq!(
                totals.farmer_amount,
                totals.subtotal + totals.delivery_fee - totals.platform_fee - totals.tax
            );
            // Everything is rounded to cents
            prop_assert_eq!(totals.total, round2(totals.total));
            prop_assert_eq!(totals.farmer_amount, round2(totals.farmer_amount));
        }
    }
}
