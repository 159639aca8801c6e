//! Canonical domain enums shared by entities, services, and handlers.
//!
//! All enums persist as UPPERCASE string columns so database rows stay
//! readable and the stored values match the public API wire format.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fulfillment lifecycle of an order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "PREPARING")]
    Preparing,
    #[sea_orm(string_value = "READY")]
    Ready,
    #[sea_orm(string_value = "FULFILLED")]
    Fulfilled,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl OrderStatus {
    /// Allowed next statuses from the current one. Terminal states return an
    /// empty slice; every pair not listed here is rejected.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
            OrderStatus::Confirmed => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::Ready, OrderStatus::Cancelled],
            OrderStatus::Ready => &[OrderStatus::Fulfilled, OrderStatus::Cancelled],
            OrderStatus::Fulfilled => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// States in which a shipping label may be created for the order.
    pub fn is_preparable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
        )
    }
}

/// Payment-side status of an order or payment row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

/// How the customer receives the order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentMethod {
    #[sea_orm(string_value = "PICKUP")]
    Pickup,
    #[sea_orm(string_value = "DELIVERY")]
    Delivery,
}

/// Payment method chosen at checkout; selects the provider strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "CARD")]
    Card,
    #[sea_orm(string_value = "PAYPAL")]
    Paypal,
}

/// Outcome of a refund attempt; failed attempts stay in the audit trail.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Operational status of a farm; only ACTIVE farms accept orders.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FarmStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "SUSPENDED")]
    Suspended,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

/// Carriers recognized by tracking-number classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Carrier {
    Usps,
    Ups,
    Fedex,
    Farm,
}

impl Carrier {
    /// Prefix used when generating label tracking numbers.
    pub fn label_prefix(&self) -> &'static str {
        match self {
            Carrier::Usps => "94",
            Carrier::Ups => "1Z",
            Carrier::Fedex => "",
            Carrier::Farm => "FARM",
        }
    }

    /// Typical transit time used for label delivery estimates.
    pub fn transit_days(&self) -> i64 {
        match self {
            Carrier::Usps => 3,
            Carrier::Ups => 2,
            Carrier::Fedex => 2,
            Carrier::Farm => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OrderStatus::Pending, OrderStatus::Confirmed, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Ready, false)]
    #[test_case(OrderStatus::Confirmed, OrderStatus::Preparing, true)]
    #[test_case(OrderStatus::Preparing, OrderStatus::Ready, true)]
    #[test_case(OrderStatus::Ready, OrderStatus::Fulfilled, true)]
    #[test_case(OrderStatus::Fulfilled, OrderStatus::Completed, true)]
    #[test_case(OrderStatus::Fulfilled, OrderStatus::Cancelled, false)]
    #[test_case(OrderStatus::Completed, OrderStatus::Cancelled, false)]
    #[test_case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    #[test_case(OrderStatus::Pending, OrderStatus::Pending, false)]
    fn transition_table(from: OrderStatus, to: OrderStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [OrderStatus::Completed, OrderStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for target in [
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Fulfilled,
                OrderStatus::Completed,
                OrderStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn wire_values_are_uppercase() {
        assert_eq!(OrderStatus::Preparing.to_string(), "PREPARING");
        assert_eq!(PaymentStatus::Refunded.to_string(), "REFUNDED");
        assert_eq!(FulfillmentMethod::Delivery.to_string(), "DELIVERY");
        assert_eq!(Carrier::Fedex.to_string(), "FEDEX");
    }
}
