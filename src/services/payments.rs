//! Payment orchestration over pluggable provider strategies.
//!
//! Providers are resolved through a registry built once at construction, so
//! no call site branches on payment-method strings. Payment rows are written
//! before the provider is called; failed attempts stay observable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, payment, refund};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{PAYMENTS_CAPTURED, PAYMENTS_FAILED, REFUNDS_ISSUED};
use crate::models::{PaymentMethod, PaymentStatus, RefundStatus};

use super::pricing::round2;

/// Provider-side processing fee: 2.9% plus 30 cents, rounded to cents.
pub fn processing_fee(amount: Decimal) -> Decimal {
    round2(amount * dec!(0.029) + dec!(0.30))
}

#[derive(Debug, Clone)]
pub struct ProviderIntent {
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct ProviderCharge {
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct ProviderRefund {
    pub reference: String,
}

/// Capability set every payment provider implements.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<ProviderIntent, String>;

    async fn confirm(&self, intent_reference: &str) -> Result<ProviderCharge, String>;

    async fn refund(
        &self,
        charge_reference: &str,
        amount: Option<Decimal>,
    ) -> Result<ProviderRefund, String>;

    fn fee(&self, amount: Decimal) -> Decimal {
        processing_fee(amount)
    }
}

/// In-process card gateway producing Stripe-shaped references.
#[derive(Debug, Default)]
pub struct CardGateway;

#[async_trait]
impl PaymentProvider for CardGateway {
    fn name(&self) -> &'static str {
        "card"
    }

    async fn create_intent(
        &self,
        amount: Decimal,
        _currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<ProviderIntent, String> {
        if amount <= Decimal::ZERO {
            return Err("Charge amount must be positive".to_string());
        }
        Ok(ProviderIntent {
            reference: format!("pi_{}", Uuid::new_v4().simple()),
        })
    }

    async fn confirm(&self, intent_reference: &str) -> Result<ProviderCharge, String> {
        if !intent_reference.starts_with("pi_") {
            return Err(format!("Unknown payment intent {}", intent_reference));
        }
        Ok(ProviderCharge {
            transaction_id: format!("ch_{}", Uuid::new_v4().simple()),
        })
    }

    async fn refund(
        &self,
        charge_reference: &str,
        _amount: Option<Decimal>,
    ) -> Result<ProviderRefund, String> {
        if !charge_reference.starts_with("ch_") {
            return Err(format!("Unknown charge {}", charge_reference));
        }
        Ok(ProviderRefund {
            reference: format!("re_{}", Uuid::new_v4().simple()),
        })
    }
}

/// In-process PayPal-style gateway.
#[derive(Debug, Default)]
pub struct PaypalGateway;

#[async_trait]
impl PaymentProvider for PaypalGateway {
    fn name(&self) -> &'static str {
        "paypal"
    }

    async fn create_intent(
        &self,
        amount: Decimal,
        _currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<ProviderIntent, String> {
        if amount <= Decimal::ZERO {
            return Err("Charge amount must be positive".to_string());
        }
        Ok(ProviderIntent {
            reference: format!("PAYID-{}", Uuid::new_v4().simple().to_string().to_uppercase()),
        })
    }

    async fn confirm(&self, intent_reference: &str) -> Result<ProviderCharge, String> {
        if !intent_reference.starts_with("PAYID-") {
            return Err(format!("Unknown PayPal order {}", intent_reference));
        }
        Ok(ProviderCharge {
            transaction_id: format!(
                "CAP-{}",
                Uuid::new_v4().simple().to_string().to_uppercase()
            ),
        })
    }

    async fn refund(
        &self,
        charge_reference: &str,
        _amount: Option<Decimal>,
    ) -> Result<ProviderRefund, String> {
        if !charge_reference.starts_with("CAP-") {
            return Err(format!("Unknown capture {}", charge_reference));
        }
        Ok(ProviderRefund {
            reference: format!(
                "REF-{}",
                Uuid::new_v4().simple().to_string().to_uppercase()
            ),
        })
    }
}

/// Method-to-provider mapping built once at construction.
pub struct ProviderRegistry {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn with_default_providers() -> Self {
        let mut providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>> = HashMap::new();
        providers.insert(PaymentMethod::Card, Arc::new(CardGateway));
        providers.insert(PaymentMethod::Paypal, Arc::new(PaypalGateway));
        Self { providers }
    }

    pub fn register(&mut self, method: PaymentMethod, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(method, provider);
    }

    pub fn provider(&self, method: PaymentMethod) -> Result<&Arc<dyn PaymentProvider>, ServiceError> {
        self.providers.get(&method).ok_or_else(|| {
            ServiceError::InvalidOperation(format!("No provider registered for {}", method))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentIntentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundPaymentRequest {
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub intent_reference: Option<String>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentResponse {
    fn from_model(model: payment::Model) -> Self {
        let fee = processing_fee(model.amount);
        Self {
            id: model.id,
            order_id: model.order_id,
            amount: model.amount,
            currency: model.currency,
            status: model.status,
            method: model.method,
            intent_reference: model.intent_reference,
            transaction_id: model.transaction_id,
            failure_reason: model.failure_reason,
            refunded_amount: model.refunded_amount,
            net: model.amount - fee,
            fee,
            completed_at: model.completed_at,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<refund::Model> for RefundResponse {
    fn from(model: refund::Model) -> Self {
        Self {
            id: model.id,
            payment_id: model.payment_id,
            amount: model.amount,
            status: model.status,
            reason: model.reason,
            provider_reference: model.provider_reference,
            created_at: model.created_at,
        }
    }
}

/// Confirmation result; `AlreadyCaptured` is the idempotent no-op path.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmPaymentOutcome {
    Captured { payment: PaymentResponse },
    AlreadyCaptured,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    registry: Arc<ProviderRegistry>,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            db,
            event_sender,
            registry,
        }
    }

    /// Creates a payment intent for an unpaid order. The Payment row is
    /// persisted before the provider call; a provider failure leaves it
    /// FAILED with the reason recorded.
    #[instrument(skip(self, request), fields(order_id = %order_id, method = %request.method))]
    pub async fn create_payment_intent(
        &self,
        order_id: Uuid,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentResponse, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Order payment status is {}, expected PENDING",
                order.payment_status
            )));
        }
        if request.amount != order.total {
            return Err(ServiceError::InvalidInput(format!(
                "Payment amount {} does not match order total {}",
                request.amount, order.total
            )));
        }

        let provider = self.registry.provider(request.method)?.clone();
        let now = Utc::now();
        let payment_id = Uuid::new_v4();

        let record = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            amount: Set(request.amount),
            currency: Set(request.currency.clone()),
            status: Set(PaymentStatus::Pending),
            method: Set(request.method),
            intent_reference: Set(None),
            transaction_id: Set(None),
            failure_reason: Set(None),
            refunded_amount: Set(Decimal::ZERO),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let record = record.insert(&*self.db).await?;

        let metadata = serde_json::json!({
            "order_id": order_id,
            "order_number": order.order_number,
        });
        match provider
            .create_intent(request.amount, &request.currency, &metadata)
            .await
        {
            Ok(intent) => {
                let mut active: payment::ActiveModel = record.into();
                active.intent_reference = Set(Some(intent.reference));
                active.updated_at = Set(Some(Utc::now()));
                let updated = active.update(&*self.db).await?;

                info!(payment_id = %payment_id, "Payment intent created");
                self.event_sender
                    .send_or_log(Event::PaymentIntentCreated {
                        order_id,
                        payment_id,
                    })
                    .await;
                Ok(PaymentResponse::from_model(updated))
            }
            Err(message) => {
                self.mark_payment_failed(record, &message).await?;
                warn!(payment_id = %payment_id, reason = %message, "Payment intent rejected by provider");
                Err(ServiceError::PaymentProvider {
                    provider: provider.name().to_string(),
                    message,
                })
            }
        }
    }

    /// Confirms the pending payment for an order. Idempotent: when the order
    /// is already paid and no pending attempt exists, this is a no-op
    /// success and the provider is not contacted.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
    ) -> Result<ConfirmPaymentOutcome, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let pending = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?;

        let record = match pending {
            Some(record) => record,
            None if order.payment_status == PaymentStatus::Completed => {
                info!(order_id = %order_id, "Payment already captured, confirm is a no-op");
                return Ok(ConfirmPaymentOutcome::AlreadyCaptured);
            }
            None => {
                return Err(ServiceError::NotFound(format!(
                    "No pending payment for order {}",
                    order_id
                )))
            }
        };

        let intent_reference = record.intent_reference.clone().ok_or_else(|| {
            ServiceError::InvalidOperation(
                "Payment has no intent reference to confirm".to_string(),
            )
        })?;
        let provider = self.registry.provider(record.method)?.clone();
        let payment_id = record.id;
        let amount = record.amount;

        match provider.confirm(&intent_reference).await {
            Ok(charge) => {
                let now = Utc::now();
                let txn = self.db.begin().await?;

                // Gated on the observed PENDING status; a concurrent confirm
                // that already captured wins and this one becomes a no-op
                let payment_change = payment::ActiveModel {
                    status: Set(PaymentStatus::Completed),
                    transaction_id: Set(Some(charge.transaction_id)),
                    completed_at: Set(Some(now)),
                    updated_at: Set(Some(now)),
                    ..Default::default()
                };
                let result = payment::Entity::update_many()
                    .set(payment_change)
                    .filter(payment::Column::Id.eq(payment_id))
                    .filter(payment::Column::Status.eq(PaymentStatus::Pending))
                    .exec(&txn)
                    .await?;
                if result.rows_affected == 0 {
                    info!(payment_id = %payment_id, "Payment captured concurrently, confirm is a no-op");
                    return Ok(ConfirmPaymentOutcome::AlreadyCaptured);
                }

                let updated = payment::Entity::find_by_id(payment_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Payment {} not found", payment_id))
                    })?;

                let order_change = order::ActiveModel {
                    payment_status: Set(PaymentStatus::Completed),
                    paid_at: Set(Some(now)),
                    updated_at: Set(Some(now)),
                    ..Default::default()
                };
                order::Entity::update_many()
                    .set(order_change)
                    .filter(order::Column::Id.eq(order_id))
                    .exec(&txn)
                    .await?;

                txn.commit().await?;

                PAYMENTS_CAPTURED.inc();
                info!(payment_id = %payment_id, amount = %amount, "Payment captured");
                self.event_sender
                    .send_or_log(Event::PaymentCaptured {
                        order_id,
                        payment_id,
                        amount,
                    })
                    .await;
                Ok(ConfirmPaymentOutcome::Captured {
                    payment: PaymentResponse::from_model(updated),
                })
            }
            Err(message) => {
                let now = Utc::now();
                let txn = self.db.begin().await?;

                let mut active: payment::ActiveModel = record.into();
                active.status = Set(PaymentStatus::Failed);
                active.failure_reason = Set(Some(message.clone()));
                active.updated_at = Set(Some(now));
                active.update(&txn).await?;

                let order_change = order::ActiveModel {
                    payment_status: Set(PaymentStatus::Failed),
                    updated_at: Set(Some(now)),
                    ..Default::default()
                };
                order::Entity::update_many()
                    .set(order_change)
                    .filter(order::Column::Id.eq(order_id))
                    .exec(&txn)
                    .await?;

                txn.commit().await?;

                PAYMENTS_FAILED.inc();
                error!(payment_id = %payment_id, reason = %message, "Payment capture failed");
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        order_id,
                        payment_id,
                        reason: message.clone(),
                    })
                    .await;
                Err(ServiceError::PaymentProvider {
                    provider: provider.name().to_string(),
                    message,
                })
            }
        }
    }

    /// Refunds a captured payment, fully or partially. The cumulative
    /// refunded amount can never exceed the captured amount.
    #[instrument(skip(self, request), fields(payment_id = %payment_id))]
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        request: RefundPaymentRequest,
    ) -> Result<RefundResponse, ServiceError> {
        let record = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if record.status != PaymentStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment status is {}, only COMPLETED payments can be refunded",
                record.status
            )));
        }

        let remaining = record.amount - record.refunded_amount;
        let amount = request.amount.unwrap_or(remaining);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Refund amount must be positive".to_string(),
            ));
        }
        if amount > remaining {
            return Err(ServiceError::InvalidOperation(format!(
                "Refund of {} exceeds remaining refundable amount {}",
                amount, remaining
            )));
        }

        let charge_reference = record.transaction_id.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Payment has no charge to refund".to_string())
        })?;
        let provider = self.registry.provider(record.method)?.clone();
        let order_id = record.order_id;
        let refund_id = Uuid::new_v4();
        let now = Utc::now();

        let provider_result = provider.refund(&charge_reference, Some(amount)).await;

        let provider_refund = match provider_result {
            Ok(provider_refund) => provider_refund,
            Err(message) => {
                // Record the failed attempt, then propagate
                let failed = refund::ActiveModel {
                    id: Set(refund_id),
                    payment_id: Set(payment_id),
                    amount: Set(amount),
                    reason: Set(request.reason.clone()),
                    status: Set(RefundStatus::Failed),
                    provider_reference: Set(None),
                    created_at: Set(now),
                };
                failed.insert(&*self.db).await?;
                warn!(refund_id = %refund_id, reason = %message, "Provider rejected refund");
                return Err(ServiceError::PaymentProvider {
                    provider: provider.name().to_string(),
                    message,
                });
            }
        };

        let observed_refunded = record.refunded_amount;
        let new_refunded = observed_refunded + amount;
        let fully_refunded = new_refunded >= record.amount;
        let partial = !fully_refunded;

        let txn = self.db.begin().await?;

        let completed = refund::ActiveModel {
            id: Set(refund_id),
            payment_id: Set(payment_id),
            amount: Set(amount),
            reason: Set(request.reason.clone()),
            status: Set(RefundStatus::Completed),
            provider_reference: Set(Some(provider_refund.reference)),
            created_at: Set(now),
        };
        let inserted = completed.insert(&txn).await?;

        // Gated on the observed cumulative amount so racing refunds cannot
        // both advance it past the cap; the loser's refund row rolls back
        let mut payment_change = payment::ActiveModel {
            refunded_amount: Set(new_refunded),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        if fully_refunded {
            payment_change.status = Set(PaymentStatus::Refunded);
        }
        let result = payment::Entity::update_many()
            .set(payment_change)
            .filter(payment::Column::Id.eq(payment_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Completed))
            .filter(payment::Column::RefundedAmount.eq(observed_refunded))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Payment was refunded concurrently, please retry".to_string(),
            ));
        }

        if fully_refunded {
            let order_change = order::ActiveModel {
                payment_status: Set(PaymentStatus::Refunded),
                updated_at: Set(Some(now)),
                ..Default::default()
            };
            order::Entity::update_many()
                .set(order_change)
                .filter(order::Column::Id.eq(order_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        REFUNDS_ISSUED.inc();
        info!(refund_id = %refund_id, amount = %amount, partial = partial, "Refund issued");
        self.event_sender
            .send_or_log(Event::PaymentRefunded {
                payment_id,
                refund_id,
                amount,
                partial,
            })
            .await;

        Ok(RefundResponse::from(inserted))
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentResponse, ServiceError> {
        let record = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;
        Ok(PaymentResponse::from_model(record))
    }

    #[instrument(skip(self))]
    pub async fn list_payments_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<PaymentResponse>, ServiceError> {
        let records = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(records.into_iter().map(PaymentResponse::from_model).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<RefundResponse>, ServiceError> {
        let records = refund::Entity::find()
            .filter(refund::Column::PaymentId.eq(payment_id))
            .order_by_desc(refund::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(records.into_iter().map(RefundResponse::from).collect())
    }

    async fn mark_payment_failed(
        &self,
        record: payment::Model,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let mut active: payment::ActiveModel = record.into();
        active.status = Set(PaymentStatus::Failed);
        active.failure_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;
        PAYMENTS_FAILED.inc();
        Ok(())
    }
}
