//! Shared test fixtures: a temporary SQLite database with migrations applied
//! and seed helpers for the reference rows most tests need.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use uuid::Uuid;

use farmdirect_api::db::{self, DbPool};
use farmdirect_api::entities::{customer, customer_address, delivery_zone, farm, product};
use farmdirect_api::events::{process_events, EventSender};
use farmdirect_api::models::FarmStatus;
use farmdirect_api::services::orders::OrderService;
use farmdirect_api::services::payments::{PaymentService, ProviderRegistry};
use farmdirect_api::services::pricing::PricingRates;
use farmdirect_api::services::tracking::TrackingService;

pub struct TestDb {
    pub db: Arc<DbPool>,
    _dir: TempDir,
}

pub async fn setup() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let pool = db::establish_connection(&url).await.expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");

    TestDb {
        db: Arc::new(pool),
        _dir: dir,
    }
}

pub fn event_sender() -> EventSender {
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(process_events(rx));
    EventSender::new(tx)
}

pub fn order_service(db: &Arc<DbPool>) -> OrderService {
    OrderService::new(
        db.clone(),
        event_sender(),
        PricingRates::default(),
        "ORD".to_string(),
        "USD".to_string(),
    )
}

pub fn payment_service(db: &Arc<DbPool>) -> PaymentService {
    PaymentService::new(
        db.clone(),
        event_sender(),
        Arc::new(ProviderRegistry::with_default_providers()),
    )
}

pub fn tracking_service(db: &Arc<DbPool>) -> TrackingService {
    TrackingService::new(db.clone(), event_sender())
}

pub async fn seed_customer(db: &DbPool) -> customer::Model {
    let id = Uuid::new_v4();
    customer::ActiveModel {
        id: Set(id),
        email: Set(format!("{}@example.com", id.simple())),
        name: Set("Test Shopper".to_string()),
        phone: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed customer")
}

pub async fn seed_farm(db: &DbPool) -> farm::Model {
    farm::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Green Acres".to_string()),
        status: Set(FarmStatus::Active),
        zip_code: Set("97201".to_string()),
        pickup_instructions: Set(Some("Barn entrance, ring the bell".to_string())),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed farm")
}

pub async fn seed_product(
    db: &DbPool,
    farm_id: Uuid,
    price: Decimal,
    quantity: i32,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        farm_id: Set(farm_id),
        name: Set("Heirloom Tomatoes".to_string()),
        price: Set(price),
        unit: Set("lb".to_string()),
        weight_lb: Set(dec!(1.0)),
        quantity_available: Set(quantity),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed product")
}

pub async fn seed_address(db: &DbPool, customer_id: Uuid, zip: &str) -> customer_address::Model {
    customer_address::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        street: Set("1 Main St".to_string()),
        city: Set("Portland".to_string()),
        state: Set("OR".to_string()),
        zip_code: Set(zip.to_string()),
        is_default: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed address")
}

pub async fn seed_zone(
    db: &DbPool,
    zip_codes: &str,
    radius_miles: Decimal,
    base_rate: Decimal,
    per_mile_rate: Decimal,
    free_shipping_threshold: Option<Decimal>,
    estimated_days: i32,
) -> delivery_zone::Model {
    delivery_zone::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Portland Metro".to_string()),
        zip_codes: Set(zip_codes.to_string()),
        radius_miles: Set(radius_miles),
        base_rate: Set(base_rate),
        per_mile_rate: Set(per_mile_rate),
        free_shipping_threshold: Set(free_shipping_threshold),
        estimated_days: Set(estimated_days),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed zone")
}
