use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted purchase record. Created by the payment webhook (out of scope
/// here); this subsystem consumes and mutates it for refunds and reschedules.
///
/// `refunded` is a one-way terminal flag; subscriptions never enter that
/// transition.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    pub status: String,
    pub is_subscription: bool,
    #[sea_orm(nullable)]
    pub gateway_session_id: Option<String>,
    pub refunded: bool,
    /// `{date, time}` for schedulable service orders
    #[sea_orm(column_type = "Json", nullable)]
    pub schedule: Option<Json>,
    /// Line items as recorded at purchase, each mirroring its own schedule
    #[sea_orm(column_type = "Json")]
    pub items: Json,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
