use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line item in a cart: a catalog service plus the add-ons selected in the
/// booking questionnaire.
///
/// `base_price` and `price` are advisory until the pricing resolver refreshes
/// them from the catalog immediately before checkout.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub cart_id: Uuid,
    /// Catalog identifier of the service
    pub service_id: String,
    pub title: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub base_price: Decimal,
    /// Selected add-ons as `[{name, price}]`; captured at selection time and
    /// never re-priced against the catalog.
    #[sea_orm(column_type = "Json")]
    pub add_ons: Json,
    pub quantity: i32,
    /// base_price + sum of add-on prices
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cart::Entity",
        from = "Column::CartId",
        to = "super::cart::Column::Id"
    )]
    Cart,
}

impl Related<super::cart::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cart.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A discrete questionnaire choice priced at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOn {
    pub name: String,
    pub price: Decimal,
}

impl Model {
    /// Parses the stored add-ons column. A malformed column is treated as
    /// "no add-ons" rather than failing the cart.
    pub fn add_ons(&self) -> Vec<AddOn> {
        serde_json::from_value(self.add_ons.clone()).unwrap_or_default()
    }
}
