use crate::{
    entities::{cart, cart_item, Cart, CartItem},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Session-scoped cart management.
///
/// A cart is created lazily on the first add-to-cart for a session and is
/// considered cleared once its items are gone. The pricing resolver also
/// writes through this service right before checkout, so the persisted items
/// always match what the gateway is told to charge.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the session's cart, creating it on first use.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, session_id: &str) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::SessionId.eq(session_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let new_cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id.to_string()),
            contact_name: Set(None),
            contact_email: Set(None),
            contact_phone: Set(None),
            address: Set(None),
            schedule: Set(None),
            promo_code: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = new_cart.insert(&*self.db).await?;
        info!("Created cart {} for session", created.id);
        Ok(created)
    }

    /// Loads a session's cart with items, or `None` when the session has no
    /// cart yet.
    pub async fn find_with_items(
        &self,
        session_id: &str,
    ) -> Result<Option<(cart::Model, Vec<cart_item::Model>)>, ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::SessionId.eq(session_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let items = cart.find_related(CartItem).all(&*self.db).await?;
        Ok(Some((cart, items)))
    }

    /// Adds an item, merging quantity when the same service is already in
    /// the cart with identical add-ons.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        session_id: &str,
        input: AddItemInput,
    ) -> Result<cart_item::Model, ServiceError> {
        let cart = self.get_or_create(session_id).await?;
        let add_ons_json = serde_json::to_value(&input.add_ons)?;
        let price = line_price(input.base_price, &input.add_ons);

        let txn = self.db.begin().await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ServiceId.eq(&input.service_id))
            .one(&txn)
            .await?;

        let item = match existing.filter(|item| item.add_ons == add_ons_json) {
            Some(item) => {
                let quantity = item.quantity + input.quantity.max(1);
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?
            }
            None => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    service_id: Set(input.service_id.clone()),
                    title: Set(input.title.clone()),
                    base_price: Set(input.base_price),
                    add_ons: Set(add_ons_json),
                    quantity: Set(input.quantity.max(1)),
                    price: Set(price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        info!("Added {} to cart {}", item.service_id, cart.id);
        Ok(item)
    }

    /// Updates an item's quantity; zero or negative removes the item.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        session_id: &str,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let cart = self.require_cart(session_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        if quantity <= 0 {
            item.delete(&*self.db).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        Ok(())
    }

    /// Removes an item from the session's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, session_id: &str, item_id: Uuid) -> Result<(), ServiceError> {
        self.update_item_quantity(session_id, item_id, 0).await
    }

    /// Records checkout contact details on the cart.
    #[instrument(skip(self, contact))]
    pub async fn set_contact(
        &self,
        session_id: &str,
        contact: ContactInput,
    ) -> Result<cart::Model, ServiceError> {
        let cart = self.get_or_create(session_id).await?;
        let mut active: cart::ActiveModel = cart.into();
        active.contact_name = Set(contact.name);
        active.contact_email = Set(contact.email);
        active.contact_phone = Set(contact.phone);
        if let Some(address) = contact.address {
            active.address = Set(Some(serde_json::to_value(address)?));
        }
        if let Some(schedule) = contact.schedule {
            active.schedule = Set(Some(serde_json::to_value(schedule)?));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Attaches a promo code to the cart without validating it; validation
    /// (and redemption) happens at checkout.
    #[instrument(skip(self))]
    pub async fn set_promo_code(
        &self,
        session_id: &str,
        code: Option<String>,
    ) -> Result<cart::Model, ServiceError> {
        let cart = self.require_cart(session_id).await?;
        let mut active: cart::ActiveModel = cart.into();
        active.promo_code = Set(code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    async fn require_cart(&self, session_id: &str) -> Result<cart::Model, ServiceError> {
        Cart::find()
            .filter(cart::Column::SessionId.eq(session_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found for session".to_string()))
    }
}

async fn touch_cart(
    conn: &impl sea_orm::ConnectionTrait,
    cart: &cart::Model,
) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.clone().into();
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

/// Line price is the base price plus every selected add-on.
pub fn line_price(base_price: Decimal, add_ons: &[crate::entities::cart_item::AddOn]) -> Decimal {
    base_price + add_ons.iter().map(|a| a.price).sum::<Decimal>()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddItemInput {
    pub service_id: String,
    pub title: String,
    pub base_price: Decimal,
    #[serde(default)]
    pub add_ons: Vec<crate::entities::cart_item::AddOn>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<ServiceAddress>,
    pub schedule: Option<ServiceSchedule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSchedule {
    pub date: String,
    pub time: String,
}
