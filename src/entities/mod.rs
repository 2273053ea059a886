pub mod cart;
pub mod cart_item;
pub mod discount_lead;
pub mod order;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use discount_lead::Entity as DiscountLead;
pub use order::Entity as Order;
