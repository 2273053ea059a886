pub mod cart;
pub mod checkout;
pub mod common;
pub mod leads;
pub mod orders;
pub mod promotions;
