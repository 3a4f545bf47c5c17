pub mod catalog;
mod purchase;

pub use catalog::{shop_listing, style_or_default, Availability, PinStyle, PIN_CATALOG};
pub use purchase::{plan_purchase, purchase_or_equip, PurchaseOutcome, PurchasePlan};
