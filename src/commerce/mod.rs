//! Product catalogue and order pricing.

mod catalog;
mod money;
mod orders;

pub use catalog::{Category, Product, ProductCatalog};
pub use money::Cents;
pub use orders::{
    DEFAULT_GRIND, FLAT_SHIPPING, FREE_SHIPPING_THRESHOLD, GRIND_OPTIONS, OrderError,
    OrderItemRequest, PricedLine, Quote, TAX_RATE_BASIS_POINTS, normalize_phone, order_number,
    price_order, random_base36, shipping_for, tax_for, to_base36,
};
