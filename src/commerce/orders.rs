use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Cents, ProductCatalog};

/// 8.25% sales tax, in basis points.
pub const TAX_RATE_BASIS_POINTS: u64 = 825;
pub const FREE_SHIPPING_THRESHOLD: Cents = Cents(5_000);
pub const FLAT_SHIPPING: Cents = Cents(599);
pub const GRIND_OPTIONS: [&str; 4] = ["whole_bean", "standard", "espresso", "coarse"];
pub const DEFAULT_GRIND: &str = "whole_bean";

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid phone number")]
    InvalidPhone,
    #[error("Order must contain at least one item")]
    NoItems,
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Size \"{size}\" not available for {product}. Available: {available}")]
    SizeUnavailable {
        size: String,
        product: String,
        available: String,
    },
    #[error("Quantity for {0} must be at least 1")]
    InvalidQuantity(String),
}

/// One requested line as the caller described it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    /// Product name or key, e.g. "House Blend" or "house-blend"
    pub product: String,
    /// Number of units
    pub quantity: u32,
    /// Size such as 12oz, 1lb, 2lb, 5lb, 3oz or 12pack (defaults to the smallest listed size)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Grind for coffee: whole_bean, standard, espresso or coarse (default whole_bean)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub product_name: String,
    pub product_sku: String,
    pub quantity: u32,
    pub size: String,
    pub grind: Option<String>,
    pub unit_price: Cents,
    pub total_price: Cents,
}

/// A fully resolved and priced order, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub customer_phone: String,
    pub lines: Vec<PricedLine>,
    pub subtotal: Cents,
    pub tax: Cents,
    pub shipping: Cents,
    pub total: Cents,
}

/// Strip everything but digits and format as E.164 for the North American plan.
///
/// Needs at least ten digits; a leading `1` is treated as the country code.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 10 {
        return None;
    }
    if digits.starts_with('1') {
        Some(format!("+{digits}"))
    } else {
        Some(format!("+1{digits}"))
    }
}

#[must_use]
pub const fn tax_for(subtotal: Cents) -> Cents {
    subtotal.apply_rate(TAX_RATE_BASIS_POINTS)
}

#[must_use]
pub fn shipping_for(subtotal: Cents) -> Cents {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        Cents::ZERO
    } else {
        FLAT_SHIPPING
    }
}

/// Resolve and price every line. Any unresolvable line rejects the whole order.
///
/// # Errors
/// Returns the first validation failure, naming the offending item.
pub fn price_order(
    catalog: &ProductCatalog,
    customer_phone: &str,
    items: &[OrderItemRequest],
) -> Result<Quote, OrderError> {
    let customer_phone = normalize_phone(customer_phone).ok_or(OrderError::InvalidPhone)?;
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = catalog
            .resolve(&item.product)
            .ok_or_else(|| OrderError::ProductNotFound(item.product.clone()))?;
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity(product.name.clone()));
        }

        let priced = match item.size.as_deref() {
            Some(size) => product.price_for(size),
            None => product.default_size(),
        };
        let (size, unit_price) = priced.ok_or_else(|| OrderError::SizeUnavailable {
            size: item.size.clone().unwrap_or_default(),
            product: product.name.clone(),
            available: product.sizes().collect::<Vec<_>>().join(", "),
        })?;

        let grind = product.category.takes_grind().then(|| {
            item.grind
                .as_deref()
                .map(|g| g.trim().to_ascii_lowercase().replace([' ', '-'], "_"))
                .filter(|g| GRIND_OPTIONS.contains(&g.as_str()))
                .unwrap_or_else(|| DEFAULT_GRIND.to_string())
        });

        lines.push(PricedLine {
            product_name: product.name.clone(),
            product_sku: product.key.clone(),
            quantity: item.quantity,
            size: size.to_string(),
            grind,
            unit_price,
            total_price: unit_price * item.quantity,
        });
    }

    let subtotal: Cents = lines.iter().map(|line| line.total_price).sum();
    let tax = tax_for(subtotal);
    let shipping = shipping_for(subtotal);
    Ok(Quote {
        customer_phone,
        lines,
        subtotal,
        tax,
        shipping,
        total: subtotal + tax + shipping,
    })
}

/// `MDC-` + base36 epoch millis + three random base36 characters.
#[must_use]
pub fn order_number() -> String {
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    format!("MDC-{}{}", to_base36(millis), random_base36(3))
}

#[must_use]
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36[usize::try_from(value % 36).unwrap_or_default()]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// `len` uppercase base36 characters.
#[must_use]
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}
