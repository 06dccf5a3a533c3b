//! Persistence contract used by the tools, plus an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::commerce::{Cents, PricedLine};
use crate::kb::KbSource;
use crate::tools::LowConfidenceAction;
use crate::{Error, Result};

pub const DEFAULT_KB_MIN_CONFIDENCE: f64 = 0.55;
pub const DEFAULT_TRANSFER_WAIT_SECS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessConfig {
    pub kb_min_confidence: f64,
    pub low_confidence_action: LowConfidenceAction,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            kb_min_confidence: DEFAULT_KB_MIN_CONFIDENCE,
            low_confidence_action: LowConfidenceAction::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub destination: Option<String>,
    pub hold_message: Option<String>,
    pub wait_seconds: u32,
    pub voicemail_greeting: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            destination: None,
            hold_message: None,
            wait_seconds: DEFAULT_TRANSFER_WAIT_SECS,
            voicemail_greeting: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLog {
    pub id: u64,
    pub call_sid: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub outcome: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_name: String,
    pub product_sku: String,
    pub quantity: u32,
    pub size: String,
    pub grind: Option<String>,
    pub unit_price: Cents,
    pub total_price: Cents,
}

impl From<PricedLine> for OrderItem {
    fn from(line: PricedLine) -> Self {
        Self {
            product_name: line.product_name,
            product_sku: line.product_sku,
            quantity: line.quantity,
            size: line.size,
            grind: line.grind,
            unit_price: line.unit_price,
            total_price: line.total_price,
        }
    }
}

/// An order with its line items. `id` is assigned by the store on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub order_number: String,
    pub call_log_id: Option<u64>,
    pub customer_phone: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Cents,
    pub tax: Cents,
    pub shipping: Cents,
    pub total: Cents,
    pub status: OrderStatus,
    pub payment_status: String,
    pub payment_method: String,
    pub shipping_method: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentLog {
    pub call_log_id: Option<u64>,
    pub intent: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl IntentLog {
    pub fn new(call_log_id: Option<u64>, intent: impl Into<String>, payload: Value) -> Self {
        Self {
            call_log_id,
            intent: intent.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationLog {
    pub call_log_id: Option<u64>,
    pub question: String,
    pub language: String,
    pub sources: Vec<KbSource>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageLog {
    pub call_sid: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn business_config(&self) -> Result<Option<BusinessConfig>>;
    async fn transfer_config(&self) -> Result<Option<TransferConfig>>;

    async fn call_log_by_sid(&self, call_sid: &str) -> Result<Option<CallLog>>;
    /// Create the call log if needed; `from`/`to` only fill fields that are still empty.
    async fn upsert_call_log(
        &self,
        call_sid: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<CallLog>;
    async fn set_call_outcome(&self, call_sid: &str, outcome: &str) -> Result<()>;

    /// Persist the order and its items in one write. Nothing is stored on error.
    async fn create_order(&self, order: Order) -> Result<Order>;
    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>>;
    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>>;

    async fn log_intent(&self, entry: IntentLog) -> Result<()>;
    async fn log_citation(&self, entry: CitationLog) -> Result<()>;
    async fn log_language(&self, call_sid: Option<&str>, language: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct Audit {
    intents: Vec<IntentLog>,
    citations: Vec<CitationLog>,
    languages: Vec<LanguageLog>,
}

/// Process-local store. Locks are only held inside synchronous sections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    business: RwLock<Option<BusinessConfig>>,
    transfer: RwLock<Option<TransferConfig>>,
    calls: RwLock<HashMap<String, CallLog>>,
    orders: RwLock<HashMap<String, Order>>,
    audit: Mutex<Audit>,
    next_id: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_business_config(self, config: BusinessConfig) -> Self {
        *self.business.write() = Some(config);
        self
    }

    #[must_use]
    pub fn with_transfer_config(self, config: TransferConfig) -> Self {
        *self.transfer.write() = Some(config);
        self
    }

    pub fn set_business_config(&self, config: BusinessConfig) {
        *self.business.write() = Some(config);
    }

    #[must_use]
    pub fn intents(&self) -> Vec<IntentLog> {
        self.audit.lock().intents.clone()
    }

    #[must_use]
    pub fn citations(&self) -> Vec<CitationLog> {
        self.audit.lock().citations.clone()
    }

    #[must_use]
    pub fn languages(&self) -> Vec<LanguageLog> {
        self.audit.lock().languages.clone()
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn business_config(&self) -> Result<Option<BusinessConfig>> {
        Ok(self.business.read().clone())
    }

    async fn transfer_config(&self) -> Result<Option<TransferConfig>> {
        Ok(self.transfer.read().clone())
    }

    async fn call_log_by_sid(&self, call_sid: &str) -> Result<Option<CallLog>> {
        Ok(self.calls.read().get(call_sid).cloned())
    }

    async fn upsert_call_log(
        &self,
        call_sid: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<CallLog> {
        let mut calls = self.calls.write();
        let log = calls.entry(call_sid.to_string()).or_insert_with(|| CallLog {
            id: self.next_id(),
            call_sid: call_sid.to_string(),
            from: None,
            to: None,
            outcome: None,
            started_at: Utc::now(),
        });
        if log.from.is_none() {
            log.from = from.map(str::to_string);
        }
        if log.to.is_none() {
            log.to = to.map(str::to_string);
        }
        Ok(log.clone())
    }

    async fn set_call_outcome(&self, call_sid: &str, outcome: &str) -> Result<()> {
        let mut calls = self.calls.write();
        let log = calls
            .get_mut(call_sid)
            .ok_or_else(|| Error::Store(format!("Call log not found: {call_sid}")))?;
        log.outcome = Some(outcome.to_string());
        Ok(())
    }

    async fn create_order(&self, mut order: Order) -> Result<Order> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.order_number) {
            return Err(Error::Store(format!(
                "Duplicate order number: {}",
                order.order_number
            )));
        }
        order.id = self.next_id();
        orders.insert(order.order_number.clone(), order.clone());
        Ok(order)
    }

    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().get(order_number).cloned())
    }

    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.write();
        Ok(orders.get_mut(order_number).map(|order| {
            order.status = status;
            order.clone()
        }))
    }

    async fn log_intent(&self, entry: IntentLog) -> Result<()> {
        self.audit.lock().intents.push(entry);
        Ok(())
    }

    async fn log_citation(&self, entry: CitationLog) -> Result<()> {
        self.audit.lock().citations.push(entry);
        Ok(())
    }

    async fn log_language(&self, call_sid: Option<&str>, language: &str) -> Result<()> {
        self.audit.lock().languages.push(LanguageLog {
            call_sid: call_sid.map(str::to_string),
            language: language.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(number: &str) -> Order {
        Order {
            id: 0,
            order_number: number.to_string(),
            call_log_id: None,
            customer_phone: "+15125550100".to_string(),
            items: vec![OrderItem {
                product_name: "Peru".to_string(),
                product_sku: "peru".to_string(),
                quantity: 1,
                size: "12oz".to_string(),
                grind: Some("whole_bean".to_string()),
                unit_price: Cents(1999),
                total_price: Cents(1999),
            }],
            subtotal: Cents(1999),
            tax: Cents(165),
            shipping: Cents(599),
            total: Cents(2763),
            status: OrderStatus::Pending,
            payment_status: "pending".to_string(),
            payment_method: "phone".to_string(),
            shipping_method: "standard".to_string(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_order_numbers_are_rejected() {
        let store = MemoryStore::new();
        let first = store.create_order(order("MDC-1")).await.unwrap();
        assert!(first.id > 0);
        assert!(matches!(store.create_order(order("MDC-1")).await, Err(Error::Store(_))));
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.order_by_number("MDC-1").await.unwrap().unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn status_updates_only_touch_existing_orders() {
        let store = MemoryStore::new();
        store.create_order(order("MDC-2")).await.unwrap();
        let updated = store
            .update_order_status("MDC-2", OrderStatus::Shipped)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        assert!(store.update_order_status("nope", OrderStatus::Shipped).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn call_logs_upsert_and_record_outcome() {
        let store = MemoryStore::new();
        let created = store.upsert_call_log("CA1", Some("+1512"), None).await.unwrap();
        let again = store.upsert_call_log("CA1", Some("+1999"), Some("+1800")).await.unwrap();
        assert_eq!(created.id, again.id);
        assert_eq!(again.from.as_deref(), Some("+1512"));
        assert_eq!(again.to.as_deref(), Some("+1800"));

        store.set_call_outcome("CA1", "transferred").await.unwrap();
        let log = store.call_log_by_sid("CA1").await.unwrap().unwrap();
        assert_eq!(log.outcome.as_deref(), Some("transferred"));
        assert!(store.set_call_outcome("CA404", "transferred").await.is_err());
    }

    #[test]
    fn business_config_defaults() {
        let config = BusinessConfig::default();
        assert!((config.kb_min_confidence - 0.55).abs() < f64::EPSILON);
        assert_eq!(config.low_confidence_action, LowConfidenceAction::AskClarify);
        assert_eq!(
            serde_json::to_value(&config).unwrap()["lowConfidenceAction"],
            "ask_clarify"
        );
    }
}
