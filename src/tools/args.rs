//! Argument types for the tool catalogue. Field docs become parameter descriptions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::commerce::OrderItemRequest;

/// Tools that take no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferArgs {
    /// Reason for transfer
    pub reason: Option<String>,
    /// Caller phone number for notification
    pub caller_phone: Option<String>,
    /// Caller name if known
    pub caller_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentArgs {
    /// Requested date/time in ISO format (e.g., 2024-03-15T14:00:00)
    pub date_time: Option<String>,
    /// Duration in minutes (default 30)
    pub duration_mins: Option<u32>,
    /// Purpose of the appointment
    pub purpose: Option<String>,
    /// Caller phone number to send SMS confirmation
    pub contact: Option<String>,
    /// Caller email for calendar invite
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TakeMessageArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnswerQuestionArgs {
    /// The question to answer
    pub question: String,
    /// Language code (en, es, etc)
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendTextArgs {
    /// Phone number to send SMS to
    pub to: String,
    /// The text message content to send
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderArgs {
    /// Customer phone number for the order confirmation text
    pub customer_phone: String,
    /// Items to order
    pub items: Vec<OrderItemRequest>,
    /// Shipping method (default standard)
    pub shipping_method: Option<String>,
    /// Anything else the caller asked us to note on the order
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetProductsArgs {
    /// Filter by category: blend, single-origin, specialty, pods, tea or sample
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LookupProductArgs {
    /// Product name or key as the caller said it
    pub product_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SetLanguageArgs {
    /// Language code (en, es, etc)
    pub lang: Option<String>,
}
