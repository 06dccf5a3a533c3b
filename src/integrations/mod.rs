//! Outbound collaborators: SMS, telephony control, notifications and booking.

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

pub mod booking;
pub mod slack;
pub mod twilio;

pub use booking::LinkBooking;
pub use slack::{SlackAttachment, SlackConfig, SlackField, SlackMessage, SlackNotifier};
pub use twilio::{TwilioClient, TwilioConfig, Twiml, transfer_twiml};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsReceipt {
    pub sid: Option<String>,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send `body` to `to`. The number is normalized before sending.
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt>;
}

#[async_trait]
pub trait Telephony: Send + Sync {
    /// Replace the live call's instructions with `twiml`.
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferNotice {
    pub caller_phone: Option<String>,
    pub caller_name: Option<String>,
    pub reason: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_transfer(&self, notice: &TransferNotice) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub date_time: Option<String>,
    pub duration_mins: u32,
    pub purpose: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingOutcome {
    pub booked: bool,
    pub mode: String,
    pub link: String,
}

#[async_trait]
pub trait BookingService: Send + Sync {
    async fn book(&self, request: &BookingRequest) -> Result<BookingOutcome>;
}
