use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{Notifier, TransferNotice};
use crate::transport::http::{Auth, RestClient};
use crate::{Error, Result};

pub const DEFAULT_USERNAME: &str = "Mangy Dog Coffee Bot";
pub const DEFAULT_ICON: &str = ":coffee:";
const FOOTER: &str = "Mangy Dog Coffee Voice Assistant";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl SlackField {
    pub fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlackAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlackMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlackAttachment>,
}

impl SlackMessage {
    #[must_use]
    pub fn transfer_request(notice: &TransferNotice) -> Self {
        Self {
            text: "Call transfer requested - caller wants to speak with a human".to_string(),
            username: None,
            icon_emoji: Some(":telephone_receiver:".to_string()),
            attachments: vec![SlackAttachment {
                color: Some("#dc3545".to_string()),
                title: Some("Transfer Request".to_string()),
                text: None,
                fields: vec![
                    SlackField::new(
                        "Caller",
                        notice.caller_name.as_deref().unwrap_or("Unknown"),
                        true,
                    ),
                    SlackField::new(
                        "Phone",
                        notice.caller_phone.as_deref().unwrap_or("Unknown"),
                        true,
                    ),
                    SlackField::new(
                        "Reason",
                        notice.reason.as_deref().unwrap_or("Not specified"),
                        false,
                    ),
                ],
                footer: Some(FOOTER.to_string()),
                ts: Some(chrono::Utc::now().timestamp()),
            }],
        }
    }
}

/// Incoming-webhook notifier. Without a webhook URL every send succeeds silently.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    rest: Option<RestClient>,
    username: String,
    icon_emoji: String,
}

impl SlackNotifier {
    /// # Errors
    /// Returns an error if the webhook URL is invalid.
    #[allow(clippy::result_large_err)]
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let rest = config
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| RestClient::new(url, Auth::None))
            .transpose()?;
        Ok(Self {
            rest,
            username: config
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            icon_emoji: config
                .icon_emoji
                .clone()
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
        })
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.rest.is_some()
    }

    /// Post a message, filling in the bot name and icon when unset.
    ///
    /// # Errors
    /// Returns [`Error::Integration`] when the webhook answers with a non-success status.
    pub async fn send(&self, mut message: SlackMessage) -> Result<()> {
        let Some(rest) = &self.rest else {
            debug!("Slack webhook not configured, skipping notification");
            return Ok(());
        };
        message.username.get_or_insert_with(|| self.username.clone());
        message.icon_emoji.get_or_insert_with(|| self.icon_emoji.clone());

        rest.post_json("", &message).await.map_err(|err| match err {
            Error::Http(http) if http.status().is_some() => Error::Integration(format!(
                "Slack returned {}",
                http.status().map_or(0, |status| status.as_u16())
            )),
            other => other,
        })?;
        info!("Slack notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_transfer(&self, notice: &TransferNotice) -> Result<()> {
        self.send(SlackMessage::transfer_request(notice)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_message_fills_unknowns() {
        let message = SlackMessage::transfer_request(&TransferNotice::default());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["icon_emoji"], ":telephone_receiver:");
        let fields = &value["attachments"][0]["fields"];
        assert_eq!(fields[0]["value"], "Unknown");
        assert_eq!(fields[2]["value"], "Not specified");
        assert_eq!(fields[2]["short"], false);
        assert!(value.get("username").is_none());
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_a_no_op() {
        let notifier = SlackNotifier::new(&SlackConfig::default()).unwrap();
        assert!(!notifier.is_configured());
        notifier
            .notify_transfer(&TransferNotice::default())
            .await
            .unwrap();
    }
}
