use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{SmsGateway, SmsReceipt, Telephony};
use crate::commerce::normalize_phone;
use crate::transport::http::{Auth, RestClient};
use crate::{Error, Result};

pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
pub const SAY_VOICE: &str = "Polly.Joanna";
pub const DEFAULT_HOLD_MESSAGE: &str = "Transferring you now. Please hold.";
pub const DEFAULT_VOICEMAIL_GREETING: &str = "I'm sorry, no one is available right now. \
Please leave a message after the tone, or contact us at mangy dog coffee dot com.";
pub const VOICEMAIL_MAX_SECS: u32 = 120;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    sid: Option<String>,
}

/// Twilio REST client for SMS and live-call updates.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    rest: RestClient,
    account_sid: String,
    from_number: Option<String>,
    messaging_service_sid: Option<String>,
}

impl TwilioClient {
    /// # Errors
    /// Returns an error if the API base URL is invalid or the HTTP client fails to build.
    #[allow(clippy::result_large_err)]
    pub fn new(config: &TwilioConfig) -> Result<Self> {
        let rest = RestClient::new(
            config.api_base.as_deref().unwrap_or(TWILIO_API_BASE),
            Auth::basic(&config.account_sid, &config.auth_token),
        )?;
        Ok(Self {
            rest,
            account_sid: config.account_sid.clone(),
            from_number: config.from_number.clone(),
            messaging_service_sid: config.messaging_service_sid.clone(),
        })
    }
}

#[async_trait]
impl SmsGateway for TwilioClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt> {
        let to = normalize_phone(to)
            .ok_or_else(|| Error::InvalidArguments("Invalid phone number".to_string()))?;

        let mut form = vec![("To", to.as_str()), ("Body", body)];
        if let Some(service) = self.messaging_service_sid.as_deref() {
            form.push(("MessagingServiceSid", service));
        } else if let Some(from) = self.from_number.as_deref() {
            form.push(("From", from));
        } else {
            return Err(Error::Config("No SMS sender configured".to_string()));
        }

        let path = format!("Accounts/{}/Messages.json", self.account_sid);
        let reply: Resource = self.rest.post_form(&path, &form).await?;
        info!(sid = ?reply.sid, to = %to, "SMS sent");
        Ok(SmsReceipt { sid: reply.sid })
    }
}

#[async_trait]
impl Telephony for TwilioClient {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<()> {
        let path = format!("Accounts/{}/Calls/{call_sid}.json", self.account_sid);
        let _: Resource = self.rest.post_form(&path, &[("Twiml", twiml)]).await?;
        info!(call_sid = %call_sid, "Call updated");
        Ok(())
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal TwiML `<Response>` builder. Text and attribute values are escaped.
#[derive(Debug, Clone, Default)]
pub struct Twiml {
    verbs: Vec<String>,
}

impl Twiml {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn say(mut self, text: &str) -> Self {
        self.verbs.push(format!(
            r#"<Say voice="{}">{}</Say>"#,
            escape_xml(SAY_VOICE),
            escape_xml(text)
        ));
        self
    }

    #[must_use]
    pub fn dial(mut self, number: &str, timeout_secs: u32) -> Self {
        self.verbs.push(format!(
            r#"<Dial timeout="{timeout_secs}">{}</Dial>"#,
            escape_xml(number)
        ));
        self
    }

    #[must_use]
    pub fn record(mut self, max_length_secs: u32, finish_on_key: &str) -> Self {
        self.verbs.push(format!(
            r#"<Record maxLength="{max_length_secs}" playBeep="true" finishOnKey="{}"/>"#,
            escape_xml(finish_on_key)
        ));
        self
    }

    #[must_use]
    pub fn hangup(mut self) -> Self {
        self.verbs.push("<Hangup/>".to_string());
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response>{}</Response>"#,
            self.verbs.concat()
        )
    }
}

/// Hold message, dial with a bounded wait, then a voicemail fallback if nobody answers.
#[must_use]
pub fn transfer_twiml(
    destination: &str,
    hold_message: Option<&str>,
    wait_secs: u32,
    voicemail_greeting: Option<&str>,
) -> String {
    Twiml::new()
        .say(hold_message.unwrap_or(DEFAULT_HOLD_MESSAGE))
        .dial(destination, wait_secs)
        .say(voicemail_greeting.unwrap_or(DEFAULT_VOICEMAIL_GREETING))
        .record(VOICEMAIL_MAX_SECS, "#")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_text_and_attributes() {
        let xml = Twiml::new().say("Tom & Jerry's <cafe>").build();
        assert!(xml.contains("Tom &amp; Jerry&apos;s &lt;cafe&gt;"));
        assert!(xml.starts_with("<?xml"));
        assert!(xml.ends_with("</Response>"));
    }

    #[test]
    fn transfer_dials_then_falls_back_to_voicemail() {
        let xml = transfer_twiml("+15125550199", None, 25, Some("Leave a message."));
        let say = xml.find("Transferring you now").unwrap();
        let dial = xml.find(r#"<Dial timeout="25">+15125550199</Dial>"#).unwrap();
        let greeting = xml.find("Leave a message.").unwrap();
        let record = xml
            .find(r##"<Record maxLength="120" playBeep="true" finishOnKey="#"/>"##)
            .unwrap();
        assert!(say < dial && dial < greeting && greeting < record);
    }
}
