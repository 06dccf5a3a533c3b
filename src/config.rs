//! Application configuration.
//!
//! Values come from the environment (a `.env` file is loaded first when present),
//! optionally overridden by a YAML file:
//!
//! ```yaml
//! openai:
//!   api_key: "sk-..."
//!   model: "gpt-realtime"
//!   voice: "alloy"
//! audio:
//!   input_format: "audio/pcmu"
//!   output_format: "audio/pcmu"
//!   turn_detection: "server_vad"
//! session:
//!   keepalive_secs: 20
//!   auto_flush_bytes: 32000
//! twilio:
//!   account_sid: "AC..."
//!   auth_token: "..."
//!   from_number: "+15125550100"
//!   transfer_number: "+15125550199"
//! slack:
//!   webhook_url: "https://hooks.slack.com/services/..."
//! booking:
//!   base_url: "https://mangydogcoffee.com/book"
//! business:
//!   organization: "Mangy Dog Coffee"
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::integrations::booking::DEFAULT_BOOKING_URL;
use crate::integrations::{SlackConfig, TwilioConfig};
use crate::protocol::models::{AudioFormat, DEFAULT_MODEL, DEFAULT_VOICE, TurnDetectionMode};
use crate::realtime::{
    DEFAULT_AUTO_FLUSH_BYTES, DEFAULT_INSTRUCTIONS, DEFAULT_KEEPALIVE_INTERVAL, SessionOptions,
};
use crate::tools::AboutInfo;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub base_url: Option<String>,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    pub input_format: AudioFormat,
    pub output_format: AudioFormat,
    pub turn_detection: TurnDetectionMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub keepalive_secs: u64,
    pub auto_flush_bytes: usize,
    pub auto_tool_response: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub transfer_number: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub openai: OpenAiSettings,
    pub audio: AudioSettings,
    pub session: SessionSettings,
    pub twilio: TwilioSettings,
    pub slack: SlackConfig,
    pub booking_url: String,
    pub business: AboutInfo,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiSettings {
                api_key: String::new(),
                model: DEFAULT_MODEL.to_string(),
                voice: DEFAULT_VOICE.to_string(),
                base_url: None,
                instructions: DEFAULT_INSTRUCTIONS.to_string(),
            },
            audio: AudioSettings {
                input_format: AudioFormat::Pcmu,
                output_format: AudioFormat::Pcmu,
                turn_detection: TurnDetectionMode::ServerVad,
            },
            session: SessionSettings {
                keepalive_secs: DEFAULT_KEEPALIVE_INTERVAL.as_secs(),
                auto_flush_bytes: DEFAULT_AUTO_FLUSH_BYTES,
                auto_tool_response: true,
            },
            twilio: TwilioSettings::default(),
            slack: SlackConfig::default(),
            booking_url: DEFAULT_BOOKING_URL.to_string(),
            business: AboutInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct YamlConfig {
    openai: Option<OpenAiYaml>,
    audio: Option<AudioYaml>,
    session: Option<SessionYaml>,
    twilio: Option<TwilioYaml>,
    slack: Option<SlackYaml>,
    booking: Option<BookingYaml>,
    business: Option<BusinessYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct OpenAiYaml {
    api_key: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    base_url: Option<String>,
    instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AudioYaml {
    input_format: Option<String>,
    output_format: Option<String>,
    turn_detection: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SessionYaml {
    keepalive_secs: Option<u64>,
    auto_flush_bytes: Option<usize>,
    auto_tool_response: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TwilioYaml {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    messaging_service_sid: Option<String>,
    transfer_number: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SlackYaml {
    webhook_url: Option<String>,
    username: Option<String>,
    icon_emoji: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BookingYaml {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BusinessYaml {
    organization: Option<String>,
    beneficiary: Option<String>,
    mission: Option<String>,
    website: Option<String>,
}

fn parse_format(raw: &str) -> Result<AudioFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "audio/pcmu" | "pcmu" | "g711_ulaw" => Ok(AudioFormat::Pcmu),
        "audio/pcma" | "pcma" | "g711_alaw" => Ok(AudioFormat::Pcma),
        "audio/pcm" | "pcm" | "pcm16" => Ok(AudioFormat::pcm_24khz()),
        other => Err(Error::Config(format!("Unknown audio format: {other}"))),
    }
}

fn parse_turn_detection(raw: &str) -> Result<TurnDetectionMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "server_vad" | "vad" => Ok(TurnDetectionMode::ServerVad),
        "none" | "off" | "disabled" => Ok(TurnDetectionMode::None),
        other => Err(Error::Config(format!("Unknown turn detection mode: {other}"))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a number, got {raw:?}")))
}

fn overlay(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn overlay_opt(target: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *target = value;
    }
}

impl AppConfig {
    /// Load `.env` (if any), then read the environment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a variable has an invalid value or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded .env");
        }
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Environment values with the YAML file laid over them.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        let raw = std::fs::read_to_string(path.as_ref())?;
        config.apply_yaml(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a value cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        overlay(&mut config.openai.api_key, get("OPENAI_API_KEY"));
        overlay(&mut config.openai.model, get("OPENAI_REALTIME_MODEL"));
        overlay(&mut config.openai.voice, get("OPENAI_TTS_VOICE"));
        overlay_opt(&mut config.openai.base_url, get("OPENAI_REALTIME_URL"));

        overlay_opt(&mut config.twilio.account_sid, get("TWILIO_ACCOUNT_SID"));
        overlay_opt(&mut config.twilio.auth_token, get("TWILIO_AUTH_TOKEN"));
        overlay_opt(&mut config.twilio.from_number, get("TWILIO_VOICE_NUMBER"));
        overlay_opt(
            &mut config.twilio.messaging_service_sid,
            get("TWILIO_MESSAGING_SERVICE_SID"),
        );
        overlay_opt(
            &mut config.twilio.transfer_number,
            get("TWILIO_AGENT_TRANSFER_NUMBER"),
        );

        overlay_opt(&mut config.slack.webhook_url, get("SLACK_WEBHOOK_URL"));
        overlay(&mut config.booking_url, get("BOOKING_BASE_URL"));

        if let Some(raw) = get("REALTIME_KEEPALIVE_SECS") {
            config.session.keepalive_secs = parse_number("REALTIME_KEEPALIVE_SECS", &raw)?;
        }
        if let Some(raw) = get("REALTIME_AUTO_FLUSH_BYTES") {
            config.session.auto_flush_bytes = parse_number("REALTIME_AUTO_FLUSH_BYTES", &raw)?;
        }
        Ok(config)
    }

    /// Lay YAML values over the current ones. Absent keys leave values untouched.
    ///
    /// # Errors
    /// Returns an error if the YAML is malformed or holds an unknown audio setting.
    #[allow(clippy::result_large_err)]
    pub fn apply_yaml(&mut self, raw: &str) -> Result<()> {
        let yaml: YamlConfig = serde_yaml::from_str(raw)?;

        if let Some(openai) = yaml.openai {
            overlay(&mut self.openai.api_key, openai.api_key);
            overlay(&mut self.openai.model, openai.model);
            overlay(&mut self.openai.voice, openai.voice);
            overlay_opt(&mut self.openai.base_url, openai.base_url);
            overlay(&mut self.openai.instructions, openai.instructions);
        }
        if let Some(audio) = yaml.audio {
            if let Some(raw) = audio.input_format {
                self.audio.input_format = parse_format(&raw)?;
            }
            if let Some(raw) = audio.output_format {
                self.audio.output_format = parse_format(&raw)?;
            }
            if let Some(raw) = audio.turn_detection {
                self.audio.turn_detection = parse_turn_detection(&raw)?;
            }
        }
        if let Some(session) = yaml.session {
            if let Some(secs) = session.keepalive_secs {
                self.session.keepalive_secs = secs;
            }
            if let Some(bytes) = session.auto_flush_bytes {
                self.session.auto_flush_bytes = bytes;
            }
            if let Some(enabled) = session.auto_tool_response {
                self.session.auto_tool_response = enabled;
            }
        }
        if let Some(twilio) = yaml.twilio {
            overlay_opt(&mut self.twilio.account_sid, twilio.account_sid);
            overlay_opt(&mut self.twilio.auth_token, twilio.auth_token);
            overlay_opt(&mut self.twilio.from_number, twilio.from_number);
            overlay_opt(
                &mut self.twilio.messaging_service_sid,
                twilio.messaging_service_sid,
            );
            overlay_opt(&mut self.twilio.transfer_number, twilio.transfer_number);
            overlay_opt(&mut self.twilio.api_base, twilio.api_base);
        }
        if let Some(slack) = yaml.slack {
            overlay_opt(&mut self.slack.webhook_url, slack.webhook_url);
            overlay_opt(&mut self.slack.username, slack.username);
            overlay_opt(&mut self.slack.icon_emoji, slack.icon_emoji);
        }
        if let Some(booking) = yaml.booking {
            overlay(&mut self.booking_url, booking.base_url);
        }
        if let Some(business) = yaml.business {
            overlay(&mut self.business.organization, business.organization);
            overlay(&mut self.business.beneficiary, business.beneficiary);
            overlay(&mut self.business.mission, business.mission);
            overlay(&mut self.business.website, business.website);
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::Config`] naming the first invalid setting.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.trim().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY is required".to_string()));
        }
        if self.session.keepalive_secs == 0 {
            return Err(Error::Config("keepalive interval must be positive".to_string()));
        }
        if self.session.auto_flush_bytes == 0 {
            return Err(Error::Config("auto-flush threshold must be positive".to_string()));
        }
        self.audio.input_format.validate()?;
        self.audio.output_format.validate()?;
        Ok(())
    }

    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(self.openai.api_key.clone())
            .model(self.openai.model.clone())
            .voice(self.openai.voice.clone())
            .instructions(self.openai.instructions.clone())
            .audio_formats(
                self.audio.input_format.clone(),
                self.audio.output_format.clone(),
            )
            .turn_detection(self.audio.turn_detection)
            .keepalive_interval(Duration::from_secs(self.session.keepalive_secs))
            .auto_tool_response(self.session.auto_tool_response);
        if let Some(url) = &self.openai.base_url {
            options = options.base_url(url.clone());
        }
        options
    }

    /// Twilio credentials, if both the account SID and auth token are set.
    #[must_use]
    pub fn twilio_config(&self) -> Option<TwilioConfig> {
        Some(TwilioConfig {
            account_sid: self.twilio.account_sid.clone()?,
            auth_token: self.twilio.auth_token.clone()?,
            from_number: self.twilio.from_number.clone(),
            messaging_service_sid: self.twilio.messaging_service_sid.clone(),
            api_base: self.twilio.api_base.clone(),
        })
    }

    /// Non-secret settings for startup logs.
    #[must_use]
    pub fn summary(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("model", self.openai.model.clone()),
            ("voice", self.openai.voice.clone()),
            ("input_format", self.audio.input_format.to_string()),
            ("output_format", self.audio.output_format.to_string()),
            ("keepalive_secs", self.session.keepalive_secs.to_string()),
            ("twilio", self.twilio_config().is_some().to_string()),
            ("slack", self.slack.webhook_url.is_some().to_string()),
        ])
    }
}
