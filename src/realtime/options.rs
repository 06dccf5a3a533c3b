use crate::protocol::models::{
    AudioConfig, AudioFormat, DEFAULT_MODEL, InputAudioConfig, OutputAudioConfig,
    OutputModalities, SessionKind, SessionUpdate, Tool, ToolChoice, TurnDetectionMode, Voice,
};
use std::time::Duration;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_AUTO_FLUSH_BYTES: usize = 32_000;

pub const DEFAULT_INSTRUCTIONS: &str = "\
You are the voice assistant for Mangy Dog Coffee, \"Coffee with a bite!\". \
10% of all sales go to the AKT Foundation, a 501(c)(3) nonprofit.

You help callers with our coffees (blends, single origins, roasts, tasting notes), \
loose leaf teas, coffee pods, pricing, grinds and brewing, and our charitable mission. \
Available grinds are Whole Bean, Standard, Espresso and Coarse.

Always call the answerQuestion tool before answering anything about specific products, \
product details or availability. Never say we do not carry something without checking first. \
When it reports low confidence, ask the caller to clarify instead of reading the partial context as fact.

Be warm and helpful, like a knowledgeable barista. If you cannot help, offer to transfer \
the caller to a person. This is a phone call: never use emojis.";

/// Everything negotiated with the model when a session opens.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub voice: Voice,
    pub instructions: String,
    pub input_format: AudioFormat,
    pub output_format: AudioFormat,
    pub turn_detection: TurnDetectionMode,
    pub output_modalities: Option<OutputModalities>,
    pub tools: Vec<Tool>,
    pub keepalive_interval: Duration,
    /// Ask for a new response once every outstanding tool call is answered.
    pub auto_tool_response: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            voice: Voice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            input_format: AudioFormat::Pcmu,
            output_format: AudioFormat::Pcmu,
            turn_detection: TurnDetectionMode::ServerVad,
            output_modalities: Some(OutputModalities::Audio),
            tools: Vec::new(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            auto_tool_response: true,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn voice(mut self, voice: impl Into<Voice>) -> Self {
        self.voice = voice.into();
        self
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn audio_formats(mut self, input: AudioFormat, output: AudioFormat) -> Self {
        self.input_format = input;
        self.output_format = output;
        self
    }

    #[must_use]
    pub const fn turn_detection(mut self, mode: TurnDetectionMode) -> Self {
        self.turn_detection = mode;
        self
    }

    #[must_use]
    pub const fn output_modalities(mut self, modalities: Option<OutputModalities>) -> Self {
        self.output_modalities = modalities;
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Ping interval while open. `Duration::ZERO` turns keepalive off.
    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    #[must_use]
    pub const fn auto_tool_response(mut self, enabled: bool) -> Self {
        self.auto_tool_response = enabled;
        self
    }

    /// The full `session.update` sent once the transport opens.
    #[must_use]
    pub fn to_session_update(&self) -> SessionUpdate {
        SessionUpdate {
            kind: SessionKind::Realtime,
            model: Some(self.model.clone()),
            instructions: Some(self.instructions.clone()),
            output_modalities: self.output_modalities,
            audio: Some(AudioConfig {
                input: Some(InputAudioConfig {
                    format: Some(self.input_format.clone()),
                    turn_detection: Some(self.turn_detection.to_wire()),
                }),
                output: Some(OutputAudioConfig {
                    format: Some(self.output_format.clone()),
                    voice: Some(self.voice.clone()),
                    speed: None,
                }),
            }),
            tools: (!self.tools.is_empty()).then(|| self.tools.clone()),
            tool_choice: (!self.tools.is_empty()).then_some(ToolChoice::Auto),
        }
    }
}
