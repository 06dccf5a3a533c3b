use crate::protocol::models::Response;
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::ToolCallEvent;
use super::transport::BoxFuture;

pub type DeltaHandler = Box<dyn Fn(&str) + Send + Sync>;
pub type ResponseHandler = Box<dyn Fn(&Response) + Send + Sync>;
pub type LifecycleHandler = Box<dyn Fn() + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;
pub type ToolCallHandler =
    Arc<dyn Fn(ToolCallEvent) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Session callbacks, all optional.
///
/// Everything except the tool-call handler runs inline on the session task,
/// so handlers must return quickly; hand work off to a channel if it may block.
#[derive(Default)]
pub struct SessionHandlers {
    pub on_audio_delta: Option<DeltaHandler>,
    pub on_text_delta: Option<DeltaHandler>,
    pub on_transcript_delta: Option<DeltaHandler>,
    pub on_response_completed: Option<ResponseHandler>,
    pub on_speech_started: Option<LifecycleHandler>,
    pub on_tool_call: Option<ToolCallHandler>,
    pub on_open: Option<LifecycleHandler>,
    pub on_close: Option<LifecycleHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl SessionHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base64 audio chunk from the model, in the negotiated output format.
    #[must_use]
    pub fn on_audio_delta<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_audio_delta = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_text_delta<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_text_delta = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_transcript_delta<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_transcript_delta = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_response_completed<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.on_response_completed = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_speech_started<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_speech_started = Some(Box::new(handler));
        self
    }

    /// The resolved value is serialized and sent back as the call's output.
    /// An `Err` is sent as `{ "ok": false, "error": message }`.
    #[must_use]
    pub fn on_tool_call<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolCallEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.on_tool_call = Some(Arc::new(move |call| Box::pin(handler(call))));
        self
    }

    #[must_use]
    pub fn on_open<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_close<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub(crate) fn emit_delta(handler: Option<&DeltaHandler>, delta: &str) {
        if let Some(handler) = handler {
            handler(delta);
        }
    }

    pub(crate) fn emit_open(&self) {
        if let Some(handler) = &self.on_open {
            handler();
        }
    }

    pub(crate) fn emit_close(&self) {
        if let Some(handler) = &self.on_close {
            handler();
        }
    }

    pub(crate) fn emit_error(&self, err: &Error) {
        if let Some(handler) = &self.on_error {
            handler(err);
        }
    }
}
