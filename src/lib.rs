//! Realtime voice assistant backend for a coffee retailer.
//!
//! A phone call is bridged into a duplex speech-model session
//! ([`realtime::RealtimeSessionClient`]). Function calls the model emits are
//! routed by name ([`tools::ToolCallRouter`]) to the business operations in
//! [`tools::ToolExecutor`], and the results are fed back into the session.

#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod commerce;
pub mod config;
pub mod error;
pub mod integrations;
pub mod kb;
pub mod orchestrator;
pub mod protocol;
pub mod realtime;
pub mod store;
pub mod tools;
pub mod transport;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use orchestrator::CallOrchestrator;
pub use protocol::client_events::ClientEvent;
pub use protocol::models::{
    AudioConfig, AudioFormat, InputAudioConfig, Item, ItemStatus, Modality,
    OutputAudioConfig, OutputModalities, Response, ResponseConfig, ResponseStatus, Role,
    SessionKind, SessionUpdate, Tool, ToolChoice, TurnDetection, TurnDetectionMode, Voice,
};
pub use protocol::server_events::ServerEvent;
pub use realtime::{
    ConnectionState, RealtimeSessionClient, SessionHandlers, SessionOptions, ToolCallEvent,
    ToolOutput,
};
pub use tools::{ExecutorDeps, ToolCallRouter, ToolContext, ToolExecutor};

use futures::{SinkExt, StreamExt};
use serde_json::from_str;
use std::collections::HashSet;
use tokio_tungstenite::tungstenite::protocol::Message;
use transport::ws::WsStream;

use crate::protocol::models;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const MAX_INPUT_AUDIO_CHUNK_BYTES: usize = 15 * 1024 * 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// A single WebSocket connection to the realtime model endpoint.
///
/// This is the raw event pipe; [`RealtimeSessionClient`] layers state,
/// buffering and tool-call handling on top of it.
///
/// Thread safety: `RealtimeClient` is `Send` but not `Sync` because the underlying
/// WebSocket stream is not `Sync`.
#[must_use]
pub struct RealtimeClient {
    stream: WsStream,
}

impl RealtimeClient {
    /// Connect to the realtime endpoint.
    ///
    /// # Errors
    /// Returns an error if the connection fails or if the URL is invalid.
    pub async fn connect(api_key: &str, model: Option<&str>, base_url: Option<&str>) -> Result<Self> {
        let stream = transport::ws::connect(api_key, model, base_url).await?;
        Ok(Self { stream })
    }

    /// Send a client event to the server.
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails or if the WebSocket send fails.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        validate_client_event(&event)?;
        let json = serde_json::to_string(&event)?;
        tracing::trace!("Sending event: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next server event. `None` means the server closed the socket.
    /// Frames that are not JSON are logged and skipped.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!("Received event: {}", safe_truncate(&text, TRACE_LOG_MAX_BYTES));
                    if let Some(event) = decode_server_frame(&text) {
                        return Ok(Some(event));
                    }
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection closed by server");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }

    /// Send a WebSocket ping so idle-timeout proxies keep the socket open.
    ///
    /// # Errors
    /// Returns an error if the WebSocket send fails.
    pub async fn ping(&mut self) -> Result<()> {
        self.stream.send(Message::Ping(Vec::new().into())).await?;
        Ok(())
    }

    /// Send a close frame.
    ///
    /// # Errors
    /// Returns an error if the close handshake cannot be started.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

fn decode_server_frame(text: &str) -> Option<ServerEvent> {
    match from_str::<ServerEvent>(text) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(
                error = %err,
                frame = %safe_truncate(text, TRACE_LOG_MAX_BYTES),
                "Skipping malformed server frame"
            );
            None
        }
    }
}

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

#[allow(clippy::result_large_err)]
pub(crate) fn validate_client_event(event: &ClientEvent) -> Result<()> {
    match event {
        ClientEvent::InputAudioBufferAppend { audio, .. } => {
            let size = estimate_base64_decoded_len(audio)?;
            if size > MAX_INPUT_AUDIO_CHUNK_BYTES {
                return Err(Error::InvalidClientEvent(format!(
                    "input_audio_buffer.append exceeds 15MB ({size} bytes)",
                )));
            }
        }
        ClientEvent::SessionUpdate { session, .. } => {
            validate_session_update(session.as_ref())?;
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn validate_session_update(session: &models::SessionUpdate) -> Result<()> {
    if let Some(audio) = &session.audio {
        if let Some(format) = audio.input.as_ref().and_then(|input| input.format.as_ref()) {
            format.validate()?;
        }
        if let Some(format) = audio.output.as_ref().and_then(|output| output.format.as_ref()) {
            format.validate()?;
        }
    }
    if let Some(tools) = &session.tools {
        validate_tools(tools)?;
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn validate_tools(tools: &[models::Tool]) -> Result<()> {
    let mut seen = HashSet::new();
    for tool in tools {
        let name = tool.name();
        if name.is_empty() {
            return Err(Error::InvalidClientEvent("tool name must not be empty".to_string()));
        }
        if !seen.insert(name) {
            return Err(Error::InvalidClientEvent(format!("duplicate tool name: {name}")));
        }
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn estimate_base64_decoded_len(s: &str) -> Result<usize> {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 length".to_string(),
        ));
    }

    let mut padding = 0;
    let mut seen_padding = false;
    for &b in bytes {
        if b == b'=' {
            seen_padding = true;
            padding += 1;
            continue;
        }
        if seen_padding {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 padding".to_string(),
            ));
        }
        let is_valid = matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/'
        );
        if !is_valid {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 character".to_string(),
            ));
        }
    }

    if padding > 2 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 padding length".to_string(),
        ));
    }

    Ok(bytes.len() / 4 * 3 - padding)
}
