use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, Modality, OutputModalities, ResponseConfig, SessionUpdate};
use crate::protocol::server_events::ServerEvent;
use crate::{Error, Result};

use super::handlers::{SessionHandlers, ToolCallHandler};
use super::options::SessionOptions;
use super::transport::{Connector, Transport, WsConnector};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, interval_at};

const COMMAND_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub call_id: String,
    pub name: String,
    /// Parsed arguments; `{}` when the model sent nothing parseable.
    pub arguments: Value,
}

/// The answer to one [`ToolCallEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: Value,
}

impl ToolOutput {
    #[must_use]
    pub fn new(call_id: impl Into<String>, output: Value) -> Self {
        Self {
            call_id: call_id.into(),
            output,
        }
    }
}

enum Command {
    Send(ClientEvent),
    ToolOutput {
        output: ToolOutput,
        respond: oneshot::Sender<Result<()>>,
    },
    Close,
}

struct Shared {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    handlers: SessionHandlers,
    state: Mutex<ConnectionState>,
    pending_bytes: AtomicUsize,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn finish(&self) {
        self.set_state(ConnectionState::Closed);
        self.commands.lock().take();
        self.pending_bytes.store(0, Ordering::Relaxed);
        self.handlers.emit_close();
    }
}

/// One duplex session with the realtime model, owned by a single call leg.
///
/// `connect` spawns a task that owns the transport. Every other method talks
/// to that task over a channel, so the handle can be shared freely. Audio and
/// control methods are silent no-ops unless the session is open; failures are
/// reported through [`SessionHandlers::on_error`] and never returned.
#[derive(Clone)]
pub struct RealtimeSessionClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RealtimeSessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSessionClient")
            .field("state", &self.state())
            .field("pending_bytes", &self.pending_bytes())
            .finish_non_exhaustive()
    }
}

impl RealtimeSessionClient {
    /// A session that connects over WebSocket using the key, model and URL in `options`.
    #[must_use]
    pub fn new(options: SessionOptions, handlers: SessionHandlers) -> Self {
        let connector = WsConnector::new(
            options.api_key.clone(),
            options.model.clone(),
            options.base_url.clone(),
        );
        Self::with_connector(Arc::new(connector), options, handlers)
    }

    #[must_use]
    pub fn with_connector(
        connector: Arc<dyn Connector>,
        options: SessionOptions,
        handlers: SessionHandlers,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                options,
                handlers,
                state: Mutex::new(ConnectionState::Disconnected),
                pending_bytes: AtomicUsize::new(0),
                commands: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Decoded bytes appended since the last commit.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.shared.pending_bytes.load(Ordering::Relaxed)
    }

    /// Start connecting in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime. Outcome is reported through
    /// `on_open`, or `on_error` followed by `on_close`.
    pub fn connect(&self) {
        {
            let mut state = self.shared.state.lock();
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing
            ) {
                tracing::warn!(state = ?*state, "connect() ignored: session already active");
                return;
            }
            *state = ConnectionState::Connecting;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        *self.shared.commands.lock() = Some(cmd_tx);
        tokio::spawn(run_session(Arc::clone(&self.shared), cmd_rx));
    }

    /// Forward one base64 audio frame to the input buffer.
    pub async fn append_audio(&self, audio: &str) {
        if audio.is_empty() {
            return;
        }
        let event = ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio: audio.to_string(),
        };
        if let Err(err) = crate::validate_client_event(&event) {
            tracing::warn!(error = %err, "Dropping invalid audio frame");
            self.shared.handlers.emit_error(&err);
            return;
        }
        if self.send(event).await {
            self.shared
                .pending_bytes
                .fetch_add(base64::decoded_len_estimate(audio.len()), Ordering::Relaxed);
        }
    }

    /// End the user turn and ask for a response.
    ///
    /// The protocol takes one output modality per response: any set with audio
    /// yields audio (with a transcript), text alone yields text, and an empty
    /// set defers to the session default.
    pub async fn commit_and_respond(&self, modalities: &[Modality]) {
        if !self.send(ClientEvent::InputAudioBufferCommit { event_id: None }).await {
            return;
        }
        let response = OutputModalities::from_requested(modalities).map(|output_modalities| {
            Box::new(ResponseConfig {
                output_modalities: Some(output_modalities),
                ..ResponseConfig::default()
            })
        });
        self.send(ClientEvent::response_create(response)).await;
        self.shared.pending_bytes.store(0, Ordering::Relaxed);
    }

    /// Commit and respond if at least `threshold_bytes` are pending. Returns whether it flushed.
    pub async fn maybe_auto_flush(&self, threshold_bytes: usize) -> bool {
        let pending = self.pending_bytes();
        if pending == 0 || pending < threshold_bytes || !self.is_open() {
            return false;
        }
        tracing::debug!(pending, threshold_bytes, "Auto-flushing input audio");
        self.commit_and_respond(&[Modality::Audio, Modality::Text]).await;
        true
    }

    /// Push a partial configuration change to the open session.
    pub async fn update_session(&self, patch: SessionUpdate) {
        self.send(ClientEvent::SessionUpdate {
            event_id: None,
            session: Box::new(patch),
        })
        .await;
    }

    pub async fn cancel_response(&self) {
        self.send(ClientEvent::ResponseCancel {
            event_id: None,
            response_id: None,
        })
        .await;
    }

    pub async fn clear_input_audio(&self) {
        if self.send(ClientEvent::InputAudioBufferClear { event_id: None }).await {
            self.shared.pending_bytes.store(0, Ordering::Relaxed);
        }
    }

    /// Answer a tool call directly instead of through `on_tool_call`.
    ///
    /// # Errors
    /// `NotConnected` unless open, `UnknownToolCall` if the id was never received
    /// or was already answered, or the transport error if the send fails.
    pub async fn send_tool_output(&self, output: ToolOutput) -> Result<()> {
        let sender = self.sender().ok_or(Error::NotConnected)?;
        let (respond, rx) = oneshot::channel();
        sender
            .send(Command::ToolOutput { output, respond })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Graceful shutdown. Safe to call more than once.
    pub async fn close(&self) {
        let sender = {
            let mut state = self.shared.state.lock();
            if !matches!(*state, ConnectionState::Connecting | ConnectionState::Open) {
                return;
            }
            *state = ConnectionState::Closing;
            self.shared.commands.lock().clone()
        };
        if let Some(sender) = sender {
            let _ = sender.send(Command::Close).await;
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Command>> {
        if !self.is_open() {
            return None;
        }
        self.shared.commands.lock().clone()
    }

    async fn send(&self, event: ClientEvent) -> bool {
        let Some(sender) = self.sender() else {
            return false;
        };
        sender.send(Command::Send(event)).await.is_ok()
    }
}

async fn run_session(shared: Arc<Shared>, mut cmd_rx: mpsc::Receiver<Command>) {
    let mut transport = match shared.connector.connect().await {
        Ok(transport) => transport,
        Err(err) => {
            tracing::error!(error = %err, "Realtime connect failed");
            shared.handlers.emit_error(&err);
            shared.finish();
            return;
        }
    };

    let config = ClientEvent::SessionUpdate {
        event_id: None,
        session: Box::new(shared.options.to_session_update()),
    };
    if let Err(err) = transport.send(config).await {
        tracing::error!(error = %err, "Failed to send session configuration");
        shared.handlers.emit_error(&err);
        let _ = transport.close().await;
        shared.finish();
        return;
    }

    let opened = {
        let mut state = shared.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            true
        } else {
            false
        }
    };
    if !opened {
        let _ = transport.close().await;
        shared.finish();
        return;
    }
    tracing::info!(model = %shared.options.model, "Realtime session open");
    shared.handlers.emit_open();

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let mut task = SessionTask {
        shared: Arc::clone(&shared),
        outstanding: HashSet::new(),
        call_names: HashMap::new(),
        results_tx,
    };
    let period = shared.options.keepalive_interval;
    let mut keepalive = (!period.is_zero()).then(|| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(event)) => {
                        let kind = event.kind();
                        match transport.send(event).await {
                            Ok(()) => {}
                            Err(Error::InvalidClientEvent(msg)) => {
                                tracing::warn!(event = kind, "Rejected outbound event: {msg}");
                            }
                            Err(err) => {
                                tracing::error!(event = kind, error = %err, "Realtime send failed");
                                shared.handlers.emit_error(&err);
                                break;
                            }
                        }
                    }
                    Some(Command::ToolOutput { output, respond }) => {
                        let result = task.answer(transport.as_mut(), output).await;
                        let _ = respond.send(result);
                    }
                    Some(Command::Close) | None => break,
                }
            }
            event = transport.next_event() => {
                match event {
                    Ok(Some(evt)) => task.handle_event(evt),
                    Ok(None) => {
                        tracing::info!("Realtime transport closed by server");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Realtime transport failed");
                        shared.handlers.emit_error(&err);
                        break;
                    }
                }
            }
            Some(output) = results_rx.recv() => {
                match task.answer(transport.as_mut(), output).await {
                    Ok(()) => {}
                    Err(Error::UnknownToolCall(call_id)) => {
                        tracing::warn!(call_id = %call_id, "Dropping tool result for answered call");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to send tool output");
                        shared.handlers.emit_error(&err);
                        break;
                    }
                }
            }
            () = next_keepalive(&mut keepalive) => {
                if let Err(err) = transport.keepalive().await {
                    tracing::warn!(error = %err, "Keepalive failed");
                }
            }
        }
    }

    shared.set_state(ConnectionState::Closing);
    if let Err(err) = transport.close().await {
        tracing::debug!(error = %err, "Error while closing realtime transport");
    }
    if !task.outstanding.is_empty() {
        tracing::debug!(count = task.outstanding.len(), "Session closed with unanswered tool calls");
    }
    tracing::info!("Realtime session closed");
    shared.finish();
}

/// Resolves on the next keepalive tick, or never when keepalive is off.
async fn next_keepalive(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct SessionTask {
    shared: Arc<Shared>,
    /// Tool calls received and not yet answered.
    outstanding: HashSet<String>,
    /// call_id -> name from `response.output_item.added`.
    call_names: HashMap<String, String>,
    results_tx: mpsc::UnboundedSender<ToolOutput>,
}

impl SessionTask {
    fn handle_event(&mut self, event: ServerEvent) {
        let shared = Arc::clone(&self.shared);
        let handlers = &shared.handlers;
        match event {
            ServerEvent::ResponseOutputAudioDelta { delta, .. } => {
                SessionHandlers::emit_delta(handlers.on_audio_delta.as_ref(), &delta);
            }
            ServerEvent::ResponseOutputTextDelta { delta, .. } => {
                SessionHandlers::emit_delta(handlers.on_text_delta.as_ref(), &delta);
            }
            ServerEvent::ResponseOutputAudioTranscriptDelta { delta, .. } => {
                SessionHandlers::emit_delta(handlers.on_transcript_delta.as_ref(), &delta);
            }
            ServerEvent::ResponseDone { response, .. } => {
                tracing::debug!(response_id = %response.id, "Response completed");
                if let Some(handler) = &handlers.on_response_completed {
                    handler(&response);
                }
            }
            ServerEvent::InputAudioBufferSpeechStarted { .. } => {
                if let Some(handler) = &handlers.on_speech_started {
                    handler();
                }
            }
            ServerEvent::ResponseOutputItemAdded {
                item: Item::FunctionCall { call_id, name, .. },
                ..
            } => {
                self.call_names.insert(call_id, name);
            }
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => self.start_tool_call(call_id, name, &arguments),
            ServerEvent::Error { error, .. } => {
                tracing::warn!(code = ?error.code, "Realtime error event: {}", error.message);
                handlers.emit_error(&Error::Api(error));
            }
            ServerEvent::Unknown(value) => {
                let kind = value.get("type").and_then(Value::as_str).unwrap_or("unknown");
                tracing::debug!(event = kind, "Ignoring unhandled realtime event");
            }
            other => {
                tracing::trace!(event = other.kind(), "Realtime event");
            }
        }
    }

    fn start_tool_call(&mut self, call_id: String, name: Option<String>, arguments: &str) {
        let recorded = self.call_names.remove(&call_id);
        let name = name
            .filter(|name| !name.is_empty())
            .or(recorded)
            .unwrap_or_default();
        if !self.outstanding.insert(call_id.clone()) {
            tracing::debug!(call_id = %call_id, "Ignoring repeated tool call");
            return;
        }

        tracing::info!(call_id = %call_id, tool = %name, "Tool call");
        let call = ToolCallEvent {
            call_id,
            name,
            arguments: parse_arguments(arguments),
        };
        let handler = self.shared.handlers.on_tool_call.clone();
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let output = execute_tool_call(handler, call).await;
            // Fails only once the session has ended; the result is discarded.
            let _ = results.send(output);
        });
    }

    async fn answer(&mut self, transport: &mut dyn Transport, output: ToolOutput) -> Result<()> {
        if !self.outstanding.remove(&output.call_id) {
            tracing::warn!(call_id = %output.call_id, "Tool output for unknown or answered call");
            return Err(Error::UnknownToolCall(output.call_id));
        }
        let payload = serde_json::to_string(&output.output)?;
        transport
            .send(ClientEvent::function_call_output(output.call_id, payload))
            .await?;
        if self.outstanding.is_empty() && self.shared.options.auto_tool_response {
            transport.send(ClientEvent::response_create(None)).await?;
        }
        Ok(())
    }
}

/// Lenient argument decoding: anything that is not a JSON object becomes `{}`.
fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                tracing::debug!("Unparseable tool arguments, using empty object");
            }
            json!({})
        }
    }
}

async fn execute_tool_call(handler: Option<ToolCallHandler>, call: ToolCallEvent) -> ToolOutput {
    let call_id = call.call_id.clone();
    let Some(handler) = handler else {
        return ToolOutput::new(
            call_id,
            json!({ "ok": false, "error": format!("Unhandled tool {}", call.name) }),
        );
    };

    let name = call.name.clone();
    let output = match AssertUnwindSafe(handler(call)).catch_unwind().await {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            tracing::warn!(call_id = %call_id, tool = %name, error = %err, "Tool call failed");
            json!({ "ok": false, "error": err.to_string() })
        }
        Err(_) => {
            tracing::error!(call_id = %call_id, tool = %name, "Tool call panicked");
            json!({ "ok": false, "error": "Tool execution failed" })
        }
    };
    ToolOutput::new(call_id, output)
}
