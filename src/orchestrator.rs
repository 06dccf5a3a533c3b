//! Bridge between a Twilio media stream and one realtime session.

use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::protocol::models::TurnDetectionMode;
use crate::realtime::{
    BoxFuture, Connector, DEFAULT_AUTO_FLUSH_BYTES, RealtimeSessionClient, SessionHandlers,
    SessionOptions, ToolCallEvent,
};
use crate::store::Store;
use crate::tools::{ToolCallRouter, ToolContext};

/// Inbound Twilio media-stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioFrame {
    Connected {},
    Start { start: StreamStart },
    Media { media: MediaPayload },
    Mark {},
    Stop {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaPayload {
    /// Base64 μ-law audio.
    pub payload: String,
}

/// Outbound `media` frame carrying model audio back to the caller.
#[must_use]
pub fn media_frame(stream_sid: &str, payload: &str) -> String {
    json!({ "event": "media", "streamSid": stream_sid, "media": { "payload": payload } })
        .to_string()
}

/// Outbound `clear` frame: drop audio Twilio has buffered (caller barge-in).
#[must_use]
pub fn clear_frame(stream_sid: &str) -> String {
    json!({ "event": "clear", "streamSid": stream_sid }).to_string()
}

struct ActiveCall {
    stream_sid: String,
    session: RealtimeSessionClient,
}

/// Owns the session for one phone call. No reconnects: once the session closes the bridge ends.
pub struct CallOrchestrator {
    options: SessionOptions,
    router: Arc<ToolCallRouter>,
    connector: Option<Arc<dyn Connector>>,
    store: Option<Arc<dyn Store>>,
    auto_flush_bytes: usize,
    outbound: mpsc::UnboundedSender<String>,
    finished: Arc<AtomicBool>,
    call: Option<ActiveCall>,
}

impl std::fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("stream_sid", &self.call.as_ref().map(|c| c.stream_sid.as_str()))
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl CallOrchestrator {
    /// Returns the orchestrator and the receiver of outbound Twilio frames, in order.
    ///
    /// When `options` carries no tools, the router's catalogue is advertised.
    #[must_use]
    pub fn new(
        mut options: SessionOptions,
        router: Arc<ToolCallRouter>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        if options.tools.is_empty() && !router.is_empty() {
            match router.try_as_tools() {
                Ok(tools) => options.tools = tools,
                Err(err) => warn!(error = %err, "Tool catalogue could not be serialized"),
            }
        }
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            options,
            router,
            connector: None,
            store: None,
            auto_flush_bytes: DEFAULT_AUTO_FLUSH_BYTES,
            outbound,
            finished: Arc::new(AtomicBool::new(false)),
            call: None,
        };
        (orchestrator, outbound_rx)
    }

    /// Use `connector` instead of the WebSocket connector from the options.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register each call in `store` when its stream starts, so transfers can record
    /// an outcome and audit entries carry the call log id.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub const fn auto_flush_bytes(mut self, threshold: usize) -> Self {
        self.auto_flush_bytes = threshold;
        self
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn session(&self) -> Option<&RealtimeSessionClient> {
        self.call.as_ref().map(|call| &call.session)
    }

    /// Adapt the router to the session's tool-call handler, with `ctx` attached to every call.
    pub fn tool_handler(
        router: Arc<ToolCallRouter>,
        ctx: ToolContext,
    ) -> impl Fn(ToolCallEvent) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
        move |call: ToolCallEvent| {
            let router = Arc::clone(&router);
            let ctx = ctx.clone();
            Box::pin(async move {
                Ok(router
                    .dispatch_with(&call.name, call.arguments, &ctx)
                    .await)
            })
        }
    }

    fn handlers(&self, stream_sid: &str, ctx: ToolContext) -> SessionHandlers {
        let audio_tx = self.outbound.clone();
        let audio_sid = stream_sid.to_string();
        let clear_tx = self.outbound.clone();
        let clear_sid = stream_sid.to_string();
        let closed = Arc::clone(&self.finished);

        SessionHandlers::new()
            .on_audio_delta(move |delta| {
                let _ = audio_tx.send(media_frame(&audio_sid, delta));
            })
            .on_speech_started(move || {
                let _ = clear_tx.send(clear_frame(&clear_sid));
            })
            .on_tool_call(Self::tool_handler(Arc::clone(&self.router), ctx))
            .on_open(|| info!("Realtime session open"))
            .on_error(|err| error!(error = %err, "Realtime session error"))
            .on_close(move || {
                info!("Realtime session closed");
                closed.store(true, Ordering::SeqCst);
            })
    }

    async fn register_call(&self, call_sid: &str, from: Option<&str>, to: Option<&str>) {
        let Some(store) = &self.store else {
            return;
        };
        match store.upsert_call_log(call_sid, from, to).await {
            Ok(log) => debug!(call_sid = %call_sid, call_log_id = log.id, "Call registered"),
            Err(err) => warn!(call_sid = %call_sid, error = %err, "Call log write failed"),
        }
    }

    async fn start(&mut self, start: StreamStart) {
        if self.call.is_some() {
            warn!(stream_sid = %start.stream_sid, "Duplicate start frame ignored");
            return;
        }
        let params = &start.custom_parameters;
        let caller_phone = params
            .get("from")
            .or_else(|| params.get("callerPhone"))
            .cloned();
        if let Some(call_sid) = &start.call_sid {
            self.register_call(
                call_sid,
                caller_phone.as_deref(),
                params.get("to").map(String::as_str),
            )
            .await;
        }
        let ctx = ToolContext {
            call_sid: start.call_sid.clone(),
            caller_phone,
        };
        let handlers = self.handlers(&start.stream_sid, ctx);
        let session = match &self.connector {
            Some(connector) => RealtimeSessionClient::with_connector(
                Arc::clone(connector),
                self.options.clone(),
                handlers,
            ),
            None => RealtimeSessionClient::new(self.options.clone(), handlers),
        };
        info!(stream_sid = %start.stream_sid, call_sid = ?start.call_sid, "Media stream started");
        session.connect();
        self.call = Some(ActiveCall {
            stream_sid: start.stream_sid,
            session,
        });
    }

    /// Handle one inbound frame. Returns `false` once the bridge should stop.
    pub async fn handle_frame(&mut self, raw: &str) -> bool {
        let frame: TwilioFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "Skipping undecodable media-stream frame");
                return !self.is_finished();
            }
        };

        match frame {
            TwilioFrame::Connected {} => debug!("Media stream connected"),
            TwilioFrame::Start { start } => self.start(start).await,
            TwilioFrame::Media { media } => {
                if let Some(call) = &self.call {
                    call.session.append_audio(&media.payload).await;
                    if self.options.turn_detection == TurnDetectionMode::None {
                        call.session.maybe_auto_flush(self.auto_flush_bytes).await;
                    }
                }
            }
            TwilioFrame::Mark {} | TwilioFrame::Other => {}
            TwilioFrame::Stop {} => {
                info!("Media stream stopped");
                self.shutdown().await;
                return false;
            }
        }
        !self.is_finished()
    }

    /// Feed frames until the stream stops, the channel closes, or the session ends.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        while let Some(raw) = inbound.recv().await {
            if !self.handle_frame(&raw).await {
                break;
            }
        }
        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        if let Some(call) = &self.call {
            call.session.close().await;
        }
        self.finished.store(true, Ordering::SeqCst);
    }
}
