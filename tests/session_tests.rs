use barista_rt::realtime::{BoxFuture, Connector, Transport};
use barista_rt::store::{MemoryStore, Store};
use barista_rt::tools::args::NoArgs;
use barista_rt::{
    CallOrchestrator, ClientEvent, ConnectionState, Error, Result, ServerEvent, SessionOptions,
    ToolCallRouter, ToolContext, TurnDetectionMode,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct ChannelTransport {
    incoming: mpsc::Receiver<ServerEvent>,
    outgoing: mpsc::UnboundedSender<Value>,
}

impl Transport for ChannelTransport {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let value = serde_json::to_value(&event)?;
            self.outgoing.send(value).map_err(|_| Error::ConnectionClosed)
        })
    }

    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
        Box::pin(async move { Ok(self.incoming.recv().await) })
    }
}

struct OneShotConnector {
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl Connector for OneShotConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Transport>>> {
        let transport = self.transport.lock().take();
        Box::pin(async move { transport.ok_or(Error::ConnectionClosed) })
    }
}

struct Wire {
    connector: Arc<OneShotConnector>,
    server: mpsc::Sender<ServerEvent>,
    sent: mpsc::UnboundedReceiver<Value>,
}

fn wire() -> Wire {
    let (server, incoming) = mpsc::channel(16);
    let (outgoing, sent) = mpsc::unbounded_channel();
    let transport = ChannelTransport { incoming, outgoing };
    Wire {
        connector: Arc::new(OneShotConnector {
            transport: Mutex::new(Some(Box::new(transport))),
        }),
        server,
        sent,
    }
}

fn event(value: Value) -> ServerEvent {
    serde_json::from_value(value).unwrap()
}

async fn next_sent(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn router() -> Arc<ToolCallRouter> {
    let mut router = ToolCallRouter::new();
    router.tool_with_description(
        "whoIsCalling",
        "Report the caller",
        |_: NoArgs, ctx: ToolContext| async move {
            Ok::<_, Error>(json!({ "callSid": ctx.call_sid, "from": ctx.caller_phone }))
        },
    );
    Arc::new(router)
}

const START: &str = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1","customParameters":{"from":"+15125550100"}}}"#;

async fn started(options: SessionOptions) -> (CallOrchestrator, mpsc::UnboundedReceiver<String>, Wire) {
    let mut wire = wire();
    let (orchestrator, frames) = CallOrchestrator::new(options, router());
    let mut orchestrator = orchestrator
        .with_connector(Arc::clone(&wire.connector) as Arc<dyn Connector>)
        .auto_flush_bytes(6);

    assert!(orchestrator.handle_frame(r#"{"event":"connected"}"#).await);
    assert!(orchestrator.handle_frame(START).await);
    let config = next_sent(&mut wire.sent).await;
    assert_eq!(config["type"], "session.update");
    assert_eq!(config["session"]["tools"][0]["name"], "whoIsCalling");

    let session = orchestrator.session().unwrap().clone();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !session.is_open() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    (orchestrator, frames, wire)
}

#[tokio::test]
async fn model_audio_and_barge_in_reach_the_caller() {
    let (_orchestrator, mut frames, wire) = started(SessionOptions::new("sk-test")).await;

    wire.server
        .send(event(json!({ "type": "response.output_audio.delta", "delta": "AAAA" })))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut frames).await,
        json!({ "event": "media", "streamSid": "MZ1", "media": { "payload": "AAAA" } })
    );

    wire.server
        .send(event(json!({ "type": "input_audio_buffer.speech_started" })))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut frames).await,
        json!({ "event": "clear", "streamSid": "MZ1" })
    );
}

#[tokio::test]
async fn tool_calls_are_answered_with_call_context() {
    let (_orchestrator, _frames, mut wire) = started(SessionOptions::new("sk-test")).await;

    wire.server
        .send(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "whoIsCalling",
            "arguments": "{}",
        })))
        .await
        .unwrap();

    let output = next_sent(&mut wire.sent).await;
    assert_eq!(output["type"], "conversation.item.create");
    assert_eq!(output["item"]["call_id"], "call_1");
    let payload: Value = serde_json::from_str(output["item"]["output"].as_str().unwrap()).unwrap();
    assert_eq!(payload, json!({ "callSid": "CA1", "from": "+15125550100" }));

    let follow_up = next_sent(&mut wire.sent).await;
    assert_eq!(follow_up["type"], "response.create");
}

#[tokio::test]
async fn unknown_tool_still_gets_an_answer() {
    let (_orchestrator, _frames, mut wire) = started(SessionOptions::new("sk-test")).await;

    wire.server
        .send(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_9",
            "name": "orderPizza",
            "arguments": "not json",
        })))
        .await
        .unwrap();

    let output = next_sent(&mut wire.sent).await;
    let payload: Value = serde_json::from_str(output["item"]["output"].as_str().unwrap()).unwrap();
    assert_eq!(payload, json!({ "error": "Unknown tool: orderPizza" }));
}

#[tokio::test]
async fn caller_audio_is_flushed_without_server_turn_detection() {
    let options = SessionOptions::new("sk-test").turn_detection(TurnDetectionMode::None);
    let (mut orchestrator, _frames, mut wire) = started(options).await;

    assert!(orchestrator.handle_frame(r#"{"event":"media","media":{"payload":"AAAA"}}"#).await);
    assert_eq!(next_sent(&mut wire.sent).await["type"], "input_audio_buffer.append");
    assert!(orchestrator.handle_frame(r#"{"event":"media","media":{"payload":"AAAA"}}"#).await);
    assert_eq!(next_sent(&mut wire.sent).await["type"], "input_audio_buffer.append");
    assert_eq!(next_sent(&mut wire.sent).await["type"], "input_audio_buffer.commit");
    assert_eq!(next_sent(&mut wire.sent).await["type"], "response.create");
    assert_eq!(orchestrator.session().unwrap().pending_bytes(), 0);
}

#[tokio::test]
async fn server_vad_leaves_turns_to_the_model() {
    let (mut orchestrator, _frames, mut wire) = started(SessionOptions::new("sk-test")).await;

    for _ in 0..3 {
        assert!(orchestrator.handle_frame(r#"{"event":"media","media":{"payload":"AAAA"}}"#).await);
        assert_eq!(next_sent(&mut wire.sent).await["type"], "input_audio_buffer.append");
    }
    assert_eq!(orchestrator.session().unwrap().pending_bytes(), 9);
    assert!(wire.sent.try_recv().is_err());
}

#[tokio::test]
async fn stop_frame_closes_the_session() {
    let (mut orchestrator, _frames, _wire) = started(SessionOptions::new("sk-test")).await;
    let session = orchestrator.session().unwrap().clone();

    assert!(!orchestrator.handle_frame(r#"{"event":"stop"}"#).await);
    assert!(orchestrator.is_finished());
    tokio::time::timeout(Duration::from_secs(1), async {
        while session.state() != ConnectionState::Closed {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn server_hangup_ends_the_bridge() {
    let (orchestrator, _frames, wire) = started(SessionOptions::new("sk-test")).await;
    let session = orchestrator.session().unwrap().clone();
    let (inbound_tx, inbound) = mpsc::channel(4);
    let bridge = tokio::spawn(orchestrator.run(inbound));

    drop(wire.server);
    tokio::time::timeout(Duration::from_secs(1), async {
        while session.state() != ConnectionState::Closed {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    inbound_tx
        .send(r#"{"event":"mark"}"#.to_string())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), bridge)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn failed_connect_finishes_the_call() {
    let connector = Arc::new(OneShotConnector {
        transport: Mutex::new(None),
    });
    let (orchestrator, _frames) = CallOrchestrator::new(SessionOptions::new("sk-test"), router());
    let mut orchestrator = orchestrator.with_connector(connector);
    orchestrator.handle_frame(START).await;

    tokio::time::timeout(Duration::from_secs(1), async {
        while !orchestrator.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(orchestrator.session().unwrap().state(), ConnectionState::Closed);
}

#[tokio::test]
async fn stream_start_registers_the_call() {
    let mut wire = wire();
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _frames) = CallOrchestrator::new(SessionOptions::new("sk-test"), router());
    let mut orchestrator = orchestrator
        .with_connector(Arc::clone(&wire.connector) as Arc<dyn Connector>)
        .with_store(Arc::clone(&store) as Arc<dyn Store>);

    let start = r#"{"event":"start","start":{"streamSid":"MZ2","callSid":"CA2","customParameters":{"from":"+15125550100","to":"+15125550000"}}}"#;
    assert!(orchestrator.handle_frame(start).await);
    assert_eq!(next_sent(&mut wire.sent).await["type"], "session.update");

    let log = store.call_log_by_sid("CA2").await.unwrap().unwrap();
    assert_eq!(log.from.as_deref(), Some("+15125550100"));
    assert_eq!(log.to.as_deref(), Some("+15125550000"));
    store.set_call_outcome("CA2", "transferred").await.unwrap();
    let log = store.call_log_by_sid("CA2").await.unwrap().unwrap();
    assert_eq!(log.outcome.as_deref(), Some("transferred"));
}
