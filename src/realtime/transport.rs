use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;
use crate::{RealtimeClient, Result};
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One open duplex connection to the model.
pub trait Transport: Send {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>>;
    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>>;

    /// Idle-connection keepalive. Transports without one do nothing.
    fn keepalive(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Opens transports. The session calls it once per `connect()`.
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Transport>>>;
}

/// Connects over WebSocket with bearer auth.
#[derive(Clone)]
pub struct WsConnector {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl WsConnector {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url,
        }
    }
}

impl std::fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnector")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Transport>>> {
        Box::pin(async move {
            let client =
                RealtimeClient::connect(&self.api_key, Some(&self.model), self.base_url.as_deref())
                    .await?;
            Ok(Box::new(WsTransport { client }) as Box<dyn Transport>)
        })
    }
}

struct WsTransport {
    client: RealtimeClient,
}

impl Transport for WsTransport {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.send(event).await })
    }

    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
        Box::pin(async move { self.client.next_event().await })
    }

    fn keepalive(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.ping().await })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.close().await })
    }
}
