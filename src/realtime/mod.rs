//! Duplex realtime session with the speech model.

mod handlers;
mod options;
mod session;
mod transport;

pub use handlers::{
    DeltaHandler, ErrorHandler, LifecycleHandler, ResponseHandler, SessionHandlers,
    ToolCallHandler,
};
pub use options::{
    DEFAULT_AUTO_FLUSH_BYTES, DEFAULT_INSTRUCTIONS, DEFAULT_KEEPALIVE_INTERVAL, SessionOptions,
};
pub use session::{ConnectionState, RealtimeSessionClient, ToolCallEvent, ToolOutput};
pub use transport::{BoxFuture, Connector, Transport, WsConnector};
