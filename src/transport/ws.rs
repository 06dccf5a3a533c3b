use crate::error::Result;
use crate::protocol::models::DEFAULT_MODEL;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

pub const WS_BASE_URL: &str = "wss://api.openai.com/v1/realtime";

/// Socket to the realtime endpoint; already a `Stream` + `Sink` of frames.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime endpoint URL with the model as a query parameter.
///
/// # Errors
/// Returns an error if `base_url` is not a valid URL.
#[allow(clippy::result_large_err)]
pub fn endpoint(model: Option<&str>, base_url: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base_url.unwrap_or(WS_BASE_URL))?;
    url.query_pairs_mut()
        .append_pair("model", model.unwrap_or(DEFAULT_MODEL));
    Ok(url)
}

/// Open the socket, authenticating with `api_key` as a bearer token.
///
/// # Errors
/// Returns an error if the URL or key is malformed or the handshake fails
/// (network failure, rejected credentials).
pub async fn connect(api_key: &str, model: Option<&str>, base_url: Option<&str>) -> Result<WsStream> {
    let url = endpoint(model, base_url)?;
    let mut request = url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {api_key}"))?);

    let (stream, _) = connect_async(request).await?;
    tracing::info!(host = url.host_str().unwrap_or_default(), "Connected to realtime endpoint");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_defaults_into_the_query() {
        let url = endpoint(None, None).unwrap();
        assert_eq!(url.host_str(), Some("api.openai.com"));
        assert_eq!(url.query(), Some("model=gpt-realtime"));
    }

    #[test]
    fn custom_base_keeps_its_path() {
        let url = endpoint(Some("gpt-realtime-mini"), Some("ws://127.0.0.1:9000/rt")).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/rt?model=gpt-realtime-mini");
    }
}
