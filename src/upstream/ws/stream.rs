//! Market stream implementation.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::types::MarketClass;
use crate::upstream::ws::client::WsConfig;
use crate::upstream::ws::messages::{StreamEvent, parse_event};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single raw market stream connection.
///
/// Yields parsed [`StreamEvent`]s. The stream never reconnects on its own:
/// when the connection closes, errors, or stays silent for longer than
/// [`WsConfig::message_timeout`], it yields one error and then ends. The
/// owning cache decides whether and when to resubscribe.
///
/// # Example
///
/// ```rust,ignore
/// use binance_proxy::types::MarketClass;
/// use binance_proxy::upstream::ws::MarketWsClient;
/// use futures_util::StreamExt;
///
/// let client = MarketWsClient::new(MarketClass::Spot);
/// let mut stream = client.subscribe_ticker("BTCUSDT").await?;
///
/// while let Some(event) = stream.next().await {
///     println!("{:?}", event?);
/// }
/// ```
pub struct MarketStream {
    class: MarketClass,
    inner: Option<WsStream>,
    url: String,
    message_timeout: Duration,
    /// Fires when no frame arrived within `message_timeout`.
    watchdog: Pin<Box<Sleep>>,
}

impl std::fmt::Debug for MarketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStream")
            .field("class", &self.class)
            .field("url", &self.url)
            .field("connected", &self.inner.is_some())
            .finish()
    }
}

impl MarketStream {
    /// Connect to a stream URL.
    pub(crate) async fn connect(class: MarketClass, url: &str, config: &WsConfig) -> Result<Self, ProxyError> {
        let connect = connect_async(url);
        let (ws_stream, _) = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| ProxyError::WebSocketMsg(format!("Timed out connecting to {}", url)))?
            .map_err(|e| ProxyError::WebSocketMsg(format!("Failed to connect to {}: {}", url, e)))?;

        debug!(%url, "Stream connected");

        Ok(Self {
            class,
            inner: Some(ws_stream),
            url: url.to_string(),
            message_timeout: config.message_timeout,
            watchdog: Box::pin(tokio::time::sleep(config.message_timeout)),
        })
    }

    fn reset_watchdog(&mut self) {
        let deadline = Instant::now() + self.message_timeout;
        self.watchdog.as_mut().reset(deadline);
    }

    /// Drop the connection and report why.
    fn fail(&mut self, reason: String) -> Poll<Option<Result<StreamEvent, ProxyError>>> {
        self.inner = None;
        Poll::Ready(Some(Err(ProxyError::ConnectionClosed { reason })))
    }
}

impl Stream for MarketStream {
    type Item = Result<StreamEvent, ProxyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => {
                    this.reset_watchdog();
                    match msg {
                        WsMessage::Text(text) => match parse_event(this.class, &text) {
                            Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                            Ok(None) => continue,
                            Err(e) => {
                                warn!("Failed to parse stream message: {}", e);
                                continue;
                            }
                        },
                        WsMessage::Binary(data) => {
                            let class = this.class;
                            let parsed = std::str::from_utf8(&data).ok().map(|text| parse_event(class, text));
                            if let Some(Ok(Some(event))) = parsed {
                                return Poll::Ready(Some(Ok(event)));
                            }
                            continue;
                        }
                        // Pongs are answered by tungstenite.
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                        WsMessage::Close(frame) => {
                            let reason = frame
                                .map(|f| format!("{} {}", f.code, f.reason))
                                .unwrap_or_else(|| "closed by server".to_string());
                            return this.fail(reason);
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    warn!(url = %this.url, "Stream error: {}", e);
                    this.inner = None;
                    return Poll::Ready(Some(Err(ProxyError::WebSocket(e))));
                }
                Poll::Ready(None) => return this.fail("connection ended".to_string()),
                Poll::Pending => break,
            }
        }

        if this.watchdog.as_mut().poll(cx).is_ready() {
            let secs = this.message_timeout.as_secs();
            return this.fail(format!("no message for {}s", secs));
        }

        Poll::Pending
    }
}
