/// Push stream subscriptions.
///
/// Every subscription owns one WebSocket connection and one reader task.
/// [`StreamManager::subscribe`] hands back the event channel and the stop
/// handle immediately; connecting happens inside the task.
///
/// Lifecycle of a subscription:
/// - connecting: the task dials the stream URL
/// - open: each text/binary frame is decoded into `T` and pushed in arrival
///   order; a full channel suspends the reader until the consumer catches up
/// - closing: the stop handle fired or was dropped, the consumer dropped the
///   stream, the peer closed, or the connection failed
/// - closed: a close frame is sent (bounded by `close_timeout`), the socket is
///   dropped and the event channel ends
///
/// A frame that fails to decode is logged and skipped; the connection stays
/// open unless `max_consecutive_decode_failures` is reached.
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tokio_tungstenite::tungstenite::Message as WsMsg;
use url::Url;

use crate::errors::BinanceError;

type WsConnection =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Maximum number of frame bytes echoed into decode-failure logs.
const FRAME_LOG_LIMIT: usize = 256;

/// Configuration for stream subscriptions.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Events buffered per subscription before the reader waits (default: 64).
    pub channel_capacity: usize,
    /// Timeout for the WebSocket handshake (default: 10s).
    pub connect_timeout: Duration,
    /// Time allowed to send the close frame when shutting down (default: 1s).
    pub close_timeout: Duration,
    /// Close the subscription after this many undecodable frames in a row
    /// (default: `None`, never).
    pub max_consecutive_decode_failures: Option<usize>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            max_consecutive_decode_failures: None,
        }
    }
}

/// A typed stream of decoded events.
///
/// Ends (`None`) once the subscription is closed, for whatever reason.
#[derive(Debug)]
pub struct TypedStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TypedStream<T> {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for TypedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Stops one subscription.
///
/// Calling [`StopHandle::stop`] or dropping the handle both close the
/// subscription's connection.
#[derive(Debug)]
pub struct StopHandle {
    tx: oneshot::Sender<()>,
}

impl StopHandle {
    pub fn stop(self) {
        let _ = self.tx.send(());
    }

    /// Whether the reader task has terminated.
    pub fn is_finished(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the reader task has terminated.
    pub async fn finished(&mut self) {
        self.tx.closed().await
    }
}

/// A channel pair returned by every subscribe call.
pub type Subscription<T> = (TypedStream<T>, StopHandle);

/// Opens subscriptions against one stream endpoint.
#[derive(Debug, Clone)]
pub struct StreamManager {
    base: Url,
    config: WsConfig,
}

impl StreamManager {
    pub fn new(ws_base: &str, config: WsConfig) -> Result<Self, BinanceError> {
        let base = Url::parse(ws_base)?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(BinanceError::Config(format!(
                "stream base must use ws:// or wss://, got {ws_base}"
            )));
        }
        Ok(Self { base, config })
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// URL of a raw stream, e.g. `bnbbtc@depth` or a listen key.
    pub fn stream_url(&self, stream_name: &str) -> Result<Url, BinanceError> {
        if stream_name.is_empty() || stream_name.contains(['/', '?', '#']) {
            return Err(BinanceError::Construction(format!(
                "invalid stream name: {stream_name:?}"
            )));
        }
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), stream_name);
        Ok(Url::parse(&joined)?)
    }

    /// Start a subscription decoding every frame as `T`.
    ///
    /// Returns as soon as the reader task is spawned. Connection failures
    /// after that point are logged and end the event stream.
    pub fn subscribe<T>(&self, stream_name: &str) -> Result<Subscription<T>, BinanceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.stream_url(stream_name)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BinanceError::Config(format!("subscribe needs a tokio runtime: {e}")))?;

        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        debug!("ws.subscribe url={}", url);
        runtime.spawn(run_subscription(url, self.config.clone(), events_tx, stop_rx));

        Ok((TypedStream { rx: events_rx }, StopHandle { tx: stop_tx }))
    }
}

enum Step {
    Stop,
    ConsumerGone,
    Frame(Option<Result<WsMsg, tokio_tungstenite::tungstenite::Error>>),
}

async fn run_subscription<T>(
    url: Url,
    config: WsConfig,
    events: mpsc::Sender<T>,
    mut stop: oneshot::Receiver<()>,
) where
    T: DeserializeOwned + Send + 'static,
{
    let connect = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(url.as_str()),
    );
    let mut ws = tokio::select! {
        biased;
        _ = &mut stop => {
            debug!("ws.stopped_before_open url={}", url);
            return;
        }
        result = connect => match result {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                error!("ws.connect_failed url={} error={}", url, e);
                return;
            }
            Err(_) => {
                error!("ws.connect_timeout url={} timeout={:?}", url, config.connect_timeout);
                return;
            }
        },
    };
    debug!("ws.open url={}", url);

    let mut decode_failures = 0usize;
    let reason = loop {
        let step = tokio::select! {
            biased;
            _ = &mut stop => Step::Stop,
            _ = events.closed() => Step::ConsumerGone,
            frame = ws.next() => Step::Frame(frame),
        };

        let payload = match step {
            Step::Stop => break "stopped",
            Step::ConsumerGone => break "consumer dropped",
            Step::Frame(Some(Ok(WsMsg::Text(text)))) => text.into_bytes(),
            Step::Frame(Some(Ok(WsMsg::Binary(data)))) => data,
            Step::Frame(Some(Ok(WsMsg::Ping(data)))) => {
                if let Err(e) = ws.send(WsMsg::Pong(data)).await {
                    warn!("ws.pong_failed url={} error={}", url, e);
                    break "pong failed";
                }
                continue;
            }
            Step::Frame(Some(Ok(WsMsg::Close(frame)))) => {
                warn!("ws.closed_by_peer url={} frame={:?}", url, frame);
                break "closed by peer";
            }
            Step::Frame(Some(Ok(_))) => continue,
            Step::Frame(Some(Err(e))) => {
                error!("ws.read_failed url={} error={}", url, e);
                break "read failed";
            }
            Step::Frame(None) => break "connection ended",
        };

        match serde_json::from_slice::<T>(&payload) {
            Ok(event) => {
                decode_failures = 0;
                let pushed = tokio::select! {
                    biased;
                    _ = &mut stop => None,
                    sent = events.send(event) => Some(sent.is_ok()),
                };
                match pushed {
                    None => break "stopped",
                    Some(false) => break "consumer dropped",
                    Some(true) => {}
                }
            }
            Err(e) => {
                decode_failures += 1;
                let shown = &payload[..payload.len().min(FRAME_LOG_LIMIT)];
                warn!(
                    "ws.decode_failed url={} consecutive={} error={} frame={}",
                    url,
                    decode_failures,
                    e,
                    String::from_utf8_lossy(shown)
                );
                if config
                    .max_consecutive_decode_failures
                    .is_some_and(|max| decode_failures >= max)
                {
                    error!(
                        "ws.decode_failure_limit url={} failures={}",
                        url, decode_failures
                    );
                    break "decode failure limit";
                }
            }
        }
    };

    shutdown(&mut ws, config.close_timeout).await;
    debug!("ws.closed url={} reason={}", url, reason);
}

/// Send a close frame, then let the socket drop.
async fn shutdown(ws: &mut WsConnection, close_timeout: Duration) {
    match tokio::time::timeout(close_timeout, ws.close(None)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("ws.close_frame_failed error={}", e),
        Err(_) => debug!("ws.close_frame_timeout timeout={:?}", close_timeout),
    }
}
