//! Per-connection lifecycle: register, pump the delivery queue into the
//! socket, watch the peer, and tear down through the registry.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use relay_settings::SubscriberSettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::registry::SubscriberRegistry;
use super::subscriber::Subscriber;

/// Timing knobs for a subscriber connection.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    pub write_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&SubscriberSettings::default())
    }
}

/// `tokio::time::interval` panics on a zero period.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

impl From<&SubscriberSettings> for ConnectionConfig {
    fn from(s: &SubscriberSettings) -> Self {
        Self {
            write_timeout: s.write_timeout(),
            heartbeat_interval: s.heartbeat_interval().max(MIN_HEARTBEAT_INTERVAL),
            client_timeout: s.client_timeout(),
        }
    }
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The viewer closed the socket or the transport failed on read.
    PeerClosed,
    /// The broadcaster removed the subscriber after a delivery failure.
    Evicted,
    /// A socket write returned an error.
    WriteFailed,
    /// A socket write did not finish within the write timeout.
    WriteTimedOut,
    /// No pong or other traffic within the client timeout.
    HeartbeatTimedOut,
    /// The server is shutting down.
    Shutdown,
}

/// Drive one upgraded socket as a subscriber until it closes.
pub async fn serve_subscriber(
    socket: WebSocket,
    registry: Arc<SubscriberRegistry>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) {
    let (handle, rx) = registry.register();
    let subscriber = Arc::clone(handle.subscriber());
    info!(
        subscriber_id = %subscriber.id(),
        subscribers = registry.len(),
        "subscriber connected"
    );

    let (sink, stream) = socket.split();
    let peer_gone = CancellationToken::new();
    let reader = tokio::spawn(read_loop(
        stream,
        Arc::clone(&subscriber),
        peer_gone.clone(),
    ));

    let reason = write_loop(sink, rx, &subscriber, config, &peer_gone, &shutdown).await;
    reader.abort();

    let _ = registry.unregister(&handle);
    subscriber.mark_closed();
    info!(
        subscriber_id = %subscriber.id(),
        ?reason,
        age_secs = subscriber.age().as_secs(),
        delivered = subscriber.delivered_count(),
        "subscriber disconnected"
    );
}

/// Forward queued frames to the socket, ping on the heartbeat interval, and
/// stop on the first of: peer gone, eviction, shutdown, write failure.
pub async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Utf8Bytes>,
    subscriber: &Subscriber,
    config: ConnectionConfig,
    peer_gone: &CancellationToken,
    shutdown: &CancellationToken,
) -> CloseReason
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval(config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL));
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                send_close(&mut sink, close_code::AWAY, "server shutting down", config.write_timeout).await;
                return CloseReason::Shutdown;
            }
            () = subscriber.removed() => {
                send_close(&mut sink, close_code::POLICY, "subscriber dropped", config.write_timeout).await;
                return CloseReason::Evicted;
            }
            () = peer_gone.cancelled() => return CloseReason::PeerClosed,
            frame = rx.recv() => {
                // The registry holds the sender until removal, which also
                // fires `removed()`; a closed queue means we were dropped.
                let Some(frame) = frame else {
                    return CloseReason::Evicted;
                };
                if let Err(reason) = send_bounded(&mut sink, Message::Text(frame), subscriber, config.write_timeout).await {
                    return reason;
                }
            }
            _ = ping.tick() => {
                if subscriber.idle_for() > config.client_timeout {
                    warn!(subscriber_id = %subscriber.id(), "heartbeat timed out");
                    return CloseReason::HeartbeatTimedOut;
                }
                if let Err(reason) = send_bounded(&mut sink, Message::Ping(Bytes::new()), subscriber, config.write_timeout).await {
                    return reason;
                }
                trace!(subscriber_id = %subscriber.id(), "sent ping");
            }
        }
    }
}

async fn send_bounded<S>(
    sink: &mut S,
    message: Message,
    subscriber: &Subscriber,
    write_timeout: Duration,
) -> Result<(), CloseReason>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(subscriber_id = %subscriber.id(), error = %e, "socket write failed");
            Err(CloseReason::WriteFailed)
        }
        Err(_) => {
            warn!(
                subscriber_id = %subscriber.id(),
                timeout_ms = write_timeout.as_millis(),
                "socket write timed out"
            );
            Err(CloseReason::WriteTimedOut)
        }
    }
}

async fn send_close<S>(sink: &mut S, code: u16, reason: &'static str, write_timeout: Duration)
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(Some(frame)))).await;
}

/// Consume inbound frames. Any traffic counts as liveness; text and binary
/// frames are otherwise ignored. Cancels `peer_gone` on exit.
pub async fn read_loop<R, E>(mut stream: R, subscriber: Arc<Subscriber>, peer_gone: CancellationToken)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let _guard = peer_gone.drop_guard();
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_) | Message::Binary(_)) => {
                subscriber.mark_alive();
                trace!(subscriber_id = %subscriber.id(), "ignoring inbound frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => subscriber.mark_alive(),
            Err(e) => {
                debug!(subscriber_id = %subscriber.id(), error = %e, "socket read failed");
                break;
            }
        }
    }
}
