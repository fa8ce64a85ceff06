/// WebSocket stream for real-time notifications
///
/// Clients subscribe to channels and follow the durable event log from a
/// cursor:
///
/// - Backpressure: a bounded buffer between the log poller and the socket;
///   a send timeout disconnects slow consumers.
/// - Cursor management: clients resume from any sequence number; omitted
///   cursors start at the current head (live tail only).
/// - Connection health: periodic pings detect dead connections.
///
/// Frames are JSON with a monotonically increasing `seq`. Delivery is
/// at-most-once, best-effort; persistent read/unread state lives in the
/// notification store, not here.
use crate::{
    auth,
    context::AppContext,
    error::HubError,
    notify::{channel, ChannelEvent},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    time::{interval, timeout, Duration},
};

const BUFFER_SIZE: usize = 100;
const POLL_INTERVAL_MS: u64 = 250;
const SEND_TIMEOUT_MS: u64 = 5000;
const PING_INTERVAL_SECS: u64 = 30;
const POLL_BATCH: i64 = 200;

/// Build stream routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/ws/notifications", get(subscribe))
}

/// Request parameters for the notification stream
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Bearer token (WebSocket clients cannot always set headers)
    pub token: String,
    /// Comma-separated channel list, e.g. "corporate,department:3,topic:rust"
    pub channels: Option<String>,
    /// Optional cursor to resume from (sequence number)
    pub cursor: Option<i64>,
}

/// One frame pushed to the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFrame {
    pub seq: i64,
    pub channel: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub time: String,
}

/// WebSocket handler
pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(params): Query<SubscribeParams>,
) -> Result<Response, HubError> {
    let claims = auth::validate_token(&ctx.config.authentication.jwt_secret, &params.token)?;

    // Subscriptions: requested channels plus the caller's personal channel
    let mut channels: Vec<String> = params
        .channels
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    channels.push(channel::employee(&claims.sub));
    channels.sort();
    channels.dedup();

    let cursor = params.cursor;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, ctx, channels, cursor)))
}

async fn handle_socket(
    socket: WebSocket,
    ctx: AppContext,
    channels: Vec<String>,
    cursor: Option<i64>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ChannelEvent>(BUFFER_SIZE);

    // Producer: poll the event log past the cursor and feed the buffer
    let producer_ctx = ctx.clone();
    let producer_channels = channels.clone();
    let producer = tokio::spawn(async move {
        let mut cursor = match cursor {
            Some(c) => c,
            // No cursor: live tail from the current head
            None => match producer_ctx.events.current_seq().await {
                Ok(seq) => seq.unwrap_or(0),
                Err(e) => {
                    tracing::warn!(error = %e, "stream producer failed to read head");
                    return;
                }
            },
        };

        let mut poll = interval(Duration::from_millis(POLL_INTERVAL_MS));
        loop {
            poll.tick().await;

            let events = match producer_ctx
                .events
                .events_after(cursor, &producer_channels, POLL_BATCH)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, "stream producer poll failed");
                    continue;
                }
            };

            for event in events {
                cursor = cursor.max(event.seq);
                // Buffer full for too long means the consumer is gone or
                // hopelessly slow; stop producing.
                if tx
                    .send_timeout(event, Duration::from_millis(SEND_TIMEOUT_MS))
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    });

    // Consumer: drain the buffer into the socket, ping periodically
    let mut ping = interval(Duration::from_secs(PING_INTERVAL_SECS));
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let frame = StreamFrame {
                    seq: event.seq,
                    channel: event.channel,
                    event_type: event.event_type,
                    payload: serde_json::to_value(&event.payload).unwrap_or_default(),
                    time: event.time,
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode stream frame");
                        continue;
                    }
                };
                let send = timeout(
                    Duration::from_millis(SEND_TIMEOUT_MS),
                    sender.send(Message::Text(text)),
                )
                .await;
                match send {
                    Ok(Ok(_)) => {}
                    _ => break, // slow or dead consumer
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Pongs and client text are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    producer.abort();
}
