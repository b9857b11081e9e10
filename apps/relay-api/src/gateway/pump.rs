//! Read and write pumps: the two tasks that move frames between a socket and
//! a [`SocketSession`].
//!
//! Both are generic over the frame stream/sink so they can be driven by an
//! axum `WebSocket` split in production and by in-memory streams in tests.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use prost::Message as _;
use relay_common::packets::{to_timestamp, Msg, Packet};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use super::client::SocketSession;
use super::room::ReplayEntry;
use super::session::ClientSession;

/// Normal closure.
const CLOSE_NORMAL: u16 = 1000;
/// Upper bound on a single frame write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Upper bound on the final flush and close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Keepalive period for a given pong wait: 9/10 of it.
pub fn ping_period(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}

/// Read frames until the socket ends, errors, goes idle for `pong_wait`, or
/// the session is closed elsewhere. Always closes the session on exit.
pub async fn read_pump<S, E>(session: Arc<SocketSession>, mut frames: S, pong_wait: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut closed = session.closed_signal();
    let mut deadline = Instant::now() + pong_wait;

    let reason = loop {
        let frame = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break "closed",
            _ = time::sleep_until(deadline) => break "read deadline exceeded",
            frame = frames.next() => frame,
        };

        match frame {
            None => break "connection closed",
            Some(Err(err)) => {
                tracing::debug!(session_id = session.id(), %err, "websocket read error");
                break "read error";
            }
            Some(Ok(Message::Binary(bytes))) => handle_frame(&session, &bytes),
            Some(Ok(Message::Pong(_))) => deadline = Instant::now() + pong_wait,
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Text(_))) => {
                tracing::debug!(session_id = session.id(), "text frame ignored, expected binary");
            }
            Some(Ok(Message::Close(_))) => break "client closed",
        }
    };

    tracing::debug!(session_id = session.id(), reason, "read pump exited");
    session.close(reason);
}

/// Decode one binary frame and hand it to the session.
fn handle_frame(session: &SocketSession, bytes: &[u8]) {
    let packet = match Packet::decode(bytes) {
        Ok(packet) => packet,
        Err(err) => {
            tracing::debug!(session_id = session.id(), %err, "malformed packet");
            return;
        }
    };
    let Some(mut msg) = packet.msg else {
        tracing::debug!(session_id = session.id(), "packet without payload");
        return;
    };

    // Routing fields from the wire are never trusted.
    let sender_id = session.id();
    let room_id = session.room_id();

    if let Msg::Chat(chat) = &mut msg {
        let now = Utc::now();
        chat.timestamp = Some(to_timestamp(now));
        chat.sender_username = session.username().to_string();
        session.room().replay.record(ReplayEntry {
            timestamp: now,
            sender_id,
            sender_username: chat.sender_username.clone(),
            chat: chat.clone(),
        });
    }

    session.process_message(sender_id, room_id, msg);
}

/// Write queued packets as binary frames and ping every
/// [`ping_period`]. Once the session closes, whatever is still queued is
/// flushed and a close frame sent, all within [`CLOSE_GRACE`]. A failed or
/// stalled write closes the session.
///
/// Returning drops `sink`, which releases the socket.
pub async fn write_pump<K>(
    session: Arc<SocketSession>,
    mut outbound: mpsc::Receiver<Packet>,
    mut sink: K,
    pong_wait: Duration,
) where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let period = ping_period(pong_wait);
    let mut keepalive = time::interval_at(Instant::now() + period, period);
    let mut closed = session.closed_signal();

    let reason = loop {
        tokio::select! {
            packet = outbound.recv() => {
                let Some(packet) = packet else {
                    flush_and_close(&session, &mut outbound, &mut sink).await;
                    break "queue closed";
                };
                let frame = Message::Binary(packet.encode_to_vec().into());
                if let Err(reason) = write_frame(&session, &mut sink, frame, &mut closed).await {
                    break reason;
                }
            }
            _ = keepalive.tick() => {
                let ping = Message::Ping(Default::default());
                if let Err(reason) = write_frame(&session, &mut sink, ping, &mut closed).await {
                    break reason;
                }
            }
            _ = until_closed(&mut closed) => {
                flush_and_close(&session, &mut outbound, &mut sink).await;
                break "closed";
            }
        }
    };

    tracing::debug!(session_id = session.id(), reason, "write pump exited");
    session.close("write pump exited");
}

async fn until_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// One write, bounded by [`WRITE_WAIT`] and abandoned if the session closes
/// while the peer is not draining.
async fn write_frame<K>(
    session: &SocketSession,
    sink: &mut K,
    frame: Message,
    closed: &mut watch::Receiver<bool>,
) -> Result<(), &'static str>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    tokio::select! {
        biased;
        sent = time::timeout(WRITE_WAIT, sink.send(frame)) => match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                tracing::debug!(session_id = session.id(), %err, "websocket write error");
                Err("write error")
            }
            Err(_) => {
                tracing::debug!(session_id = session.id(), "websocket write timed out");
                Err("write timed out")
            }
        },
        _ = until_closed(closed) => Err("closed during write"),
    }
}

/// Best-effort drain of the queue followed by a normal close frame.
async fn flush_and_close<K>(session: &SocketSession, outbound: &mut mpsc::Receiver<Packet>, sink: &mut K)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let flushed = time::timeout(CLOSE_GRACE, async {
        while let Ok(packet) = outbound.try_recv() {
            sink.send(Message::Binary(packet.encode_to_vec().into())).await?;
        }
        sink.send(Message::Close(Some(CloseFrame {
            code: CLOSE_NORMAL,
            reason: "".into(),
        })))
        .await
    })
    .await;

    match flushed {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(session_id = session.id(), %err, "connection closed"),
        Err(_) => tracing::debug!(session_id = session.id(), "close handshake timed out"),
    }
}
