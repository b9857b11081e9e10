//! Socket-backed [`ClientSession`].
//!
//! The session itself never touches the socket: it owns the sending half of
//! the outbound queue and a close signal. The pumps in
//! [`super::pump`] own the socket halves.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relay_common::packets::{Msg, Packet};
use tokio::sync::{mpsc, watch};

use super::hub::{Departure, HubHandle};
use super::room::Room;
use super::session::{ClientSession, ClientState, ConnectedState};

/// Capacity of each session's outbound queue.
pub const OUTBOUND_QUEUE: usize = 256;

/// Reason given when a newer connection of the same account takes over.
pub const DUPLICATE_SESSION_REASON: &str = "Another connection was found";

pub struct SocketSession {
    id: AtomicU64,
    user_id: String,
    username: String,
    room: Arc<Room>,
    hub: HubHandle,
    /// `None` once closed. Dropping the sender ends the write pump.
    outbound: Mutex<Option<mpsc::Sender<Packet>>>,
    state: Mutex<ClientState>,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl SocketSession {
    /// Build an unadmitted session and the receiving end of its outbound queue.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        room: Arc<Room>,
        hub: HubHandle,
    ) -> (Arc<Self>, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (close_tx, _) = watch::channel(false);
        let session = Arc::new(Self {
            id: AtomicU64::new(0),
            user_id: user_id.into(),
            username: username.into(),
            room,
            hub,
            outbound: Mutex::new(Some(tx)),
            state: Mutex::new(ClientState::Uninitialized),
            closed: AtomicBool::new(false),
            close_tx,
        });
        (session, rx)
    }

    /// Resolves to `true` once [`close`](ClientSession::close) ran.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ClientSession for SocketSession {
    fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn room(&self) -> &Arc<Room> {
        &self.room
    }

    fn initialize(&self, id: u64) {
        self.id.store(id, Ordering::Release);
        let room_id = self.room.id;
        tracing::info!(
            session_id = id,
            room_id,
            user_id = %self.user_id,
            username = %self.username,
            "session admitted"
        );

        self.set_state(ClientState::Connected(ConnectedState));

        self.room.clients.for_each(|peer_id, peer| {
            if peer_id != id && peer.user_id() == self.user_id {
                tracing::warn!(
                    session_id = peer_id,
                    room_id,
                    user_id = %self.user_id,
                    replaced_by = id,
                    "evicting duplicate session"
                );
                peer.close(DUPLICATE_SESSION_REASON);
            }
        });

        self.broadcast(Msg::register(id, &self.username), room_id);

        self.room.clients.for_each(|peer_id, peer| {
            if peer_id == id || peer.state() == ClientState::Closed {
                return;
            }
            peer.pass_to_peer(Msg::register(peer_id, peer.username()), id);
        });

        for entry in self.room.replay.replay_ordered() {
            self.socket_send_as(Msg::Chat(entry.chat), entry.sender_id, room_id);
        }
    }

    fn state(&self) -> ClientState {
        *self.state.lock()
    }

    fn set_state(&self, state: ClientState) {
        let previous = {
            let mut slot = self.state.lock();
            std::mem::replace(&mut *slot, state)
        };
        previous.on_exit(self);
        state.on_enter(self);
    }

    fn socket_send_as(&self, msg: Msg, sender_id: u64, room_id: u64) {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            tracing::trace!(session_id = self.id(), "outbound queue closed, dropping packet");
            return;
        };
        match tx.try_send(Packet::new(sender_id, room_id, msg)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(packet)) => {
                tracing::warn!(
                    session_id = self.id(),
                    sender_id,
                    kind = packet.msg.as_ref().map(Msg::kind).unwrap_or("none"),
                    "outbound queue full, dropping packet"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!(session_id = self.id(), "write pump gone, dropping packet");
            }
        }
    }

    fn broadcast(&self, msg: Msg, room_id: u64) {
        self.hub.broadcast(Packet::new(self.id(), room_id, msg));
    }

    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let id = self.id();
        tracing::info!(session_id = id, room_id = self.room.id, reason, "closing session");

        self.set_state(ClientState::Closed);
        self.close_tx.send_replace(true);
        self.hub.unregister(Departure {
            room_id: self.room.id,
            session_id: id,
        });
        self.outbound.lock().take();
    }
}
