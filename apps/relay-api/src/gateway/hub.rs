//! The hub: single task that owns room membership.
//!
//! Every membership change and every room-scoped broadcast goes through one
//! of three bounded channels and is handled by [`Hub::run`], one event at a
//! time. Connections talk to it through a cloneable [`HubHandle`].

use std::sync::Arc;

use relay_common::packets::{Msg, Packet};
use tokio::sync::{mpsc, oneshot, watch};

use super::room::RoomCatalog;
use super::session::ClientSession;

/// Capacity of the hub broadcast channel.
pub const BROADCAST_QUEUE: usize = 256;
/// Capacity of the unregister channel.
pub const UNREGISTER_QUEUE: usize = 256;
const REGISTER_QUEUE: usize = 64;

/// A session asking to be admitted to its room.
struct Registration {
    session: Arc<dyn ClientSession>,
    admitted: oneshot::Sender<u64>,
}

/// A session leaving its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub room_id: u64,
    pub session_id: u64,
}

/// Cheap, cloneable access to a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Departure>,
    broadcast_tx: mpsc::Sender<Packet>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    rooms: Arc<RoomCatalog>,
}

impl HubHandle {
    /// The room catalog. Rooms may be created from any task.
    pub fn rooms(&self) -> &Arc<RoomCatalog> {
        &self.rooms
    }

    /// Hand `session` to the hub and wait until admission finished.
    ///
    /// Returns the assigned session id, or `None` when the hub is gone or the
    /// session's room does not exist.
    pub async fn register(&self, session: Arc<dyn ClientSession>) -> Option<u64> {
        let (admitted, ack) = oneshot::channel();
        self.register_tx
            .send(Registration { session, admitted })
            .await
            .ok()?;
        ack.await.ok()
    }

    /// Ask the hub to remove a session. Never blocks; returns `false` when
    /// the request was dropped.
    pub fn unregister(&self, departure: Departure) -> bool {
        match self.unregister_tx.try_send(departure) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = departure.session_id,
                    room_id = departure.room_id,
                    "unregister queue full, dropping request"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a packet for delivery to every member of `packet.room_id` except
    /// its sender. Never blocks; returns `false` when the packet was dropped.
    pub fn broadcast(&self, packet: Packet) -> bool {
        try_broadcast(&self.broadcast_tx, packet)
    }

    /// Stop the hub loop after the event it is currently handling.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

fn try_broadcast(tx: &mpsc::Sender<Packet>, packet: Packet) -> bool {
    match tx.try_send(packet) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(packet)) => {
            tracing::warn!(
                sender_id = packet.sender_id,
                room_id = packet.room_id,
                "broadcast queue full, dropping packet"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

pub struct Hub {
    rooms: Arc<RoomCatalog>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Departure>,
    broadcast_rx: mpsc::Receiver<Packet>,
    /// Used to announce departures to the remaining members.
    broadcast_tx: mpsc::Sender<Packet>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    pub fn new() -> (Hub, HubHandle) {
        let rooms = Arc::new(RoomCatalog::new());
        let (register_tx, register_rx) = mpsc::channel(REGISTER_QUEUE);
        let (unregister_tx, unregister_rx) = mpsc::channel(UNREGISTER_QUEUE);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let hub = Hub {
            rooms: rooms.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            broadcast_tx: broadcast_tx.clone(),
            shutdown_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            rooms,
        };
        (hub, handle)
    }

    /// Drive the loop until [`HubHandle::shutdown`] is called or every handle
    /// was dropped.
    pub async fn run(mut self) {
        tracing::info!("hub started");
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(registration) = self.register_rx.recv() => self.handle_register(registration),
                Some(departure) = self.unregister_rx.recv() => self.handle_unregister(departure),
                Some(packet) = self.broadcast_rx.recv() => self.handle_broadcast(packet),
                else => break,
            }
        }
        tracing::info!("hub stopped");
    }

    fn handle_register(&self, registration: Registration) {
        let Registration { session, admitted } = registration;
        let Some(room) = self.rooms.get(session.room_id()) else {
            tracing::warn!(room_id = session.room_id(), "register for unknown room");
            return;
        };

        let pruned = room.replay.prune_expired();
        if pruned > 0 {
            tracing::debug!(room_id = room.id, pruned, "pruned replay buffer");
        }

        let id = room.clients.add(session.clone());
        session.initialize(id);
        // The connection may have given up waiting; admission stands regardless.
        let _ = admitted.send(id);
    }

    fn handle_unregister(&self, departure: Departure) {
        if departure.session_id == 0 {
            return;
        }
        let Some(room) = self.rooms.get(departure.room_id) else {
            return;
        };
        if room.clients.get(departure.session_id).is_none() {
            return;
        }

        try_broadcast(
            &self.broadcast_tx,
            Packet::new(
                departure.session_id,
                departure.room_id,
                Msg::unregister(departure.session_id),
            ),
        );
        room.clients.remove(departure.session_id);
        tracing::info!(
            session_id = departure.session_id,
            room_id = departure.room_id,
            "session left room"
        );
    }

    fn handle_broadcast(&self, packet: Packet) {
        let Some(room) = self.rooms.get(packet.room_id) else {
            return;
        };
        let Some(msg) = packet.msg else {
            return;
        };
        room.clients.for_each(|id, member| {
            if id != packet.sender_id {
                member.process_message(packet.sender_id, packet.room_id, msg.clone());
            }
        });
    }
}
