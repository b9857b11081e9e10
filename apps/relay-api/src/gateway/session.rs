//! Per-connection session abstraction and its protocol state machine.

use std::sync::Arc;

use relay_common::packets::Msg;

use super::room::Room;

/// A connected participant as seen by the hub and by its peers.
///
/// Implementations are transport specific. The hub only ever talks to
/// sessions through this trait.
pub trait ClientSession: Send + Sync {
    /// Hub-assigned id. `0` until [`initialize`](Self::initialize) ran.
    fn id(&self) -> u64;
    /// Authenticated account id.
    fn user_id(&self) -> &str;
    fn username(&self) -> &str;
    /// The room this session joined (or is joining).
    fn room(&self) -> &Arc<Room>;

    fn room_id(&self) -> u64 {
        self.room().id
    }

    /// Run admission: bind `id`, enter [`ClientState::Connected`], evict other
    /// sessions of the same account, announce, catch up and replay.
    ///
    /// Called exactly once, by the hub, right after the session was added to
    /// its room.
    fn initialize(&self, id: u64);

    fn state(&self) -> ClientState;
    fn set_state(&self, state: ClientState);

    /// Route a payload according to the current state.
    fn process_message(&self, sender_id: u64, room_id: u64, msg: Msg) {
        self.state().handle_message(self, sender_id, room_id, msg);
    }

    /// Queue a payload for this session's own socket, sent as itself.
    fn socket_send(&self, msg: Msg) {
        self.socket_send_as(msg, self.id(), self.room_id());
    }

    /// Queue a payload for this session's own socket on behalf of `sender_id`.
    /// Never blocks: the payload is dropped when the queue is full.
    fn socket_send_as(&self, msg: Msg, sender_id: u64, room_id: u64);

    /// Hand a payload straight to one peer of the same room, bypassing the hub.
    fn pass_to_peer(&self, msg: Msg, peer_id: u64) {
        if let Some(peer) = self.room().clients.get(peer_id) {
            peer.process_message(self.id(), self.room_id(), msg);
        }
    }

    /// Ask the hub to deliver a payload to every other member of `room_id`.
    /// Never blocks: the payload is dropped when the hub queue is full.
    fn broadcast(&self, msg: Msg, room_id: u64);

    /// Tear the session down. Safe to call any number of times from any task.
    fn close(&self, reason: &str);
}

// ---------------------------------------------------------------------------
// Protocol states
// ---------------------------------------------------------------------------

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed, not yet admitted by the hub.
    Uninitialized,
    Connected(ConnectedState),
    Closed,
}

impl ClientState {
    pub fn name(&self) -> &'static str {
        match self {
            ClientState::Uninitialized => "Uninitialized",
            ClientState::Connected(_) => "Connected",
            ClientState::Closed => "Closed",
        }
    }

    pub fn on_enter<S: ClientSession + ?Sized>(&self, session: &S) {
        if let ClientState::Connected(state) = self {
            state.on_enter(session);
        }
    }

    pub fn on_exit<S: ClientSession + ?Sized>(&self, _session: &S) {}

    pub fn handle_message<S: ClientSession + ?Sized>(
        &self,
        session: &S,
        sender_id: u64,
        room_id: u64,
        msg: Msg,
    ) {
        match self {
            ClientState::Connected(state) => state.handle_message(session, sender_id, room_id, msg),
            ClientState::Uninitialized | ClientState::Closed => {
                tracing::trace!(
                    session_id = session.id(),
                    sender_id,
                    state = self.name(),
                    kind = msg.kind(),
                    "dropping message for inactive session"
                );
            }
        }
    }
}

/// State of a session admitted to a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectedState;

impl ConnectedState {
    /// Tell the client who it is and where it landed.
    fn on_enter<S: ClientSession + ?Sized>(&self, session: &S) {
        session.socket_send(Msg::id(
            session.id(),
            session.username(),
            session.room().descriptor(),
        ));
    }

    fn handle_message<S: ClientSession + ?Sized>(
        &self,
        session: &S,
        sender_id: u64,
        room_id: u64,
        msg: Msg,
    ) {
        if sender_id == session.id() {
            // Our own client sent this: everyone else in the room gets it.
            session.broadcast(msg, room_id);
        } else {
            // A peer or the hub fan-out: forward to our own client.
            session.socket_send_as(msg, sender_id, room_id);
        }
    }
}
