//! Protobuf wire schema shared by the relay server and its clients.
//!
//! Two envelopes exist:
//! - [`Packet`] travels over the WebSocket, one packet per binary frame.
//! - [`Message`] is the body of every HTTP request and response.

use chrono::{DateTime, TimeZone, Utc};

// ---------------------------------------------------------------------------
// Socket envelope
// ---------------------------------------------------------------------------

/// A frame exchanged over the WebSocket.
///
/// `sender_id` and `room_id` are server-authoritative: whatever a client puts
/// there is overwritten on receipt.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    #[prost(uint64, tag = "1")]
    pub sender_id: u64,
    #[prost(uint64, tag = "2")]
    pub room_id: u64,
    #[prost(oneof = "packet::Msg", tags = "3, 4, 5, 6, 7, 8")]
    pub msg: Option<packet::Msg>,
}

pub mod packet {
    /// Payload carried by a [`super::Packet`].
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "3")]
        Chat(super::ChatMessage),
        #[prost(message, tag = "4")]
        Id(super::IdMessage),
        #[prost(message, tag = "5")]
        Register(super::RegisterMessage),
        #[prost(message, tag = "6")]
        Unregister(super::UnregisterMessage),
        #[prost(message, tag = "7")]
        OkResponse(super::OkResponseMessage),
        #[prost(message, tag = "8")]
        DenyResponse(super::DenyResponseMessage),
    }
}

pub use packet::Msg;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatMessage {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<::prost_types::Timestamp>,
    #[prost(string, tag = "2")]
    pub sender_username: String,
    #[prost(string, tag = "3")]
    pub msg: String,
}

/// Sent once to a freshly admitted session: its id and the room it joined.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdMessage {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(message, optional, tag = "3")]
    pub room: Option<RoomDescriptor>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomDescriptor {
    #[prost(uint64, tag = "1")]
    pub room_id: u64,
    #[prost(string, tag = "2")]
    pub owner_id: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterMessage {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub username: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnregisterMessage {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OkResponseMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DenyResponseMessage {
    #[prost(string, tag = "1")]
    pub reason: String,
}

// ---------------------------------------------------------------------------
// HTTP envelope
// ---------------------------------------------------------------------------

/// Body of every HTTP request and successful response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(oneof = "message::Type", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub r#type: Option<message::Type>,
}

pub mod message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Login(super::LoginRequestMessage),
        #[prost(message, tag = "2")]
        Register(super::RegisterRequestMessage),
        #[prost(message, tag = "3")]
        Refresh(super::RefreshRequestMessage),
        #[prost(message, tag = "4")]
        Logout(super::LogoutRequestMessage),
        #[prost(message, tag = "5")]
        RoomsRequest(super::RoomsRequestMessage),
        #[prost(message, tag = "6")]
        NewRoom(super::NewRoomRequestMessage),
        #[prost(message, tag = "7")]
        OkResponse(super::OkResponseMessage),
        #[prost(message, tag = "8")]
        DenyResponse(super::DenyResponseMessage),
        #[prost(message, tag = "9")]
        Jwt(super::JwtMessage),
        #[prost(message, tag = "10")]
        RoomsResponse(super::RoomsResponseMessage),
        #[prost(message, tag = "11")]
        NewRoomResponse(super::NewRoomResponseMessage),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRequestMessage {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterRequestMessage {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RefreshRequestMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogoutRequestMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomsRequestMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NewRoomRequestMessage {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JwtMessage {
    #[prost(string, tag = "1")]
    pub access_token: String,
    #[prost(string, tag = "2")]
    pub refresh_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NewRoomResponseMessage {
    #[prost(uint64, tag = "1")]
    pub room_id: u64,
    #[prost(string, tag = "2")]
    pub owner_id: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomsResponseMessage {
    #[prost(message, repeated, tag = "1")]
    pub rooms: Vec<NewRoomResponseMessage>,
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl Msg {
    pub fn chat(sender_username: &str, text: &str, at: DateTime<Utc>) -> Self {
        Msg::Chat(ChatMessage {
            timestamp: Some(to_timestamp(at)),
            sender_username: sender_username.to_string(),
            msg: text.to_string(),
        })
    }

    pub fn id(id: u64, username: &str, room: RoomDescriptor) -> Self {
        Msg::Id(IdMessage {
            id,
            username: username.to_string(),
            room: Some(room),
        })
    }

    pub fn register(id: u64, username: &str) -> Self {
        Msg::Register(RegisterMessage {
            id,
            username: username.to_string(),
        })
    }

    pub fn unregister(id: u64) -> Self {
        Msg::Unregister(UnregisterMessage { id })
    }

    pub fn ok() -> Self {
        Msg::OkResponse(OkResponseMessage {})
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Msg::DenyResponse(DenyResponseMessage {
            reason: reason.into(),
        })
    }

    /// Short variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Chat(_) => "chat",
            Msg::Id(_) => "id",
            Msg::Register(_) => "register",
            Msg::Unregister(_) => "unregister",
            Msg::OkResponse(_) => "ok_response",
            Msg::DenyResponse(_) => "deny_response",
        }
    }
}

impl Packet {
    pub fn new(sender_id: u64, room_id: u64, msg: Msg) -> Self {
        Self {
            sender_id,
            room_id,
            msg: Some(msg),
        }
    }
}

impl Message {
    pub fn ok() -> Self {
        Self {
            r#type: Some(message::Type::OkResponse(OkResponseMessage {})),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            r#type: Some(message::Type::DenyResponse(DenyResponseMessage {
                reason: reason.into(),
            })),
        }
    }

    pub fn jwt(access_token: String, refresh_token: String) -> Self {
        Self {
            r#type: Some(message::Type::Jwt(JwtMessage {
                access_token,
                refresh_token,
            })),
        }
    }

    pub fn rooms(rooms: Vec<NewRoomResponseMessage>) -> Self {
        Self {
            r#type: Some(message::Type::RoomsResponse(RoomsResponseMessage { rooms })),
        }
    }

    pub fn new_room(room: NewRoomResponseMessage) -> Self {
        Self {
            r#type: Some(message::Type::NewRoomResponse(room)),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub fn to_timestamp(at: DateTime<Utc>) -> ::prost_types::Timestamp {
    ::prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Convert a wire timestamp back to UTC. Returns `None` for out-of-range values.
pub fn from_timestamp(ts: &::prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    Utc.timestamp_opt(ts.seconds, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn packet_survives_the_wire() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let packet = Packet::new(7, 2, Msg::chat("alice", "hi", at));

        let bytes = packet.encode_to_vec();
        let decoded = Packet::decode(bytes.as_slice()).unwrap();

        assert_eq!(decoded.sender_id, 7);
        assert_eq!(decoded.room_id, 2);
        match decoded.msg {
            Some(Msg::Chat(chat)) => {
                assert_eq!(chat.msg, "hi");
                assert_eq!(chat.sender_username, "alice");
                assert_eq!(from_timestamp(&chat.timestamp.unwrap()), Some(at));
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn empty_payload_decodes_as_none() {
        let bytes = Packet {
            sender_id: 1,
            room_id: 1,
            msg: None,
        }
        .encode_to_vec();
        assert!(Packet::decode(bytes.as_slice()).unwrap().msg.is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Packet::decode(&[0xff, 0xff, 0xff][..]).is_err());
    }

    #[test]
    fn negative_nanos_are_out_of_range() {
        let ts = ::prost_types::Timestamp {
            seconds: 0,
            nanos: -1,
        };
        assert!(from_timestamp(&ts).is_none());
    }

    #[test]
    fn kind_names_match_variants() {
        assert_eq!(Msg::unregister(3).kind(), "unregister");
        assert_eq!(Msg::deny("no").kind(), "deny_response");
    }
}
