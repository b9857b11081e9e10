pub mod id;
pub mod packets;

pub use packets::{Message, Msg, Packet};
