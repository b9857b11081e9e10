pub mod client;
pub mod hub;
pub mod pump;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
