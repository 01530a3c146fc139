//! An authoritative DNS server library: a bit-exact wire-format
//! codec for RFC 1035 messages with name compression and EDNS(0), a
//! registry of SOA zones, and a UDP/TCP server façade which
//! dispatches queries to a handler.
//!
//! The codec lives in `protocol`: `Message::from_octets` decodes,
//! `Message::to_octets` encodes.  `server::Server` serves a handler
//! over both transports, answering SOA queries and filling in
//! authority sections for the zones registered with it.

pub mod protocol;
pub mod server;
pub mod settings;
pub mod zones;
