// ABOUTME: Sendspin wire protocol
// ABOUTME: WebSocket handshake, JSON control messages, and binary chunk framing

pub mod client;
pub mod messages;
