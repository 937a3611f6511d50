// ABOUTME: Crate-wide error type
// ABOUTME: Typed failures surfaced from protocol, sync and audio output paths

use thiserror::Error;

/// Errors produced by the Sendspin client and player core.
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// Low-level WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Malformed or unexpected protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio output device could not be opened or failed during playback.
    #[error("audio output error: {0}")]
    Output(String),
}
