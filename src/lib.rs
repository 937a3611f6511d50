// ABOUTME: sendspin - Sendspin protocol client and time-synchronized PCM player
// ABOUTME: see player::Player for the core; protocol::client for the network layer

pub mod audio;
pub mod error;
pub mod player;
pub mod protocol;
pub mod sync;

pub use error::Error;
pub use player::Player;
