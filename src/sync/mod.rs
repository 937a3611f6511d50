// ABOUTME: Clock synchronization collaborator
// ABOUTME: Produces the server<->client time-conversion functions the player core consumes

pub mod clock;

pub use clock::{conversions, now_client_us, ClockSync, SyncQuality};
