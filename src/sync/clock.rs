// ABOUTME: Clock synchronization implementation
// ABOUTME: Calculates RTT and converts server loop time to local Instant

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Clock synchronization quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncQuality {
    /// Good synchronization (RTT < 50ms)
    Good,
    /// Degraded synchronization (RTT 50-100ms)
    Degraded,
    /// Lost synchronization (RTT > 100ms or no sync)
    Lost,
}

/// Clock synchronization state
#[derive(Debug)]
pub struct ClockSync {
    /// Last known RTT in microseconds
    rtt_micros: Option<i64>,

    /// When server loop started in Unix time (microseconds)
    server_loop_start_unix: Option<i64>,

    /// When we computed this (for staleness detection)
    last_update: Option<Instant>,

    /// Whether we've successfully synced once
    synced: bool,
}

impl ClockSync {
    /// Create a new clock synchronization instance
    pub fn new() -> Self {
        Self {
            rtt_micros: None,
            server_loop_start_unix: None,
            last_update: None,
            synced: false,
        }
    }

    /// Update clock sync with new measurement
    /// t1 = client_transmitted (Unix µs)
    /// t2 = server_received (server loop µs)
    /// t3 = server_transmitted (server loop µs)
    /// t4 = client_received (Unix µs)
    pub fn update(&mut self, t1: i64, t2: i64, t3: i64, t4: i64) {
        // RTT = (t4 - t1) - (t3 - t2)
        let rtt = (t4 - t1) - (t3 - t2);
        self.rtt_micros = Some(rtt);

        // Discard samples with high RTT (network congestion)
        if rtt > 100_000 {
            // 100ms
            log::warn!("Discarding sync sample: high RTT {}µs", rtt);
            return;
        }

        // On first successful sync, compute when the server loop started in Unix µs
        // Per Go reference: ONLY calculate this once, never update it again!
        // The server loop started at a specific moment in time - that never changes.
        if !self.synced {
            let now_unix = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_micros() as i64;

            self.server_loop_start_unix = Some(now_unix - t2);
            self.synced = true;

            log::info!(
                "Clock sync established: t1={}, t2={}, t3={}, t4={}, rtt={}µs, now_unix={}, serverLoopStart={}",
                t1, t2, t3, t4, rtt, now_unix,
                self.server_loop_start_unix.unwrap()
            );
        }

        self.last_update = Some(Instant::now());
    }

    /// Get current RTT in microseconds
    pub fn rtt_micros(&self) -> Option<i64> {
        self.rtt_micros
    }

    /// Convert server loop microseconds to local Instant
    pub fn server_to_local_instant(&self, server_micros: i64) -> Option<Instant> {
        let server_start = self.server_loop_start_unix?;

        // Convert to Unix microseconds
        let unix_micros = server_start + server_micros;

        // Convert to Instant
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_micros() as i64;

        let now_instant = Instant::now();

        let delta_micros = unix_micros - now_unix;

        if delta_micros >= 0 {
            Some(now_instant + Duration::from_micros(delta_micros as u64))
        } else {
            now_instant.checked_sub(Duration::from_micros((-delta_micros) as u64))
        }
    }

    /// Get sync quality based on RTT
    pub fn quality(&self) -> SyncQuality {
        match self.rtt_micros {
            Some(rtt) if rtt < 50_000 => SyncQuality::Good,
            Some(rtt) if rtt < 100_000 => SyncQuality::Degraded,
            _ => SyncQuality::Lost,
        }
    }

    /// Check if sync is stale (>5 seconds old)
    pub fn is_stale(&self) -> bool {
        match self.last_update {
            Some(last) => last.elapsed() > Duration::from_secs(5),
            None => true,
        }
    }

    /// Whether we've ever successfully synced.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Convert a server-clock instant to client (loop) time, in Unix
    /// microseconds. Returns `None` until the first successful sync.
    pub fn server_to_client_us(&self, server_us: i64) -> Option<i64> {
        self.server_loop_start_unix.map(|start| start + server_us)
    }

    /// Convert a client (loop) instant to server time, in microseconds.
    /// Returns `None` until the first successful sync.
    pub fn client_to_server_us(&self, client_us: i64) -> Option<i64> {
        self.server_loop_start_unix.map(|start| client_us - start)
    }
}

/// Current client (loop) time, in Unix microseconds.
///
/// The player core treats this as its monotonic "loop" clock: on this
/// platform wall-clock and monotonic time agree closely enough over the
/// lifetime of a stream, and using Unix time keeps it directly comparable
/// with the handshake timestamps in `sync::clock`.
pub fn now_client_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// Build the pair of time-conversion closures the player core consumes:
/// `server_to_client` and `client_to_server`, both in microseconds.
///
/// Before the first successful sync there is no affine mapping yet, so the
/// fallback treats the two clocks as identical, i.e. schedule against the
/// current loop time rather than blocking or panicking.
pub fn conversions(
    clock: Arc<Mutex<ClockSync>>,
) -> (
    Arc<dyn Fn(i64) -> i64 + Send + Sync>,
    Arc<dyn Fn(i64) -> i64 + Send + Sync>,
) {
    let server_to_client = {
        let clock = Arc::clone(&clock);
        Arc::new(move |server_us: i64| -> i64 {
            clock
                .lock()
                .unwrap()
                .server_to_client_us(server_us)
                .unwrap_or(server_us)
        })
    };

    let client_to_server = Arc::new(move |client_us: i64| -> i64 {
        clock
            .lock()
            .unwrap()
            .client_to_server_us(client_us)
            .unwrap_or(client_us)
    });

    (server_to_client, client_to_server)
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}
