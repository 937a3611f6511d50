// ABOUTME: playback-relevant state shared between control and audio threads
// ABOUTME: each field is a machine word, written by control and snapshotted whole by the callback

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// The three-state playback machine driving the output callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Initializing,
    WaitingForStart,
    Playing,
}

impl PlaybackState {
    fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Initializing => 0,
            PlaybackState::WaitingForStart => 1,
            PlaybackState::Playing => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::WaitingForStart,
            2 => PlaybackState::Playing,
            _ => PlaybackState::Initializing,
        }
    }
}

/// Cross-thread playback state. Volume, mute, correction counters and
/// playback state are written by control and read by audio; the audio
/// callback takes one snapshot at entry and uses it throughout. `clear_requested`
/// runs the other way: set by audio on underflow, read-and-cleared by control.
pub struct Shared {
    state: AtomicU8,
    volume: AtomicU32,
    muted: AtomicBool,
    insert_every_n_frames: AtomicU64,
    drop_every_n_frames: AtomicU64,
    clear_requested: AtomicBool,
    /// Scheduled start, in loop (client) microseconds. `i64::MIN` encodes "unset".
    scheduled_start_loop_us: AtomicI64,
    /// Last estimate of current playback position in server time, written by
    /// the audio callback and read by the control thread on the next submit.
    last_known_playback_position_us: AtomicI64,
    early_start_suspect: AtomicBool,
}

const UNSET: i64 = i64::MIN;

impl Shared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Initializing.to_u8()),
            volume: AtomicU32::new(100),
            muted: AtomicBool::new(false),
            insert_every_n_frames: AtomicU64::new(0),
            drop_every_n_frames: AtomicU64::new(0),
            clear_requested: AtomicBool::new(false),
            scheduled_start_loop_us: AtomicI64::new(UNSET),
            last_known_playback_position_us: AtomicI64::new(UNSET),
            early_start_suspect: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed) as u8
    }

    pub fn set_volume(&self, v: u8) {
        self.volume.store(v.min(100) as u32, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, m: bool) {
        self.muted.store(m, Ordering::Relaxed);
    }

    pub fn correction_plan(&self) -> (u64, u64) {
        (
            self.insert_every_n_frames.load(Ordering::Relaxed),
            self.drop_every_n_frames.load(Ordering::Relaxed),
        )
    }

    pub fn set_correction_plan(&self, insert_every_n: u64, drop_every_n: u64) {
        self.insert_every_n_frames.store(insert_every_n, Ordering::Relaxed);
        self.drop_every_n_frames.store(drop_every_n, Ordering::Relaxed);
    }

    /// Set by the audio thread on device underflow/overflow.
    pub fn request_clear(&self) {
        self.clear_requested.store(true, Ordering::Release);
    }

    /// Read-and-clear, called by control at the head of `submit`.
    pub fn take_clear_requested(&self) -> bool {
        self.clear_requested.swap(false, Ordering::AcqRel)
    }

    pub fn scheduled_start_loop_us(&self) -> Option<i64> {
        match self.scheduled_start_loop_us.load(Ordering::Relaxed) {
            UNSET => None,
            v => Some(v),
        }
    }

    pub fn set_scheduled_start_loop_us(&self, v: Option<i64>) {
        self.scheduled_start_loop_us
            .store(v.unwrap_or(UNSET), Ordering::Relaxed);
    }

    pub fn last_known_playback_position_us(&self) -> Option<i64> {
        match self.last_known_playback_position_us.load(Ordering::Relaxed) {
            UNSET => None,
            v => Some(v),
        }
    }

    /// Written by the audio thread, read by control — the one field that
    /// crosses the boundary in the opposite direction from the rest.
    pub fn set_last_known_playback_position_us(&self, v: i64) {
        self.last_known_playback_position_us.store(v, Ordering::Relaxed);
    }

    pub fn early_start_suspect(&self) -> bool {
        self.early_start_suspect.load(Ordering::Relaxed)
    }

    pub fn set_early_start_suspect(&self, v: bool) {
        self.early_start_suspect.store(v, Ordering::Relaxed);
    }

    /// Reset every field to its post-`clear` default, except volume/mute
    /// which survive a `clear` — they are player-façade state, not schedule
    /// state, and are intentionally preserved here.
    pub fn reset_for_clear(&self) {
        self.set_state(PlaybackState::Initializing);
        self.set_correction_plan(0, 0);
        self.clear_requested.store(false, Ordering::Release);
        self.set_scheduled_start_loop_us(None);
        self.last_known_playback_position_us.store(UNSET, Ordering::Relaxed);
        // early_start_suspect is cleared only here, by a full clear; nothing
        // else resets it once submit() sets it.
        self.early_start_suspect.store(false, Ordering::Relaxed);
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unset() {
        let s = Shared::new();
        assert_eq!(s.state(), PlaybackState::Initializing);
        assert_eq!(s.volume(), 100);
        assert!(!s.muted());
        assert_eq!(s.scheduled_start_loop_us(), None);
        assert_eq!(s.last_known_playback_position_us(), None);
    }

    #[test]
    fn clear_requested_round_trips_once() {
        let s = Shared::new();
        assert!(!s.take_clear_requested());
        s.request_clear();
        assert!(s.take_clear_requested());
        assert!(!s.take_clear_requested());
    }

    #[test]
    fn volume_is_clamped() {
        let s = Shared::new();
        s.set_volume(250);
        assert_eq!(s.volume(), 100);
    }

    #[test]
    fn reset_for_clear_restores_defaults_but_preserves_volume() {
        let s = Shared::new();
        s.set_volume(42);
        s.set_state(PlaybackState::Playing);
        s.set_scheduled_start_loop_us(Some(123));
        s.set_correction_plan(0, 10);
        s.reset_for_clear();
        assert_eq!(s.state(), PlaybackState::Initializing);
        assert_eq!(s.scheduled_start_loop_us(), None);
        assert_eq!(s.correction_plan(), (0, 0));
        assert_eq!(s.volume(), 42);
    }
}
