// ABOUTME: time-synchronized PCM audio player core (C1-C7)
// ABOUTME: public API: set_format, submit, clear, set_volume, stop

pub mod calibration;
pub mod callback;
pub mod correction;
pub mod filter;
pub mod queue;
pub mod state;

use crate::audio::device::resolve_output_device;
use crate::audio::AudioFormat;
use crate::error::Error;
use crate::sync::now_client_us;
use calibration::CalibrationRing;
use cpal::traits::{DeviceTrait, StreamTrait};
use correction::CorrectionScheduler;
use queue::{Chunk, ChunkQueue};
use state::{PlaybackState, Shared};
use std::sync::Arc;
use std::time::Instant;

/// Fixed output block size.
pub const BLOCKSIZE_FRAMES: usize = 2048;

/// A first-chunk schedule closer than this to "now" is treated as
/// suspiciously early.
pub const EARLY_START_THRESHOLD_US: i64 = 700_000;

/// While `WAITING_FOR_START`, the schedule is only overwritten if it moves
/// by more than this much.
pub const START_UPDATE_THRESHOLD_US: i64 = 5_000;

/// Volume curve exponent (cubic).
pub const VOLUME_CURVE_EXPONENT: f64 = 3.0;

type TimeConv = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

/// The time-synchronized PCM player. Owns the output stream and every
/// control-thread-local piece of scheduling state; the audio-thread-visible
/// pieces (queue, calibration ring, shared atomics) are handed to the
/// `cpal` callback as `Arc`s and outlive any individual stream.
pub struct Player {
    format: Option<AudioFormat>,
    device_id: Option<String>,
    server_to_client: TimeConv,
    client_to_server: TimeConv,

    stream: Option<cpal::Stream>,
    stream_started: bool,
    closed: bool,

    queue: Arc<ChunkQueue>,
    calibration: Arc<CalibrationRing>,
    shared: Arc<Shared>,
    correction: CorrectionScheduler,

    expected_next_timestamp_us: Option<i64>,
    first_server_timestamp_us: Option<i64>,
}

impl Player {
    /// Construct a dormant player: no output stream exists until
    /// [`set_format`](Self::set_format) is called. `server_to_client` and
    /// `client_to_server` are the externally supplied time-conversion
    /// callables; they are cheap, non-blocking closures safe to call
    /// from the control thread.
    pub fn new(
        server_to_client: TimeConv,
        client_to_server: TimeConv,
        device_id: Option<String>,
    ) -> Self {
        Self {
            format: None,
            device_id,
            server_to_client,
            client_to_server,
            stream: None,
            stream_started: false,
            closed: false,
            queue: Arc::new(ChunkQueue::new()),
            calibration: Arc::new(CalibrationRing::new()),
            shared: Arc::new(Shared::new()),
            correction: CorrectionScheduler::new(),
            expected_next_timestamp_us: None,
            first_server_timestamp_us: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state() == PlaybackState::Playing
    }

    /// Opens the output stream for a new format. Closes any existing
    /// stream first and resets every piece of first-chunk scheduling state.
    pub fn set_format(&mut self, sample_rate: u32, channels: u8) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }

        self.stream = None;
        self.stream_started = false;

        let format = AudioFormat::new(sample_rate, channels);
        self.queue = Arc::new(ChunkQueue::new());
        self.calibration = Arc::new(CalibrationRing::new());
        self.shared = Arc::new(Shared::new());
        self.correction = CorrectionScheduler::new();
        self.expected_next_timestamp_us = None;
        self.first_server_timestamp_us = None;

        let device = resolve_output_device(self.device_id.as_deref())?;
        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(BLOCKSIZE_FRAMES as u32),
        };

        let data_callback = callback::build_data_callback(
            format,
            BLOCKSIZE_FRAMES,
            Arc::clone(&self.queue),
            Arc::clone(&self.calibration),
            Arc::clone(&self.shared),
            Arc::clone(&self.client_to_server),
        );

        let stream = device
            .build_output_stream(
                &config,
                data_callback,
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        self.format = Some(format);
        self.stream = Some(stream);
        Ok(())
    }

    /// Ingest one chunk from the control thread.
    pub fn submit(&mut self, server_timestamp_us: i64, payload: &[u8]) {
        if self.closed {
            return;
        }

        let format = match self.format {
            Some(f) => f,
            None => {
                log::warn!("submit() before set_format(); dropping chunk");
                return;
            }
        };
        let frame_size = format.frame_size();

        if payload.is_empty() || payload.len() % frame_size != 0 {
            log::warn!(
                "dropping misaligned or empty chunk ({} bytes, frame_size {})",
                payload.len(),
                frame_size
            );
            return;
        }

        if self.shared.take_clear_requested() {
            self.clear();
        }

        let now = now_client_us();

        if self.shared.scheduled_start_loop_us().is_none() {
            let scheduled = (self.server_to_client)(server_timestamp_us);
            self.shared.set_scheduled_start_loop_us(Some(scheduled));
            self.shared.set_state(PlaybackState::WaitingForStart);
            self.first_server_timestamp_us = Some(server_timestamp_us);
            self.queue.set_server_ts_cursor_us(server_timestamp_us);
            if scheduled - now <= EARLY_START_THRESHOLD_US {
                self.shared.set_early_start_suspect(true);
            }
        } else if self.shared.state() == PlaybackState::WaitingForStart {
            if let Some(first_ts) = self.first_server_timestamp_us {
                let recomputed = (self.server_to_client)(first_ts);
                if let Some(current) = self.shared.scheduled_start_loop_us() {
                    if (recomputed - current).abs() > START_UPDATE_THRESHOLD_US {
                        self.shared.set_scheduled_start_loop_us(Some(recomputed));
                    }
                }
            }
        }

        if self.shared.state() == PlaybackState::Playing {
            if let Some(position_us) = self.shared.last_known_playback_position_us() {
                let error = (position_us - self.queue.server_ts_cursor_us()) as f64;
                match self.correction.decide(error, format.sample_rate, Instant::now()) {
                    Some(plan) => self
                        .shared
                        .set_correction_plan(plan.insert_every_n_frames, plan.drop_every_n_frames),
                    None => {
                        log::info!("sync divergence {:.0}us exceeds re-anchor threshold; clearing", error);
                        self.clear();
                        return;
                    }
                }
            }
        }

        self.enqueue_reconciled(server_timestamp_us, payload, format);

        if !self.stream_started && self.queue.queued_duration_us() > 0 {
            if let Some(stream) = &self.stream {
                if let Err(e) = stream.play() {
                    log::error!("failed to start stream: {}", e);
                } else {
                    self.stream_started = true;
                    log::info!(
                        "stream started, {}us buffered",
                        self.queue.queued_duration_us()
                    );
                }
            }
        }
    }

    fn enqueue_reconciled(&mut self, server_timestamp_us: i64, payload: &[u8], format: AudioFormat) {
        let frame_size = format.frame_size();
        let sample_rate = format.sample_rate;

        let (ts, bytes): (i64, Arc<[u8]>) = match self.expected_next_timestamp_us {
            None => (server_timestamp_us, Arc::from(payload)),
            Some(exp) => {
                if server_timestamp_us > exp {
                    let gap_us = (server_timestamp_us - exp) as u64;
                    let silence_frames = format.micros_to_frames(gap_us);
                    let silence_bytes = silence_frames as usize * frame_size;
                    if silence_bytes > 0 {
                        let silence = Chunk {
                            server_timestamp_us: exp,
                            audio_bytes: Arc::from(vec![0u8; silence_bytes].into_boxed_slice()),
                        };
                        self.queue.push(silence, frame_size, sample_rate);
                    }
                    (server_timestamp_us, Arc::from(payload))
                } else if server_timestamp_us < exp {
                    let overlap_us = (exp - server_timestamp_us) as u64;
                    let trim_frames = format.micros_to_frames(overlap_us);
                    let trim_bytes = trim_frames as usize * frame_size;
                    if trim_bytes >= payload.len() {
                        log::warn!("dropping fully-overlapped chunk at ts={}", server_timestamp_us);
                        return;
                    }
                    (exp, Arc::from(&payload[trim_bytes..]))
                } else {
                    (server_timestamp_us, Arc::from(payload))
                }
            }
        };

        let chunk = Chunk {
            server_timestamp_us: ts,
            audio_bytes: bytes,
        };
        let duration_us = chunk.duration_us(frame_size, sample_rate);
        self.queue.push(chunk, frame_size, sample_rate);
        self.expected_next_timestamp_us = Some(ts + duration_us as i64);
    }

    /// Drains the queue and resets schedule/correction state, but keeps
    /// `format` and the device binding. Stops (does not close) the
    /// stream.
    pub fn clear(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("failed to pause stream on clear: {}", e);
            }
        }
        self.queue.clear();
        self.shared.reset_for_clear();
        self.correction.reset_filter();
        self.expected_next_timestamp_us = None;
        self.first_server_timestamp_us = None;
        self.stream_started = false;
    }

    /// Clamp `volume` to `0..=100`; takes effect on the next callback
    /// invocation.
    pub fn set_volume(&mut self, volume: u8, muted: bool) {
        self.shared.set_volume(volume.min(100));
        self.shared.set_muted(muted);
    }

    /// Closes the stream permanently; further `submit`/`clear` calls are
    /// no-ops.
    pub fn stop(&mut self) {
        self.closed = true;
        self.stream = None;
        self.stream_started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> (TimeConv, TimeConv) {
        (Arc::new(|x| x), Arc::new(|x| x))
    }

    #[test]
    fn dropping_misaligned_payload_does_not_advance_expectation() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));
        player.submit(0, &[1, 2, 3]); // 3 bytes, not a multiple of frame_size=4
        assert_eq!(player.expected_next_timestamp_us, None);
    }

    #[test]
    fn stop_is_idempotent_and_blocks_further_submits() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));
        player.stop();
        player.stop();
        player.submit(0, &[0u8; 4]);
        assert_eq!(player.expected_next_timestamp_us, None);
    }

    #[test]
    fn first_chunk_schedules_start_and_sets_waiting_state() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));
        let now = now_client_us();
        player.submit(now + 300_000, &[0u8; 4]);
        assert_eq!(player.shared.state(), PlaybackState::WaitingForStart);
        assert_eq!(player.shared.scheduled_start_loop_us(), Some(now + 300_000));
        assert_eq!(player.expected_next_timestamp_us, Some(now + 300_000 + 22));
    }

    #[test]
    fn early_start_suspect_set_when_schedule_is_close() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));
        let now = now_client_us();
        player.submit(now + 100_000, &[0u8; 4]); // 100ms, under EARLY_START_THRESHOLD_US
        assert!(player.shared.early_start_suspect());
    }

    #[test]
    fn gap_between_chunks_is_filled_with_silence() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        let format = AudioFormat::new(1000, 1); // 1000 Hz, mono => frame_size 2, 1us per... easier math
        player.format = Some(format);

        // First chunk: 100ms @ 1000Hz = 100 frames = 200 bytes, ts=0.
        player.submit(0, &vec![1u8; 200]);
        // Second chunk arrives 100ms later than expected (gap of 100ms = 100 frames = 200 bytes of silence).
        player.submit(200_000, &vec![2u8; 200]);

        assert_eq!(
            player.queue.queued_duration_us(),
            100_000 + 100_000 + 100_000 // real + silence + real
        );
    }

    #[test]
    fn overlapping_chunk_is_trimmed_and_retimed() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        let format = AudioFormat::new(1000, 1); // frame_size = 2 bytes
        player.format = Some(format);

        // First chunk: 100ms (100 frames, 200 bytes) at ts=0 -> expected_next = 100_000.
        player.submit(0, &vec![1u8; 200]);
        // Second chunk overlaps by 40ms (ts=60_000 instead of 100_000): trims 40 frames = 80 bytes.
        player.submit(60_000, &vec![2u8; 200]);

        // expected_next_timestamp_us should now be 100_000 (retimed start) + (200-80)/2 frames * 1000us
        assert_eq!(player.expected_next_timestamp_us, Some(100_000 + 60_000));
    }

    #[test]
    fn catastrophic_divergence_triggers_clear_back_to_initializing() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));

        let now = now_client_us();
        player.submit(now, &[0u8; 4]);
        player.shared.set_state(PlaybackState::Playing);
        player.shared.set_last_known_playback_position_us(600_000);
        // cursor is 0, position is 600_000us ahead -> error exceeds REANCHOR_THRESHOLD_US.
        player.submit(now + 1, &[0u8; 4]);

        // The re-anchoring submit drops its own triggering chunk: the queue
        // is left empty and nothing re-seeds the schedule until the next
        // chunk arrives fresh.
        assert_eq!(player.shared.state(), PlaybackState::Initializing);
        assert_eq!(player.queue.queued_duration_us(), 0);
        assert_eq!(player.expected_next_timestamp_us, None);
        player.submit(now + 300_000, &[0u8; 4]);
        assert_eq!(player.shared.state(), PlaybackState::WaitingForStart);
    }

    #[test]
    fn clear_is_idempotent() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.format = Some(AudioFormat::new(44_100, 2));
        player.submit(0, &[0u8; 4]);
        player.clear();
        let state_after_first = player.shared.state();
        player.clear();
        assert_eq!(player.shared.state(), state_after_first);
        assert_eq!(player.expected_next_timestamp_us, None);
    }

    #[test]
    fn set_volume_clamps_to_100() {
        let (s2c, c2s) = identity();
        let mut player = Player::new(s2c, c2s, None);
        player.set_volume(250, false);
        assert_eq!(player.shared.volume(), 100);
    }
}
