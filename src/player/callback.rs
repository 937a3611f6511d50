// ABOUTME: C5 - the cpal audio callback: start-gating, fast/slow-path buffer fill, volume scaling
// ABOUTME: real-time constraints apply here: no allocation, no blocking, no logging above debug

use super::calibration::CalibrationRing;
use super::queue::ChunkQueue;
use super::state::{PlaybackState, Shared};
use crate::audio::AudioFormat;
use crate::sync::now_client_us;
use cpal::OutputCallbackInfo;
use std::sync::Arc;

const DISABLED: u64 = u64::MAX;

fn interval_or_disabled(n: u64) -> u64 {
    if n == 0 {
        DISABLED
    } else {
        n
    }
}

/// Everything the callback needs across invocations that is NOT
/// control-thread-visible: per-callback countdown counters, the cached DAC
/// equivalent of the scheduled start, and the last emitted frame for
/// duplication on an insert event. None of this is shared state: it lives
/// only as captured locals in the closure below.
struct CallbackLocals {
    scratch: Vec<u8>,
    last_emitted_frame: Vec<u8>,
    have_last_frame: bool,
    scheduled_start_dac_us: Option<f64>,
    cached_scheduled_start_loop_us: Option<i64>,
    next_insert_in: u64,
    next_drop_in: u64,
    last_insert_every_n: u64,
    last_drop_every_n: u64,
}

impl CallbackLocals {
    fn new(frame_size: usize, max_frames: usize) -> Self {
        Self {
            scratch: vec![0u8; max_frames * frame_size],
            last_emitted_frame: vec![0u8; frame_size],
            have_last_frame: false,
            scheduled_start_dac_us: None,
            cached_scheduled_start_loop_us: None,
            next_insert_in: DISABLED,
            next_drop_in: DISABLED,
            last_insert_every_n: 0,
            last_drop_every_n: 0,
        }
    }

    fn sync_counters(&mut self, insert_every_n: u64, drop_every_n: u64) {
        if insert_every_n != self.last_insert_every_n {
            self.next_insert_in = interval_or_disabled(insert_every_n);
            self.last_insert_every_n = insert_every_n;
        }
        if drop_every_n != self.last_drop_every_n {
            self.next_drop_in = interval_or_disabled(drop_every_n);
            self.last_drop_every_n = drop_every_n;
        }
    }
}

/// Build the stream data callback. `frame_size` and `sample_rate` are fixed
/// for the stream's lifetime; `queue`/`calibration`/`shared` are the three
/// structures crossing the control/audio boundary.
pub fn build_data_callback(
    format: AudioFormat,
    block_size_frames: usize,
    queue: Arc<ChunkQueue>,
    calibration: Arc<CalibrationRing>,
    shared: Arc<Shared>,
    client_to_server: Arc<dyn Fn(i64) -> i64 + Send + Sync>,
) -> impl FnMut(&mut [i16], &OutputCallbackInfo) + Send + 'static {
    let frame_size = format.frame_size();
    let channels = format.channels as usize;
    let sample_rate = format.sample_rate;
    // A handful of callbacks' worth of slack in case the host ever requests
    // more frames than the configured block size; avoids a mid-callback
    // reallocation.
    let mut locals = CallbackLocals::new(frame_size, block_size_frames * 4);

    move |data: &mut [i16], info: &OutputCallbackInfo| {
        let frames_total = data.len() / channels;
        let bytes_total = frames_total * frame_size;
        if locals.scratch.len() < bytes_total {
            locals.scratch.resize(bytes_total, 0);
        }

        // --- Step A: calibration & position -------------------------------
        let loop_us_now = now_client_us();
        let ts = info.timestamp();
        let output_delay_us = ts
            .playback
            .duration_since(&ts.callback)
            .map(|d| d.as_micros() as f64)
            .unwrap_or(0.0);
        let dac_us_now = loop_us_now as f64 + output_delay_us;

        calibration.push(dac_us_now, loop_us_now);

        let position_loop_us = calibration.loop_for_dac(dac_us_now);
        let position_server_us = client_to_server(position_loop_us);
        shared.set_last_known_playback_position_us(position_server_us);

        if let Some(start_loop_us) = shared.scheduled_start_loop_us() {
            if locals.cached_scheduled_start_loop_us != Some(start_loop_us) {
                locals.scheduled_start_dac_us = calibration.dac_for_loop(start_loop_us);
                locals.cached_scheduled_start_loop_us = Some(start_loop_us);
            }
        } else {
            locals.scheduled_start_dac_us = None;
            locals.cached_scheduled_start_loop_us = None;
        }

        // --- Step C/D: state machine + buffer fill ------------------------
        match shared.state() {
            PlaybackState::Initializing => {
                data.fill(0);
                return;
            }
            PlaybackState::WaitingForStart => {
                let (target_us, current_us) =
                    match (locals.scheduled_start_dac_us, shared.scheduled_start_loop_us()) {
                        (Some(target), _) => (target, dac_us_now),
                        (None, Some(start_loop)) => (start_loop as f64, loop_us_now as f64),
                        (None, None) => {
                            data.fill(0);
                            return;
                        }
                    };
                let delta_us = target_us - current_us;

                if delta_us > 0.0 {
                    let silence_frames = format
                        .micros_to_frames(delta_us.round() as u64)
                        .min(frames_total as u64) as usize;
                    let silence_bytes = silence_frames * frame_size;
                    locals.scratch[..silence_bytes].fill(0);

                    if silence_frames < frames_total {
                        shared.set_state(PlaybackState::Playing);
                        fast_fill(
                            &queue,
                            &mut locals.scratch[silence_bytes..bytes_total],
                            frame_size,
                            sample_rate,
                            &shared,
                            &mut locals.last_emitted_frame,
                            &mut locals.have_last_frame,
                        );
                    }
                } else {
                    if !shared.early_start_suspect() {
                        let behind_us = (-delta_us) as u64;
                        let skip = format.micros_to_frames_ceil(behind_us);
                        queue.skip_frames(skip, frame_size, sample_rate);
                    }
                    shared.set_state(PlaybackState::Playing);
                    fast_fill(
                        &queue,
                        &mut locals.scratch[..bytes_total],
                        frame_size,
                        sample_rate,
                        &shared,
                        &mut locals.last_emitted_frame,
                        &mut locals.have_last_frame,
                    );
                }
            }
            PlaybackState::Playing => {
                let (insert_every_n, drop_every_n) = shared.correction_plan();
                if insert_every_n == 0 && drop_every_n == 0 {
                    fast_fill(
                        &queue,
                        &mut locals.scratch[..bytes_total],
                        frame_size,
                        sample_rate,
                        &shared,
                        &mut locals.last_emitted_frame,
                        &mut locals.have_last_frame,
                    );
                } else {
                    locals.sync_counters(insert_every_n, drop_every_n);
                    slow_fill(
                        &queue,
                        &mut locals.scratch[..bytes_total],
                        frame_size,
                        sample_rate,
                        frames_total,
                        insert_every_n,
                        drop_every_n,
                        &mut locals.next_insert_in,
                        &mut locals.next_drop_in,
                        &shared,
                        &mut locals.last_emitted_frame,
                        &mut locals.have_last_frame,
                    );
                }
            }
        }

        // --- Step E: volume scaling + sample conversion -------------------
        let volume = shared.volume();
        let muted = shared.muted();

        for (i, out_sample) in data.iter_mut().enumerate() {
            let byte_off = i * 2;
            if byte_off + 2 > locals.scratch.len() {
                *out_sample = 0;
                continue;
            }
            let raw = i16::from_le_bytes([locals.scratch[byte_off], locals.scratch[byte_off + 1]]);
            *out_sample = scale_sample(raw, volume, muted);
        }
    }
}

/// Cubic volume curve: amplitude = (volume/100)^3. Mute forces silence
/// regardless of volume; volume 100 passes the sample through unscaled.
fn scale_sample(raw: i16, volume: u8, muted: bool) -> i16 {
    if muted || volume == 0 {
        return 0;
    }
    if volume == 100 {
        return raw;
    }
    let gain = (volume as f64 / 100.0).powf(crate::player::VOLUME_CURVE_EXPONENT);
    (raw as f64 * gain).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Bulk-read exactly `out.len()` bytes from the queue, zero-filling any
/// shortfall and flagging a deferred re-anchor on underrun while playing.
fn fast_fill(
    queue: &ChunkQueue,
    out: &mut [u8],
    frame_size: usize,
    sample_rate: u32,
    shared: &Shared,
    last_emitted_frame: &mut [u8],
    have_last_frame: &mut bool,
) {
    let written = queue.read_frames(out, frame_size, sample_rate);
    if written < out.len() {
        out[written..].fill(0);
        if written == 0 && !out.is_empty() {
            shared.request_clear();
        }
    }
    if written >= frame_size {
        let tail = &out[written - frame_size..written];
        last_emitted_frame.copy_from_slice(tail);
        *have_last_frame = true;
    }
}

#[allow(clippy::too_many_arguments)]
fn slow_fill(
    queue: &ChunkQueue,
    out: &mut [u8],
    frame_size: usize,
    sample_rate: u32,
    frames_total: usize,
    insert_every_n: u64,
    drop_every_n: u64,
    next_insert_in: &mut u64,
    next_drop_in: &mut u64,
    shared: &Shared,
    last_emitted_frame: &mut [u8],
    have_last_frame: &mut bool,
) {
    let mut frames_remaining = frames_total as u64;
    let mut offset = 0usize;
    let mut underran = false;

    while frames_remaining > 0 {
        let segment = (*next_insert_in).min(*next_drop_in).min(frames_remaining);
        let seg_bytes = segment as usize * frame_size;

        if seg_bytes > 0 {
            let written = queue.read_frames(&mut out[offset..offset + seg_bytes], frame_size, sample_rate);
            if written < seg_bytes {
                out[offset + written..offset + seg_bytes].fill(0);
                underran = true;
            }
            if written >= frame_size {
                let tail = &out[offset + written - frame_size..offset + written];
                last_emitted_frame.copy_from_slice(tail);
                *have_last_frame = true;
            }
            offset += seg_bytes;
            frames_remaining -= segment;
            if *next_insert_in != DISABLED {
                *next_insert_in -= segment;
            }
            if *next_drop_in != DISABLED {
                *next_drop_in -= segment;
            }
        }

        if frames_remaining == 0 || underran {
            break;
        }

        if *next_insert_in == 0 {
            if *have_last_frame {
                out[offset..offset + frame_size].copy_from_slice(last_emitted_frame);
            } else {
                out[offset..offset + frame_size].fill(0);
            }
            offset += frame_size;
            frames_remaining -= 1;
            *next_insert_in = interval_or_disabled(insert_every_n);
            if *next_drop_in != DISABLED {
                *next_drop_in = next_drop_in.saturating_sub(1);
            }
        } else if *next_drop_in == 0 {
            // Discard one input frame, then emit the frame after it.
            queue.skip_frames(1, frame_size, sample_rate);
            let written = queue.read_frames(&mut out[offset..offset + frame_size], frame_size, sample_rate);
            if written < frame_size {
                out[offset + written..offset + frame_size].fill(0);
                underran = true;
            } else {
                last_emitted_frame.copy_from_slice(&out[offset..offset + frame_size]);
                *have_last_frame = true;
            }
            offset += frame_size;
            frames_remaining -= 1;
            *next_drop_in = interval_or_disabled(drop_every_n);
            if *next_insert_in != DISABLED {
                *next_insert_in = next_insert_in.saturating_sub(1);
            }
        }
    }

    if underran {
        if offset < out.len() {
            out[offset..].fill(0);
        }
        shared.request_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::queue::{Chunk, ChunkQueue};
    use std::sync::Arc;

    const FRAME_SIZE: usize = 2; // mono, 16-bit
    const RATE: u32 = 1000;

    fn frame_i16(v: i16) -> [u8; 2] {
        v.to_le_bytes()
    }

    fn push_frames(q: &ChunkQueue, values: &[i16]) {
        let mut bytes = Vec::with_capacity(values.len() * FRAME_SIZE);
        for v in values {
            bytes.extend_from_slice(&frame_i16(*v));
        }
        q.push(
            Chunk {
                server_timestamp_us: 0,
                audio_bytes: Arc::from(bytes.into_boxed_slice()),
            },
            FRAME_SIZE,
            RATE,
        );
    }

    fn samples_of(buf: &[u8]) -> Vec<i16> {
        buf.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
    }

    #[test]
    fn scale_sample_cubic_law_at_half_volume() {
        // P7: volume=50 => gain = 0.5^3 = 0.125
        assert_eq!(scale_sample(800, 50, false), 100);
    }

    #[test]
    fn scale_sample_mute_forces_silence_regardless_of_volume() {
        assert_eq!(scale_sample(i16::MAX, 100, true), 0);
    }

    #[test]
    fn scale_sample_full_volume_is_passthrough() {
        assert_eq!(scale_sample(1234, 100, false), 1234);
    }

    #[test]
    fn scale_sample_zero_volume_is_silence() {
        assert_eq!(scale_sample(1234, 0, false), 0);
    }

    #[test]
    fn fast_fill_writes_exact_bytes_when_queue_has_enough() {
        let q = ChunkQueue::new();
        push_frames(&q, &[1, 2, 3, 4]);
        let shared = Shared::new();
        let mut out = [0u8; 8];
        let mut last = vec![0u8; FRAME_SIZE];
        let mut have_last = false;
        fast_fill(&q, &mut out, FRAME_SIZE, RATE, &shared, &mut last, &mut have_last);
        assert_eq!(samples_of(&out), vec![1, 2, 3, 4]);
        assert!(have_last);
        assert_eq!(samples_of(&last), vec![4]);
        assert!(!shared.take_clear_requested());
    }

    #[test]
    fn fast_fill_underrun_zero_fills_and_requests_clear() {
        let q = ChunkQueue::new();
        let shared = Shared::new();
        let mut out = [9u8; 8];
        let mut last = vec![0u8; FRAME_SIZE];
        let mut have_last = false;
        fast_fill(&q, &mut out, FRAME_SIZE, RATE, &shared, &mut last, &mut have_last);
        assert_eq!(out, [0u8; 8]);
        assert!(shared.take_clear_requested());
    }

    #[test]
    fn slow_fill_insert_duplicates_last_frame_without_consuming_input() {
        // 5 output frames, insert every 3rd: emits f1,f2,f3,dup(f3),f4 and
        // consumes only 4 real input frames.
        let q = ChunkQueue::new();
        push_frames(&q, &[1, 2, 3, 4, 5]);
        let shared = Shared::new();
        let mut out = [0u8; 5 * FRAME_SIZE];
        let mut last = vec![0u8; FRAME_SIZE];
        let mut have_last = false;
        let mut next_insert_in = 3u64;
        let mut next_drop_in = DISABLED;

        slow_fill(
            &q,
            &mut out,
            FRAME_SIZE,
            RATE,
            5,
            3,
            0,
            &mut next_insert_in,
            &mut next_drop_in,
            &shared,
            &mut last,
            &mut have_last,
        );

        assert_eq!(samples_of(&out), vec![1, 2, 3, 3, 4]);
        assert_eq!(q.server_ts_cursor_us(), 4 * 1_000_000 / RATE as i64);
    }

    #[test]
    fn slow_fill_drop_skips_one_input_frame() {
        // 5 output frames, drop every 3rd: emits f1,f2,f3,f5(f4 dropped),f6
        // and consumes 6 real input frames for 5 output frames.
        let q = ChunkQueue::new();
        push_frames(&q, &[1, 2, 3, 4, 5, 6]);
        let shared = Shared::new();
        let mut out = [0u8; 5 * FRAME_SIZE];
        let mut last = vec![0u8; FRAME_SIZE];
        let mut have_last = false;
        let mut next_insert_in = DISABLED;
        let mut next_drop_in = 3u64;

        slow_fill(
            &q,
            &mut out,
            FRAME_SIZE,
            RATE,
            5,
            0,
            3,
            &mut next_insert_in,
            &mut next_drop_in,
            &shared,
            &mut last,
            &mut have_last,
        );

        assert_eq!(samples_of(&out), vec![1, 2, 3, 5, 6]);
        assert_eq!(q.server_ts_cursor_us(), 6 * 1_000_000 / RATE as i64);
    }
}
