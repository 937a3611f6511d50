// ABOUTME: C3 - FIFO of timestamped PCM chunks shared between control (push/clear) and audio (read)
// ABOUTME: control never blocks the audio thread: audio uses try_lock and treats contention as underrun

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A single queued PCM chunk, stamped with the server time its first frame
/// must play at.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub server_timestamp_us: i64,
    pub audio_bytes: Arc<[u8]>,
}

impl Chunk {
    pub fn frame_count(&self, frame_size: usize) -> u64 {
        (self.audio_bytes.len() / frame_size) as u64
    }

    pub fn duration_us(&self, frame_size: usize, sample_rate: u32) -> u64 {
        self.frame_count(frame_size) * 1_000_000 / sample_rate as u64
    }
}

struct Inner {
    items: VecDeque<Chunk>,
    current: Option<Chunk>,
    offset: usize,
    /// Fractional remainder for cursor advancement, in units of
    /// µs · sample_rate, reduced by sample_rate per full microsecond to
    /// avoid float drift.
    remainder: u64,
}

/// Single-producer (control thread: `push`/`clear`), single-consumer (audio
/// thread: `read_frames`/`skip_frames`) chunk FIFO.
///
/// The audio side never blocks: it uses `try_lock` and, on contention
/// (control mid-push/clear), returns zero frames for that callback exactly
/// as it would on a genuine underrun. Contention is rare and the critical
/// sections on the control side are a handful of pointer/counter writes.
pub struct ChunkQueue {
    inner: Mutex<Inner>,
    queued_duration_us: AtomicU64,
    server_ts_cursor_us: AtomicI64,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                current: None,
                offset: 0,
                remainder: 0,
            }),
            queued_duration_us: AtomicU64::new(0),
            server_ts_cursor_us: AtomicI64::new(0),
        }
    }

    /// Append a chunk. Control thread only.
    pub fn push(&self, chunk: Chunk, frame_size: usize, sample_rate: u32) {
        let duration = chunk.duration_us(frame_size, sample_rate);
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(chunk);
        self.queued_duration_us.fetch_add(duration, Ordering::Relaxed);
    }

    /// Drain all buffered audio and reset bookkeeping. Control thread only;
    /// this is only safe once the stream has been paused synchronously, so
    /// there is no concurrent audio-thread reader.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        inner.current = None;
        inner.offset = 0;
        inner.remainder = 0;
        self.queued_duration_us.store(0, Ordering::Relaxed);
        self.server_ts_cursor_us.store(0, Ordering::Relaxed);
    }

    pub fn queued_duration_us(&self) -> u64 {
        self.queued_duration_us.load(Ordering::Relaxed)
    }

    pub fn server_ts_cursor_us(&self) -> i64 {
        self.server_ts_cursor_us.load(Ordering::Relaxed)
    }

    /// Anchor the cursor to the first chunk's timestamp when a stream
    /// (re)starts. Control thread only, while the audio side is not running.
    pub fn set_server_ts_cursor_us(&self, value: i64) {
        self.server_ts_cursor_us.store(value, Ordering::Relaxed);
    }

    fn advance_cursor(&self, inner: &mut Inner, frames: u64, sample_rate: u32) {
        if frames == 0 {
            return;
        }
        let total = frames * 1_000_000 + inner.remainder;
        let whole_us = total / sample_rate as u64;
        inner.remainder = total % sample_rate as u64;
        self.server_ts_cursor_us
            .fetch_add(whole_us as i64, Ordering::Relaxed);
    }

    fn pop_fully_consumed(&self, inner: &mut Inner, frame_size: usize, sample_rate: u32) {
        if let Some(chunk) = &inner.current {
            if inner.offset >= chunk.audio_bytes.len() {
                let duration = chunk.duration_us(frame_size, sample_rate);
                self.queued_duration_us
                    .fetch_sub(duration.min(self.queued_duration_us.load(Ordering::Relaxed)), Ordering::Relaxed);
                inner.current = None;
                inner.offset = 0;
            }
        }
    }

    /// Fast-path bulk read: fills `out` with up to `out.len()` bytes of real
    /// audio, advancing the server-timeline cursor by exactly the frames
    /// consumed. Returns the number of bytes written; the caller zero-fills
    /// the remainder on underrun. Audio thread only.
    pub fn read_frames(&self, out: &mut [u8], frame_size: usize, sample_rate: u32) -> usize {
        let mut inner = match self.inner.try_lock() {
            Ok(g) => g,
            Err(_) => return 0,
        };

        let mut written = 0usize;
        while written < out.len() {
            if inner.current.is_none() {
                inner.current = inner.items.pop_front();
                inner.offset = 0;
                if inner.current.is_none() {
                    break;
                }
            }

            let chunk = inner.current.as_ref().unwrap();
            let remaining = chunk.audio_bytes.len() - inner.offset;
            let need = out.len() - written;
            let take = remaining.min(need);

            out[written..written + take]
                .copy_from_slice(&chunk.audio_bytes[inner.offset..inner.offset + take]);
            inner.offset += take;
            written += take;

            self.pop_fully_consumed(&mut inner, frame_size, sample_rate);
        }

        let frames = (written / frame_size) as u64;
        self.advance_cursor(&mut inner, frames, sample_rate);
        written
    }

    /// Consume `frames` without writing them anywhere (drop-event / start
    /// gate catch-up). Returns the number of frames actually skipped (fewer
    /// than requested if the queue underruns). Audio thread only.
    pub fn skip_frames(&self, frames: u64, frame_size: usize, sample_rate: u32) -> u64 {
        let mut inner = match self.inner.try_lock() {
            Ok(g) => g,
            Err(_) => return 0,
        };

        let bytes_to_skip = frames as usize * frame_size;
        let mut skipped = 0usize;
        while skipped < bytes_to_skip {
            if inner.current.is_none() {
                inner.current = inner.items.pop_front();
                inner.offset = 0;
                if inner.current.is_none() {
                    break;
                }
            }

            let chunk = inner.current.as_ref().unwrap();
            let remaining = chunk.audio_bytes.len() - inner.offset;
            let need = bytes_to_skip - skipped;
            let take = remaining.min(need);

            inner.offset += take;
            skipped += take;

            self.pop_fully_consumed(&mut inner, frame_size, sample_rate);
        }

        let frames_skipped = (skipped / frame_size) as u64;
        self.advance_cursor(&mut inner, frames_skipped, sample_rate);
        frames_skipped
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(ts: i64, bytes: &[u8]) -> Chunk {
        Chunk {
            server_timestamp_us: ts,
            audio_bytes: Arc::from(bytes),
        }
    }

    #[test]
    fn push_then_read_roundtrips_bytes() {
        let q = ChunkQueue::new();
        // 2 channels * 2 bytes = 4 byte frames; 2 frames of data.
        q.push(chunk(0, &[1, 2, 3, 4, 5, 6, 7, 8]), 4, 44_100);
        assert_eq!(q.queued_duration_us(), 2 * 1_000_000 / 44_100);

        let mut out = [0u8; 8];
        let n = q.read_frames(&mut out, 4, 44_100);
        assert_eq!(n, 8);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(q.queued_duration_us(), 0);
    }

    #[test]
    fn underrun_zero_fills_caller_side() {
        let q = ChunkQueue::new();
        q.push(chunk(0, &[1, 2, 3, 4]), 4, 44_100);

        let mut out = [9u8; 12];
        let n = q.read_frames(&mut out, 4, 44_100);
        assert_eq!(n, 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn cursor_advances_with_exact_frame_count() {
        let q = ChunkQueue::new();
        q.push(chunk(0, &[0u8; 400]), 4, 44_100); // 100 frames
        let mut out = [0u8; 400];
        q.read_frames(&mut out, 4, 44_100);
        assert_eq!(q.server_ts_cursor_us(), 100 * 1_000_000 / 44_100);
    }

    #[test]
    fn skip_frames_advances_cursor_without_output() {
        let q = ChunkQueue::new();
        q.push(chunk(0, &[7u8; 40]), 4, 44_100); // 10 frames
        let skipped = q.skip_frames(10, 4, 44_100);
        assert_eq!(skipped, 10);
        assert_eq!(q.server_ts_cursor_us(), 10 * 1_000_000 / 44_100);
    }

    #[test]
    fn clear_resets_everything() {
        let q = ChunkQueue::new();
        q.push(chunk(0, &[1u8; 40]), 4, 44_100);
        q.clear();
        assert_eq!(q.queued_duration_us(), 0);
        assert_eq!(q.server_ts_cursor_us(), 0);
        let mut out = [9u8; 8];
        let n = q.read_frames(&mut out, 4, 44_100);
        assert_eq!(n, 0);
    }
}
