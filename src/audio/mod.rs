// ABOUTME: PCM audio format descriptor shared by the protocol and player layers
// ABOUTME: Sample width is fixed at 16-bit signed little-endian per the core's contract

pub mod device;

/// Audio codec announced by the stream (protocol-level; the player core only
/// ever renders `Pcm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Pcm,
}

/// Immutable PCM format descriptor for one stream.
///
/// `frame_size` is always `channels as usize * 2` bytes (16-bit signed
/// little-endian samples); there is no sample-width negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per frame: one 16-bit sample per channel.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * 2
    }

    /// Convert a frame count to a duration in microseconds.
    pub fn frames_to_micros(&self, frames: u64) -> u64 {
        frames * 1_000_000 / self.sample_rate as u64
    }

    /// Convert a duration in microseconds to a frame count, rounding down.
    pub fn micros_to_frames(&self, micros: u64) -> u64 {
        micros * self.sample_rate as u64 / 1_000_000
    }

    /// Convert a duration in microseconds to a frame count, rounding up.
    pub fn micros_to_frames_ceil(&self, micros: u64) -> u64 {
        (micros * self.sample_rate as u64 + 999_999) / 1_000_000
    }
}
