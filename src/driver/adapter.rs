// SPDX-License-Identifier: GPL-3.0-only

//! Capability contracts implemented by capture backends
//!
//! Every backend implements [`Adapter`]. Optional capabilities are separate
//! traits; an adapter advertises one by overriding the matching accessor on
//! [`Adapter`] to return itself:
//!
//! ```ignore
//! impl Adapter for Webcam {
//!     fn open(&mut self) -> DriverResult<()> { ... }
//!     fn close(&mut self) -> DriverResult<()> { ... }
//!     fn properties(&self) -> Vec<MediaProps> { ... }
//!
//!     fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
//!         Some(self)
//!     }
//! }
//! ```
//!
//! The accessors are queried once when the adapter is wrapped into a
//! [`Device`](super::Device).

use super::props::{FrameFormat, MediaProps};
use crate::errors::DriverResult;
use std::sync::Arc;
use std::time::Instant;

/// Base lifecycle every capture backend provides
pub trait Adapter: Send {
    /// Acquire the underlying capture resource
    fn open(&mut self) -> DriverResult<()>;

    /// Release the underlying capture resource
    fn close(&mut self) -> DriverResult<()>;

    /// Configurations this adapter can capture with
    ///
    /// Only consulted while the adapter is open.
    fn properties(&self) -> Vec<MediaProps>;

    fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
        None
    }

    fn as_audio_recorder(&mut self) -> Option<&mut dyn AudioRecorder> {
        None
    }

    fn as_availability_probe(&self) -> Option<&dyn AvailabilityProbe> {
        None
    }
}

/// Video capture capability
pub trait VideoRecorder: Send {
    /// Start producing frames with the requested configuration
    fn video_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>>;
}

/// Audio capture capability
pub trait AudioRecorder: Send {
    /// Start producing sample chunks with the requested configuration
    fn audio_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn AudioReader>>;
}

/// Availability probing capability
pub trait AvailabilityProbe {
    /// Whether the hardware behind the adapter can currently be used
    fn is_available(&self) -> DriverResult<bool>;
}

/// A single captured video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Raw frame bytes in `format` layout
    pub data: Arc<[u8]>,
    /// Frame counter as reported by the source
    pub sequence: u64,
    pub captured_at: Instant,
}

/// A chunk of captured audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Interleaved samples in the range [-1.0, 1.0]
    pub samples: Arc<[f32]>,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl AudioChunk {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.samples.len() / self.channel_count as usize
        }
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Pull-based source of video frames
///
/// `read` blocks until the next frame is available and returns
/// [`DriverError::EndOfStream`](crate::errors::DriverError::EndOfStream)
/// once the adapter has been closed.
pub trait VideoReader: Send {
    fn read(&mut self) -> DriverResult<VideoFrame>;
}

impl<F> VideoReader for F
where
    F: FnMut() -> DriverResult<VideoFrame> + Send,
{
    fn read(&mut self) -> DriverResult<VideoFrame> {
        self()
    }
}

/// Pull-based source of audio chunks
pub trait AudioReader: Send {
    fn read(&mut self) -> DriverResult<AudioChunk>;
}

impl<F> AudioReader for F
where
    F: FnMut() -> DriverResult<AudioChunk> + Send,
{
    fn read(&mut self) -> DriverResult<AudioChunk> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DriverError;

    #[test]
    fn test_closure_reader() {
        let mut remaining = 2;
        let mut reader = move || {
            if remaining == 0 {
                return Err(DriverError::EndOfStream);
            }
            remaining -= 1;
            Ok(AudioChunk {
                sample_rate: 8_000,
                channel_count: 2,
                samples: Arc::from(vec![0.5f32, -0.75, 0.25, 0.0]),
                sequence: 0,
                captured_at: Instant::now(),
            })
        };

        let chunk = AudioReader::read(&mut reader).unwrap();
        assert_eq!(chunk.frames(), 2);
        assert_eq!(chunk.peak(), 0.75);
        assert!(AudioReader::read(&mut reader).is_ok());
        assert_eq!(AudioReader::read(&mut reader).unwrap_err(), DriverError::EndOfStream);
    }
}
