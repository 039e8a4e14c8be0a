// SPDX-License-Identifier: GPL-3.0-only

//! Capture configuration descriptors
//!
//! [`MediaProps`] describes either a configuration an adapter advertises or
//! one a consumer requests. The device layer never interprets it; adapters
//! decide what a request means.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pixel layout of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Planar 4:2:0
    I420,
    /// Semi-planar 4:2:0 (Y plane + interleaved UV)
    NV12,
    /// Semi-planar 4:2:0 (Y plane + interleaved VU)
    NV21,
    /// Packed 4:2:2 (Y0 U Y1 V)
    YUY2,
    /// Packed 4:2:2 (U Y0 V Y1)
    UYVY,
    /// 32-bit RGBA
    RGBA,
    /// Motion JPEG, one JPEG image per frame
    MJPEG,
    /// 16-bit depth
    Z16,
}

impl FrameFormat {
    pub const ALL: [FrameFormat; 8] = [
        FrameFormat::I420,
        FrameFormat::NV12,
        FrameFormat::NV21,
        FrameFormat::YUY2,
        FrameFormat::UYVY,
        FrameFormat::RGBA,
        FrameFormat::MJPEG,
        FrameFormat::Z16,
    ];

    /// V4L2 FourCC code for this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            FrameFormat::I420 => *b"YU12",
            FrameFormat::NV12 => *b"NV12",
            FrameFormat::NV21 => *b"NV21",
            FrameFormat::YUY2 => *b"YUYV",
            FrameFormat::UYVY => *b"UYVY",
            FrameFormat::RGBA => *b"AB24",
            FrameFormat::MJPEG => *b"MJPG",
            FrameFormat::Z16 => *b"Z16 ",
        }
    }

    /// Parse a V4L2 FourCC code, accepting common aliases
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"YU12" | b"I420" => Some(FrameFormat::I420),
            b"NV12" => Some(FrameFormat::NV12),
            b"NV21" => Some(FrameFormat::NV21),
            b"YUYV" | b"YUY2" => Some(FrameFormat::YUY2),
            b"UYVY" => Some(FrameFormat::UYVY),
            b"AB24" | b"RGBA" => Some(FrameFormat::RGBA),
            b"MJPG" | b"JPEG" => Some(FrameFormat::MJPEG),
            b"Z16 " => Some(FrameFormat::Z16),
            _ => None,
        }
    }

    /// Exact frame size in bytes for uncompressed formats
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            FrameFormat::I420 | FrameFormat::NV12 | FrameFormat::NV21 => Some(pixels * 3 / 2),
            FrameFormat::YUY2 | FrameFormat::UYVY | FrameFormat::Z16 => Some(pixels * 2),
            FrameFormat::RGBA => Some(pixels * 4),
            FrameFormat::MJPEG => None,
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameFormat::I420 => "I420",
            FrameFormat::NV12 => "NV12",
            FrameFormat::NV21 => "NV21",
            FrameFormat::YUY2 => "YUY2",
            FrameFormat::UYVY => "UYVY",
            FrameFormat::RGBA => "RGBA",
            FrameFormat::MJPEG => "MJPEG",
            FrameFormat::Z16 => "Z16",
        };
        write!(f, "{}", name)
    }
}

/// Video part of a capture configuration; zero means "unspecified"
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoProps {
    pub width: u32,
    pub height: u32,
    /// Frames per second
    pub frame_rate: f32,
    pub frame_format: Option<FrameFormat>,
}

impl VideoProps {
    pub fn is_empty(&self) -> bool {
        self.width == 0 && self.height == 0 && self.frame_rate == 0.0 && self.frame_format.is_none()
    }
}

impl std::fmt::Display for VideoProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if self.frame_rate > 0.0 {
            write!(f, " @ {}fps", self.frame_rate)?;
        }
        if let Some(format) = self.frame_format {
            write!(f, " {}", format)?;
        }
        Ok(())
    }
}

/// Audio part of a capture configuration; zero means "unspecified"
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioProps {
    pub channel_count: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub sample_size: u16,
    /// Duration covered by one chunk handed to the reader
    pub latency: Duration,
    pub is_float: bool,
    pub is_big_endian: bool,
    pub is_interleaved: bool,
}

impl AudioProps {
    pub fn is_empty(&self) -> bool {
        self.channel_count == 0 && self.sample_rate == 0 && self.sample_size == 0
    }

    /// Number of frames (samples per channel) in one chunk
    pub fn frames_per_chunk(&self) -> usize {
        (self.sample_rate as u128 * self.latency.as_micros() / 1_000_000) as usize
    }
}

impl std::fmt::Display for AudioProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}bit{}",
            self.channel_count,
            self.sample_rate,
            self.sample_size,
            if self.is_float { " float" } else { "" }
        )?;
        if !self.latency.is_zero() {
            write!(f, " {}ms", self.latency.as_millis())?;
        }
        Ok(())
    }
}

/// A supported or requested capture configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaProps {
    /// Backend-specific identifier of the node the configuration belongs to
    pub device_id: Option<String>,
    pub video: VideoProps,
    pub audio: AudioProps,
}

impl MediaProps {
    pub fn video(video: VideoProps) -> Self {
        Self {
            video,
            ..Default::default()
        }
    }

    pub fn audio(audio: AudioProps) -> Self {
        Self {
            audio,
            ..Default::default()
        }
    }
}

impl std::fmt::Display for MediaProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.video.is_empty(), self.audio.is_empty()) {
            (false, true) => write!(f, "{}", self.video),
            (true, false) => write!(f, "{}", self.audio),
            (false, false) => write!(f, "{} / {}", self.video, self.audio),
            (true, true) => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        for format in FrameFormat::ALL {
            assert_eq!(FrameFormat::from_fourcc(&format.fourcc()), Some(format));
        }
        assert_eq!(FrameFormat::from_fourcc(b"YUY2"), Some(FrameFormat::YUY2));
        assert_eq!(FrameFormat::from_fourcc(b"H264"), None);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(FrameFormat::I420.frame_size(640, 480), Some(460_800));
        assert_eq!(FrameFormat::YUY2.frame_size(640, 480), Some(614_400));
        assert_eq!(FrameFormat::RGBA.frame_size(2, 2), Some(16));
        assert_eq!(FrameFormat::MJPEG.frame_size(640, 480), None);
    }

    #[test]
    fn test_frames_per_chunk() {
        let audio = AudioProps {
            channel_count: 2,
            sample_rate: 48_000,
            sample_size: 32,
            latency: Duration::from_millis(20),
            is_float: true,
            is_big_endian: false,
            is_interleaved: true,
        };
        assert_eq!(audio.frames_per_chunk(), 960);
    }

    #[test]
    fn test_display() {
        let video = VideoProps {
            width: 1280,
            height: 720,
            frame_rate: 30.0,
            frame_format: Some(FrameFormat::NV12),
        };
        assert_eq!(video.to_string(), "1280x720 @ 30fps NV12");
        assert_eq!(MediaProps::default().to_string(), "any");
        assert_eq!(MediaProps::video(video).to_string(), "1280x720 @ 30fps NV12");
    }
}
