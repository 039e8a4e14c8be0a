// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

/// Directory name under the user's config directory
pub const APP_DIR_NAME: &str = "mediadriver";

/// Config file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default log filter when neither RUST_LOG nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Synthetic test sources
pub mod test_pattern {
    pub const CAMERA_LABEL: &str = "test-pattern-camera";
    pub const MICROPHONE_LABEL: &str = "test-tone-microphone";
    /// Followed by the display index
    pub const SCREEN_LABEL_PREFIX: &str = "test-pattern-screen-";

    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
    pub const DEFAULT_FRAME_RATE: f32 = 30.0;
    /// Slowest pacing accepted; 0 means unpaced
    pub const MIN_FRAME_RATE: f32 = 0.01;
    pub const DEFAULT_SCREEN_COUNT: u32 = 1;
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
    pub const DEFAULT_CHANNEL_COUNT: u16 = 2;
    pub const DEFAULT_TONE_HZ: f32 = 440.0;
    /// Amplitude of the generated tone
    pub const TONE_AMPLITUDE: f32 = 0.25;

    /// Standard SMPTE-style bar colours (RGBA)
    pub const BAR_COLORS: [[u8; 4]; 8] = [
        [235, 235, 235, 255], // white
        [235, 235, 16, 255],  // yellow
        [16, 235, 235, 255],  // cyan
        [16, 235, 16, 255],   // green
        [235, 16, 235, 255],  // magenta
        [235, 16, 16, 255],   // red
        [16, 16, 235, 255],   // blue
        [16, 16, 16, 255],    // black
    ];
}

/// Length of one audio chunk handed to readers
pub const DEFAULT_AUDIO_LATENCY: Duration = Duration::from_millis(20);

/// Memory-mapped buffers requested from V4L2
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// How long the PipeWire reader waits for one chunk before retrying
pub const AUDIO_PULL_TIMEOUT: Duration = Duration::from_millis(500);

/// Frames read by `record` when no count is given
pub const DEFAULT_RECORD_COUNT: usize = 30;
