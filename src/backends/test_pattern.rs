// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture sources
//!
//! Hardware-free adapters useful for pipelines under test and for checking
//! that the device layer is wired up:
//! - [`TestPatternCamera`]: scrolling RGBA colour bars, with availability probe
//! - [`TestPatternScreen`]: one colour-bar display per configured screen,
//!   video only
//! - [`ToneMicrophone`]: interleaved f32 sine tone, audio only
//!
//! Readers handed out by all of them stop with `EndOfStream` once the adapter
//! is closed.

use crate::config::{Config, TestPatternSettings};
use crate::constants::test_pattern::{
    BAR_COLORS, CAMERA_LABEL, MICROPHONE_LABEL, MIN_FRAME_RATE, SCREEN_LABEL_PREFIX,
    TONE_AMPLITUDE,
};
use crate::driver::{
    Adapter, AudioChunk, AudioProps, AudioReader, AudioRecorder, AvailabilityProbe, DeviceManager,
    DeviceType, FrameFormat, Info, MediaProps, Priority, VideoFrame, VideoProps, VideoReader,
    VideoRecorder,
};
use crate::errors::{DriverError, DriverResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Register the synthetic camera, screens and microphone
pub fn initialize(manager: &DeviceManager, config: &Config) -> usize {
    let settings = &config.test_pattern;
    let mut registered = 0;

    let camera = Info::new(CAMERA_LABEL, DeviceType::Camera)
        .with_name("Test Pattern Camera")
        .with_priority(config.priority_for(CAMERA_LABEL, Priority::Low));
    match manager.register(TestPatternCamera::new(settings.clone()), camera) {
        Ok(_) => registered += 1,
        Err(e) => warn!(error = %e, "Failed to register test pattern camera"),
    }

    // Display 0 is the primary screen
    for display in 0..settings.screen_count {
        let label = format!("{SCREEN_LABEL_PREFIX}{display}");
        let fallback = if display == 0 {
            Priority::High
        } else {
            Priority::Normal
        };
        let info = Info::new(&label, DeviceType::Screen)
            .with_name(format!("Test Pattern Screen {display}"))
            .with_priority(config.priority_for(&label, fallback));
        match manager.register(TestPatternScreen::new(display, settings.clone()), info) {
            Ok(_) => registered += 1,
            Err(e) => warn!(label = %label, error = %e, "Failed to register test pattern screen"),
        }
    }

    let microphone = Info::new(MICROPHONE_LABEL, DeviceType::Microphone)
        .with_name("Test Tone Microphone")
        .with_priority(config.priority_for(MICROPHONE_LABEL, Priority::Low));
    match manager.register(ToneMicrophone::new(settings.clone()), microphone) {
        Ok(_) => registered += 1,
        Err(e) => warn!(error = %e, "Failed to register test tone microphone"),
    }

    info!(count = registered, "Test pattern sources registered");
    registered
}

/// Fill an RGBA buffer with vertical colour bars shifted by `offset` pixels
pub fn color_bars(width: u32, height: u32, offset: u32) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let mut data = vec![0u8; width * height * 4];
    if width == 0 {
        return data;
    }

    let bar_width = width.div_ceil(BAR_COLORS.len()).max(1);
    let mut row = Vec::with_capacity(width * 4);
    for x in 0..width {
        let shifted = (x + offset as usize) % width;
        row.extend_from_slice(&BAR_COLORS[(shifted / bar_width).min(BAR_COLORS.len() - 1)]);
    }
    for line in data.chunks_exact_mut(width * 4) {
        line.copy_from_slice(&row);
    }
    data
}

/// Generate `frames` interleaved frames of a sine tone starting at `phase`
///
/// Returns the samples and the phase to continue from.
pub fn sine_tone(
    frames: usize,
    channel_count: u16,
    sample_rate: u32,
    tone_hz: f32,
    phase: f32,
) -> (Vec<f32>, f32) {
    let channels = channel_count.max(1) as usize;
    let step = std::f32::consts::TAU * tone_hz / sample_rate.max(1) as f32;
    let mut samples = Vec::with_capacity(frames * channels);
    let mut phase = phase;

    for _ in 0..frames {
        let value = phase.sin() * TONE_AMPLITUDE;
        samples.extend(std::iter::repeat_n(value, channels));
        phase = (phase + step) % std::f32::consts::TAU;
    }
    (samples, phase)
}

/// Sleeps until each frame's deadline to hold a steady rate
struct Pacer {
    interval: Duration,
    next: Option<Instant>,
}

impl Pacer {
    /// A rate of zero, or one no `Duration` can represent, disables pacing
    fn new(rate: f32) -> Self {
        let interval = if rate > 0.0 {
            Duration::try_from_secs_f32(1.0 / rate).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next: None,
        }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Skip ahead instead of bursting after a stall
        self.next = deadline.max(now).checked_add(self.interval);
    }
}

/// Check a configured frame rate: 0 disables pacing, otherwise it must be
/// finite and at least [`MIN_FRAME_RATE`]
fn validate_frame_rate(frame_rate: f32) -> DriverResult<()> {
    if frame_rate == 0.0 || (frame_rate.is_finite() && frame_rate >= MIN_FRAME_RATE) {
        Ok(())
    } else {
        Err(DriverError::OpenFailed(format!(
            "invalid test pattern frame rate {frame_rate}"
        )))
    }
}

/// Colour-bar generator shared by the camera and the screens
struct BarSource {
    settings: TestPatternSettings,
    /// Initial scroll position so displays are told apart
    start_offset: u32,
    /// Present while open; cleared on close so readers stop
    running: Option<Arc<AtomicBool>>,
}

impl BarSource {
    fn new(settings: TestPatternSettings, start_offset: u32) -> Self {
        Self {
            settings,
            start_offset,
            running: None,
        }
    }

    fn supported(&self) -> VideoProps {
        VideoProps {
            width: self.settings.width,
            height: self.settings.height,
            frame_rate: self.settings.frame_rate,
            frame_format: Some(FrameFormat::RGBA),
        }
    }

    fn open(&mut self) -> DriverResult<()> {
        if self.settings.width == 0 || self.settings.height == 0 {
            return Err(DriverError::OpenFailed(format!(
                "invalid test pattern size {}x{}",
                self.settings.width, self.settings.height
            )));
        }
        validate_frame_rate(self.settings.frame_rate)?;
        self.running = Some(Arc::new(AtomicBool::new(true)));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }
    }

    fn record(&self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
        let running = self
            .running
            .clone()
            .ok_or_else(|| DriverError::RecordFailed("test pattern is not open".into()))?;

        let supported = self.supported();
        let wanted = requested.video;
        if (wanted.width != 0 && wanted.width != supported.width)
            || (wanted.height != 0 && wanted.height != supported.height)
        {
            return Err(DriverError::FormatNotSupported(format!(
                "requested {}x{}, test pattern produces {}x{}",
                wanted.width, wanted.height, supported.width, supported.height
            )));
        }
        if let Some(format) = wanted.frame_format
            && format != FrameFormat::RGBA
        {
            return Err(DriverError::FormatNotSupported(format!(
                "requested {}, test pattern produces RGBA",
                format
            )));
        }

        let (width, height) = (supported.width, supported.height);
        let start_offset = self.start_offset as u64;
        let mut pacer = Pacer::new(supported.frame_rate);
        let mut sequence = 0u64;

        Ok(Box::new(move || {
            if !running.load(Ordering::SeqCst) {
                return Err(DriverError::EndOfStream);
            }
            pacer.wait();

            let offset = ((start_offset + sequence) % width as u64) as u32;
            let frame = VideoFrame {
                width,
                height,
                format: FrameFormat::RGBA,
                data: Arc::from(color_bars(width, height, offset)),
                sequence,
                captured_at: Instant::now(),
            };
            sequence += 1;
            Ok(frame)
        }))
    }
}

/// Scrolling colour-bar camera
pub struct TestPatternCamera {
    source: BarSource,
}

impl TestPatternCamera {
    pub fn new(settings: TestPatternSettings) -> Self {
        Self {
            source: BarSource::new(settings, 0),
        }
    }
}

impl Adapter for TestPatternCamera {
    fn open(&mut self) -> DriverResult<()> {
        self.source.open()?;
        debug!(size = %self.source.supported(), "Test pattern camera opened");
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.source.close();
        Ok(())
    }

    fn properties(&self) -> Vec<MediaProps> {
        vec![MediaProps::video(self.source.supported())]
    }

    fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
        Some(self)
    }

    fn as_availability_probe(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }
}

impl VideoRecorder for TestPatternCamera {
    fn video_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
        self.source.record(requested)
    }
}

impl AvailabilityProbe for TestPatternCamera {
    fn is_available(&self) -> DriverResult<bool> {
        Ok(true)
    }
}

/// Synthetic display
///
/// Video only; whether a display is present is not probed.
pub struct TestPatternScreen {
    display: u32,
    source: BarSource,
}

impl TestPatternScreen {
    pub fn new(display: u32, settings: TestPatternSettings) -> Self {
        // Shift each display by one bar
        let bar_width = settings.width.div_ceil(BAR_COLORS.len() as u32);
        Self {
            display,
            source: BarSource::new(settings, display.saturating_mul(bar_width)),
        }
    }
}

impl Adapter for TestPatternScreen {
    fn open(&mut self) -> DriverResult<()> {
        self.source.open()?;
        debug!(display = self.display, size = %self.source.supported(), "Test pattern screen opened");
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.source.close();
        Ok(())
    }

    fn properties(&self) -> Vec<MediaProps> {
        vec![MediaProps::video(self.source.supported())]
    }

    fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
        Some(self)
    }
}

impl VideoRecorder for TestPatternScreen {
    fn video_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
        self.source.record(requested)
    }
}

/// Sine-tone microphone
pub struct ToneMicrophone {
    settings: TestPatternSettings,
    running: Option<Arc<AtomicBool>>,
}

impl ToneMicrophone {
    pub fn new(settings: TestPatternSettings) -> Self {
        Self {
            settings,
            running: None,
        }
    }

    fn supported(&self) -> AudioProps {
        AudioProps {
            channel_count: self.settings.channel_count,
            sample_rate: self.settings.sample_rate,
            sample_size: 32,
            latency: self.settings.latency,
            is_float: true,
            is_big_endian: false,
            is_interleaved: true,
        }
    }
}

impl Adapter for ToneMicrophone {
    fn open(&mut self) -> DriverResult<()> {
        if self.settings.sample_rate == 0 || self.settings.channel_count == 0 {
            return Err(DriverError::OpenFailed(
                "test tone needs a sample rate and at least one channel".into(),
            ));
        }
        self.running = Some(Arc::new(AtomicBool::new(true)));
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn properties(&self) -> Vec<MediaProps> {
        vec![MediaProps::audio(self.supported())]
    }

    fn as_audio_recorder(&mut self) -> Option<&mut dyn AudioRecorder> {
        Some(self)
    }
}

impl AudioRecorder for ToneMicrophone {
    fn audio_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn AudioReader>> {
        let running = self
            .running
            .clone()
            .ok_or_else(|| DriverError::RecordFailed("test tone microphone is not open".into()))?;

        let supported = self.supported();
        let wanted = requested.audio;
        if wanted.sample_rate != 0 && wanted.sample_rate != supported.sample_rate {
            return Err(DriverError::FormatNotSupported(format!(
                "requested {}Hz, test tone produces {}Hz",
                wanted.sample_rate, supported.sample_rate
            )));
        }

        // Channel count and chunk length may be chosen by the caller
        let channel_count = if wanted.channel_count != 0 {
            wanted.channel_count
        } else {
            supported.channel_count
        };
        let latency = if wanted.latency.is_zero() {
            supported.latency
        } else {
            wanted.latency
        };
        let sample_rate = supported.sample_rate;
        let tone_hz = self.settings.tone_hz;
        let frames = AudioProps {
            latency,
            ..supported
        }
        .frames_per_chunk()
        .max(1);

        let mut pacer = Pacer::new(1.0 / latency.as_secs_f32().max(f32::EPSILON));
        let mut phase = 0.0f32;
        let mut sequence = 0u64;

        Ok(Box::new(move || {
            if !running.load(Ordering::SeqCst) {
                return Err(DriverError::EndOfStream);
            }
            pacer.wait();

            let (samples, next_phase) = sine_tone(frames, channel_count, sample_rate, tone_hz, phase);
            phase = next_phase;
            let chunk = AudioChunk {
                sample_rate,
                channel_count,
                samples: Arc::from(samples),
                sequence,
                captured_at: Instant::now(),
            };
            sequence += 1;
            Ok(chunk)
        }))
    }
}
