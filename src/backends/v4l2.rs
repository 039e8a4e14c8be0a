// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 cameras
//!
//! Every `/dev/video*` node with the video-capture capability is
//! registered under its path. Capture runs on a dedicated thread that owns
//! the memory-mapped stream and hands frames to the reader over a bounded
//! channel; frames are dropped when the reader falls behind.

use crate::config::Config;
use crate::constants::V4L2_BUFFER_COUNT;
use crate::driver::{
    Adapter, AvailabilityProbe, DeviceManager, DeviceType, FrameFormat, Info, MediaProps,
    Priority, VideoFrame, VideoProps, VideoReader, VideoRecorder,
};
use crate::errors::{DriverError, DriverResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Frames buffered between the capture thread and the reader
const FRAME_QUEUE_DEPTH: usize = 2;

/// Sizes tried against stepwise frame-size ranges
const STEPWISE_SIZES: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];

/// Register every capture-capable V4L2 node
///
/// The first node found is preferred as the default camera.
pub fn initialize(manager: &DeviceManager, config: &Config) -> usize {
    let mut registered = 0;

    for path in video_nodes(Path::new("/dev")) {
        let label = path.to_string_lossy().to_string();
        let card = match Device::with_path(&path).and_then(|dev| dev.query_caps()) {
            Ok(caps) if caps.capabilities.contains(Flags::VIDEO_CAPTURE) => caps.card,
            Ok(_) => {
                debug!(path = %label, "Skipping node without video capture");
                continue;
            }
            Err(e) => {
                debug!(path = %label, error = %e, "Skipping unreadable video node");
                continue;
            }
        };

        let fallback = if registered == 0 {
            Priority::High
        } else {
            Priority::Normal
        };
        let info = Info::new(&label, DeviceType::Camera)
            .with_name(&card)
            .with_priority(config.priority_for(&label, fallback));

        match manager.register(V4l2Camera::new(path), info) {
            Ok(_) => registered += 1,
            Err(e) => warn!(path = %label, error = %e, "Failed to register V4L2 camera"),
        }
    }

    info!(count = registered, "V4L2 cameras registered");
    registered
}

/// `videoN` entries of `dir`, ordered by N
pub fn video_nodes(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to list video nodes");
            return Vec::new();
        }
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let index = entry
                .file_name()
                .to_str()?
                .strip_prefix("video")?
                .parse::<u32>()
                .ok()?;
            Some((index, entry.path()))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, path)| path).collect()
}

/// Discrete modes a node advertises, in driver order
fn supported_modes(dev: &Device) -> Vec<VideoProps> {
    let mut modes = Vec::new();
    let Ok(descriptions) = dev.enum_formats() else {
        return modes;
    };

    for description in descriptions {
        let Some(frame_format) = FrameFormat::from_fourcc(&description.fourcc.repr) else {
            continue;
        };
        let Ok(frame_sizes) = dev.enum_framesizes(description.fourcc) else {
            continue;
        };

        for frame_size in frame_sizes {
            let sizes: Vec<(u32, u32)> = match frame_size.size {
                v4l::framesize::FrameSizeEnum::Discrete(size) => vec![(size.width, size.height)],
                v4l::framesize::FrameSizeEnum::Stepwise(step) => STEPWISE_SIZES
                    .into_iter()
                    .filter(|&(w, h)| {
                        (step.min_width..=step.max_width).contains(&w)
                            && (step.min_height..=step.max_height).contains(&h)
                    })
                    .collect(),
            };

            for (width, height) in sizes {
                let rates = dev
                    .enum_frameintervals(description.fourcc, width, height)
                    .map(|intervals| {
                        intervals
                            .into_iter()
                            .filter_map(|interval| match interval.interval {
                                v4l::frameinterval::FrameIntervalEnum::Discrete(frac)
                                    if frac.numerator > 0 =>
                                {
                                    Some(frac.denominator as f32 / frac.numerator as f32)
                                }
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();

                if rates.is_empty() {
                    modes.push(VideoProps {
                        width,
                        height,
                        frame_rate: 0.0,
                        frame_format: Some(frame_format),
                    });
                }
                modes.extend(rates.into_iter().map(|frame_rate| VideoProps {
                    width,
                    height,
                    frame_rate,
                    frame_format: Some(frame_format),
                }));
            }
        }
    }
    modes
}

/// First mode compatible with every non-zero field of `wanted`
pub fn select_mode(modes: &[VideoProps], wanted: &VideoProps) -> Option<VideoProps> {
    modes.iter().copied().find(|mode| {
        (wanted.width == 0 || wanted.width == mode.width)
            && (wanted.height == 0 || wanted.height == mode.height)
            && (wanted.frame_rate <= 0.0 || (wanted.frame_rate - mode.frame_rate).abs() < 0.5)
            && wanted
                .frame_format
                .is_none_or(|format| Some(format) == mode.frame_format)
    })
}

/// Handle to a running capture thread
struct CaptureThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("V4L2 capture thread panicked");
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Camera backed by one V4L2 node
pub struct V4l2Camera {
    path: PathBuf,
    modes: Vec<VideoProps>,
    capture: Option<CaptureThread>,
}

impl V4l2Camera {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            modes: Vec::new(),
            capture: None,
        }
    }

    fn stop_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            debug!(path = %self.path.display(), "V4L2 capture stopped");
        }
    }
}

impl Adapter for V4l2Camera {
    fn open(&mut self) -> DriverResult<()> {
        let dev = Device::with_path(&self.path).map_err(|e| {
            DriverError::OpenFailed(format!("{}: {e}", self.path.display()))
        })?;
        self.modes = supported_modes(&dev);
        if self.modes.is_empty() {
            return Err(DriverError::OpenFailed(format!(
                "{} advertises no supported formats",
                self.path.display()
            )));
        }
        info!(path = %self.path.display(), modes = self.modes.len(), "V4L2 camera opened");
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.stop_capture();
        self.modes.clear();
        Ok(())
    }

    fn properties(&self) -> Vec<MediaProps> {
        let device_id = self.path.to_string_lossy().to_string();
        self.modes
            .iter()
            .map(|mode| MediaProps {
                device_id: Some(device_id.clone()),
                ..MediaProps::video(*mode)
            })
            .collect()
    }

    fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
        Some(self)
    }

    fn as_availability_probe(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }
}

impl VideoRecorder for V4l2Camera {
    fn video_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
        let mode = select_mode(&self.modes, &requested.video).ok_or_else(|| {
            DriverError::FormatNotSupported(format!(
                "{} cannot deliver {}",
                self.path.display(),
                requested.video
            ))
        })?;
        // One stream per node
        self.stop_capture();

        let running = Arc::new(AtomicBool::new(true));
        let (frame_tx, frame_rx) = mpsc::sync_channel(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = mpsc::channel();

        let path = self.path.clone();
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("v4l2-capture".into())
            .spawn(move || capture_loop(&path, mode, thread_running, ready_tx, frame_tx))
            .map_err(|e| DriverError::RecordFailed(format!("failed to spawn capture thread: {e}")))?;

        let mut capture = CaptureThread {
            running: Arc::clone(&running),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                capture.stop();
                return Err(e);
            }
            Err(_) => {
                capture.stop();
                return Err(DriverError::RecordFailed("capture thread exited".into()));
            }
        }
        self.capture = Some(capture);

        info!(path = %self.path.display(), mode = %mode, "V4L2 capture started");
        Ok(Box::new(FrameReader {
            running,
            frames: frame_rx,
        }))
    }
}

impl AvailabilityProbe for V4l2Camera {
    /// The node still exists and can be opened
    fn is_available(&self) -> DriverResult<bool> {
        Ok(Device::with_path(&self.path).is_ok())
    }
}

struct FrameReader {
    running: Arc<AtomicBool>,
    frames: Receiver<DriverResult<VideoFrame>>,
}

impl VideoReader for FrameReader {
    fn read(&mut self) -> DriverResult<VideoFrame> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DriverError::EndOfStream);
        }
        self.frames.recv().unwrap_or(Err(DriverError::EndOfStream))
    }
}

fn capture_loop(
    path: &Path,
    mode: VideoProps,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<DriverResult<()>>,
    frames: SyncSender<DriverResult<VideoFrame>>,
) {
    let (mut dev, format) = match configure(path, &mode) {
        Ok(configured) => configured,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, V4L2_BUFFER_COUNT)
    {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(DriverError::RecordFailed(format!(
                "failed to create buffer stream: {e}"
            ))));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let (width, height) = (mode.width, mode.height);
    while running.load(Ordering::SeqCst) {
        let frame = match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                Ok(VideoFrame {
                    width,
                    height,
                    format,
                    data: Arc::from(&buf[..used]),
                    sequence: meta.sequence as u64,
                    captured_at: Instant::now(),
                })
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "V4L2 dequeue failed");
                Err(DriverError::Io(e.to_string()))
            }
        };
        let failed = frame.is_err();

        match frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Reader behind, frame dropped"),
            Err(TrySendError::Disconnected(_)) => break,
        }
        if failed {
            break;
        }
    }
    debug!(path = %path.display(), "V4L2 capture loop ended");
}

fn configure(path: &Path, mode: &VideoProps) -> DriverResult<(Device, FrameFormat)> {
    let dev = Device::with_path(path)
        .map_err(|e| DriverError::RecordFailed(format!("{}: {e}", path.display())))?;
    let format = mode
        .frame_format
        .ok_or_else(|| DriverError::FormatNotSupported("no pixel format selected".into()))?;

    let wanted = Format::new(mode.width, mode.height, FourCC::new(&format.fourcc()));
    let applied = dev
        .set_format(&wanted)
        .map_err(|e| DriverError::FormatNotSupported(format!("set_format failed: {e}")))?;
    if applied.width != mode.width
        || applied.height != mode.height
        || applied.fourcc != wanted.fourcc
    {
        return Err(DriverError::FormatNotSupported(format!(
            "driver chose {}x{} {} instead of {}",
            applied.width, applied.height, applied.fourcc, mode
        )));
    }
    Ok((dev, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, frame_rate: f32, format: FrameFormat) -> VideoProps {
        VideoProps {
            width,
            height,
            frame_rate,
            frame_format: Some(format),
        }
    }

    #[test]
    fn test_select_mode() {
        let modes = [
            mode(640, 480, 30.0, FrameFormat::YUY2),
            mode(1280, 720, 30.0, FrameFormat::MJPEG),
            mode(1280, 720, 60.0, FrameFormat::MJPEG),
        ];

        assert_eq!(select_mode(&modes, &VideoProps::default()), Some(modes[0]));
        let hd = VideoProps {
            width: 1280,
            height: 720,
            frame_rate: 60.0,
            frame_format: None,
        };
        assert_eq!(select_mode(&modes, &hd), Some(modes[2]));
        let nv12 = VideoProps {
            frame_format: Some(FrameFormat::NV12),
            ..Default::default()
        };
        assert_eq!(select_mode(&modes, &nv12), None);
    }

    #[test]
    fn test_video_nodes_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["video10", "video2", "video0", "vbi0", "videoX"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let nodes: Vec<String> = video_nodes(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(nodes, vec!["video0", "video2", "video10"]);
    }

    #[test]
    fn test_record_without_modes_fails() {
        let mut camera = V4l2Camera::new(PathBuf::from("/nonexistent/video0"));
        let err = camera.video_record(&MediaProps::default()).err().unwrap();
        assert!(matches!(err, DriverError::FormatNotSupported(_)));
        assert_eq!(camera.is_available(), Ok(false));
        assert!(camera.open().is_err());
    }
}
