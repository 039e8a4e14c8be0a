// SPDX-License-Identifier: GPL-3.0-only

//! mediadriver - uniform, lifecycle-safe access to capture devices
//!
//! Capture backends implement a small set of capability traits; this crate
//! wraps each one in a [`Device`] that enforces an open/closed lifecycle and
//! stores it in a [`DeviceManager`] for enumeration and default-device
//! selection.
//!
//! # Architecture
//!
//! - [`driver`]: adapter traits, device wrapper, state machine and registry
//! - [`backends`]: built-in test sources plus optional V4L2 and PipeWire
//! - [`config`]: user configuration
//! - [`errors`]: error types
//!
//! # Example
//!
//! ```no_run
//! use mediadriver::{Config, DeviceManager, DeviceType, MediaProps};
//!
//! let manager = DeviceManager::new();
//! mediadriver::backends::register_all(&manager, &Config::default());
//!
//! let camera = manager.default_device(DeviceType::Camera).unwrap();
//! camera.open()?;
//! let mut reader = camera.video_record(&MediaProps::default())?;
//! let frame = reader.read()?;
//! println!("{}x{}", frame.width, frame.height);
//! camera.close()?;
//! # Ok::<(), mediadriver::DriverError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod driver;
pub mod errors;

// Re-export commonly used types
pub use config::Config;
pub use driver::{
    Adapter, AudioChunk, AudioProps, AudioReader, AudioRecorder, AvailabilityProbe, Capabilities,
    Capability, Device, DeviceManager, DeviceType, FrameFormat, Info, MediaProps, Priority, State,
    VideoFrame, VideoProps, VideoReader, VideoRecorder, filter, is_available, wrap_adapter,
};
pub use errors::{ConfigError, DriverError, DriverResult, ErrorKind};
