// SPDX-License-Identifier: GPL-3.0-only

//! Device layer
//!
//! Turns capture backends into uniform, lifecycle-safe devices.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │      Consumers      │
//! └──────────┬──────────┘
//!            │ query / default_device
//!            ▼
//! ┌─────────────────────┐
//! │    DeviceManager    │  ← label → Device, priority ordering
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │       Device        │  ← Closed/Opened state machine, fail-fast close
//! └──────────┬──────────┘
//!            │ capabilities resolved once at wrap time
//!            ▼
//! ┌─────────────────────┐
//! │   Adapter (+ Video, │  ← backend implementation
//! │ Audio, Availability)│
//! └─────────────────────┘
//! ```

pub mod adapter;
pub mod device;
pub mod manager;
pub mod props;
pub mod state;
pub mod types;

pub use adapter::{
    Adapter, AudioChunk, AudioReader, AudioRecorder, AvailabilityProbe, VideoFrame, VideoReader,
    VideoRecorder,
};
pub use device::{Device, is_available, wrap_adapter};
pub use manager::{DeviceManager, FilterFn, filter};
pub use props::{AudioProps, FrameFormat, MediaProps, VideoProps};
pub use types::{Capabilities, Capability, DeviceType, Info, Priority, State};
