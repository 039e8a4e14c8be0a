// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle-guarded device wrapper
//!
//! A [`Device`] owns one [`Adapter`] and:
//! - resolves the adapter's optional capabilities once, in [`wrap_adapter`]
//! - serializes open/close/record on a single adapter lock
//! - closes the adapter as soon as a record call fails
//!
//! State and the properties advertised at open time live in a separate
//! snapshot, so `status()` and `properties()` never wait on a record call
//! blocked inside the adapter.

use super::adapter::{Adapter, AudioReader, VideoReader};
use super::props::MediaProps;
use super::state::{Effect, Event, Step, transition};
use super::types::{Capabilities, Capability, DeviceType, Info, Priority, State};
use crate::errors::{DriverError, DriverResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// State visible to concurrent readers
#[derive(Debug, Default)]
struct Snapshot {
    state: State,
    properties: Vec<MediaProps>,
}

struct DeviceInner {
    id: String,
    info: Info,
    capabilities: Capabilities,
    adapter: Mutex<Box<dyn Adapter>>,
    snapshot: RwLock<Snapshot>,
}

/// Wrapped, lifecycle-guarded capture device
///
/// Cloning is cheap; all clones refer to the same adapter and state.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

/// Wrap an adapter into a [`Device`] in the `Closed` state
///
/// The adapter's capability accessors are queried here and nowhere else.
pub fn wrap_adapter(mut adapter: Box<dyn Adapter>, info: Info) -> Device {
    let capabilities = Capabilities {
        video_record: adapter.as_video_recorder().is_some(),
        audio_record: adapter.as_audio_recorder().is_some(),
        availability_probe: adapter.as_availability_probe().is_some(),
    };

    let id = uuid::Uuid::new_v4().to_string();
    debug!(
        label = %info.label,
        id = %id,
        capabilities = %capabilities,
        "Wrapped adapter"
    );

    Device {
        inner: Arc::new(DeviceInner {
            id,
            info,
            capabilities,
            adapter: Mutex::new(adapter),
            snapshot: RwLock::new(Snapshot::default()),
        }),
    }
}

impl Device {
    /// Random identifier assigned when the adapter was wrapped
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn info(&self) -> &Info {
        &self.inner.info
    }

    pub fn label(&self) -> &str {
        &self.inner.info.label
    }

    pub fn name(&self) -> &str {
        self.inner.info.display_name()
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.inner.info.device_type
    }

    pub fn priority(&self) -> Priority {
        self.inner.info.priority
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.inner.capabilities.contains(capability)
    }

    /// Current lifecycle state
    pub fn status(&self) -> State {
        self.read_snapshot(|snapshot| snapshot.state)
    }

    /// Properties the adapter advertised when it was opened
    ///
    /// Empty while the device is closed.
    pub fn properties(&self) -> Vec<MediaProps> {
        self.read_snapshot(|snapshot| match snapshot.state {
            State::Opened => snapshot.properties.clone(),
            State::Closed => Vec::new(),
        })
    }

    /// Open the adapter
    ///
    /// Fails with `InvalidState` if the device is already open. Adapter
    /// errors are returned unchanged and leave the device closed.
    pub fn open(&self) -> DriverResult<()> {
        let mut adapter = self.lock_adapter();
        let state = self.status();
        self.request(state, Event::OpenRequested, "open")?;

        match adapter.open() {
            Ok(()) => {
                let properties = adapter.properties();
                info!(
                    label = %self.label(),
                    properties = properties.len(),
                    "Device opened"
                );
                self.commit(transition(state, Event::OpenSucceeded).next, properties);
                Ok(())
            }
            Err(err) => {
                warn!(label = %self.label(), error = %err, "Failed to open device");
                self.commit(transition(state, Event::OpenFailed).next, Vec::new());
                Err(err)
            }
        }
    }

    /// Close the adapter
    ///
    /// The device is `Closed` afterwards even if the adapter reports an
    /// error. Closing a closed device is a no-op.
    pub fn close(&self) -> DriverResult<()> {
        let mut adapter = self.lock_adapter();
        let state = self.status();
        let result = self.settle(&mut **adapter, transition(state, Event::CloseRequested));

        match &result {
            Ok(()) if state == State::Opened => info!(label = %self.label(), "Device closed"),
            Ok(()) => debug!(label = %self.label(), "Close on closed device ignored"),
            Err(err) => warn!(label = %self.label(), error = %err, "Adapter failed to close"),
        }
        result
    }

    /// Start video capture
    pub fn video_record(&self, requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
        self.record(Capability::VideoRecord, "video_record", |adapter| {
            match adapter.as_video_recorder() {
                Some(recorder) => recorder.video_record(requested),
                None => Err(DriverError::CapabilityUnsupported(Capability::VideoRecord)),
            }
        })
    }

    /// Start audio capture
    pub fn audio_record(&self, requested: &MediaProps) -> DriverResult<Box<dyn AudioReader>> {
        self.record(Capability::AudioRecord, "audio_record", |adapter| {
            match adapter.as_audio_recorder() {
                Some(recorder) => recorder.audio_record(requested),
                None => Err(DriverError::CapabilityUnsupported(Capability::AudioRecord)),
            }
        })
    }

    /// Shared path for capability-specific record calls
    ///
    /// On adapter failure the adapter is closed before the original error is
    /// returned.
    fn record<R>(
        &self,
        capability: Capability,
        operation: &'static str,
        invoke: impl FnOnce(&mut dyn Adapter) -> DriverResult<R>,
    ) -> DriverResult<R> {
        if !self.supports(capability) {
            return Err(DriverError::CapabilityUnsupported(capability));
        }

        let mut adapter = self.lock_adapter();
        let state = self.status();
        self.request(state, Event::RecordRequested, operation)?;

        match invoke(&mut **adapter) {
            Ok(reader) => {
                debug!(label = %self.label(), operation, "Recording started");
                self.commit_state(transition(state, Event::RecordSucceeded).next);
                Ok(reader)
            }
            Err(err) => {
                warn!(
                    label = %self.label(),
                    operation,
                    error = %err,
                    "Recording failed, closing device"
                );
                let step = transition(state, Event::RecordFailed);
                if let Err(close_err) = self.settle(&mut **adapter, step) {
                    warn!(
                        label = %self.label(),
                        error = %close_err,
                        "Adapter failed to close after recording error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Gate a request through the transition table
    fn request(&self, state: State, event: Event, operation: &'static str) -> DriverResult<()> {
        match transition(state, event).effect {
            Effect::Reject => Err(DriverError::invalid_state(operation, state)),
            _ => Ok(()),
        }
    }

    /// Carry out a step's effect and commit its next state
    ///
    /// The next state is committed even when the adapter's close fails.
    fn settle(&self, adapter: &mut dyn Adapter, step: Step) -> DriverResult<()> {
        let result = match step.effect {
            Effect::CloseAdapter => adapter.close(),
            _ => Ok(()),
        };
        self.commit_state(step.next);
        result
    }

    fn commit(&self, state: State, properties: Vec<MediaProps>) {
        let mut snapshot = self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.state = state;
        snapshot.properties = properties;
    }

    fn commit_state(&self, state: State) {
        let mut snapshot = self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.state = state;
        if state == State::Closed {
            snapshot.properties.clear();
        }
    }

    fn read_snapshot<T>(&self, read: impl FnOnce(&Snapshot) -> T) -> T {
        let snapshot = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        read(&snapshot)
    }

    /// A panicking adapter poisons the lock; keep serving the device anyway
    fn lock_adapter(&self) -> MutexGuard<'_, Box<dyn Adapter>> {
        self.inner
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ask the device whether its hardware can currently be used
///
/// Delegates to the adapter's availability probe and returns its answer
/// unchanged. Devices whose adapter has no probe fail with
/// `CapabilityUnsupported`, whatever their state; callers should read that
/// as "not available".
pub fn is_available(device: &Device) -> DriverResult<bool> {
    if !device.supports(Capability::AvailabilityProbe) {
        return Err(DriverError::CapabilityUnsupported(
            Capability::AvailabilityProbe,
        ));
    }

    let adapter = device.lock_adapter();
    match adapter.as_availability_probe() {
        Some(probe) => probe.is_available(),
        None => Err(DriverError::CapabilityUnsupported(
            Capability::AvailabilityProbe,
        )),
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("label", &self.inner.info.label)
            .field("device_type", &self.inner.info.device_type)
            .field("priority", &self.inner.info.priority)
            .field("capabilities", &self.inner.capabilities)
            .field("state", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::adapter::VideoRecorder;

    struct FailingClose {
        closes: Arc<Mutex<u32>>,
    }

    impl Adapter for FailingClose {
        fn open(&mut self) -> DriverResult<()> {
            Ok(())
        }

        fn close(&mut self) -> DriverResult<()> {
            *self.closes.lock().unwrap() += 1;
            Err(DriverError::Other("close failed".into()))
        }

        fn properties(&self) -> Vec<MediaProps> {
            vec![MediaProps::default()]
        }

        fn as_video_recorder(&mut self) -> Option<&mut dyn VideoRecorder> {
            Some(self)
        }
    }

    impl VideoRecorder for FailingClose {
        fn video_record(&mut self, _requested: &MediaProps) -> DriverResult<Box<dyn VideoReader>> {
            Err(DriverError::RecordFailed("sensor error".into()))
        }
    }

    fn failing_close_device() -> (Device, Arc<Mutex<u32>>) {
        let closes = Arc::new(Mutex::new(0));
        let adapter = FailingClose {
            closes: Arc::clone(&closes),
        };
        (wrap_adapter(Box::new(adapter), Info::default()), closes)
    }

    #[test]
    fn test_close_error_still_closes() {
        let (device, closes) = failing_close_device();
        device.open().unwrap();
        assert_eq!(device.properties().len(), 1);

        let err = device.close().unwrap_err();
        assert_eq!(err, DriverError::Other("close failed".into()));
        assert_eq!(device.status(), State::Closed);
        assert!(device.properties().is_empty());
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn test_record_error_wins_over_close_error() {
        let (device, closes) = failing_close_device();
        device.open().unwrap();

        let err = device.video_record(&MediaProps::default()).err().unwrap();
        assert_eq!(err, DriverError::RecordFailed("sensor error".into()));
        assert_eq!(device.status(), State::Closed);
        assert_eq!(*closes.lock().unwrap(), 1);

        // The auto-close already happened; an explicit close must not repeat it
        device.close().unwrap();
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let (device, _) = failing_close_device();
        device.open().unwrap();
        let err = device.open().unwrap_err();
        assert_eq!(err, DriverError::invalid_state("open", State::Opened));
        assert_eq!(device.status(), State::Opened);
    }

    #[test]
    fn test_unsupported_audio_record() {
        let (device, _) = failing_close_device();
        device.open().unwrap();
        let err = device.audio_record(&MediaProps::default()).err().unwrap();
        assert_eq!(
            err,
            DriverError::CapabilityUnsupported(Capability::AudioRecord)
        );
        // Missing capabilities never trigger the fail-fast close
        assert_eq!(device.status(), State::Opened);
    }

    #[test]
    fn test_debug_output() {
        let (device, _) = failing_close_device();
        let debug = format!("{:?}", device);
        assert!(debug.contains("Device"));
        assert!(debug.contains("Closed"));
        assert!(!device.id().is_empty());
    }
}
