// SPDX-License-Identifier: GPL-3.0-only

//! Device registry
//!
//! The manager provides:
//! - Registration of adapters under a unique label
//! - Thread-safe enumeration, filtering and default-device selection
//!
//! One manager is created by the composition root and handed to every
//! backend's `initialize` and to consumers; there is no process-global
//! instance.

use super::adapter::Adapter;
use super::device::{Device, wrap_adapter};
use super::types::{DeviceType, Info};
use crate::errors::{DriverError, DriverResult};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::{info, warn};

/// Predicate used by [`DeviceManager::query`]
pub type FilterFn = Box<dyn Fn(&Device) -> bool + Send + Sync>;

struct Entry {
    device: Device,
    /// Registration order, used to break priority ties
    sequence: u64,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    next_sequence: u64,
}

impl Registry {
    fn ordered_by_registration(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    fn ordered_by_priority(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| (entry.device.priority(), entry.sequence));
        entries
    }
}

/// Catalog of registered devices
///
/// Thread-safe and can be shared across threads; clones share the catalog.
#[derive(Clone, Default)]
pub struct DeviceManager {
    registry: Arc<RwLock<Registry>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `adapter` and store it under `info.label`
    ///
    /// The device is fully constructed before it becomes visible to readers.
    /// Registering a label twice fails with `DuplicateLabel`; the first
    /// device stays registered and the rejected adapter is dropped.
    pub fn register<A>(&self, adapter: A, info: Info) -> DriverResult<Device>
    where
        A: Adapter + 'static,
    {
        self.register_boxed(Box::new(adapter), info)
    }

    /// Same as [`register`](Self::register) for an already boxed adapter
    pub fn register_boxed(&self, adapter: Box<dyn Adapter>, info: Info) -> DriverResult<Device> {
        let label = info.label.clone();
        let device = wrap_adapter(adapter, info);

        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if registry.entries.contains_key(&label) {
            warn!(label = %label, "Device label already registered, ignoring");
            return Err(DriverError::DuplicateLabel(label));
        }

        let sequence = registry.next_sequence;
        registry.next_sequence += 1;
        registry.entries.insert(
            label.clone(),
            Entry {
                device: device.clone(),
                sequence,
            },
        );

        info!(
            label = %label,
            name = %device.name(),
            device_type = ?device.device_type(),
            priority = %device.priority(),
            capabilities = %device.capabilities(),
            "Registered device"
        );
        Ok(device)
    }

    /// Look up a device by label
    pub fn get(&self, label: &str) -> Option<Device> {
        self.read()
            .entries
            .get(label)
            .map(|entry| entry.device.clone())
    }

    /// All devices in registration order
    pub fn devices(&self) -> Vec<Device> {
        self.read()
            .ordered_by_registration()
            .into_iter()
            .map(|entry| entry.device.clone())
            .collect()
    }

    /// Devices accepted by `filter`, best priority first
    ///
    /// The filter runs without the registry lock held, so it may call back
    /// into the manager.
    pub fn query(&self, filter: impl Fn(&Device) -> bool) -> Vec<Device> {
        let ordered: Vec<Device> = self
            .read()
            .ordered_by_priority()
            .into_iter()
            .map(|entry| entry.device.clone())
            .collect();
        ordered.into_iter().filter(|device| filter(device)).collect()
    }

    /// Devices of one type, best priority first
    pub fn devices_by_type(&self, device_type: DeviceType) -> Vec<Device> {
        self.query(filter::device_type(device_type))
    }

    /// Highest-priority device of a type
    ///
    /// Among devices of equal priority the one registered first wins.
    pub fn default_device(&self, device_type: DeviceType) -> Option<Device> {
        self.read()
            .ordered_by_priority()
            .into_iter()
            .find(|entry| entry.device.device_type() == Some(device_type))
            .map(|entry| entry.device.clone())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("devices", &self.devices())
            .finish()
    }
}

/// Composable predicates for [`DeviceManager::query`]
pub mod filter {
    use super::FilterFn;
    use crate::driver::types::{Capability, DeviceType};

    /// Devices of the given type
    pub fn device_type(device_type: DeviceType) -> FilterFn {
        Box::new(move |device| device.device_type() == Some(device_type))
    }

    /// Devices whose adapter implements `capability`
    pub fn capability(capability: Capability) -> FilterFn {
        Box::new(move |device| device.supports(capability))
    }

    pub fn video_recorder() -> FilterFn {
        capability(Capability::VideoRecord)
    }

    pub fn audio_recorder() -> FilterFn {
        capability(Capability::AudioRecord)
    }

    /// Devices accepted by every filter
    pub fn and(filters: Vec<FilterFn>) -> FilterFn {
        Box::new(move |device| filters.iter().all(|f| f(device)))
    }

    /// Devices rejected by `inner`
    pub fn not(inner: FilterFn) -> FilterFn {
        Box::new(move |device| !inner(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::props::MediaProps;
    use crate::driver::types::Priority;

    struct Dummy;

    impl Adapter for Dummy {
        fn open(&mut self) -> DriverResult<()> {
            Ok(())
        }

        fn close(&mut self) -> DriverResult<()> {
            Ok(())
        }

        fn properties(&self) -> Vec<MediaProps> {
            Vec::new()
        }
    }

    fn info(label: &str, device_type: DeviceType, priority: Priority) -> Info {
        Info::new(label, device_type).with_priority(priority)
    }

    #[test]
    fn test_registration_order() {
        let manager = DeviceManager::new();
        for label in ["c", "a", "b"] {
            manager
                .register(Dummy, info(label, DeviceType::Camera, Priority::Normal))
                .unwrap();
        }
        let labels: Vec<String> = manager
            .devices()
            .iter()
            .map(|d| d.label().to_string())
            .collect();
        assert_eq!(labels, vec!["c", "a", "b"]);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_priority_ordering_with_ties() {
        let manager = DeviceManager::new();
        manager
            .register(Dummy, info("low", DeviceType::Camera, Priority::Low))
            .unwrap();
        manager
            .register(Dummy, info("normal-1", DeviceType::Camera, Priority::Normal))
            .unwrap();
        manager
            .register(Dummy, info("high", DeviceType::Camera, Priority::High))
            .unwrap();
        manager
            .register(Dummy, info("normal-2", DeviceType::Camera, Priority::Normal))
            .unwrap();

        let labels: Vec<String> = manager
            .devices_by_type(DeviceType::Camera)
            .iter()
            .map(|d| d.label().to_string())
            .collect();
        assert_eq!(labels, vec!["high", "normal-1", "normal-2", "low"]);
    }

    #[test]
    fn test_default_device_per_type() {
        let manager = DeviceManager::new();
        manager
            .register(Dummy, info("mic", DeviceType::Microphone, Priority::Low))
            .unwrap();
        manager
            .register(Dummy, info("cam", DeviceType::Camera, Priority::Normal))
            .unwrap();

        assert_eq!(
            manager.default_device(DeviceType::Microphone).unwrap().label(),
            "mic"
        );
        assert_eq!(
            manager.default_device(DeviceType::Camera).unwrap().label(),
            "cam"
        );
        assert!(manager.default_device(DeviceType::Screen).is_none());
    }

    #[test]
    fn test_duplicate_label_keeps_first() {
        let manager = DeviceManager::new();
        let first = manager
            .register(Dummy, info("dup", DeviceType::Camera, Priority::Normal))
            .unwrap();
        let err = manager
            .register(Dummy, info("dup", DeviceType::Screen, Priority::High))
            .unwrap_err();
        assert_eq!(err, DriverError::DuplicateLabel("dup".into()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get("dup").unwrap().id(), first.id());
    }

    #[test]
    fn test_filter_combinators() {
        let manager = DeviceManager::new();
        manager
            .register(Dummy, info("cam", DeviceType::Camera, Priority::Normal))
            .unwrap();
        manager
            .register(Dummy, info("screen", DeviceType::Screen, Priority::Normal))
            .unwrap();

        let not_camera = manager.query(filter::not(filter::device_type(DeviceType::Camera)));
        assert_eq!(not_camera.len(), 1);
        assert_eq!(not_camera[0].label(), "screen");

        let none = manager.query(filter::and(vec![
            filter::device_type(DeviceType::Camera),
            filter::video_recorder(),
        ]));
        assert!(none.is_empty());
        assert!(manager.query(filter::audio_recorder()).is_empty());
    }

    #[test]
    fn test_query_filter_may_register() {
        let manager = DeviceManager::new();
        manager
            .register(Dummy, info("cam", DeviceType::Camera, Priority::Normal))
            .unwrap();

        let (done, finished) = std::sync::mpsc::channel();
        let inner = manager.clone();
        std::thread::spawn(move || {
            let matched = inner.query(|device| {
                let label = format!("{}-mirror", device.label());
                inner
                    .register(Dummy, info(&label, DeviceType::Screen, Priority::Low))
                    .is_ok()
            });
            let _ = done.send(matched.len());
        });

        let matched = finished
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("query deadlocked on registration from its filter");
        assert_eq!(matched, 1);
        assert!(manager.get("cam-mirror").is_some());
        assert_eq!(manager.len(), 2);
    }
}
