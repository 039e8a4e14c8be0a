// SPDX-License-Identifier: GPL-3.0-only

//! Capture backends
//!
//! Each backend discovers its devices and registers them with a
//! [`DeviceManager`] handed in by the caller:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               DeviceManager                 │
//! └────────────────────┬────────────────────────┘
//!                      │ register(adapter, info)
//! ┌────────────────────┴────────────────────────┐
//! │  ┌──────────────┐ ┌────────┐ ┌──────────┐  │
//! │  │ Test pattern │ │  V4L2  │ │ PipeWire │  │
//! │  │ cam/screen/  │ │(camera)│ │  (mic)   │  │
//! │  │     mic      │ │        │ │          │  │
//! │  └──────────────┘ └────────┘ └──────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Hardware backends are opt-in through the `v4l2` and `pipewire` cargo
//! features; a backend that is compiled in can still be disabled in
//! [`Config::backends`](crate::config::Config).

#[cfg(feature = "pipewire")]
pub mod pipewire;
pub mod test_pattern;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use crate::config::Config;
use crate::driver::DeviceManager;
use tracing::{debug, info};

/// Run every enabled backend against `manager`
///
/// Returns the number of devices registered.
pub fn register_all(manager: &DeviceManager, config: &Config) -> usize {
    let mut registered = 0;

    if config.backends.test_pattern {
        registered += test_pattern::initialize(manager, config);
    } else {
        debug!("Test pattern backend disabled");
    }

    #[cfg(feature = "v4l2")]
    {
        if config.backends.v4l2 {
            registered += v4l2::initialize(manager, config);
        } else {
            debug!("V4L2 backend disabled");
        }
    }

    #[cfg(feature = "pipewire")]
    {
        if config.backends.pipewire {
            registered += pipewire::initialize(manager, config);
        } else {
            debug!("PipeWire backend disabled");
        }
    }

    info!(count = registered, "Backends initialized");
    registered
}

/// Names of the backends compiled into this build
pub fn compiled_backends() -> Vec<&'static str> {
    let mut names = vec!["test_pattern"];
    if cfg!(feature = "v4l2") {
        names.push("v4l2");
    }
    if cfg!(feature = "pipewire") {
        names.push("pipewire");
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_backends_register_nothing() {
        let manager = DeviceManager::new();
        let mut config = Config::default();
        config.backends.test_pattern = false;
        config.backends.v4l2 = false;
        config.backends.pipewire = false;
        assert_eq!(register_all(&manager, &config), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_compiled_backends_include_test_pattern() {
        assert_eq!(compiled_backends()[0], "test_pattern");
    }
}
