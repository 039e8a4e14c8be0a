// SPDX-License-Identifier: GPL-3.0-only

//! Registration metadata, device state and capability types

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Camera,
    Microphone,
    Screen,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [
        DeviceType::Camera,
        DeviceType::Microphone,
        DeviceType::Screen,
    ];
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Camera => write!(f, "camera"),
            DeviceType::Microphone => write!(f, "microphone"),
            DeviceType::Screen => write!(f, "screen"),
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" | "video" => Ok(DeviceType::Camera),
            "microphone" | "mic" | "audio" => Ok(DeviceType::Microphone),
            "screen" | "display" => Ok(DeviceType::Screen),
            other => Err(format!(
                "unknown device type {:?} (expected camera, microphone or screen)",
                other
            )),
        }
    }
}

/// Ordering hint used to pick a default device of a given type
///
/// Variants are declared from best to worst so that sorting ascending puts
/// `High` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Closed,
    Opened,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Opened => write!(f, "opened"),
        }
    }
}

/// Registration metadata supplied by the backend that owns the adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Unique key in the registry
    pub label: String,
    pub device_type: Option<DeviceType>,
    /// Display name, may be empty
    pub name: String,
    pub priority: Priority,
}

impl Info {
    pub fn new(label: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            label: label.into(),
            device_type: Some(device_type),
            name: String::new(),
            priority: Priority::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Name for display, falling back to the label
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.label
        } else {
            &self.name
        }
    }
}

/// Optional capability an adapter may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    VideoRecord,
    AudioRecord,
    AvailabilityProbe,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::VideoRecord,
        Capability::AudioRecord,
        Capability::AvailabilityProbe,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::VideoRecord => write!(f, "video record"),
            Capability::AudioRecord => write!(f, "audio record"),
            Capability::AvailabilityProbe => write!(f, "availability probe"),
        }
    }
}

/// Set of optional capabilities resolved when an adapter is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub video_record: bool,
    pub audio_record: bool,
    pub availability_probe: bool,
}

impl Capabilities {
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::VideoRecord => self.video_record,
            Capability::AudioRecord => self.audio_record,
            Capability::AvailabilityProbe => self.availability_probe,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Normal];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Normal, Priority::Low]
        );
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_device_type_parsing() {
        assert_eq!("Camera".parse::<DeviceType>(), Ok(DeviceType::Camera));
        assert_eq!("mic".parse::<DeviceType>(), Ok(DeviceType::Microphone));
        assert_eq!(" screen ".parse::<DeviceType>(), Ok(DeviceType::Screen));
        assert!("speaker".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_capabilities_iteration() {
        let caps = Capabilities {
            video_record: true,
            audio_record: false,
            availability_probe: true,
        };
        let listed: Vec<_> = caps.iter().collect();
        assert_eq!(
            listed,
            vec![Capability::VideoRecord, Capability::AvailabilityProbe]
        );
        assert_eq!(caps.to_string(), "video record, availability probe");
        assert_eq!(Capabilities::default().to_string(), "none");
    }

    #[test]
    fn test_info_display_name() {
        let info = Info::new("/dev/video0", DeviceType::Camera);
        assert_eq!(info.display_name(), "/dev/video0");
        assert_eq!(info.priority, Priority::Normal);
        let named = info.with_name("Integrated Webcam");
        assert_eq!(named.display_name(), "Integrated Webcam");
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Priority::Low);
    }
}
