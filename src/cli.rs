// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! Each command builds a fresh [`DeviceManager`] from the configured
//! backends, so the output always reflects what is attached right now.

use mediadriver::backends;
use mediadriver::config::Config;
use mediadriver::driver::{
    AudioProps, Capability, Device, DeviceManager, DeviceType, MediaProps, VideoProps, is_available,
};
use mediadriver::errors::{DriverError, ErrorKind};
use serde_json::json;
use std::time::Instant;
use tracing::warn;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn build_manager(config: &Config) -> DeviceManager {
    let manager = DeviceManager::new();
    backends::register_all(&manager, config);
    manager
}

fn find_device(manager: &DeviceManager, label: &str) -> Result<Device, DriverError> {
    manager
        .get(label)
        .ok_or_else(|| DriverError::DeviceNotFound(label.to_string()))
}

/// `Some(answer)` for probing devices, `None` when unknown
fn availability(device: &Device) -> Option<bool> {
    match is_available(device) {
        Ok(available) => Some(available),
        Err(e) if e.kind() == ErrorKind::CapabilityUnsupported => None,
        Err(e) => {
            warn!(label = %device.label(), error = %e, "Availability probe failed");
            None
        }
    }
}

/// List devices in priority order
pub fn list_devices(config: &Config, kind: Option<DeviceType>, as_json: bool) -> CliResult {
    let manager = build_manager(config);
    let devices = match kind {
        Some(kind) => manager.devices_by_type(kind),
        None => manager.query(|_| true),
    };

    if as_json {
        let entries: Vec<serde_json::Value> = devices
            .iter()
            .map(|device| {
                json!({
                    "id": device.id(),
                    "label": device.label(),
                    "name": device.name(),
                    "type": device.device_type(),
                    "priority": device.priority(),
                    "capabilities": device.capabilities().iter().collect::<Vec<_>>(),
                    "available": availability(device),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices found.");
        println!("Compiled backends: {}", backends::compiled_backends().join(", "));
        return Ok(());
    }

    println!("Devices:");
    println!();
    for device in &devices {
        let device_type = device
            .device_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let available = match availability(device) {
            Some(true) => "available",
            Some(false) => "unavailable",
            None => "unknown",
        };

        println!("  {} ({})", device.label(), device.name());
        println!("      Type: {}, priority: {}", device_type, device.priority());
        println!("      Capabilities: {}", device.capabilities());
        println!("      Availability: {}", available);
        println!();
    }
    Ok(())
}

/// Print the label of the best device of `kind`
pub fn default_device(config: &Config, kind: DeviceType) -> CliResult {
    let manager = build_manager(config);
    match manager.default_device(kind) {
        Some(device) => {
            println!("{}", device.label());
            Ok(())
        }
        None => Err(format!("No {} found", kind).into()),
    }
}

/// Open, print properties, close
pub fn probe_device(config: &Config, label: &str) -> CliResult {
    let manager = build_manager(config);
    let device = find_device(&manager, label)?;

    device.open()?;
    let properties = device.properties();
    println!("{} ({})", device.label(), device.name());
    if properties.is_empty() {
        println!("  No properties reported");
    }
    for props in &properties {
        println!("  {}", props);
    }
    device.close()?;
    Ok(())
}

/// Read `count` frames or chunks and print a summary
pub fn record(config: &Config, label: &str, count: usize, size: Option<(u32, u32)>) -> CliResult {
    let manager = build_manager(config);
    let device = find_device(&manager, label)?;

    device.open()?;
    let result = if device.supports(Capability::VideoRecord) {
        record_video(&device, count, size)
    } else if device.supports(Capability::AudioRecord) {
        record_audio(&device, count)
    } else {
        Err(DriverError::CapabilityUnsupported(Capability::VideoRecord).into())
    };

    // A failed record already closed the device
    if let Err(e) = device.close() {
        warn!(label = %label, error = %e, "Failed to close device");
    }
    result
}

fn record_video(device: &Device, count: usize, size: Option<(u32, u32)>) -> CliResult {
    let (width, height) = size.unwrap_or_default();
    let request = MediaProps::video(VideoProps {
        width,
        height,
        ..Default::default()
    });
    let mut reader = device.video_record(&request)?;

    let start = Instant::now();
    let mut frames = 0usize;
    let mut bytes = 0usize;
    let mut last = None;
    while frames < count {
        match reader.read() {
            Ok(frame) => {
                frames += 1;
                bytes += frame.data.len();
                last = Some(frame);
            }
            Err(DriverError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    match last {
        Some(frame) => println!(
            "Recorded {} frames ({}x{} {}, {} bytes) in {:.2}s ({:.1} fps)",
            frames,
            frame.width,
            frame.height,
            frame.format,
            bytes,
            elapsed,
            frames as f64 / elapsed.max(f64::EPSILON)
        ),
        None => println!("No frames recorded"),
    }
    Ok(())
}

fn record_audio(device: &Device, count: usize) -> CliResult {
    let mut reader = device.audio_record(&MediaProps::audio(AudioProps::default()))?;

    let start = Instant::now();
    let mut chunks = 0usize;
    let mut frames = 0usize;
    let mut peak = 0.0f32;
    let mut format = None;
    while chunks < count {
        match reader.read() {
            Ok(chunk) => {
                chunks += 1;
                frames += chunk.frames();
                peak = peak.max(chunk.peak());
                format = Some((chunk.sample_rate, chunk.channel_count));
            }
            Err(DriverError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        }
    }

    match format {
        Some((sample_rate, channel_count)) => println!(
            "Recorded {} chunks ({} frames, {}Hz x{}) in {:.2}s, peak {:.3}",
            chunks,
            frames,
            sample_rate,
            channel_count,
            start.elapsed().as_secs_f64(),
            peak
        ),
        None => println!("No audio recorded"),
    }
    Ok(())
}

/// Print the effective configuration, or where it lives
pub fn show_config(config: &Config, path_only: bool) -> CliResult {
    if path_only {
        println!("{}", Config::default_path()?.display());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

