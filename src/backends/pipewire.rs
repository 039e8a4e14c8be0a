// SPDX-License-Identifier: GPL-3.0-only

//! PipeWire microphones
//!
//! Sources are discovered from `pw-dump` and captured through a GStreamer
//! `pipewiresrc ! appsink` pipeline converted to interleaved F32LE. The
//! source marked as default in PipeWire metadata registers with high
//! priority.

use crate::config::Config;
use crate::constants::{AUDIO_PULL_TIMEOUT, DEFAULT_AUDIO_LATENCY};
use crate::driver::{
    Adapter, AudioChunk, AudioProps, AudioReader, AudioRecorder, AvailabilityProbe, DeviceManager,
    DeviceType, Info, MediaProps, Priority,
};
use crate::errors::{DriverError, DriverResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_SOURCE_KEYS: [&str; 2] = ["default.audio.source", "default.configured.audio.source"];
const FALLBACK_SAMPLE_RATE: u32 = 48_000;
const FALLBACK_CHANNELS: u16 = 2;

/// One `Audio/Source` node reported by PipeWire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub name: String,
    pub serial: String,
    pub node_name: String,
    pub is_default: bool,
}

/// Register every PipeWire audio source
pub fn initialize(manager: &DeviceManager, config: &Config) -> usize {
    let sources = enumerate_sources();
    let mut registered = 0;

    for source in sources {
        let label = format!("pipewire:{}", source.node_name);
        let fallback = if source.is_default {
            Priority::High
        } else {
            Priority::Normal
        };
        let info = Info::new(&label, DeviceType::Microphone)
            .with_name(&source.name)
            .with_priority(config.priority_for(&label, fallback));

        match manager.register(PipeWireMicrophone::new(source), info) {
            Ok(_) => registered += 1,
            Err(e) => warn!(label = %label, error = %e, "Failed to register PipeWire source"),
        }
    }

    info!(count = registered, "PipeWire microphones registered");
    registered
}

/// Run `pw-dump` and collect audio sources, default first
pub fn enumerate_sources() -> Vec<AudioSource> {
    let output = match Command::new("pw-dump").output() {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "Failed to run pw-dump");
            return Vec::new();
        }
    };
    if !output.status.success() {
        warn!(status = %output.status, "pw-dump exited with an error");
        return Vec::new();
    }

    match std::str::from_utf8(&output.stdout) {
        Ok(dump) => parse_sources(dump),
        Err(e) => {
            warn!(error = %e, "pw-dump output is not UTF-8");
            Vec::new()
        }
    }
}

/// Extract audio sources from `pw-dump` JSON
pub fn parse_sources(dump: &str) -> Vec<AudioSource> {
    let objects: Vec<serde_json::Value> = match serde_json::from_str(dump) {
        Ok(objects) => objects,
        Err(e) => {
            warn!(error = %e, "Failed to parse pw-dump JSON");
            return Vec::new();
        }
    };

    let default_node = default_source_name(&objects);
    let str_prop = |props: &serde_json::Value, key: &str| {
        props.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };

    let mut sources: Vec<AudioSource> = objects
        .iter()
        .filter_map(|object| object.get("info")?.get("props"))
        .filter(|props| {
            props.get("media.class").and_then(|v| v.as_str()) == Some("Audio/Source")
        })
        .map(|props| {
            let node_name = str_prop(props, "node.name").unwrap_or_default();
            let name = str_prop(props, "node.nick")
                .or_else(|| str_prop(props, "node.description"))
                .unwrap_or_else(|| {
                    if node_name.is_empty() {
                        "Unknown Audio Device".to_string()
                    } else {
                        node_name.clone()
                    }
                });
            // object.serial is a number in recent PipeWire releases
            let serial = props
                .get("object.serial")
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "0".to_string());
            let is_default = default_node.as_deref() == Some(node_name.as_str());

            debug!(name = %name, serial = %serial, is_default, "Found audio source");
            AudioSource {
                name,
                serial,
                node_name,
                is_default,
            }
        })
        .collect();

    sources.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    sources
}

fn default_source_name(objects: &[serde_json::Value]) -> Option<String> {
    let metadata = objects.iter().find(|object| {
        object.get("type").and_then(|v| v.as_str()) == Some("PipeWire:Interface:Metadata")
            && object
                .get("props")
                .and_then(|p| p.get("metadata.name"))
                .and_then(|v| v.as_str())
                == Some("default")
    })?;

    metadata
        .get("metadata")?
        .as_array()?
        .iter()
        .filter(|entry| {
            entry
                .get("key")
                .and_then(|v| v.as_str())
                .is_some_and(|key| DEFAULT_SOURCE_KEYS.contains(&key))
        })
        .find_map(|entry| entry.get("value")?.get("name")?.as_str().map(str::to_string))
}

/// Regroups interleaved samples into chunks of a fixed frame count
///
/// PipeWire buffer sizes follow the graph quantum, not the latency a caller
/// asked for.
struct Rechunker {
    chunk_len: usize,
    pending: Vec<f32>,
}

impl Rechunker {
    fn new(frames_per_chunk: usize, channel_count: u16) -> Self {
        Self {
            chunk_len: frames_per_chunk.max(1) * channel_count.max(1) as usize,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, samples: impl IntoIterator<Item = f32>) {
        self.pending.extend(samples);
    }

    /// Next full chunk, if enough samples are buffered
    fn pop(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.chunk_len {
            return None;
        }
        let rest = self.pending.split_off(self.chunk_len);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// Whatever is left once the stream has ended
    fn flush(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Running capture pipeline
struct Capture {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = ?e, "Failed to stop PipeWire capture pipeline");
        }
    }
}

/// Microphone backed by one PipeWire node
pub struct PipeWireMicrophone {
    source: AudioSource,
    opened: bool,
    /// Shared with readers; dropping the last handle stops the pipeline
    capture: Option<Arc<Capture>>,
}

impl PipeWireMicrophone {
    pub fn new(source: AudioSource) -> Self {
        Self {
            source,
            opened: false,
            capture: None,
        }
    }

    fn default_props() -> AudioProps {
        AudioProps {
            channel_count: FALLBACK_CHANNELS,
            sample_rate: FALLBACK_SAMPLE_RATE,
            sample_size: 32,
            latency: DEFAULT_AUDIO_LATENCY,
            is_float: true,
            is_big_endian: false,
            is_interleaved: true,
        }
    }

    fn launch(&self, props: &AudioProps) -> DriverResult<Capture> {
        let description = format!(
            "pipewiresrc target-object={} ! audioconvert ! audioresample ! \
             audio/x-raw,format=F32LE,layout=interleaved,rate={},channels={} ! \
             appsink name=sink sync=false max-buffers=8 drop=true",
            self.source.serial, props.sample_rate, props.channel_count
        );
        debug!(pipeline = %description, latency = ?props.latency, "Launching PipeWire capture");

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| DriverError::RecordFailed(format!("failed to build pipeline: {e}")))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| DriverError::RecordFailed("element is not a pipeline".into()))?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.dynamic_cast::<AppSink>().ok())
            .ok_or_else(|| DriverError::RecordFailed("pipeline has no appsink".into()))?;

        let capture = Capture { pipeline, appsink };
        capture
            .pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DriverError::RecordFailed(format!("failed to start capture: {e:?}")))?;
        Ok(capture)
    }

    /// Stop the running pipeline, if any
    ///
    /// Readers of the stopped pipeline end with `EndOfStream`.
    fn stop_capture(&mut self) -> DriverResult<()> {
        if let Some(capture) = self.capture.take() {
            capture
                .pipeline
                .set_state(gstreamer::State::Null)
                .map_err(|e| DriverError::Io(format!("failed to stop capture: {e:?}")))?;
            debug!(serial = %self.source.serial, "PipeWire capture stopped");
        }
        Ok(())
    }
}

/// Reader pulling from `capture` in chunks of `props.frames_per_chunk()` frames
fn capture_reader(capture: Arc<Capture>, props: &AudioProps) -> Box<dyn AudioReader> {
    let sample_rate = props.sample_rate;
    let channel_count = props.channel_count;
    let mut rechunker = Rechunker::new(props.frames_per_chunk(), channel_count);
    let mut sequence = 0u64;
    let timeout = gstreamer::ClockTime::from_mseconds(AUDIO_PULL_TIMEOUT.as_millis() as u64);

    Box::new(move || {
        let samples = loop {
            if let Some(samples) = rechunker.pop() {
                break samples;
            }
            if capture.appsink.is_eos() {
                break rechunker.flush().ok_or(DriverError::EndOfStream)?;
            }
            let Some(sample) = capture.appsink.try_pull_sample(timeout) else {
                // Stopped pipelines never report EOS
                if capture.pipeline.current_state() == gstreamer::State::Null {
                    break rechunker.flush().ok_or(DriverError::EndOfStream)?;
                }
                continue;
            };
            let buffer = sample
                .buffer()
                .ok_or_else(|| DriverError::Io("sample without buffer".into()))?;
            let map = buffer
                .map_readable()
                .map_err(|e| DriverError::Io(format!("failed to map buffer: {e}")))?;
            rechunker.push(
                map.as_slice()
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        };

        let chunk = AudioChunk {
            sample_rate,
            channel_count,
            samples: Arc::from(samples),
            sequence,
            captured_at: Instant::now(),
        };
        sequence += 1;
        Ok(chunk)
    })
}

impl Adapter for PipeWireMicrophone {
    fn open(&mut self) -> DriverResult<()> {
        gstreamer::init().map_err(|e| DriverError::OpenFailed(format!("GStreamer init failed: {e}")))?;
        self.opened = true;
        info!(name = %self.source.name, serial = %self.source.serial, "PipeWire microphone opened");
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.opened = false;
        self.stop_capture()
    }

    fn properties(&self) -> Vec<MediaProps> {
        vec![MediaProps {
            device_id: Some(self.source.serial.clone()),
            ..MediaProps::audio(Self::default_props())
        }]
    }

    fn as_audio_recorder(&mut self) -> Option<&mut dyn AudioRecorder> {
        Some(self)
    }

    fn as_availability_probe(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }
}

impl AudioRecorder for PipeWireMicrophone {
    fn audio_record(&mut self, requested: &MediaProps) -> DriverResult<Box<dyn AudioReader>> {
        if !self.opened {
            return Err(DriverError::RecordFailed("microphone is not open".into()));
        }

        let mut props = Self::default_props();
        let wanted = requested.audio;
        if wanted.sample_rate != 0 {
            props.sample_rate = wanted.sample_rate;
        }
        if wanted.channel_count != 0 {
            props.channel_count = wanted.channel_count;
        }
        if !wanted.latency.is_zero() {
            props.latency = wanted.latency;
        }
        if (wanted.sample_size != 0 && wanted.sample_size != 32) || wanted.is_big_endian {
            return Err(DriverError::FormatNotSupported(
                "PipeWire capture delivers 32-bit little-endian float".into(),
            ));
        }

        // One pipeline per node; the previous reader ends here
        self.stop_capture()?;
        let capture = Arc::new(self.launch(&props)?);
        self.capture = Some(Arc::clone(&capture));
        Ok(capture_reader(capture, &props))
    }
}

impl AvailabilityProbe for PipeWireMicrophone {
    /// The node is available while PipeWire still lists it
    fn is_available(&self) -> DriverResult<bool> {
        Ok(enumerate_sources()
            .iter()
            .any(|source| source.node_name == self.source.node_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"[
        {
            "id": 30,
            "type": "PipeWire:Interface:Metadata",
            "props": { "metadata.name": "default" },
            "metadata": [
                { "subject": 0, "key": "default.audio.sink", "value": { "name": "speakers" } },
                { "subject": 0, "key": "default.audio.source", "value": { "name": "alsa_input.usb" } }
            ]
        },
        {
            "id": 41,
            "type": "PipeWire:Interface:Node",
            "info": { "props": {
                "media.class": "Audio/Source",
                "node.name": "alsa_input.pci",
                "node.description": "Built-in Audio",
                "object.serial": 57
            } }
        },
        {
            "id": 42,
            "type": "PipeWire:Interface:Node",
            "info": { "props": {
                "media.class": "Audio/Source",
                "node.name": "alsa_input.usb",
                "node.nick": "USB Mic",
                "object.serial": "63"
            } }
        },
        {
            "id": 43,
            "type": "PipeWire:Interface:Node",
            "info": { "props": { "media.class": "Audio/Sink", "node.name": "speakers" } }
        }
    ]"#;

    #[test]
    fn test_parse_sources_default_first() {
        let sources = parse_sources(DUMP);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "USB Mic");
        assert!(sources[0].is_default);
        assert_eq!(sources[0].serial, "63");
        assert_eq!(sources[1].name, "Built-in Audio");
        assert_eq!(sources[1].serial, "57");
        assert!(!sources[1].is_default);
    }

    #[test]
    fn test_parse_sources_bad_json() {
        assert!(parse_sources("not json").is_empty());
        assert!(parse_sources("[]").is_empty());
    }

    #[test]
    fn test_record_requires_open() {
        let mut mic = PipeWireMicrophone::new(parse_sources(DUMP).remove(0));
        let err = mic.audio_record(&MediaProps::default()).err().unwrap();
        assert!(matches!(err, DriverError::RecordFailed(_)));
        assert_eq!(mic.properties()[0].device_id.as_deref(), Some("63"));
    }

    fn idle_capture() -> Capture {
        gstreamer::init().unwrap();
        let pipeline = gstreamer::Pipeline::new();
        let appsink = AppSink::builder().build();
        pipeline.add(&appsink).unwrap();
        pipeline.set_state(gstreamer::State::Paused).unwrap();
        Capture { pipeline, appsink }
    }

    #[test]
    fn test_rechunker_fixed_chunks() {
        // 3 frames of stereo per chunk
        let mut rechunker = Rechunker::new(3, 2);
        rechunker.push((0..4).map(|i| i as f32));
        assert!(rechunker.pop().is_none());

        rechunker.push((4..14).map(|i| i as f32));
        assert_eq!(rechunker.pop().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(rechunker.pop().unwrap(), vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert!(rechunker.pop().is_none());
        assert_eq!(rechunker.flush().unwrap(), vec![12.0, 13.0]);
        assert!(rechunker.flush().is_none());
    }

    #[test]
    fn test_rechunker_uses_requested_latency() {
        let props = AudioProps {
            sample_rate: 48_000,
            channel_count: 1,
            latency: std::time::Duration::from_millis(10),
            ..PipeWireMicrophone::default_props()
        };
        let mut rechunker = Rechunker::new(props.frames_per_chunk(), props.channel_count);
        // One 1024-frame quantum yields two 480-frame chunks
        rechunker.push(std::iter::repeat_n(0.5, 1024));
        assert_eq!(rechunker.pop().unwrap().len(), 480);
        assert_eq!(rechunker.pop().unwrap().len(), 480);
        assert!(rechunker.pop().is_none());
    }

    #[test]
    fn test_stop_capture_ends_previous_reader() {
        let mut mic = PipeWireMicrophone::new(parse_sources(DUMP).remove(0));
        mic.opened = true;
        let first = Arc::new(idle_capture());
        mic.capture = Some(Arc::clone(&first));
        let mut reader = capture_reader(Arc::clone(&first), &PipeWireMicrophone::default_props());

        mic.stop_capture().unwrap();
        assert!(mic.capture.is_none());
        assert_eq!(first.pipeline.current_state(), gstreamer::State::Null);
        assert!(reader.read().unwrap_err().is_end_of_stream());

        // Nothing left to stop
        mic.stop_capture().unwrap();
        mic.close().unwrap();
    }
}
