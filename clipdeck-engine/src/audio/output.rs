//! Audio device output using cpal
//!
//! `DeviceBackend` owns one cpal output stream on a dedicated thread (streams
//! are not `Send` on every host). The real-time callback pulls from a single
//! shared voice slot; clips are resampled to the device rate and mapped to its
//! channel count before they are installed.

use crate::audio::resampler::Resampler;
use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use crate::playback::backend::{BackendEvent, BackendEventSender, PlaybackBackend, StartError, VoiceId};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

struct DeviceVoice {
    id: VoiceId,
    /// Interleaved at the device rate and channel count
    samples: Vec<f32>,
    position: usize,
    paused: bool,
    finished: bool,
    events: BackendEventSender,
}

type VoiceSlot = Arc<Mutex<Option<DeviceVoice>>>;

fn lock_slot(slot: &VoiceSlot) -> std::sync::MutexGuard<'_, Option<DeviceVoice>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fill one callback buffer from the voice slot; silence when idle
fn render<T>(slot: &VoiceSlot, data: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    let mut guard = lock_slot(slot);
    let Some(voice) = guard.as_mut().filter(|v| !v.paused && !v.finished) else {
        data.fill(T::EQUILIBRIUM);
        return;
    };

    let available = voice.samples.len() - voice.position;
    let n = available.min(data.len());
    for (out, &s) in data[..n].iter_mut().zip(&voice.samples[voice.position..voice.position + n]) {
        *out = T::from_sample(s);
    }
    data[n..].fill(T::EQUILIBRIUM);
    voice.position += n;

    if voice.position >= voice.samples.len() {
        voice.finished = true;
        let _ = voice.events.send(BackendEvent::Ended(voice.id));
    }
}

enum Command {
    Shutdown,
}

/// Playback backend rendering to a cpal output device
pub struct DeviceBackend {
    slot: VoiceSlot,
    sample_rate: u32,
    channels: usize,
    stream_failed: Arc<AtomicBool>,
    commands: std_mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceBackend {
    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open `device_name` (or the default device) and start its stream.
    ///
    /// An unknown device name falls back to the default device.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let slot: VoiceSlot = Arc::new(Mutex::new(None));
        let stream_failed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(u32, usize)>>();
        let (commands, command_rx) = std_mpsc::channel::<Command>();

        let thread_slot = Arc::clone(&slot);
        let thread_failed = Arc::clone(&stream_failed);
        let thread = std::thread::Builder::new()
            .name("clipdeck-audio".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name, thread_slot, thread_failed) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until shutdown or the backend is dropped
                match command_rx.recv() {
                    Ok(Command::Shutdown) | Err(_) => {}
                }
                drop(stream);
                debug!("Audio output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during setup".to_string()))??;

        Ok(Self {
            slot,
            sample_rate,
            channels,
            stream_failed,
            commands,
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

fn build_stream(
    device_name: Option<String>,
    slot: VoiceSlot,
    failed: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32, usize)> {
    let device = select_device(device_name.as_deref())?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_typed_stream::<f32>(&device, &config, slot, failed)?,
        SampleFormat::I16 => build_typed_stream::<i16>(&device, &config, slot, failed)?,
        SampleFormat::U16 => build_typed_stream::<u16>(&device, &config, slot, failed)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, config.sample_rate.0, config.channels as usize))
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    slot: VoiceSlot,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let error_slot = Arc::clone(&slot);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| render(&slot, data),
            move |err| {
                error!("Audio stream error: {}", err);
                failed.store(true, Ordering::SeqCst);
                if let Some(voice) = lock_slot(&error_slot).as_mut() {
                    if !voice.finished {
                        voice.finished = true;
                        let _ = voice.events.send(BackendEvent::Failed {
                            voice: voice.id,
                            message: err.to_string(),
                        });
                    }
                }
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build output stream: {}", e)))
}

impl PlaybackBackend for DeviceBackend {
    fn name(&self) -> &'static str {
        "device"
    }

    fn prime(&self) {
        // Desktop audio devices need no gesture
    }

    fn start(
        &self,
        voice: VoiceId,
        clip: Arc<PcmBuffer>,
        events: BackendEventSender,
    ) -> std::result::Result<(), StartError> {
        if self.stream_failed.load(Ordering::SeqCst) {
            return Err(StartError::Failed("audio stream has failed".to_string()));
        }

        let resampled = Resampler::resample(&clip, self.sample_rate)
            .map_err(|e| StartError::Failed(e.to_string()))?;
        let samples = Resampler::interleave_for_output(&resampled, self.channels);

        let mut guard = lock_slot(&self.slot);
        if let Some(previous) = guard.as_ref() {
            warn!("{} replaces unreleased {}", voice, previous.id);
        }
        *guard = Some(DeviceVoice {
            id: voice,
            samples,
            position: 0,
            paused: false,
            finished: false,
            events,
        });

        debug!("{} started on device ({} frames)", voice, resampled.frames());
        Ok(())
    }

    fn pause(&self, voice: VoiceId) {
        if let Some(v) = lock_slot(&self.slot).as_mut().filter(|v| v.id == voice) {
            v.paused = true;
        }
    }

    fn resume(&self, voice: VoiceId) {
        if let Some(v) = lock_slot(&self.slot).as_mut().filter(|v| v.id == voice) {
            v.paused = false;
        }
    }

    fn release(&self, voice: VoiceId) {
        let mut guard = lock_slot(&self.slot);
        if guard.as_ref().map(|v| v.id == voice).unwrap_or(false) {
            *guard = None;
            debug!("{} released", voice);
        }
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }
}
