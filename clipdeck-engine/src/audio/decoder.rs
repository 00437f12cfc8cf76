//! Decode Adapter using symphonia
//!
//! Turns an opaque byte source (memory, file, or streaming reader) into a
//! planar `PcmBuffer`. Video containers contribute their first decodable audio
//! track only.
//!
//! Decoding runs on tokio's blocking pool under a caller-imposed timeout. The
//! symphonia reader/decoder pair lives in a `DecodeContext` that is dropped on
//! every exit path; when the awaiting side gives up (timeout or cancellation)
//! a shared flag makes the worker's next read fail so the context is released
//! promptly. On timeout the adapter waits for that release before reporting.

use crate::audio::types::PcmBuffer;
use crate::audio::wav::dequantize_sample;
use crate::error::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace, warn};

/// Default decode timeout
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a timed-out decode may take to release its context
pub const DEFAULT_RELEASE_GRACE: Duration = Duration::from_secs(2);

/// Input handed to the Decode Adapter
pub enum ByteSource {
    /// Whole file already in memory
    Memory { bytes: Vec<u8>, hint: Option<String> },
    /// Local file; its extension is used as the format hint
    File(PathBuf),
    /// Non-seekable stream (e.g. a network body)
    Reader {
        reader: Box<dyn Read + Send + Sync>,
        hint: Option<String>,
    },
}

impl ByteSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ByteSource::Memory { bytes, hint: None }
    }

    /// Attach a file-extension hint (e.g. `"mp4"`) to speed up probing
    pub fn with_hint(self, extension: impl Into<String>) -> Self {
        let extension = Some(extension.into());
        match self {
            ByteSource::Memory { bytes, .. } => ByteSource::Memory {
                bytes,
                hint: extension,
            },
            ByteSource::Reader { reader, .. } => ByteSource::Reader {
                reader,
                hint: extension,
            },
            file @ ByteSource::File(_) => file,
        }
    }

    fn describe(&self) -> String {
        match self {
            ByteSource::Memory { bytes, .. } => format!("{} in-memory bytes", bytes.len()),
            ByteSource::File(path) => path.display().to_string(),
            ByteSource::Reader { .. } => "stream".to_string(),
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Memory { bytes, hint } => f
                .debug_struct("Memory")
                .field("len", &bytes.len())
                .field("hint", hint)
                .finish(),
            ByteSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ByteSource::Reader { hint, .. } => {
                f.debug_struct("Reader").field("hint", hint).finish_non_exhaustive()
            }
        }
    }
}

/// Shared cancellation flag between the awaiting task and the decode worker
#[derive(Debug, Clone, Default)]
struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raises the flag if the awaiting future is dropped before completion
struct RaiseOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl Drop for RaiseOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.raise();
        }
    }
}

/// Media source wrapper whose reads fail once cancellation is requested
struct CancellableSource {
    inner: Box<dyn MediaSource>,
    cancel: CancelFlag,
}

impl Read for CancellableSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_raised() {
            // Not `Interrupted`: readers retry that kind indefinitely
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "decode cancelled"));
        }
        self.inner.read(buf)
    }
}

impl Seek for CancellableSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for CancellableSource {
    fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }
}

/// Scoped symphonia state for one decode. Dropping it releases the reader,
/// the codec, and the underlying byte source.
struct DecodeContext {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: Option<u32>,
}

impl DecodeContext {
    fn open(source: ByteSource, cancel: &CancelFlag) -> Result<Self> {
        let mut hint = Hint::new();

        let media: Box<dyn MediaSource> = match source {
            ByteSource::Memory { bytes, hint: ext } => {
                if let Some(ext) = ext {
                    hint.with_extension(&ext);
                }
                Box::new(std::io::Cursor::new(bytes))
            }
            ByteSource::File(path) => {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
                let file = File::open(&path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::NotFound(path.display().to_string())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Box::new(file)
            }
            ByteSource::Reader { reader, hint: ext } => {
                if let Some(ext) = ext {
                    hint.with_extension(&ext);
                }
                Box::new(ReadOnlySource::new(reader))
            }
        };

        let media = CancellableSource {
            inner: media,
            cancel: cancel.clone(),
        };
        let mss = MediaSourceStream::new(Box::new(media), Default::default());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        // First decodable audio track; video tracks carry CODEC_TYPE_NULL or
        // an unregistered codec and are skipped
        let track = format
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != CODEC_TYPE_NULL
                    && symphonia::default::get_codecs()
                        .get_codec(t.codec_params.codec)
                        .is_some()
            })
            .ok_or_else(|| Error::UnsupportedFormat("No decodable audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to create decoder: {}", e)))?;

        trace!("Acquired decoding context for track {}", track_id);

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
        })
    }

    /// Decode every packet of the selected track into planar f32
    fn decode_all(&mut self, cancel: &CancelFlag) -> Result<PcmBuffer> {
        let mut planar: Vec<Vec<f32>> = Vec::new();
        let mut skipped_packets = 0usize;

        loop {
            if cancel.is_raised() {
                return Err(Error::Internal("decode cancelled".to_string()));
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    break;
                }
                Err(e) => {
                    return Err(Error::CorruptInput(format!("Failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if self.sample_rate.is_none() {
                        self.sample_rate = Some(decoded.spec().rate);
                    }
                    append_planar(&decoded, &mut planar)?;
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    // Recoverable: symphonia guarantees the next packet is usable
                    warn!("Skipping undecodable packet: {}", msg);
                    skipped_packets += 1;
                }
                Err(e) => {
                    return Err(Error::CorruptInput(format!("Decoder failed: {}", e)));
                }
            }
        }

        let frames = planar.first().map(Vec::len).unwrap_or(0);
        if frames == 0 {
            return Err(Error::CorruptInput(format!(
                "No audio frames decoded ({} packets skipped)",
                skipped_packets
            )));
        }

        let sample_rate = self
            .sample_rate
            .ok_or_else(|| Error::CorruptInput("Sample rate not found".to_string()))?;

        debug!(
            "Decoded {} frames, {} channels @ {}Hz ({} packets skipped)",
            frames,
            planar.len(),
            sample_rate,
            skipped_packets
        );

        PcmBuffer::new(sample_rate, planar)
    }
}

impl Drop for DecodeContext {
    fn drop(&mut self) {
        trace!("Released decoding context for track {}", self.track_id);
    }
}

/// Append one decoded packet to the planar accumulator.
///
/// 16-bit integer PCM uses the encoder's exact inverse quantization so stored
/// clips decode bit-exactly; other formats go through symphonia's conversion.
fn append_planar(decoded: &AudioBufferRef<'_>, planar: &mut Vec<Vec<f32>>) -> Result<()> {
    let channels = decoded.spec().channels.count();

    if planar.is_empty() {
        planar.resize_with(channels, Vec::new);
    } else if planar.len() != channels {
        return Err(Error::CorruptInput(format!(
            "Channel count changed mid-stream: {} -> {}",
            planar.len(),
            channels
        )));
    }

    match decoded {
        AudioBufferRef::S16(buf) => {
            for (ch_idx, out) in planar.iter_mut().enumerate() {
                out.extend(buf.chan(ch_idx).iter().map(|&s| dequantize_sample(s)));
            }
        }
        AudioBufferRef::F32(buf) => {
            for (ch_idx, out) in planar.iter_mut().enumerate() {
                out.extend_from_slice(buf.chan(ch_idx));
            }
        }
        other => {
            let mut converted: AudioBuffer<f32> =
                AudioBuffer::new(other.capacity() as u64, *other.spec());
            other.convert(&mut converted);
            for (ch_idx, out) in planar.iter_mut().enumerate() {
                out.extend_from_slice(converted.chan(ch_idx));
            }
        }
    }

    Ok(())
}

fn decode_blocking(source: ByteSource, cancel: CancelFlag) -> Result<PcmBuffer> {
    let mut context = DecodeContext::open(source, &cancel)?;
    let result = context.decode_all(&cancel);
    drop(context);
    result
}

/// Decode Adapter: byte source in, PCM buffer out, bounded by a timeout
#[derive(Debug, Clone)]
pub struct DecodeAdapter {
    timeout: Duration,
    release_grace: Duration,
}

impl DecodeAdapter {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DECODE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            release_grace: DEFAULT_RELEASE_GRACE,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decode `source` into a PCM buffer.
    ///
    /// # Errors
    /// - `UnsupportedFormat`: unknown container/codec or no audio track
    /// - `CorruptInput`: stream error mid-decode or no frames produced
    /// - `DecodeTimeout`: not finished within the adapter's timeout
    /// - `NotFound` / `Io`: file sources that cannot be opened
    pub async fn decode(&self, source: ByteSource) -> Result<PcmBuffer> {
        let described = source.describe();
        debug!("Decoding {} (timeout {:?})", described, self.timeout);

        let cancel = CancelFlag::default();
        let worker_cancel = cancel.clone();
        let mut guard = RaiseOnDrop {
            flag: cancel.clone(),
            armed: true,
        };

        let mut worker = tokio::task::spawn_blocking(move || decode_blocking(source, worker_cancel));

        match tokio::time::timeout(self.timeout, &mut worker).await {
            Ok(joined) => {
                guard.armed = false;
                joined.map_err(|e| Error::Internal(format!("Decode worker failed: {}", e)))?
            }
            Err(_) => {
                cancel.raise();
                guard.armed = false;
                match tokio::time::timeout(self.release_grace, worker).await {
                    Ok(_) => debug!("Timed-out decode of {} released its context", described),
                    Err(_) => warn!(
                        "Decode worker for {} still running {:?} after timeout",
                        described, self.release_grace
                    ),
                }
                Err(Error::DecodeTimeout(self.timeout))
            }
        }
    }
}

impl Default for DecodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}
