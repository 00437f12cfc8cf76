//! Trim pipeline: decode → trim → encode → (optionally) save

use crate::audio::decoder::{ByteSource, DecodeAdapter};
use crate::audio::types::{EncodedClip, TrimRange};
use crate::audio::{trim, wav};
use crate::error::Result;
use crate::store::SoundStore;
use clipdeck_common::SoundRecord;
use tracing::info;

pub struct ClipPipeline {
    decoder: DecodeAdapter,
}

impl ClipPipeline {
    pub fn new(decoder: DecodeAdapter) -> Self {
        Self { decoder }
    }

    /// Decode `source`, cut `range` out of it, and encode the result as WAV.
    ///
    /// The range is validated before decoding so a bad request never pays
    /// for a decode.
    pub async fn trim_to_clip(&self, source: ByteSource, range: TrimRange) -> Result<EncodedClip> {
        range.validate()?;

        let pcm = self.decoder.decode(source).await?;
        let trimmed = trim::trim(&pcm, range)?;
        let clip = wav::encode(&trimmed)?;

        info!(
            "Trimmed {:.3}s-{:.3}s of a {:.3}s source into {} bytes",
            range.start_seconds,
            range.end_seconds,
            pcm.duration_seconds(),
            clip.byte_length()
        );
        Ok(clip)
    }

    /// `trim_to_clip`, then persist the clip under `title`
    pub async fn trim_and_save(
        &self,
        source: ByteSource,
        range: TrimRange,
        title: &str,
        store: &dyn SoundStore,
    ) -> Result<SoundRecord> {
        let clip = self.trim_to_clip(source, range).await?;
        store.save(&clip, title).await
    }
}

impl Default for ClipPipeline {
    fn default() -> Self {
        Self::new(DecodeAdapter::new())
    }
}
