//! Encoder boundary: argument profiles per media kind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assetforge_common::FileKind;
use async_trait::async_trait;

use super::command::ToolCommand;
use super::error::{CompressionError, Result};
use crate::config::CompressionConfig;

/// Fixed constant rate factor for video re-encodes.
pub const VIDEO_CRF: u32 = 23;
pub const VIDEO_PRESET: &str = "medium";
pub const AUDIO_BITRATE: &str = "128k";
/// Longest image side after compression. Smaller images are not enlarged.
pub const IMAGE_MAX_DIMENSION: u32 = 4096;

/// Compresses `input` into `output`, reporting only success or failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path, kind: FileKind) -> Result<()>;
}

/// Reject kinds the pipeline does not compress.
pub fn ensure_supported(kind: FileKind) -> Result<()> {
    if kind.is_compressible() {
        Ok(())
    } else {
        Err(CompressionError::UnsupportedMediaType(kind))
    }
}

/// [`Transcoder`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    image_quality: u32,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            image_quality: config.image_quality,
            timeout: config.encoder_timeout(),
        }
    }

    /// Build the ffmpeg argument list for a kind.
    pub fn arguments(&self, input: &Path, output: &Path, kind: FileKind) -> Result<Vec<String>> {
        ensure_supported(kind)?;

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        if kind == FileKind::Video {
            args.extend([
                "-c:v".to_string(),
                "libx264".to_string(),
                "-crf".to_string(),
                VIDEO_CRF.to_string(),
                "-preset".to_string(),
                VIDEO_PRESET.to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                AUDIO_BITRATE.to_string(),
                "-movflags".to_string(),
                "+faststart".to_string(),
            ]);
        } else {
            args.extend([
                "-vf".to_string(),
                format!(
                    "scale='min({max},iw)':'min({max},ih)':force_original_aspect_ratio=decrease",
                    max = IMAGE_MAX_DIMENSION
                ),
                "-q:v".to_string(),
                self.image_quality.to_string(),
            ]);
        }

        args.push(output.to_string_lossy().to_string());
        Ok(args)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path, kind: FileKind) -> Result<()> {
        let args = self.arguments(input, output, kind)?;

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            %kind,
            "Running encoder"
        );

        ToolCommand::new(self.ffmpeg_path.clone())
            .args(args)
            .timeout(self.timeout)
            .execute()
            .await
            .map_err(|e| CompressionError::Transcode(e.to_string()))?;

        Ok(())
    }
}
