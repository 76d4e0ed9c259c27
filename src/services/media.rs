// Media Preparation
// Turns files on disk into classification requests (MIME detection, WAV metadata, size limits)

use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::models::{ClassificationRequest, ContentKind};

/// Largest payload accepted as an inline part.
pub const MAX_INLINE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file is empty: {0}")]
    Empty(String),
    #[error("payload of {size} bytes exceeds the {limit} byte inline limit")]
    TooLarge { size: usize, limit: usize },
    #[error("text file is not valid UTF-8: {0}")]
    NotUtf8(String),
}

/// Caller-supplied values that win over detection.
#[derive(Debug, Clone, Default)]
pub struct MediaOverrides {
    pub mime_type: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Used when an audio file's extension says nothing useful.
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";
/// Used when an image file's extension says nothing useful.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// MIME type guessed from the file extension, constrained to the content kind.
/// A guess of the wrong top-level type falls back to the kind's default.
pub fn mime_type_from_path(path: &Path, kind: ContentKind) -> String {
    let guess = mime_guess::from_path(path);
    let matching = |top: mime_guess::mime::Name<'static>, fallback: &str| {
        guess
            .iter()
            .find(|m| m.type_() == top)
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| fallback.to_string())
    };

    match kind {
        ContentKind::Image => matching(mime_guess::mime::IMAGE, DEFAULT_IMAGE_MIME),
        ContentKind::Audio => matching(mime_guess::mime::AUDIO, DEFAULT_AUDIO_MIME),
        ContentKind::Text => guess.first_or_text_plain().essence_str().to_string(),
    }
}

/// Check an inline payload against the size limit.
pub fn check_inline_size(size: usize) -> Result<(), MediaError> {
    if size > MAX_INLINE_BYTES {
        return Err(MediaError::TooLarge {
            size,
            limit: MAX_INLINE_BYTES,
        });
    }
    Ok(())
}

fn read_u16_le(bytes: &[u8], at: usize) -> Option<u16> {
    let b = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Duration of a PCM WAV file, read from its RIFF chunks.
pub fn wav_duration_seconds(bytes: &[u8]) -> Option<f64> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WAVE" {
        return None;
    }

    let mut byte_rate: Option<u32> = None;
    let mut pos = 12usize;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32_le(bytes, pos + 4)? as usize;
        let body = pos + 8;

        match id {
            b"fmt " => {
                // channels @2, sample_rate @4, byte_rate @8 within the fmt body
                let channels = read_u16_le(bytes, body + 2)?;
                let rate = read_u32_le(bytes, body + 8)?;
                if channels == 0 || rate == 0 {
                    return None;
                }
                byte_rate = Some(rate);
            }
            b"data" => {
                let rate = byte_rate?;
                // Streams written before their length is known carry a bogus size
                let available = bytes.len().saturating_sub(body);
                let data_len = size.min(available);
                return Some(data_len as f64 / rate as f64);
            }
            _ => {}
        }

        // Chunks are word aligned
        pos = body.checked_add(size)?.checked_add(size & 1)?;
    }

    None
}

/// Read a file and build a request of the given kind.
pub async fn load_request(
    path: &Path,
    kind: ContentKind,
    overrides: &MediaOverrides,
) -> Result<ClassificationRequest, MediaError> {
    let path_str = path.display().to_string();
    let bytes = tokio::fs::read(path).await.map_err(|source| MediaError::Io {
        path: path_str.clone(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(MediaError::Empty(path_str));
    }

    let request = match kind {
        ContentKind::Text => {
            let body = String::from_utf8(bytes).map_err(|_| MediaError::NotUtf8(path_str.clone()))?;
            ClassificationRequest::text(body)
        }
        ContentKind::Image => {
            check_inline_size(bytes.len())?;
            let mime = overrides
                .mime_type
                .clone()
                .unwrap_or_else(|| mime_type_from_path(path, kind));
            ClassificationRequest::image(bytes, mime)
        }
        ContentKind::Audio => {
            check_inline_size(bytes.len())?;
            let mime = overrides
                .mime_type
                .clone()
                .unwrap_or_else(|| mime_type_from_path(path, kind));
            let duration = overrides
                .duration_seconds
                .or_else(|| wav_duration_seconds(&bytes))
                .unwrap_or(0.0);
            ClassificationRequest::audio(bytes, mime, duration)
        }
    };

    info!(
        "[MEDIA] Prepared {} request from {} ({} bytes)",
        kind,
        path_str,
        request.payload_len()
    );

    Ok(request)
}
