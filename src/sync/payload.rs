use std::{fs, io::ErrorKind, path::Path};

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::SecondsFormat;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use log::warn;
use serde::Serialize;

use crate::db::{Event, EventKind, Metadata};

use super::error::DeliveryError;

/// Files at or above this size are downscaled and re-encoded before upload.
pub const INLINE_SCREENSHOT_LIMIT: usize = 500_000;
const UPLOAD_JPEG_QUALITY: u8 = 60;

/// Wire form of one event: one JSON object per POST.
#[derive(Debug, Serialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub app_name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl EventPayload {
    pub fn from_event(event: &Event, screenshot: Option<&[u8]>) -> Self {
        Self {
            kind: event.kind,
            app_name: event.app_name.clone(),
            timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            window_title: event.window_title.clone(),
            metadata: event.metadata.clone(),
            screenshot: screenshot.map(|bytes| STANDARD.encode(bytes)),
        }
    }

    pub fn to_body(&self, event_id: i64) -> Result<Vec<u8>, DeliveryError> {
        serde_json::to_vec(self)
            .map_err(|source| DeliveryError::Serialization { event_id, source })
    }
}

/// Reads a screenshot for upload. Blocking.
///
/// Returns `None` when the file is gone or unusable; the age-based sweep
/// may legitimately have removed it before its event was synced.
pub fn load_screenshot(path: &Path, max_edge: u32) -> Option<Vec<u8>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(
                "Screenshot {} no longer exists; sending event without it",
                path.display()
            );
            return None;
        }
        Err(err) => {
            warn!("Error loading screenshot {}: {err}", path.display());
            return None;
        }
    };

    if bytes.len() < INLINE_SCREENSHOT_LIMIT {
        return Some(bytes);
    }

    match shrink_for_upload(&bytes, max_edge) {
        Ok(compressed) => Some(compressed),
        Err(err) => {
            warn!("Could not re-encode screenshot {}: {err}", path.display());
            None
        }
    }
}

fn shrink_for_upload(bytes: &[u8], max_edge: u32) -> Result<Vec<u8>> {
    let max_edge = max_edge.max(1);
    let mut image = image::load_from_memory(bytes)?;
    if image.width().max(image.height()) > max_edge {
        image = image.resize(max_edge, max_edge, FilterType::Triangle);
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, UPLOAD_JPEG_QUALITY).encode_image(&image.to_rgb8())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};

    fn sample_event() -> Event {
        Event {
            id: 7,
            kind: EventKind::WindowChange,
            app_name: "Xcode".into(),
            window_title: None,
            screenshot_path: None,
            metadata: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap(),
            synced: false,
        }
    }

    fn body_json(payload: &EventPayload) -> Value {
        serde_json::from_slice(&payload.to_body(7).unwrap()).unwrap()
    }

    #[test]
    fn minimal_event_omits_optional_fields() {
        let body = body_json(&EventPayload::from_event(&sample_event(), None));
        assert_eq!(
            body,
            json!({
                "type": "window_change",
                "app_name": "Xcode",
                "timestamp": "2024-03-09T14:30:05Z",
            })
        );
    }

    #[test]
    fn optional_fields_and_screenshot_are_included() {
        let mut event = sample_event();
        event.kind = EventKind::Screenshot;
        event.window_title = Some("main.swift".into());
        let mut metadata = Metadata::new();
        metadata.insert("width".into(), json!(1440));
        event.metadata = Some(metadata);

        let body = body_json(&EventPayload::from_event(&event, Some(b"jpeg-bytes")));
        assert_eq!(body["type"], "screenshot");
        assert_eq!(body["window_title"], "main.swift");
        assert_eq!(body["metadata"]["width"], 1440);
        assert_eq!(body["screenshot"], STANDARD.encode(b"jpeg-bytes"));
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_screenshot(&dir.path().join("gone.jpg"), 1920), None);
    }

    #[test]
    fn small_files_are_sent_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();
        assert_eq!(load_screenshot(&path, 1920).as_deref(), Some(&b"not really a jpeg"[..]));
    }

    #[test]
    fn large_files_are_downscaled_to_max_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.png");

        // Pseudo-random pixels keep the PNG well above the inline limit.
        let mut seed: u32 = 0x2545_f491;
        let noisy = RgbImage::from_fn(1600, 900, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            Rgb([r, g, b])
        });
        noisy.save_with_format(&path, ImageFormat::Png).unwrap();
        assert!(fs::metadata(&path).unwrap().len() as usize >= INLINE_SCREENSHOT_LIMIT);

        let uploaded = load_screenshot(&path, 800).unwrap();
        let decoded = image::load_from_memory(&uploaded).unwrap();
        assert_eq!(image::guess_format(&uploaded).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 450);
    }

    #[test]
    fn large_undecodable_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.jpg");
        fs::write(&path, vec![0xAB; INLINE_SCREENSHOT_LIMIT + 1]).unwrap();
        assert_eq!(load_screenshot(&path, 1920), None);
    }
}
