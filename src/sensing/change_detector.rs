use image::{imageops::FilterType, DynamicImage};
use sha2::{Digest, Sha256};

const HASH_WIDTH: u32 = 200;
const HASH_HEIGHT: u32 = 150;

/// SHA-256 of the frame downscaled to 200x150 RGBA, hex-encoded. Callers
/// compare hashes for exact equality.
pub fn content_hash(image: &DynamicImage) -> String {
    let small = image
        .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
        .to_rgba8();
    hex::encode(Sha256::digest(small.as_raw()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDecision {
    pub changed: bool,
    pub hash: String,
}

/// Exact-hash gate in front of screenshot persistence.
///
/// Not synchronized: it is owned by the single capture task.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_hash: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `image` and commits it as the new reference when it differs.
    pub fn should_capture(&mut self, image: &DynamicImage) -> CaptureDecision {
        let hash = content_hash(image);
        let changed = self.is_new(&hash);
        if changed {
            self.commit(hash.clone());
        }
        CaptureDecision { changed, hash }
    }

    /// Compares without touching the reference.
    pub fn is_new(&self, hash: &str) -> bool {
        self.last_hash.as_deref() != Some(hash)
    }

    /// Makes `hash` the reference. Call once the frame is safely on disk.
    pub fn commit(&mut self, hash: String) {
        self.last_hash = Some(hash);
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}
