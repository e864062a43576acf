use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use log::{debug, warn};

const JPEG_QUALITY: u8 = 70;

/// Owns the `Screenshots/` directory. All methods block.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `image` as `screenshot_<unix-millis>.jpg` and syncs it to
    /// disk. Never reuses an existing file name, so each event owns its file.
    /// The JPEG is written under a `.part` name and renamed into place, so a
    /// failed save leaves nothing behind.
    pub fn save(&self, image: &DynamicImage, taken_at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.unused_path(taken_at);
        let temp_path = path.with_extension("jpg.part");
        let written = write_jpeg(&temp_path, image).and_then(|()| {
            fs::rename(&temp_path, &path)
                .with_context(|| format!("failed to move screenshot to {}", path.display()))
        });
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {cleanup}", temp_path.display());
                }
            }
            return Err(err);
        }
        Ok(path)
    }

    fn unused_path(&self, taken_at: DateTime<Utc>) -> PathBuf {
        let stem = format!("screenshot_{}", taken_at.timestamp_millis());
        let mut path = self.dir.join(format!("{stem}.jpg"));
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{suffix}.jpg"));
            suffix += 1;
        }
        path
    }

    /// Deletes files last modified more than `max_age` ago, whether or not
    /// their events have been synced yet. Returns how many were removed.
    pub fn sweep_older_than(&self, max_age: Duration) -> Result<usize> {
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return Ok(0);
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to list {}", self.dir.display()))
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry in {}: {err}", self.dir.display());
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(err) => {
                    warn!("Skipping {}: {err}", entry.path().display());
                    continue;
                }
            };

            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(err) => warn!("Failed to remove {}: {err}", entry.path().display()),
                }
            }
        }

        debug!("Screenshot sweep removed {removed} files");
        Ok(removed)
    }
}

fn write_jpeg(path: &Path, image: &DynamicImage) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create screenshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&image.to_rgb8())
        .context("failed to encode screenshot as JPEG")?;
    writer.flush()?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("failed to sync screenshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::solid_frame;

    #[test]
    fn save_writes_a_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path().join("Screenshots"));

        let path = store.save(&solid_frame([200, 10, 10, 255]), Utc::now()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
    }

    #[test]
    fn failed_encode_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path().to_path_buf());
        // JPEG dimensions are limited to 65535 pixels per side.
        let too_wide = DynamicImage::new_rgb8(70_000, 1);

        assert!(store.save(&too_wide, Utc::now()).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let path = store.save(&solid_frame([3, 3, 3, 255]), Utc::now()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(names, vec![path]);
    }

    #[test]
    fn same_timestamp_gets_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path().to_path_buf());
        let at = Utc::now();

        let first = store.save(&solid_frame([0, 0, 0, 255]), at).unwrap();
        let second = store.save(&solid_frame([0, 0, 0, 255]), at).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn sweep_removes_only_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path().to_path_buf());

        let old = store.save(&solid_frame([1, 1, 1, 255]), Utc::now()).unwrap();
        let fresh = store.save(&solid_frame([2, 2, 2, 255]), Utc::now()).unwrap();
        let eight_days_ago = SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(eight_days_ago)
            .unwrap();

        let removed = store
            .sweep_older_than(Duration::from_secs(7 * 24 * 60 * 60))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn sweep_of_missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(dir.path().join("absent"));
        assert_eq!(store.sweep_older_than(Duration::from_secs(1)).unwrap(), 0);
    }
}
