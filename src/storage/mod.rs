//! Object storage for uploaded images and object-name generation.

pub mod signing;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::StorageConfig;

pub use signing::{LocalUrlSigner, SignedUrlIssuer, UrlSigner};

/// Where uploaded bytes end up.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Object store rooted in a local directory.
///
/// Alongside each object it writes a JPEG thumbnail under the thumbnail
/// prefix, standing in for the resize hook a bucket would run.
pub struct FsObjectStore {
    root: PathBuf,
    thumbnail_prefix: String,
    thumbnail_size: u32,
}

impl FsObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            thumbnail_prefix: config.thumbnail_prefix.clone(),
            thumbnail_size: config.thumbnail_size,
        }
    }

    fn object_path(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid object key {:?}", key),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn write_new(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Objects are immutable once written
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn write_thumbnail(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let img = image::load_from_memory(bytes)?;
        let thumbnail = img.thumbnail(self.thumbnail_size, self.thumbnail_size).to_rgb8();

        let path = self.object_path(&format!("{}{}", self.thumbnail_prefix, key))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        thumbnail.save_with_format(&path, image::ImageFormat::Jpeg)?;
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.write_new(key, bytes)?;

        if !key.starts_with(&self.thumbnail_prefix) {
            if let Err(e) = self.write_thumbnail(key, bytes) {
                tracing::warn!(key, error = %e, "Thumbnail generation failed");
            }
        }
        Ok(())
    }
}

/// Generates object names of the form `yyyyMMddHHmmssSSS` + owner id.
#[derive(Debug, Clone)]
pub struct ObjectNamer {
    owner_id: i64,
    offset: FixedOffset,
    thumbnail_prefix: String,
}

impl ObjectNamer {
    pub fn new(config: &StorageConfig) -> Self {
        let offset = FixedOffset::east_opt(config.name_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Self {
            owner_id: config.owner_id,
            offset,
            thumbnail_prefix: config.thumbnail_prefix.clone(),
        }
    }

    /// A fresh name. The millisecond part never repeats within this process,
    /// so two uploads in the same millisecond still get distinct keys.
    pub fn next_name(&self) -> String {
        let millis = next_unique_millis(Utc::now().timestamp_millis());
        format_name(millis, self.offset, self.owner_id)
    }

    pub fn thumbnail_key(&self, name: &str) -> String {
        format!("{}{}", self.thumbnail_prefix, name)
    }
}

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

fn next_unique_millis(now: i64) -> i64 {
    let mut last = LAST_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

fn format_name(millis: i64, offset: FixedOffset, owner_id: i64) -> String {
    let instant = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    format!(
        "{}{}",
        instant.with_timezone(&offset).format("%Y%m%d%H%M%S%3f"),
        owner_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn storage_config(root: &Path) -> StorageConfig {
        StorageConfig {
            root: root.to_path_buf(),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_format_name_uses_offset_and_owner() {
        let instant = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let millis = instant.timestamp_millis() + 123;
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();

        assert_eq!(format_name(millis, kst, 1), "202305010900001231");
        assert_eq!(format_name(millis, Utc.fix(), 42), "2023050100000012342");
    }

    #[test]
    fn test_names_are_unique_under_contention() {
        let namer = ObjectNamer::new(&StorageConfig::default());
        let names: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| (0..50).map(|_| namer.next_name()).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_thumbnail_key() {
        let namer = ObjectNamer::new(&StorageConfig::default());
        assert_eq!(namer.thumbnail_key("abc1"), "thumbnail/abc1");
    }

    #[test]
    fn test_put_writes_object_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(&storage_config(dir.path()));

        let img = image::RgbImage::from_pixel(64, 32, image::Rgb([200, 10, 10]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        store.put("photo1", &bytes).unwrap();

        assert_eq!(fs::read(dir.path().join("photo1")).unwrap(), bytes);
        let thumb = image::open(dir.path().join("thumbnail").join("photo1")).unwrap();
        assert!(thumb.width() <= 256 && thumb.height() <= 256);
    }

    #[test]
    fn test_put_non_image_still_stores_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(&storage_config(dir.path()));

        store.put("blob1", b"not an image").unwrap();

        assert!(dir.path().join("blob1").exists());
        assert!(!dir.path().join("thumbnail").join("blob1").exists());
    }

    #[test]
    fn test_put_refuses_overwrite_and_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(&storage_config(dir.path()));

        store.put("same", b"one").unwrap();
        assert_eq!(
            store.put("same", b"two").unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );
        assert_eq!(
            store.put("../outside", b"x").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(fs::read(dir.path().join("same")).unwrap(), b"one");
    }
}
