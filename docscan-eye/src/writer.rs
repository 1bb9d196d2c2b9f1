//! Captured image persistence and archival

use crate::error::CaptureError;
use crate::frame::{encode_jpeg, Frame};
use chrono::Local;
use image::RgbImage;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const JPEG_QUALITY: u8 = 95;
const ID_LEN: usize = 10;
const ARCHIVE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Result of a capped save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// The cap of unarchived images was already reached; nothing was written
    BufferFull,
}

/// Random 10-character alphanumeric identifier
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Writes JPEGs into one output directory and archives them on demand.
///
/// Images sitting directly in the output directory are "pending"; `flush`
/// moves them into a timestamped subdirectory. One writer per directory is
/// assumed: the cap check and the write are not atomic.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    cap: usize,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, cap: usize) -> Result<Self, CaptureError> {
        let output_dir = output_dir.into();
        create_directory(&output_dir)?;
        Ok(Self { output_dir, cap })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Unarchived `*.jpg` files, sorted by name
    pub fn pending_images(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && path.extension().map_or(false, |ext| ext == "jpg") {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    pub fn pending_count(&self) -> Result<usize, CaptureError> {
        Ok(self.pending_images()?.len())
    }

    /// Save one frame as `<id>.jpg`, unless the cap is reached
    pub fn save(&self, frame: &Frame, id: Option<&str>) -> Result<SaveOutcome, CaptureError> {
        let pending = self.pending_count()?;
        if pending >= self.cap {
            info!(
                "{} already holds {} unarchived images, skipping save",
                self.output_dir.display(),
                pending
            );
            return Ok(SaveOutcome::BufferFull);
        }

        let id = id.map(str::to_string).unwrap_or_else(generate_id);
        let path = self.output_dir.join(format!("{}.jpg", id));
        write_jpeg(&frame.to_image()?, &path)?;

        info!("Saved capture {}", path.display());
        Ok(SaveOutcome::Saved(path))
    }

    /// Save a batch under one id: `<id>.jpg` for a single image, otherwise
    /// `<id>_<index>.jpg`. The cap does not apply.
    pub fn save_all(&self, images: &[RgbImage], id: &str) -> Result<Vec<PathBuf>, CaptureError> {
        let mut paths = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let name = if images.len() == 1 {
                format!("{}.jpg", id)
            } else {
                format!("{}_{}.jpg", id, i)
            };
            let path = self.output_dir.join(name);
            write_jpeg(image, &path)?;
            paths.push(path);
        }

        debug!("Saved {} images under id {}", paths.len(), id);
        Ok(paths)
    }

    /// Move every pending image into `<output_dir>/<local timestamp>/`.
    ///
    /// Returns the archive directory, or `None` when nothing was pending.
    pub fn flush(&self) -> Result<Option<PathBuf>, CaptureError> {
        let pending = self.pending_images()?;
        if pending.is_empty() {
            debug!("No images to archive in {}", self.output_dir.display());
            return Ok(None);
        }

        let archive = self.create_archive_dir()?;

        for path in &pending {
            if let Some(name) = path.file_name() {
                fs::rename(path, archive.join(name))?;
            }
        }

        info!("Archived {} images to {}", pending.len(), archive.display());
        Ok(Some(archive))
    }

    /// Fresh timestamped directory; a numeric suffix separates flushes within the same second
    fn create_archive_dir(&self) -> Result<PathBuf, CaptureError> {
        let stamp = Local::now().format(ARCHIVE_FORMAT).to_string();
        let mut archive = self.output_dir.join(&stamp);
        let mut suffix = 0;
        loop {
            match fs::create_dir(&archive) {
                Ok(()) => {
                    info!("Directory created: {}", archive.display());
                    return Ok(archive);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    archive = self.output_dir.join(format!("{}_{}", stamp, suffix));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn create_directory(path: &Path) -> Result<(), CaptureError> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Directory created: {}", path.display());
    }
    Ok(())
}

fn write_jpeg(image: &RgbImage, path: &Path) -> Result<(), CaptureError> {
    let bytes = encode_jpeg(image, JPEG_QUALITY)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_new_creates_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("a").join("b");
        ArtifactWriter::new(&out, 10).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn test_save_with_explicit_id() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path(), 10).unwrap();
        let outcome = writer.save(&Frame::filled(8, 6, [10, 20, 30], 0), Some("abc")).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(dir.path().join("abc.jpg")));
        assert_eq!(writer.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_pending_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path(), 10).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();
        assert_eq!(writer.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_save_all_naming() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path(), 1).unwrap();
        let image = RgbImage::new(4, 4);

        let single = writer.save_all(&[image.clone()], "one").unwrap();
        assert_eq!(single, vec![dir.path().join("one.jpg")]);

        let many = writer.save_all(&[image.clone(), image], "two").unwrap();
        assert_eq!(
            many,
            vec![dir.path().join("two_0.jpg"), dir.path().join("two_1.jpg")]
        );
        // cap of one does not apply to batches
        assert_eq!(writer.pending_count().unwrap(), 3);
    }
}
