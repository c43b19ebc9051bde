use super::raster::{from_dynamic, to_dynamic, RasterImage};
use crate::pipeline::TransformEstimate;
use crate::{AlignError, Result};
use image::imageops::FilterType;
use ndarray::ArrayView3;
use std::path::{Path, PathBuf};

pub const DEFAULT_SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Supplies raw pixel buffers by identity.
pub trait ImageSource: Send + Sync {
    /// Identities of every image in the working set, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Full-resolution pixels.
    fn load(&self, identity: &str) -> Result<RasterImage>;

    /// Pixel dimensions `(width, height)` without decoding the full image
    /// where the format allows it.
    fn dimensions(&self, identity: &str) -> Result<(u32, u32)>;

    /// Pixels resampled by `factor` (<= 1.0). `1.0` must return the full
    /// resolution image.
    fn load_scaled(&self, identity: &str, factor: f64) -> Result<RasterImage>;

    /// Copy whose longer side is at most `max_dimension`, with the factor
    /// that was applied.
    fn load_working_copy(&self, identity: &str, max_dimension: Option<u32>) -> Result<(RasterImage, f64)> {
        let factor = working_copy_factor(self.dimensions(identity)?, max_dimension);
        Ok((self.load_scaled(identity, factor)?, factor))
    }
}

/// Receives aligned rasters.
pub trait ImageSink: Send + Sync {
    fn write(&self, identity: &str, aligned: ArrayView3<f32>, transform: &TransformEstimate) -> Result<()>;
}

/// Result of looking up a previously written aligned raster.
#[derive(Debug)]
pub enum LookupOutcome {
    /// Nothing written yet; the expected not-yet-computed state.
    Absent,
    Present(RasterImage),
}

/// Factor by which an image with the given dimensions is shrunk so that its
/// longer side does not exceed `max_dimension`. Never enlarges.
pub fn working_copy_factor(dimensions: (u32, u32), max_dimension: Option<u32>) -> f64 {
    let longest = dimensions.0.max(dimensions.1);
    match max_dimension {
        Some(max) if max > 0 && longest > max => max as f64 / longest as f64,
        _ => 1.0,
    }
}

/// Images stored as files directly inside one directory.
#[derive(Debug, Clone)]
pub struct FsImageSource {
    directory: PathBuf,
    suffixes: Vec<String>,
}

impl FsImageSource {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self::with_suffixes(directory, DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_suffixes<P: AsRef<Path>>(directory: P, suffixes: Vec<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            suffixes: suffixes.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_of(&self, identity: &str) -> PathBuf {
        self.directory.join(identity)
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.suffixes.iter().any(|s| s.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn open(&self, identity: &str) -> Result<image::DynamicImage> {
        let path = self.path_of(identity);
        tracing::debug!(path = %path.display(), "Loading image");
        Ok(image::open(&path)?)
    }
}

impl ImageSource for FsImageSource {
    /// Non-recursive; only files with a known raster suffix are listed.
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if !path.is_file() || !self.is_supported(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, identity: &str) -> Result<RasterImage> {
        from_dynamic(&self.open(identity)?)
    }

    fn dimensions(&self, identity: &str) -> Result<(u32, u32)> {
        Ok(image::image_dimensions(self.path_of(identity))?)
    }

    fn load_scaled(&self, identity: &str, factor: f64) -> Result<RasterImage> {
        let image = self.open(identity)?;
        if factor >= 1.0 {
            return from_dynamic(&image);
        }
        let width = ((image.width() as f64 * factor).round() as u32).max(1);
        let height = ((image.height() as f64 * factor).round() as u32).max(1);
        from_dynamic(&image.resize_exact(width, height, FilterType::Triangle))
    }
}

/// Writes aligned rasters to `<directory>/<subdir>/<identity>`.
#[derive(Debug, Clone)]
pub struct PreprocessedDirSink {
    directory: PathBuf,
}

impl PreprocessedDirSink {
    pub fn new<P: AsRef<Path>>(root: P, subdir: &str) -> Self {
        Self {
            directory: root.as_ref().join(subdir),
        }
    }

    pub fn path_of(&self, identity: &str) -> PathBuf {
        self.directory.join(identity)
    }

    /// Distinguishes "never written" from "written but unreadable".
    pub fn lookup(&self, identity: &str) -> Result<LookupOutcome> {
        let path = self.path_of(identity);
        if !path.is_file() {
            return Ok(LookupOutcome::Absent);
        }
        let image = image::open(&path)?;
        Ok(LookupOutcome::Present(from_dynamic(&image)?))
    }
}

impl ImageSink for PreprocessedDirSink {
    fn write(&self, identity: &str, aligned: ArrayView3<f32>, transform: &TransformEstimate) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.path_of(identity);
        let encoded = to_dynamic(aligned)?;
        encoded.save(&path).map_err(AlignError::from)?;
        tracing::info!(
            path = %path.display(),
            rotation = transform.rotation(),
            scale = transform.scale(),
            "Saved aligned image"
        );
        Ok(())
    }
}
