use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{MaskError, MaskResult};

/// Extensions offered by the open dialog and accepted on drop.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "tif", "tiff", "ico"];

/// Default file name for exported masks.
pub const MASK_FILE_NAME: &str = "mask.png";

/// Result of decoding an image: pixel dimensions plus the pixels themselves.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: RgbaImage,
    /// Display name, usually the file stem.
    pub name: String,
}

impl DecodedImage {
    /// Wrap already-decoded pixels. Zero-sized images are rejected so a
    /// session never holds a buffer it cannot draw into.
    pub fn from_rgba(pixels: RgbaImage, name: impl Into<String>) -> MaskResult<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(MaskError::Decode(format!("image has no pixels ({}×{})", width, height)));
        }
        Ok(Self {
            width,
            height,
            pixels,
            name: name.into(),
        })
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("name", &self.name)
            .finish()
    }
}

/// Check if a path has one of the supported image extensions.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an in-memory image file (drag-and-drop bytes, uploads).
pub fn decode_image_bytes(bytes: &[u8], name: &str) -> MaskResult<DecodedImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| MaskError::Decode(e.to_string()))?
        .to_rgba8();
    DecodedImage::from_rgba(img, name)
}

/// Decode an image file from disk.
pub fn decode_image_file(path: &Path) -> MaskResult<DecodedImage> {
    let img = image::open(path)
        .map_err(|e| MaskError::Decode(format!("{}: {}", path.display(), e)))?
        .to_rgba8();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());
    DecodedImage::from_rgba(img, name)
}

/// Encode a mask as PNG bytes.
pub fn encode_mask_png(mask: &RgbaImage) -> MaskResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(mask.as_raw(), mask.width(), mask.height(), ColorType::Rgba8)?;
    Ok(out)
}

/// Write a mask as a PNG file.
pub fn write_mask_png(mask: &RgbaImage, path: &Path) -> MaskResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer).write_image(mask.as_raw(), mask.width(), mask.height(), ColorType::Rgba8)?;
    Ok(())
}

// ============================================================================
// FILE HANDLER
// ============================================================================

/// Native dialogs for the desktop front end. Remembers the last directory used.
#[derive(Default)]
pub struct FileHandler {
    pub last_dir: Option<PathBuf>,
}

impl FileHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&mut self, path: &Path) {
        self.last_dir = path.parent().map(Path::to_path_buf);
    }

    /// Ask the user for an image to open.
    pub fn pick_image_path(&mut self) -> Option<PathBuf> {
        let mut dialog = FileDialog::new().add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.pick_file()?;
        self.remember(&path);
        Some(path)
    }

    /// Ask the user where to save the exported mask.
    pub fn pick_export_path(&mut self, suggested_name: &str) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(suggested_name);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let mut path = dialog.save_file()?;
        if path.extension().is_none() {
            path.set_extension("png");
        }
        self.remember(&path);
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image_bytes(b"definitely not an image", "junk").unwrap_err();
        assert!(matches!(err, MaskError::Decode(_)));
        assert!(!err.is_notice());
    }

    #[test]
    fn test_zero_sized_image_is_rejected() {
        assert!(DecodedImage::from_rgba(RgbaImage::new(0, 5), "empty").is_err());
    }

    #[test]
    fn test_exported_png_decodes_to_same_pixels() {
        let mut mask = RgbaImage::new(4, 3);
        mask.put_pixel(1, 2, Rgba([255, 0, 0, 255]));
        let bytes = encode_mask_png(&mask).unwrap();
        let decoded = decode_image_bytes(&bytes, "mask").unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 3));
        assert_eq!(decoded.pixels.as_raw(), mask.as_raw());
    }

    #[test]
    fn test_write_mask_png_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MASK_FILE_NAME);
        write_mask_png(&RgbaImage::new(2, 2), &path).unwrap();
        let decoded = decode_image_file(&path).unwrap();
        assert_eq!(decoded.name, "mask");
        assert_eq!(decoded.pixels.dimensions(), (2, 2));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_image(Path::new("a/b/photo.JPG")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("noext")));
    }
}
