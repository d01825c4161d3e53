//! I/O helpers for grayscale images and JSON.
//!
//! - `load_grayscale_f32`: read a PNG/JPEG/etc. into an owned float image.
//! - `save_grayscale_f32`: write an `ImageF32` to a grayscale PNG.
//! - `write_json_file`: pretty-print a serializable value to disk.
//!
//! Used by the demo binary and tooling; the detection pipeline itself
//! performs no I/O.
use super::ImageF32;
use image::GrayImage;
use image::Luma;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load an image from disk, convert to grayscale and widen to f32
/// (keeping the 0..255 scale).
pub fn load_grayscale_f32(path: &Path) -> Result<ImageF32, String> {
    let img = image::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?
        .into_luma8();
    let w = img.width() as usize;
    let h = img.height() as usize;
    let data = img.into_raw().iter().map(|&v| v as f32).collect();
    Ok(ImageF32::from_vec(w, h, data))
}

/// Save a float image to a grayscale PNG, clamping values to [0, 255].
pub fn save_grayscale_f32(image: &ImageF32, path: &Path) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let mut out = GrayImage::new(image.w as u32, image.h as u32);
    for r in 0..image.h {
        for (c, &px) in image.row(r).iter().enumerate() {
            let v = px.clamp(0.0, 255.0);
            out.put_pixel(c as u32, r as u32, Luma([v as u8]));
        }
    }
    out.save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON for {}: {e}", path.display()))?;
    fs::write(path, json).map_err(|e| format!("Failed to write JSON {}: {e}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    Ok(())
}
