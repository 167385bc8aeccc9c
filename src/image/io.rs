//! Loading diffraction frames through the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Frames are converted to
//! single-channel `f32` intensities in `[0, 1]`.

use crate::image::Image;
use crate::util::{BraggError, BraggResult};
use std::path::Path;

/// Converts a decoded image to a grayscale `f32` frame.
pub fn frame_from_dynamic_image(img: &image::DynamicImage) -> BraggResult<Image<f32>> {
    let gray = img.to_luma32f();
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    Image::new(gray.into_raw(), width, height)
}

/// Loads a frame from disk.
pub fn load_frame<P: AsRef<Path>>(path: P) -> BraggResult<Image<f32>> {
    let img = image::open(path).map_err(|err| BraggError::ImageIo {
        reason: err.to_string(),
    })?;
    frame_from_dynamic_image(&img)
}

/// Loads an ordered stack of frames, failing on the first unreadable file.
pub fn load_stack<P: AsRef<Path>>(paths: &[P]) -> BraggResult<Vec<Image<f32>>> {
    paths.iter().map(load_frame).collect()
}
