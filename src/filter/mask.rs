//! Annulus and circle masks and masked extraction.

use crate::image::{Image, Mask};
use crate::util::{BraggError, BraggResult};

/// Square mask whose set cells lie at Euclidean distance in
/// `[inner_radius, outer_radius]` from the centre cell.
///
/// `size` must be odd so the centre falls on a cell; the mask is then
/// symmetric under 90° rotation.
pub fn annular_mask(size: usize, inner_radius: f64, outer_radius: f64) -> BraggResult<Mask> {
    if size % 2 == 0 {
        return Err(BraggError::InvalidInput {
            reason: "mask size must be odd",
        });
    }
    if !(inner_radius >= 0.0) || !(outer_radius >= inner_radius) {
        return Err(BraggError::InvalidInput {
            reason: "annulus radii must satisfy 0 <= inner <= outer",
        });
    }
    let origin = (size / 2) as f64;
    Image::from_fn(size, size, |x, y| {
        let dx = x as f64 - origin;
        let dy = y as f64 - origin;
        let dist = (dx * dx + dy * dy).sqrt();
        u8::from(dist >= inner_radius && dist <= outer_radius)
    })
}

/// Filled disc mask of the given radius; `size` must be odd.
pub fn circular_mask(size: usize, radius: f64) -> BraggResult<Mask> {
    annular_mask(size, 0.0, radius)
}

/// Pixels of an image selected by a mask placed at some offset.
///
/// `points` are image coordinates `[x, y]`; `values` are the matching pixel
/// values, both in mask row-major order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaskedRegion {
    pub points: Vec<[f64; 2]>,
    pub values: Vec<f32>,
}

impl MaskedRegion {
    /// Number of extracted pixels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Extracted pixel values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Keeps only the entries whose flag is true.
    pub fn retain_flags(&self, keep: &[bool]) -> MaskedRegion {
        let mut out = MaskedRegion::default();
        for ((p, &v), &k) in self.points.iter().zip(&self.values).zip(keep) {
            if k {
                out.points.push(*p);
                out.values.push(v);
            }
        }
        out
    }
}

/// Extracts the pixels under the set cells of `mask` with its top-left cell
/// at `top_left` (image coordinates, may be negative).
///
/// Cells falling outside the image are clipped. Fails with
/// [`BraggError::RegionEmpty`] when clipping removes every set cell.
pub fn extract_masked_region(
    image: &Image<f32>,
    mask: &Mask,
    top_left: (i64, i64),
) -> BraggResult<MaskedRegion> {
    let (tx, ty) = top_left;
    let mut region = MaskedRegion::default();
    if let Some((window, (mx, my))) = image.view().clip(tx, ty, mask.width(), mask.height()) {
        let cells = mask.view().roi(mx, my, window.width(), window.height())?;
        for wy in 0..window.height() {
            let (Some(values), Some(set)) = (window.row(wy), cells.row(wy)) else {
                continue;
            };
            let iy = ty + (my + wy) as i64;
            for (wx, (&v, &m)) in values.iter().zip(set).enumerate() {
                if m == 0 {
                    continue;
                }
                let ix = tx + (mx + wx) as i64;
                region.points.push([ix as f64, iy as f64]);
                region.values.push(v);
            }
        }
    }

    if region.is_empty() {
        return Err(BraggError::RegionEmpty { x: tx, y: ty });
    }
    Ok(region)
}

/// Sets every pixel within `radius` of `(cx, cy)` to zero.
pub fn blacken_circle(image: &mut Image<f32>, cx: f64, cy: f64, radius: f64) {
    let (w, h) = image.dims();
    let x_lo = (cx - radius).floor().max(0.0) as usize;
    let y_lo = (cy - radius).floor().max(0.0) as usize;
    let x_hi = ((cx + radius).ceil().max(-1.0) as i64).min(w as i64 - 1);
    let y_hi = ((cy + radius).ceil().max(-1.0) as i64).min(h as i64 - 1);
    if x_hi < 0 || y_hi < 0 {
        return;
    }
    let r2 = radius * radius;
    for y in y_lo..=y_hi as usize {
        for x in x_lo..=x_hi as usize {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r2 {
                if let Some(v) = image.get_mut(x, y) {
                    *v = 0.0;
                }
            }
        }
    }
}
