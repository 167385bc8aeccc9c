//! Per-spot maps built from every image's neighbourhood of the spot.
//!
//! Image `i` contributes the `(2r+1)^2` neighbourhood of the spot, read at
//! the spot's position in image `i` and pasted at the image's registered
//! offset. Overlapping contributions are averaged.

use crate::image::Image;
use crate::lattice::Spot;
use crate::register::AlignedAccumulator;
use crate::trace::{trace_event, trace_span};
use crate::util::{BraggError, BraggResult};

/// Averaged neighbourhoods of one spot across the stack.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotMap {
    /// Index into the spot list.
    pub spot: usize,
    pub map: Image<f32>,
    pub counts: Image<u32>,
}

/// Builds one map per spot.
pub fn spot_maps(
    images: &[Image<f32>],
    accumulator: &AlignedAccumulator,
    spots: &[Spot],
    radius: usize,
) -> BraggResult<Vec<SpotMap>> {
    let _span = trace_span!("spot_maps", spots = spots.len(), images = images.len()).entered();
    let offsets: Vec<(usize, (i64, i64))> = (0..images.len())
        .filter_map(|i| accumulator.image_offset(i).map(|o| (i, o)))
        .collect();
    if offsets.is_empty() {
        return Err(BraggError::InvalidInput {
            reason: "no registered images for spot maps",
        });
    }
    let min_x = offsets.iter().map(|(_, o)| o.0).min().unwrap_or(0);
    let max_x = offsets.iter().map(|(_, o)| o.0).max().unwrap_or(0);
    let min_y = offsets.iter().map(|(_, o)| o.1).min().unwrap_or(0);
    let max_y = offsets.iter().map(|(_, o)| o.1).max().unwrap_or(0);
    let side = 2 * radius + 1;
    let map_w = side + (max_x - min_x) as usize;
    let map_h = side + (max_y - min_y) as usize;
    let r = radius as i64;

    let mut maps = Vec::with_capacity(spots.len());
    for (spot_index, spot) in spots.iter().enumerate() {
        let mut sum = vec![0.0f64; map_w * map_h];
        let mut counts = vec![0u32; map_w * map_h];
        for &(i, (ox, oy)) in &offsets {
            let (sx, sy) = accumulator.to_image_coords(i, spot.x as f64, spot.y as f64)?;
            let (sx, sy) = (sx.round() as i64, sy.round() as i64);
            let Some((window, (wx0, wy0))) = images[i].view().clip(sx - r, sy - r, side, side)
            else {
                continue;
            };
            let (px, py) = ((ox - min_x) as usize + wx0, (oy - min_y) as usize + wy0);
            for wy in 0..window.height() {
                let Some(values) = window.row(wy) else {
                    continue;
                };
                let start = (py + wy) * map_w + px;
                for (k, &v) in values.iter().enumerate() {
                    sum[start + k] += v as f64;
                    counts[start + k] += 1;
                }
            }
        }
        let mean = sum
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
            .collect();
        maps.push(SpotMap {
            spot: spot_index,
            map: Image::new(mean, map_w, map_h)?,
            counts: Image::new(counts, map_w, map_h)?,
        });
    }
    trace_event!("spot_maps_built", count = maps.len());
    Ok(maps)
}
