//! Alignment and averaging of the stack into one accumulator pattern.

use crate::image::Image;
use crate::register::refine::PositionTable;
use crate::util::{BraggError, BraggResult};

/// Mean of all aligned stack pixels, in the accumulator frame.
///
/// Pixel `(u, v)` of the accumulator corresponds to pixel
/// `(u - origin.0 + ox, v - origin.1 + oy)` of an image with rounded offset
/// `(ox, oy)`. The reference image's pixel `(0, 0)` lands on `origin`.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedAccumulator {
    mean: Image<f32>,
    counts: Image<u32>,
    origin: (i64, i64),
    offsets: Vec<Option<(i64, i64)>>,
}

impl AlignedAccumulator {
    /// Accumulates every connected image at its rounded offset.
    pub fn accumulate(images: &[Image<f32>], positions: &PositionTable) -> BraggResult<Self> {
        let first = images.first().ok_or(BraggError::InvalidInput {
            reason: "empty image stack",
        })?;
        if images.len() != positions.len() {
            return Err(BraggError::InvalidInput {
                reason: "position table does not match the stack",
            });
        }
        for img in images {
            first.ensure_same_dims(img)?;
        }
        let offsets: Vec<Option<(i64, i64)>> = positions
            .offsets()
            .iter()
            .map(|o| o.map(|o| o.rounded()))
            .collect();
        let connected: Vec<(i64, i64)> = offsets.iter().flatten().copied().collect();
        let (min_x, max_x) = min_max(connected.iter().map(|o| o.0));
        let (min_y, max_y) = min_max(connected.iter().map(|o| o.1));

        let (w, h) = first.dims();
        let acc_w = w + (max_x - min_x) as usize;
        let acc_h = h + (max_y - min_y) as usize;
        let mut sum = vec![0.0f64; acc_w * acc_h];
        let mut counts = vec![0u32; acc_w * acc_h];

        for (img, offset) in images.iter().zip(&offsets) {
            let Some((ox, oy)) = offset else { continue };
            let u0 = (max_x - ox) as usize;
            let v0 = (max_y - oy) as usize;
            for y in 0..h {
                let src = &img.data()[y * w..(y + 1) * w];
                let base = (v0 + y) * acc_w + u0;
                for (x, &value) in src.iter().enumerate() {
                    sum[base + x] += value as f64;
                    counts[base + x] += 1;
                }
            }
        }

        let mean: Vec<f32> = sum
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
            .collect();

        Ok(Self {
            mean: Image::new(mean, acc_w, acc_h)?,
            counts: Image::new(counts, acc_w, acc_h)?,
            origin: (max_x, max_y),
            offsets,
        })
    }

    /// Accumulator width.
    pub fn width(&self) -> usize {
        self.mean.width()
    }

    /// Accumulator height.
    pub fn height(&self) -> usize {
        self.mean.height()
    }

    /// Per-pixel means; undefined pixels hold zero.
    pub fn mean(&self) -> &Image<f32> {
        &self.mean
    }

    /// Per-pixel overlap counts.
    pub fn counts(&self) -> &Image<u32> {
        &self.counts
    }

    /// Accumulator position of the reference image's `(0, 0)` pixel.
    pub fn origin(&self) -> (i64, i64) {
        self.origin
    }

    /// Rounded offset used for image `index`, `None` if it was not accumulated.
    pub fn image_offset(&self, index: usize) -> Option<(i64, i64)> {
        self.offsets.get(index).copied().flatten()
    }

    /// Mean at `(x, y)`, or `None` where no image overlaps.
    pub fn value(&self, x: usize, y: usize) -> Option<f32> {
        match self.counts.get(x, y) {
            Some(&c) if c > 0 => self.mean.get(x, y).copied(),
            _ => None,
        }
    }

    /// Mean over defined pixels only.
    pub fn defined_mean(&self) -> f32 {
        let (sum, n) = self
            .mean
            .data()
            .iter()
            .zip(self.counts.data())
            .filter(|(_, &c)| c > 0)
            .fold((0.0f64, 0usize), |(s, n), (&v, _)| (s + v as f64, n + 1));
        if n == 0 {
            0.0
        } else {
            (sum / n as f64) as f32
        }
    }

    /// Accumulator image with undefined pixels set to the defined mean.
    pub fn filled(&self) -> Image<f32> {
        let fill = self.defined_mean();
        let mut out = self.mean.clone();
        for (v, &c) in out.data_mut().iter_mut().zip(self.counts.data()) {
            if c == 0 {
                *v = fill;
            }
        }
        out
    }

    /// Maps an accumulator position into the frame of image `index`.
    pub fn to_image_coords(&self, index: usize, x: f64, y: f64) -> BraggResult<(f64, f64)> {
        let (ox, oy) = self
            .image_offset(index)
            .ok_or(BraggError::DisconnectedStack { image: index })?;
        Ok((
            x - self.origin.0 as f64 + ox as f64,
            y - self.origin.1 as f64 + oy as f64,
        ))
    }
}

fn min_max(values: impl Iterator<Item = i64>) -> (i64, i64) {
    values.fold((0, 0), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
