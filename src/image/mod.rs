//! Image grids: borrowed strided views and owned contiguous buffers.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are
//! zero-copy views into the same backing slice and retain the original stride.
//!
//! `Image<T>` owns a contiguous row-major buffer. Diffraction frames are
//! `Image<f32>`; binary masks are [`Mask`] (`Image<u8>`, non-zero = set).

use crate::util::{BraggError, BraggResult};

pub mod downsample;
#[cfg(feature = "image-io")]
pub mod io;

/// Binary mask; a cell is set when it is non-zero.
pub type Mask = Image<u8>;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> BraggResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> BraggResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(BraggError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> BraggResult<Self> {
        if width == 0 || height == 0 {
            return Err(BraggError::InvalidDimensions { width, height });
        }
        let out_of_bounds = BraggError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }
        let start = y * self.stride + x;
        let data = self.data.get(start..).ok_or(BraggError::BufferTooSmall {
            needed: start + 1,
            got: self.data.len(),
        })?;
        ImageView::new(data, width, height, self.stride)
    }

    /// Clips a window that may extend past any edge to the view.
    ///
    /// Returns the in-bounds part as a ROI together with its offset inside
    /// the window, or `None` when the window misses the view entirely.
    pub fn clip(&self, x: i64, y: i64, width: usize, height: usize) -> Option<(Self, (usize, usize))> {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width as i64).min(self.width as i64);
        let y1 = y.saturating_add(height as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let roi = self
            .roi(x0 as usize, y0 as usize, (x1 - x0) as usize, (y1 - y0) as usize)
            .ok()?;
        Some((roi, ((x0 - x) as usize, (y0 - y) as usize)))
    }
}

/// Owned contiguous image buffer in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T = f32> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Image<T> {
    /// Wraps a contiguous buffer of exactly `width * height` elements.
    pub fn new(data: Vec<T>, width: usize, height: usize) -> BraggResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() < needed {
            return Err(BraggError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(BraggError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Builds an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> BraggResult<Self> {
        let needed = required_len(width, height, width)?;
        let mut data = Vec::with_capacity(needed);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns the row-major pixel buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the mutable row-major pixel buffer.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the image and returns its buffer.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x)
    }

    /// Returns a mutable reference to the element at `(x, y)`.
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get_mut(y * self.width + x)
    }

    /// Returns a contiguous slice for row `y`.
    pub fn row(&self, y: usize) -> Option<&[T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.width;
        self.data.get(start..start + self.width)
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Errors unless `other` has the same dimensions.
    pub fn ensure_same_dims<U>(&self, other: &Image<U>) -> BraggResult<()> {
        if self.dims() != other.dims() {
            return Err(BraggError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width: other.width,
                height: other.height,
            });
        }
        Ok(())
    }
}

impl<T: Copy> Image<T> {
    /// Creates an image filled with `value`.
    pub fn filled(width: usize, height: usize, value: T) -> BraggResult<Self> {
        let needed = required_len(width, height, width)?;
        Ok(Self {
            data: vec![value; needed],
            width,
            height,
        })
    }
}

impl Image<u8> {
    /// Number of set cells.
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Returns whether the cell at `(x, y)` is set.
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(|&v| v != 0)
    }
}

impl Image<f32> {
    /// Location and value of the global maximum; the first occurrence wins.
    pub fn argmax(&self) -> (usize, usize, f32) {
        let mut best = (0usize, f32::NEG_INFINITY);
        for (idx, &v) in self.data.iter().enumerate() {
            if v > best.1 {
                best = (idx, v);
            }
        }
        (best.0 % self.width, best.0 / self.width, best.1)
    }

    /// Mean of all pixels.
    pub fn mean(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Element-wise product with an image of the same size.
    pub fn multiply(&self, other: &Image<f32>) -> BraggResult<Image<f32>> {
        self.ensure_same_dims(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a * b)
            .collect();
        Ok(Image {
            data,
            width: self.width,
            height: self.height,
        })
    }

    /// Bilinear sample at a sub-pixel location; `None` outside the image.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f32> {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 || x > max_x || y > max_y {
            return None;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;
        let a = self.data[y0 * self.width + x0];
        let b = self.data[y0 * self.width + x1];
        let c = self.data[y1 * self.width + x0];
        let d = self.data[y1 * self.width + x1];
        Some(
            a * (1.0 - fx) * (1.0 - fy)
                + b * fx * (1.0 - fy)
                + c * (1.0 - fx) * fy
                + d * fx * fy,
        )
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> BraggResult<usize> {
    if width == 0 || height == 0 {
        return Err(BraggError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(BraggError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(BraggError::InvalidDimensions { width, height })
}
