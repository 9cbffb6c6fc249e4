//! Spatial intensity accumulation.
//!
//! Projects a time-windowed subset of a buffer's hits onto the 256×256 sensor
//! grid, summing ToT per pixel. The resulting [`Image`] is immutable once it
//! leaves this stage and is what the display side renders, with the fiducial
//! centroid overlaid when one was found.

use crate::event::{EventBuffer, PIXEL_COUNT, SENSOR_DIM};

/// Integer grid coordinate of the fiducial marker, `(row, col)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Centroid {
    /// Row (sensor y).
    pub row: u16,
    /// Column (sensor x).
    pub col: u16,
}

/// Dense 256×256 accumulated-intensity grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    cells: Vec<u32>,
}

impl Image {
    /// An all-zero frame.
    pub fn zeros() -> Self {
        Self {
            cells: vec![0; PIXEL_COUNT],
        }
    }

    /// Cell value at `(row, col)`. Out-of-range coordinates read as 0.
    pub fn get(&self, row: usize, col: usize) -> u32 {
        if row < SENSOR_DIM && col < SENSOR_DIM {
            self.cells[row * SENSOR_DIM + col]
        } else {
            0
        }
    }

    fn add(&mut self, row: usize, col: usize, value: u32) {
        self.cells[row * SENSOR_DIM + col] += value;
    }

    /// Sum of all cell values.
    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&v| u64::from(v)).sum()
    }

    /// Maximum cell value over the whole frame.
    pub fn max(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    /// Row-major view of the grid, `SENSOR_DIM * SENSOR_DIM` cells.
    pub fn as_slice(&self) -> &[u32] {
        &self.cells
    }

    /// Normalization maximum for display rendering.
    ///
    /// The display scales the frame by the peak intensity near the fiducial
    /// (a `±radius` box around the centroid). When no centroid was found, or
    /// the box contains only zeros, this falls back to the whole-frame
    /// maximum instead of producing a degenerate divisor.
    pub fn display_max(&self, centroid: Option<Centroid>, radius: u16) -> u32 {
        let boxed = centroid.map_or(0, |c| {
            let row_lo = c.row.saturating_sub(radius) as usize;
            let col_lo = c.col.saturating_sub(radius) as usize;
            let row_hi = (c.row as usize + radius as usize).min(SENSOR_DIM - 1);
            let col_hi = (c.col as usize + radius as usize).min(SENSOR_DIM - 1);
            let mut max = 0;
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    max = max.max(self.get(row, col));
                }
            }
            max
        });
        if boxed > 0 {
            boxed
        } else {
            self.max()
        }
    }
}

/// Accumulates hits with corrected ToA in `[window_lo_ns, window_hi_ns)` into
/// an intensity image, summing ToT per pixel.
///
/// Duplicate hits on the same pixel accumulate; the total of all cells equals
/// the sum of ToT over the selected hits.
pub fn accumulate_window(buffer: &EventBuffer, window_lo_ns: f64, window_hi_ns: f64) -> Image {
    let mut image = Image::zeros();
    for hit in buffer.hits() {
        if hit.toa_ns >= window_lo_ns && hit.toa_ns < window_hi_ns {
            image.add(hit.y() as usize, hit.x() as usize, u32::from(hit.tot));
        }
    }
    image
}
