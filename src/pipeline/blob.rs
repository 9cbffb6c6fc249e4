//! Fiducial marker detection.
//!
//! Labels 4-connected components of non-zero cells in the accumulated image,
//! discards components below the configured pixel count, and reports the
//! centroid of the first surviving component in label order. Label order is
//! row-major scan order, which makes the tie-break deterministic but
//! otherwise arbitrary; the selection policy is preserved from instrument
//! commissioning and is not "largest" or "brightest".

use crate::event::SENSOR_DIM;
use crate::pipeline::image::{Centroid, Image};

/// A connected bright region that survived the size filter.
#[derive(Clone, Debug)]
pub struct Blob {
    /// Number of member cells.
    pub pixel_count: usize,
    /// Intensity-weighted center of mass over the member cells, rounded to
    /// the nearest grid coordinate.
    pub centroid: Centroid,
}

/// Labels connected components and returns those with at least `min_pixels`
/// member cells, in label (row-major scan) order.
pub fn surviving_blobs(image: &Image, min_pixels: usize) -> Vec<Blob> {
    let mut visited = vec![false; SENSOR_DIM * SENSOR_DIM];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for row in 0..SENSOR_DIM {
        for col in 0..SENSOR_DIM {
            let start = row * SENSOR_DIM + col;
            if visited[start] || image.get(row, col) == 0 {
                continue;
            }

            // Flood fill one 4-connected component.
            let mut cells: Vec<(usize, usize)> = Vec::new();
            visited[start] = true;
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                cells.push((r, c));
                for (nr, nc) in neighbors(r, c) {
                    let idx = nr * SENSOR_DIM + nc;
                    if !visited[idx] && image.get(nr, nc) != 0 {
                        visited[idx] = true;
                        stack.push((nr, nc));
                    }
                }
            }

            if cells.len() < min_pixels {
                continue;
            }
            blobs.push(Blob {
                pixel_count: cells.len(),
                centroid: weighted_centroid(image, &cells),
            });
        }
    }

    blobs
}

/// Locates the fiducial marker: the first surviving blob in label order.
///
/// Returns `None` when no component passes the size filter, including the
/// all-zero image. Callers must treat `None` as "marker absent", never as a
/// default coordinate; the image itself is still delivered downstream.
pub fn find_fiducial(image: &Image, min_pixels: usize) -> Option<Centroid> {
    surviving_blobs(image, min_pixels)
        .into_iter()
        .next()
        .map(|blob| blob.centroid)
}

fn neighbors(row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> {
    let mut out = [(0usize, 0usize); 4];
    let mut n = 0;
    if row > 0 {
        out[n] = (row - 1, col);
        n += 1;
    }
    if row + 1 < SENSOR_DIM {
        out[n] = (row + 1, col);
        n += 1;
    }
    if col > 0 {
        out[n] = (row, col - 1);
        n += 1;
    }
    if col + 1 < SENSOR_DIM {
        out[n] = (row, col + 1);
        n += 1;
    }
    out.into_iter().take(n)
}

fn weighted_centroid(image: &Image, cells: &[(usize, usize)]) -> Centroid {
    let mut mass = 0.0;
    let mut row_moment = 0.0;
    let mut col_moment = 0.0;
    for &(row, col) in cells {
        let w = f64::from(image.get(row, col));
        mass += w;
        row_moment += w * row as f64;
        col_moment += w * col as f64;
    }
    Centroid {
        row: (row_moment / mass).round() as u16,
        col: (col_moment / mass).round() as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBuffer;
    use crate::pipeline::image::accumulate_window;

    /// Builds an image with unit intensity at the given cells.
    fn image_with(cells: &[(u16, u16)], tot: u16) -> Image {
        let index: Vec<u32> = cells
            .iter()
            .map(|&(row, col)| u32::from(row) * SENSOR_DIM as u32 + u32::from(col))
            .collect();
        let n = index.len();
        let buf = EventBuffer::from_arrays(index, vec![5e8; n], vec![tot; n]).unwrap();
        accumulate_window(&buf, 1e8, 1e9)
    }

    /// A horizontal run of `len` cells starting at `(row, col)`.
    fn run(row: u16, col: u16, len: u16) -> Vec<(u16, u16)> {
        (0..len).map(|i| (row, col + i)).collect()
    }

    #[test]
    fn all_zero_image_has_no_fiducial() {
        assert!(find_fiducial(&Image::zeros(), 50).is_none());
    }

    #[test]
    fn small_components_are_discarded() {
        // One 60-cell region and one 10-cell region: only the former survives.
        let mut cells = Vec::new();
        for r in 0..6 {
            cells.extend(run(100 + r, 100, 10));
        }
        cells.extend(run(200, 30, 10));
        let image = image_with(&cells, 9);

        let blobs = surviving_blobs(&image, 50);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].pixel_count, 60);

        // Centroid lies within the bounding box of its region.
        let c = blobs[0].centroid;
        assert!((100..=105).contains(&c.row));
        assert!((100..=109).contains(&c.col));
    }

    #[test]
    fn first_survivor_in_label_order_wins() {
        // Two surviving regions; the one encountered first in row-major scan
        // order is selected even though the second is larger and brighter.
        let mut cells = Vec::new();
        for r in 0..5 {
            cells.extend(run(10 + r, 10, 12)); // 60 cells, scanned first
        }
        let mut bright = Vec::new();
        for r in 0..10 {
            bright.extend(run(150 + r, 150, 10)); // 100 cells
        }

        let buf = EventBuffer::from_arrays(
            cells
                .iter()
                .chain(&bright)
                .map(|&(row, col)| u32::from(row) * 256 + u32::from(col))
                .collect(),
            vec![5e8; cells.len() + bright.len()],
            cells
                .iter()
                .map(|_| 5u16)
                .chain(bright.iter().map(|_| 200u16))
                .collect(),
        )
        .unwrap();
        let image = accumulate_window(&buf, 1e8, 1e9);

        let centroid = find_fiducial(&image, 50).unwrap();
        assert!(centroid.row < 20, "expected the first-scanned region");
    }

    #[test]
    fn centroid_is_intensity_weighted() {
        // A 1x60 line with all the mass at the left end pulls the centroid
        // left of the geometric center.
        let cells = run(40, 0, 60);
        let index: Vec<u32> = cells
            .iter()
            .map(|&(row, col)| u32::from(row) * 256 + u32::from(col))
            .collect();
        let tot: Vec<u16> = (0..60u16).map(|i| if i < 10 { 500 } else { 1 }).collect();
        let buf = EventBuffer::from_arrays(index, vec![5e8; 60], tot).unwrap();
        let image = accumulate_window(&buf, 1e8, 1e9);

        let centroid = find_fiducial(&image, 50).unwrap();
        assert_eq!(centroid.row, 40);
        assert!(centroid.col < 15);
    }

    #[test]
    fn diagonal_cells_are_separate_components() {
        // 4-connectivity: a diagonal chain does not merge.
        let cells: Vec<(u16, u16)> = (0..60).map(|i| (i, i)).collect();
        let image = image_with(&cells, 9);
        assert!(surviving_blobs(&image, 50).is_empty());
    }
}
