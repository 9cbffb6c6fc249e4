//! Raw event data model.
//!
//! The detector delivers each data-driven dump as three parallel arrays: the
//! pixel index, the time of arrival (ToA, nanoseconds, subject to counter
//! wraparound) and the time over threshold (ToT, an intensity proxy). An
//! [`EventBuffer`] owns one such dump; [`Hit`] is the per-event view used by
//! the pipeline stages.

use crate::error::{AppResult, PixError};

/// Sensor edge length in pixels.
pub const SENSOR_DIM: usize = 256;

/// Total pixel count of the sensor.
pub const PIXEL_COUNT: usize = SENSOR_DIM * SENSOR_DIM;

/// A single detected event at a sensor pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// Linear pixel index, `0..65536`.
    pub index: u32,
    /// Time of arrival in nanoseconds, relative to the buffer after correction.
    pub toa_ns: f64,
    /// Time over threshold (pulse-width / intensity proxy).
    pub tot: u16,
}

impl Hit {
    /// Column coordinate on the sensor.
    pub fn x(&self) -> u16 {
        (self.index % SENSOR_DIM as u32) as u16
    }

    /// Row coordinate on the sensor.
    pub fn y(&self) -> u16 {
        (self.index / SENSOR_DIM as u32) as u16
    }
}

/// One acquisition dump: parallel arrays of hits in arrival order.
///
/// May be empty. Equal array lengths and in-range pixel indices are
/// invariants; a violation is a corrupt buffer, not an empty one.
#[derive(Clone, Debug, Default)]
pub struct EventBuffer {
    /// Linear pixel index per hit.
    pub index: Vec<u32>,
    /// Time of arrival per hit, nanoseconds.
    pub toa_ns: Vec<f64>,
    /// Time over threshold per hit.
    pub tot: Vec<u16>,
}

impl EventBuffer {
    /// Builds a buffer from the driver's parallel arrays, validating shape.
    pub fn from_arrays(index: Vec<u32>, toa_ns: Vec<f64>, tot: Vec<u16>) -> AppResult<Self> {
        if index.len() != toa_ns.len() || index.len() != tot.len() {
            return Err(PixError::CorruptBuffer(format!(
                "parallel array length mismatch: index={}, toa={}, tot={}",
                index.len(),
                toa_ns.len(),
                tot.len()
            )));
        }
        if let Some(bad) = index.iter().find(|&&i| i >= PIXEL_COUNT as u32) {
            return Err(PixError::CorruptBuffer(format!(
                "pixel index {bad} out of range (sensor has {PIXEL_COUNT} pixels)"
            )));
        }
        Ok(Self { index, toa_ns, tot })
    }

    /// Number of hits in the buffer.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the dump contained no hits.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterates the buffer as [`Hit`]s.
    pub fn hits(&self) -> impl Iterator<Item = Hit> + '_ {
        self.index
            .iter()
            .zip(&self.toa_ns)
            .zip(&self.tot)
            .map(|((&index, &toa_ns), &tot)| Hit { index, toa_ns, tot })
    }
}
