//! Mock detector for testing without hardware.
//!
//! Synthesizes data-driven dumps with the structure the pipeline expects: a
//! bright fiducial disk flashing once per shot inside the image window,
//! signal hits following each flash, uniform background, and optionally a
//! raw-counter wraparound. Deterministic for a given seed.

use crate::acquisition::RunParameters;
use crate::driver::EventSource;
use crate::error::AppResult;
use crate::event::{EventBuffer, SENSOR_DIM};
use crate::pipeline::timestamp::OVERFLOW_PERIOD_NS;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Mock detector configuration.
#[derive(Clone, Debug)]
pub struct MockTimepix {
    /// Buffers still to deliver in the current run.
    remaining: u32,
    running: bool,
    rng: StdRng,
    seed: u64,
    /// Fiducial disk center, `(row, col)`.
    center: (u16, u16),
    /// Fiducial disk radius in pixels.
    radius: u16,
    /// Number of shots per generated buffer.
    shots_per_buffer: usize,
    /// When set, raw times are folded through the counter overflow so that
    /// each buffer exercises the wraparound correction.
    wrap_counter: bool,
}

impl MockTimepix {
    /// Creates a mock detector with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            remaining: 0,
            running: false,
            rng: StdRng::seed_from_u64(seed),
            seed,
            center: (120, 80),
            radius: 5,
            shots_per_buffer: 40,
            wrap_counter: false,
        }
    }

    /// Overrides the number of shots generated per buffer.
    pub fn with_shots_per_buffer(mut self, shots: usize) -> Self {
        self.shots_per_buffer = shots;
        self
    }

    /// Folds generated times through the raw-counter overflow.
    pub fn with_counter_wrap(mut self, wrap: bool) -> Self {
        self.wrap_counter = wrap;
        self
    }

    /// Pixels of the fiducial disk, as linear indices.
    fn disk_pixels(&self) -> Vec<u32> {
        let (cy, cx) = (i32::from(self.center.0), i32::from(self.center.1));
        let r = i32::from(self.radius);
        let mut pixels = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dy * dy + dx * dx <= r * r {
                    let (row, col) = (cy + dy, cx + dx);
                    if (0..SENSOR_DIM as i32).contains(&row)
                        && (0..SENSOR_DIM as i32).contains(&col)
                    {
                        pixels.push(row as u32 * SENSOR_DIM as u32 + col as u32);
                    }
                }
            }
        }
        pixels
    }

    /// Generates one data-driven dump.
    ///
    /// All times are whole nanoseconds so the optional wraparound fold is
    /// exact in `f64`.
    fn generate_buffer(&mut self) -> EventBuffer {
        let mut index = Vec::new();
        let mut toa = Vec::new();
        let mut tot = Vec::new();
        let disk = self.disk_pixels();

        // Baseline background hit pinning the corrected zero.
        index.push(self.rng.gen_range(0..SENSOR_DIM as u32 * SENSOR_DIM as u32));
        toa.push(0.0);
        tot.push(self.rng.gen_range(1..15));

        // Shots: fiducial flash at the trigger instant, then signal hits.
        let first_trigger = 1.5e8;
        let spacing = 100_000.0;
        for shot in 0..self.shots_per_buffer {
            let t0 = first_trigger + shot as f64 * spacing;

            let flash_hits = self.rng.gen_range(10..20);
            for _ in 0..flash_hits {
                let pixel = disk[self.rng.gen_range(0..disk.len())];
                index.push(pixel);
                toa.push(t0 + f64::from(self.rng.gen_range(0u32..2_000)));
                tot.push(self.rng.gen_range(100..600));
            }

            let signal_hits = self.rng.gen_range(5..15);
            for _ in 0..signal_hits {
                // Away from the fiducial region so signal never joins the
                // trigger clustering.
                let row = self.rng.gen_range(0..80u32);
                let col = self.rng.gen_range(0..SENSOR_DIM as u32);
                index.push(row * SENSOR_DIM as u32 + col);
                toa.push(t0 + f64::from(self.rng.gen_range(100u32..49_000)));
                tot.push(self.rng.gen_range(5..60));
            }
        }

        // Sparse dim background across the whole span.
        let span = first_trigger + self.shots_per_buffer as f64 * spacing;
        for _ in 0..50 {
            let row = self.rng.gen_range(0..SENSOR_DIM as u32);
            let col = self.rng.gen_range(0..SENSOR_DIM as u32);
            index.push(row * SENSOR_DIM as u32 + col);
            toa.push(f64::from(self.rng.gen_range(0u32..span as u32)));
            tot.push(self.rng.gen_range(1..15));
        }

        if self.wrap_counter {
            // Shift the run so it straddles the counter overflow: hits past
            // the first 100 ms fold to small post-wrap values, earlier hits
            // keep large pre-wrap values.
            let offset = OVERFLOW_PERIOD_NS - 1e8;
            for t in toa.iter_mut() {
                *t = (*t + offset) % OVERFLOW_PERIOD_NS;
            }
        }

        EventBuffer {
            index,
            toa_ns: toa,
            tot,
        }
    }
}

impl EventSource for MockTimepix {
    fn describe(&self) -> String {
        format!("MockTimepix(seed={})", self.seed)
    }

    fn begin(&mut self, params: &RunParameters) -> AppResult<()> {
        self.remaining = params.iterations;
        self.running = true;
        self.rng = StdRng::seed_from_u64(self.seed);
        info!(device = %self.describe(), iterations = params.iterations, "mock acquisition started");
        Ok(())
    }

    fn next_buffer(&mut self) -> AppResult<Option<EventBuffer>> {
        if !self.running || self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(self.generate_buffer()))
    }

    fn abort(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::pipeline::Pipeline;

    fn run_params(iterations: u32) -> RunParameters {
        RunParameters {
            run_duration: std::time::Duration::from_secs(1),
            iterations,
        }
    }

    #[test]
    fn delivers_requested_iterations_then_ends() {
        let mut mock = MockTimepix::new(7);
        mock.begin(&run_params(3)).unwrap();
        assert!(mock.next_buffer().unwrap().is_some());
        assert!(mock.next_buffer().unwrap().is_some());
        assert!(mock.next_buffer().unwrap().is_some());
        assert!(mock.next_buffer().unwrap().is_none());
    }

    #[test]
    fn abort_stops_delivery() {
        let mut mock = MockTimepix::new(7);
        mock.begin(&run_params(10)).unwrap();
        assert!(mock.next_buffer().unwrap().is_some());
        mock.abort();
        assert!(mock.next_buffer().unwrap().is_none());
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let mut a = MockTimepix::new(42);
        let mut b = MockTimepix::new(42);
        a.begin(&run_params(1)).unwrap();
        b.begin(&run_params(1)).unwrap();
        let buf_a = a.next_buffer().unwrap().unwrap();
        let buf_b = b.next_buffer().unwrap().unwrap();
        assert_eq!(buf_a.index, buf_b.index);
        assert_eq!(buf_a.toa_ns, buf_b.toa_ns);
        assert_eq!(buf_a.tot, buf_b.tot);
    }

    #[test]
    fn generated_buffers_carry_a_findable_fiducial() {
        let mut mock = MockTimepix::new(11);
        mock.begin(&run_params(1)).unwrap();
        let mut buffer = mock.next_buffer().unwrap().unwrap();

        let mut pipeline = Pipeline::new(PipelineSettings::default());
        let out = pipeline.process(&mut buffer);
        let centroid = out.centroid.expect("mock fiducial should be detected");
        assert!(centroid.row.abs_diff(120) <= 3);
        assert!(centroid.col.abs_diff(80) <= 3);
        assert!(out.triggers > 0);
        assert!(!out.spectrum.is_empty());
    }

    #[test]
    fn counter_wrap_folds_and_corrects_to_same_spectrum() {
        let make = |wrap| {
            let mut mock = MockTimepix::new(5).with_counter_wrap(wrap);
            mock.begin(&run_params(1)).unwrap();
            let mut buffer = mock.next_buffer().unwrap().unwrap();
            let mut pipeline = Pipeline::new(PipelineSettings::default());
            pipeline.process(&mut buffer);
            pipeline.spectrum().to_pairs()
        };
        assert_eq!(make(false), make(true));
    }
}
