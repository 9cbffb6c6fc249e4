//! Per-buffer analysis pipeline.
//!
//! Each incoming [`EventBuffer`] flows through the stages in order, all
//! synchronously on the acquisition worker thread:
//!
//! 1. [`timestamp`]: counter-wraparound repair and zero-referencing.
//! 2. [`image`]: time-windowed spatial intensity accumulation.
//! 3. [`blob`]: fiducial marker detection on the accumulated frame.
//! 4. [`cluster`]: trigger recovery by density clustering near the marker.
//! 5. [`segment`]: per-shot re-binning into the cumulative spectrum.
//!
//! A buffer without a detectable fiducial still yields its frame; only the
//! marker-dependent stages (4 and 5) are skipped for that buffer. Emptiness
//! at any stage is a silent no-op, never an error.

pub mod blob;
pub mod cluster;
pub mod image;
pub mod segment;
pub mod timestamp;

use crate::config::PipelineSettings;
use crate::event::EventBuffer;
use image::{Centroid, Image};
use segment::Spectrum;
use tracing::debug;

/// Everything produced from one buffer, immutable once returned.
#[derive(Clone, Debug)]
pub struct BufferOutput {
    /// Accumulated intensity frame for display.
    pub image: Image,
    /// Located fiducial marker, or `None` when absent this buffer.
    pub centroid: Option<Centroid>,
    /// Number of shot triggers recovered from this buffer.
    pub triggers: usize,
    /// Snapshot of the cumulative spectrum, ascending `(time_ns, count)`.
    pub spectrum: Vec<(u64, u64)>,
}

/// Orchestrates the analysis stages and owns the cumulative spectrum.
pub struct Pipeline {
    settings: PipelineSettings,
    spectrum: Spectrum,
    buffers_processed: u64,
}

impl Pipeline {
    /// Creates a pipeline with the given tuning constants.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            spectrum: Spectrum::new(),
            buffers_processed: 0,
        }
    }

    /// Clears the cumulative spectrum and counters (acquisition start).
    pub fn reset(&mut self) {
        self.spectrum.reset();
        self.buffers_processed = 0;
    }

    /// Runs all stages over one buffer.
    ///
    /// The buffer's arrival times are corrected in place; the caller should
    /// treat the buffer as consumed. Safe on empty buffers.
    pub fn process(&mut self, buffer: &mut EventBuffer) -> BufferOutput {
        self.buffers_processed += 1;
        timestamp::correct_timestamps(&mut buffer.toa_ns);

        let image = image::accumulate_window(
            buffer,
            self.settings.fiducial_window_lo_ns,
            self.settings.fiducial_window_hi_ns,
        );
        let centroid = blob::find_fiducial(&image, self.settings.blob_min_pixels);

        let mut triggers = 0;
        if let Some(marker) = centroid {
            let shot_times = cluster::recover_triggers(buffer, marker, &self.settings);
            triggers = shot_times.len();
            segment::accumulate_shots(
                &buffer.toa_ns,
                &shot_times,
                self.settings.spectrum_min_ns,
                self.settings.spectrum_max_ns,
                &mut self.spectrum,
            );
        } else {
            debug!(
                buffer = self.buffers_processed,
                "no fiducial found; frame emitted, shot analysis skipped"
            );
        }

        BufferOutput {
            image,
            centroid,
            triggers,
            spectrum: self.spectrum.to_pairs(),
        }
    }

    /// The cumulative spectrum accumulated so far this run.
    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    /// Number of buffers processed since the last reset.
    pub fn buffers_processed(&self) -> u64 {
        self.buffers_processed
    }
}
