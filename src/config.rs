//! Configuration management.
//!
//! Settings are loaded from TOML files via the `config` crate and deserialized
//! into strongly-typed structs with `serde`. All empirically tuned analysis
//! constants (fiducial search window, blob size cutoff, clustering radius,
//! spectrum range) live here as configuration defaults rather than hidden
//! literals, so they can be adjusted without code changes.

use crate::error::{AppResult, PixError};
use config::Config;
use serde::Deserialize;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Acquisition loop settings.
    pub acquisition: AcquisitionSettings,
    /// Analysis pipeline tuning constants.
    pub pipeline: PipelineSettings,
    /// Raw-event storage settings.
    pub storage: StorageSettings,
}

/// Settings for the acquisition loop and the producer/consumer channel.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Requested run duration in seconds.
    pub run_duration_s: f64,
    /// Number of acquisition iterations requested from the driver.
    pub iterations: u32,
    /// Capacity of the pipeline-to-consumer event channel. When the consumer
    /// falls behind, events beyond this depth are dropped with a warning.
    pub channel_capacity: usize,
}

/// Tuning constants for the per-buffer analysis stages.
///
/// The defaults are the empirically tuned values from the instrument
/// commissioning; they are exposed here so they can be tuned per beamtime.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    /// Lower edge of the ToA window used to build the fiducial image, ns.
    pub fiducial_window_lo_ns: f64,
    /// Upper edge of the ToA window used to build the fiducial image, ns.
    pub fiducial_window_hi_ns: f64,
    /// Minimum connected-component size for a blob to count as the fiducial.
    pub blob_min_pixels: usize,
    /// Half-width of the square region around the fiducial centroid searched
    /// for trigger pulses, pixels.
    pub roi_half_width: u16,
    /// Minimum ToT for a hit to participate in trigger clustering.
    pub tot_threshold: u16,
    /// DBSCAN neighborhood radius for temporal clustering, ns.
    pub cluster_eps_ns: f64,
    /// DBSCAN minimum cluster size (the point itself counts).
    pub cluster_min_samples: usize,
    /// Lower edge of the valid shot-relative time range, ns.
    pub spectrum_min_ns: f64,
    /// Upper edge of the valid shot-relative time range, ns.
    pub spectrum_max_ns: f64,
}

/// Raw-event storage settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// Whether raw per-buffer arrays are persisted at all.
    pub enabled: bool,
    /// Directory that run files are written into.
    pub path: String,
    /// Stem of the run file name; a `_NNNN` suffix is probed to avoid
    /// overwriting an existing run.
    pub file_stem: String,
    /// Storage backend: `csv` or `hdf5`.
    pub format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            acquisition: AcquisitionSettings::default(),
            pipeline: PipelineSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            run_duration_s: 1.0,
            iterations: 1,
            channel_capacity: 64,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fiducial_window_lo_ns: 1e8,
            fiducial_window_hi_ns: 1e9,
            blob_min_pixels: 50,
            roi_half_width: 10,
            tot_threshold: 20,
            cluster_eps_ns: 10_000.0,
            cluster_min_samples: 2,
            spectrum_min_ns: 0.0,
            spectrum_max_ns: 50_000.0,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "data".into(),
            file_stem: "run".into(),
            format: "csv".into(),
        }
    }
}

impl Settings {
    /// Loads settings from `config/<name>.toml` (default `config/default`).
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(PixError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(PixError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization checks.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(PixError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.acquisition.run_duration_s <= 0.0 {
            return Err(PixError::Configuration(
                "run_duration_s must be positive".into(),
            ));
        }
        if self.acquisition.channel_capacity == 0 {
            return Err(PixError::Configuration(
                "channel_capacity must be at least 1".into(),
            ));
        }

        let p = &self.pipeline;
        if p.fiducial_window_lo_ns >= p.fiducial_window_hi_ns {
            return Err(PixError::Configuration(format!(
                "fiducial window is empty: [{}, {})",
                p.fiducial_window_lo_ns, p.fiducial_window_hi_ns
            )));
        }
        if p.spectrum_min_ns >= p.spectrum_max_ns {
            return Err(PixError::Configuration(format!(
                "spectrum range is empty: [{}, {})",
                p.spectrum_min_ns, p.spectrum_max_ns
            )));
        }
        if p.cluster_eps_ns <= 0.0 {
            return Err(PixError::Configuration(
                "cluster_eps_ns must be positive".into(),
            ));
        }
        if p.cluster_min_samples == 0 {
            return Err(PixError::Configuration(
                "cluster_min_samples must be at least 1".into(),
            ));
        }
        if p.blob_min_pixels == 0 {
            return Err(PixError::Configuration(
                "blob_min_pixels must be at least 1".into(),
            ));
        }

        let valid_formats = ["csv", "hdf5"];
        if !valid_formats.contains(&self.storage.format.as_str()) {
            return Err(PixError::Configuration(format!(
                "Invalid storage format '{}'. Must be one of: {}",
                self.storage.format,
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}
