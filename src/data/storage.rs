//! Raw event storage writers.
//!
//! When persistence is enabled, every processed buffer's raw parallel arrays
//! (pixel index, ToT, ToA) are written out keyed by the buffer's elapsed
//! wall-clock time since run start, rounded to hundredths of a second. Run
//! files are never overwritten: a `_NNNN` suffix is probed until a free name
//! is found.

use crate::config::StorageSettings;
use crate::error::{AppResult, PixError};
use crate::event::EventBuffer;
use std::path::{Path, PathBuf};

/// Sink for raw per-buffer event arrays.
///
/// Lifecycle: `init` once before the run, `write_buffer` per processed
/// buffer on the acquisition worker thread, `shutdown` after the run. The
/// storage layer owns format and compression choices.
pub trait RawEventWriter: Send {
    /// Creates the run file and prepares for writing.
    fn init(&mut self, settings: &StorageSettings) -> AppResult<()>;

    /// Appends one buffer's arrays under the given elapsed-seconds key.
    fn write_buffer(&mut self, elapsed_s: f64, buffer: &EventBuffer) -> AppResult<()>;

    /// Flushes and closes the run file.
    fn shutdown(&mut self) -> AppResult<()>;
}

/// Builds the configured writer backend.
pub fn create_writer(settings: &StorageSettings) -> AppResult<Box<dyn RawEventWriter>> {
    match settings.format.as_str() {
        "csv" => Ok(Box::new(CsvRawWriter::new())),
        "hdf5" => Ok(Box::new(Hdf5RawWriter::new())),
        other => Err(PixError::Configuration(format!(
            "unknown storage format '{other}'"
        ))),
    }
}

/// Picks `dir/stem_NNNN.ext`, probing the counter until the name is free.
pub fn unique_run_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut fid = 0u32;
    loop {
        let candidate = dir.join(format!("{stem}_{fid:04}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        fid += 1;
    }
}

// ---------------------------------------------------------------------------
// CSV backend
// ---------------------------------------------------------------------------

/// Writer producing one CSV row per hit with the buffer's elapsed key.
#[cfg(feature = "storage_csv")]
pub struct CsvRawWriter {
    path: PathBuf,
    writer: Option<csv::Writer<std::fs::File>>,
}

#[cfg(feature = "storage_csv")]
impl CsvRawWriter {
    /// Creates an uninitialized writer.
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            writer: None,
        }
    }

    /// Path of the run file once initialized.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(feature = "storage_csv")]
impl Default for CsvRawWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "storage_csv")]
impl RawEventWriter for CsvRawWriter {
    fn init(&mut self, settings: &StorageSettings) -> AppResult<()> {
        let dir = PathBuf::from(&settings.path);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| PixError::Storage(e.to_string()))?;
        }
        let stem = format!(
            "{}_{}",
            settings.file_stem,
            chrono::Utc::now().format("%Y%m%d")
        );
        self.path = unique_run_path(&dir, &stem, "csv");

        let mut writer = csv::Writer::from_path(&self.path)
            .map_err(|e| PixError::Storage(e.to_string()))?;
        writer
            .write_record(["elapsed_s", "index", "toa_ns", "tot"])
            .map_err(|e| PixError::Storage(e.to_string()))?;
        self.writer = Some(writer);
        tracing::info!(path = %self.path.display(), "raw CSV writer initialized");
        Ok(())
    }

    fn write_buffer(&mut self, elapsed_s: f64, buffer: &EventBuffer) -> AppResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(PixError::Storage("CSV writer not initialized".into()));
        };
        let key = format!("{elapsed_s:.2}");
        for hit in buffer.hits() {
            writer
                .write_record(&[
                    key.clone(),
                    hit.index.to_string(),
                    hit.toa_ns.to_string(),
                    hit.tot.to_string(),
                ])
                .map_err(|e| PixError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| PixError::Storage(e.to_string()))?;
        }
        tracing::info!("raw CSV writer shut down");
        Ok(())
    }
}

#[cfg(not(feature = "storage_csv"))]
pub struct CsvRawWriter;

#[cfg(not(feature = "storage_csv"))]
impl CsvRawWriter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(feature = "storage_csv"))]
impl Default for CsvRawWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "storage_csv"))]
impl RawEventWriter for CsvRawWriter {
    fn init(&mut self, _settings: &StorageSettings) -> AppResult<()> {
        Err(PixError::FeatureNotEnabled("storage_csv".to_string()))
    }
    fn write_buffer(&mut self, _elapsed_s: f64, _buffer: &EventBuffer) -> AppResult<()> {
        Err(PixError::FeatureNotEnabled("storage_csv".to_string()))
    }
    fn shutdown(&mut self) -> AppResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HDF5 backend
// ---------------------------------------------------------------------------

/// Writer mirroring the instrument's legacy layout: groups `Index`, `ToT`
/// and `ToA`, one dataset per buffer named by the elapsed key.
#[cfg(feature = "storage_hdf5")]
pub struct Hdf5RawWriter {
    file: Option<hdf5::File>,
}

#[cfg(feature = "storage_hdf5")]
impl Hdf5RawWriter {
    /// Creates an uninitialized writer.
    pub fn new() -> Self {
        Self { file: None }
    }
}

#[cfg(feature = "storage_hdf5")]
impl Default for Hdf5RawWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "storage_hdf5")]
impl RawEventWriter for Hdf5RawWriter {
    fn init(&mut self, settings: &StorageSettings) -> AppResult<()> {
        let dir = PathBuf::from(&settings.path);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| PixError::Storage(e.to_string()))?;
        }
        let stem = format!(
            "{}_{}",
            settings.file_stem,
            chrono::Utc::now().format("%Y%m%d")
        );
        let path = unique_run_path(&dir, &stem, "hdf5");

        let file = hdf5::File::create(&path).map_err(|e| PixError::Storage(e.to_string()))?;
        for group in ["Index", "ToT", "ToA"] {
            file.create_group(group)
                .map_err(|e| PixError::Storage(e.to_string()))?;
        }
        tracing::info!(path = %path.display(), "raw HDF5 writer initialized");
        self.file = Some(file);
        Ok(())
    }

    fn write_buffer(&mut self, elapsed_s: f64, buffer: &EventBuffer) -> AppResult<()> {
        let Some(file) = self.file.as_ref() else {
            return Err(PixError::Storage("HDF5 writer not initialized".into()));
        };
        let key = format!("{elapsed_s:.2}");
        let index: Vec<u16> = buffer.index.iter().map(|&i| i as u16).collect();

        let store = |group: &str, write: &dyn Fn(&hdf5::Group) -> hdf5::Result<()>| {
            let group = file
                .group(group)
                .map_err(|e| PixError::Storage(e.to_string()))?;
            write(&group).map_err(|e| PixError::Storage(e.to_string()))
        };
        store("Index", &|g| {
            g.new_dataset_builder().with_data(&index).create(key.as_str())?;
            Ok(())
        })?;
        store("ToT", &|g| {
            g.new_dataset_builder()
                .with_data(&buffer.tot)
                .create(key.as_str())?;
            Ok(())
        })?;
        store("ToA", &|g| {
            g.new_dataset_builder()
                .with_data(&buffer.toa_ns)
                .create(key.as_str())?;
            Ok(())
        })?;
        Ok(())
    }

    fn shutdown(&mut self) -> AppResult<()> {
        self.file = None;
        tracing::info!("raw HDF5 writer shut down");
        Ok(())
    }
}

#[cfg(not(feature = "storage_hdf5"))]
pub struct Hdf5RawWriter;

#[cfg(not(feature = "storage_hdf5"))]
impl Hdf5RawWriter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(feature = "storage_hdf5"))]
impl Default for Hdf5RawWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "storage_hdf5"))]
impl RawEventWriter for Hdf5RawWriter {
    fn init(&mut self, _settings: &StorageSettings) -> AppResult<()> {
        Err(PixError::FeatureNotEnabled("storage_hdf5".to_string()))
    }
    fn write_buffer(&mut self, _elapsed_s: f64, _buffer: &EventBuffer) -> AppResult<()> {
        Err(PixError::FeatureNotEnabled("storage_hdf5".to_string()))
    }
    fn shutdown(&mut self) -> AppResult<()> {
        Ok(())
    }
}
