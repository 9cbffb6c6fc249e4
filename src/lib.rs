//! # pixtof Core Library
//!
//! This crate is the core library for the `pixtof` application: headless
//! acquisition and online analysis for a Timepix3-class event camera. Each
//! data-driven dump from the detector is turned into a spatial intensity
//! image, a located fiducial marker, and a time-of-flight spectrum aligned
//! to shot triggers recovered directly from the event stream. Organizing the
//! project as a library lets the same pipeline serve the CLI binary
//! (`main.rs`) and future frontends such as a native GUI.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: The `AcquisitionEngine` worker loop and the
//!   `PipelineEvent` stream handed to consumers, plus the run control
//!   surface (start / stop / is_running).
//! - **`config`**: Structures for loading and validating application
//!   configuration from TOML files, including every tuned analysis constant.
//! - **`data`**: Raw-event storage writers (CSV, HDF5) behind the
//!   `RawEventWriter` trait.
//! - **`driver`**: The `EventSource` abstraction over the vendor acquisition
//!   API, and a deterministic `MockTimepix` for development and tests.
//! - **`error`**: The central `PixError` enum for consistent error handling.
//! - **`event`**: The raw hit data model (`Hit`, `EventBuffer`).
//! - **`pipeline`**: The per-buffer analysis stages: timestamp correction,
//!   spatial accumulation, fiducial detection, trigger clustering and shot
//!   segmentation.

pub mod acquisition;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod event;
pub mod pipeline;
