//! Detector driver interface.
//!
//! The vendor acquisition library delivers data-driven dumps through a
//! registered callback. That surface is abstracted here as a blocking
//! "next buffer" pull: the acquisition worker thread owns the source and
//! polls it for fully formed buffers in arrival order. The pipeline assumes
//! nothing else about delivery.

pub mod mock;

use crate::acquisition::RunParameters;
use crate::error::AppResult;
use crate::event::EventBuffer;

/// A source of event buffers (the acquisition driver collaborator).
///
/// Implementations wrap the vendor API for a real detector or synthesize
/// data for tests. Failures reported from here are the distinct driver error
/// category: the pipeline does not retry, the run halts.
pub trait EventSource: Send {
    /// Human-readable device name for logging.
    fn describe(&self) -> String;

    /// Starts an acquisition run on the device.
    fn begin(&mut self, params: &RunParameters) -> AppResult<()>;

    /// Blocks until the next dump is available.
    ///
    /// Returns `Ok(None)` when the run has delivered all its data. Buffers
    /// may be empty; the caller decides whether to skip them.
    fn next_buffer(&mut self) -> AppResult<Option<EventBuffer>>;

    /// Aborts an in-flight run. Must be safe to call when idle.
    fn abort(&mut self);
}
