//! Acquisition loop and control surface.
//!
//! One dedicated worker thread owns the driver and runs every pipeline stage
//! synchronously per buffer; nothing suspends mid-buffer. Completed,
//! immutable outputs cross to the consumer side (display, logging) over a
//! bounded single-producer channel. The stop flag is checked once per buffer
//! at the top of the loop, so an in-flight buffer always finishes and no
//! partial result is ever exposed.
//!
//! Backpressure: buffers are processed strictly in arrival order and each
//! buffer costs O(hits); if the consumer cannot keep up, events beyond the
//! channel capacity are dropped with a warning rather than queuing without
//! bound.

use crate::data::storage::RawEventWriter;
use crate::driver::EventSource;
use crate::error::{AppResult, PixError};
use crate::pipeline::image::{Centroid, Image};
use crate::pipeline::Pipeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Parameters for one acquisition run.
#[derive(Clone, Debug)]
pub struct RunParameters {
    /// Requested wall-clock duration of the run.
    pub run_duration: Duration,
    /// Number of acquisition iterations requested from the driver.
    pub iterations: u32,
}

/// A completed, immutable output crossing to the consumer thread.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// Run progress, emitted once per buffer.
    Progress {
        /// Percentage of the requested duration elapsed, clamped to 100.
        percent: u8,
        /// Human-readable status line.
        status: String,
    },
    /// The accumulated frame and the fiducial location (or explicit absence)
    /// for overlay rendering.
    Frame {
        /// Intensity frame.
        image: Image,
        /// Fiducial centroid; `None` means "marker not found this buffer".
        centroid: Option<Centroid>,
    },
    /// Current cumulative spectrum, ascending `(time_ns, count)` pairs.
    Spectrum {
        /// Sorted histogram snapshot.
        bins: Vec<(u64, u64)>,
    },
    /// The run delivered all data or was stopped.
    Finished {
        /// Buffers processed during the run.
        buffers: u64,
    },
    /// The driver or storage layer failed; the run has halted.
    Fault {
        /// Failure description with buffer context.
        message: String,
    },
}

/// Drives acquisition on a dedicated worker thread.
///
/// Control surface: [`start`](Self::start), idempotent [`stop`](Self::stop),
/// and [`is_running`](Self::is_running).
pub struct AcquisitionEngine {
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl AcquisitionEngine {
    /// Creates an idle engine.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Requests the worker to exit after the in-flight buffer.
    ///
    /// Idempotent; a no-op when nothing is running.
    pub fn stop(&self) {
        if self.is_running() {
            info!("stop requested; finishing in-flight buffer");
        }
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Starts an acquisition run.
    ///
    /// Takes ownership of the driver, the (freshly reset) pipeline and the
    /// optional raw-event writer; events are published to `events`. Fails
    /// with [`PixError::AcquisitionBusy`] when a run is already in flight.
    pub fn start(
        &mut self,
        mut source: Box<dyn EventSource>,
        mut pipeline: Pipeline,
        mut storage: Option<Box<dyn RawEventWriter>>,
        params: RunParameters,
        events: mpsc::Sender<PipelineEvent>,
    ) -> AppResult<()> {
        if self.is_running() {
            return Err(PixError::AcquisitionBusy);
        }
        // Reap a previous, already-finished worker.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        pipeline.reset();
        source.begin(&params)?;
        info!(device = %source.describe(), duration_s = params.run_duration.as_secs_f64(), "acquisition run started");

        self.running.store(true, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let stop = Arc::clone(&self.stop);

        let spawned = std::thread::Builder::new()
            .name("pixtof-acq".into())
            .spawn(move || {
                run_loop(
                    source.as_mut(),
                    &mut pipeline,
                    &mut storage,
                    &params,
                    &events,
                    &stop,
                );
                if let Some(writer) = storage.as_deref_mut() {
                    if let Err(err) = writer.shutdown() {
                        error!(%err, "raw-event writer shutdown failed");
                    }
                }
                running.store(false, Ordering::SeqCst);
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(PixError::Io(err))
            }
        }
    }

    /// Blocks until the worker thread exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Default for AcquisitionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn run_loop(
    source: &mut dyn EventSource,
    pipeline: &mut Pipeline,
    storage: &mut Option<Box<dyn RawEventWriter>>,
    params: &RunParameters,
    events: &mpsc::Sender<PipelineEvent>,
    stop: &AtomicBool,
) {
    let started = Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            source.abort();
            info!(buffers = pipeline.buffers_processed(), "acquisition stopped");
            publish(events, PipelineEvent::Finished {
                buffers: pipeline.buffers_processed(),
            });
            return;
        }

        let mut buffer = match source.next_buffer() {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                info!(buffers = pipeline.buffers_processed(), "acquisition complete");
                publish(events, PipelineEvent::Finished {
                    buffers: pipeline.buffers_processed(),
                });
                return;
            }
            Err(err) => {
                error!(buffer = pipeline.buffers_processed() + 1, %err, "driver failure; halting run");
                publish(events, PipelineEvent::Fault {
                    message: format!(
                        "buffer {}: {err}",
                        pipeline.buffers_processed() + 1
                    ),
                });
                return;
            }
        };

        // Elapsed key rounded to hundredths of a second, clamped to the
        // requested duration; used both for progress and as the storage key.
        let run_s = params.run_duration.as_secs_f64();
        let elapsed_s = (started.elapsed().as_secs_f64().min(run_s) * 100.0).round() / 100.0;
        let percent = ((elapsed_s / run_s) * 100.0).round().min(100.0) as u8;
        publish(events, PipelineEvent::Progress {
            percent,
            status: format!("{elapsed_s:.2} / {run_s:.2} s, {percent}%"),
        });

        // An empty dump carries nothing for any stage.
        if buffer.is_empty() {
            continue;
        }

        if let Some(writer) = storage.as_mut() {
            if let Err(err) = writer.write_buffer(elapsed_s, &buffer) {
                error!(buffer = pipeline.buffers_processed() + 1, %err, "storage failure; halting run");
                publish(events, PipelineEvent::Fault {
                    message: format!(
                        "buffer {}: {err}",
                        pipeline.buffers_processed() + 1
                    ),
                });
                return;
            }
        }

        let output = pipeline.process(&mut buffer);
        let spectrum_ready = output.centroid.is_some();
        publish(events, PipelineEvent::Frame {
            image: output.image,
            centroid: output.centroid,
        });
        if spectrum_ready {
            publish(events, PipelineEvent::Spectrum {
                bins: output.spectrum,
            });
        }
    }
}

/// Publishes without blocking the worker; a full queue drops the event.
fn publish(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("consumer behind; dropping pipeline event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            // Headless consumers may hang up early; processing continues so
            // storage still sees every buffer.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::driver::mock::MockTimepix;

    fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn run_completes_and_reports_finished() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut engine = AcquisitionEngine::new();
        engine
            .start(
                Box::new(MockTimepix::new(3).with_shots_per_buffer(10)),
                Pipeline::new(PipelineSettings::default()),
                None,
                RunParameters {
                    run_duration: Duration::from_millis(100),
                    iterations: 3,
                },
                tx,
            )
            .unwrap();
        engine.wait();
        assert!(!engine.is_running());

        let events = drain(&mut rx);
        let frames = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Frame { .. }))
            .count();
        assert_eq!(frames, 3);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Finished { buffers: 3 })
        ));
    }

    #[test]
    fn start_while_running_is_rejected() {
        let (tx, _rx) = mpsc::channel(16);
        let mut engine = AcquisitionEngine::new();
        engine
            .start(
                Box::new(SlowSource::default()),
                Pipeline::new(PipelineSettings::default()),
                None,
                RunParameters {
                    run_duration: Duration::from_secs(1),
                    iterations: 1,
                },
                tx.clone(),
            )
            .unwrap();
        let second = engine.start(
            Box::new(MockTimepix::new(0)),
            Pipeline::new(PipelineSettings::default()),
            None,
            RunParameters {
                run_duration: Duration::from_secs(1),
                iterations: 1,
            },
            tx,
        );
        assert!(matches!(second, Err(PixError::AcquisitionBusy)));
        engine.stop();
        engine.wait();
    }

    #[test]
    fn stop_is_idempotent_when_idle() {
        let engine = AcquisitionEngine::new();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    /// A source that delivers empty buffers forever until aborted.
    #[derive(Default)]
    struct SlowSource {
        aborted: bool,
    }

    impl EventSource for SlowSource {
        fn describe(&self) -> String {
            "SlowSource".into()
        }
        fn begin(&mut self, _params: &RunParameters) -> AppResult<()> {
            Ok(())
        }
        fn next_buffer(&mut self) -> AppResult<Option<crate::event::EventBuffer>> {
            if self.aborted {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(1));
            Ok(Some(crate::event::EventBuffer::default()))
        }
        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    #[test]
    fn failed_begin_leaves_engine_idle_and_restartable() {
        struct BrokenBegin;
        impl EventSource for BrokenBegin {
            fn describe(&self) -> String {
                "BrokenBegin".into()
            }
            fn begin(&mut self, _params: &RunParameters) -> AppResult<()> {
                Err(PixError::Driver("device not present".into()))
            }
            fn next_buffer(&mut self) -> AppResult<Option<crate::event::EventBuffer>> {
                Ok(None)
            }
            fn abort(&mut self) {}
        }

        let (tx, mut rx) = mpsc::channel(16);
        let mut engine = AcquisitionEngine::new();
        let params = RunParameters {
            run_duration: Duration::from_millis(100),
            iterations: 1,
        };
        let first = engine.start(
            Box::new(BrokenBegin),
            Pipeline::new(PipelineSettings::default()),
            None,
            params.clone(),
            tx.clone(),
        );
        assert!(matches!(first, Err(PixError::Driver(_))));
        assert!(!engine.is_running());

        // The engine must accept a new run after the failed begin.
        engine
            .start(
                Box::new(MockTimepix::new(1).with_shots_per_buffer(10)),
                Pipeline::new(PipelineSettings::default()),
                None,
                params,
                tx,
            )
            .unwrap();
        engine.wait();
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, PipelineEvent::Finished { .. })));
    }

    #[test]
    fn driver_failure_halts_with_fault() {
        struct FailingSource;
        impl EventSource for FailingSource {
            fn describe(&self) -> String {
                "FailingSource".into()
            }
            fn begin(&mut self, _params: &RunParameters) -> AppResult<()> {
                Ok(())
            }
            fn next_buffer(&mut self) -> AppResult<Option<crate::event::EventBuffer>> {
                Err(PixError::Driver("device unplugged".into()))
            }
            fn abort(&mut self) {}
        }

        let (tx, mut rx) = mpsc::channel(16);
        let mut engine = AcquisitionEngine::new();
        engine
            .start(
                Box::new(FailingSource),
                Pipeline::new(PipelineSettings::default()),
                None,
                RunParameters {
                    run_duration: Duration::from_secs(1),
                    iterations: 1,
                },
                tx,
            )
            .unwrap();
        engine.wait();

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Fault { message } if message.contains("device unplugged")
        )));
    }
}
