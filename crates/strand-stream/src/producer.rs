use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use error_stack::{report, IntoReport, ResultExt};
use strand_batch::{CapacityLimits, Row, RowBatch};
use strand_interfaces::{PipelineStep, RowSink, RowSource, SinkError, StreamOptions};

use crate::error::{Error, ErrorState};
use crate::stats::StreamStats;
use crate::writer::BatchWriter;

/// Source and step handed back when the worker exits, so the facade can
/// reseek and restart.
pub(crate) type Reclaimed = (Box<dyn RowSource>, Option<Box<dyn PipelineStep>>);

/// Handle to the background worker of one stream.
///
/// Owns the consumer end of the data rendezvous and the producer end of
/// the recycle ring. Dropping the handle without joining detaches the
/// worker; it observes the disconnected channels and exits.
pub(crate) struct ProducerHandle {
    pub data_rx: Receiver<RowBatch>,
    pub recycle_tx: Sender<RowBatch>,
    stop: Arc<AtomicBool>,
    join: JoinHandle<Reclaimed>,
}

impl ProducerHandle {
    /// Spawn the worker: a rendezvous data slot, a two-slot recycle ring
    /// carrying the batch pair, and one named OS thread running the
    /// produce loop.
    pub fn spawn(
        source: Box<dyn RowSource>,
        step: Option<Box<dyn PipelineStep>>,
        pending: Option<Row>,
        options: &StreamOptions,
        stats: Arc<StreamStats>,
        errors: Arc<ErrorState>,
    ) -> error_stack::Result<Self, Error> {
        let limits = CapacityLimits {
            min: options.min_capacity,
            max: options.max_capacity,
            max_bytes: options.max_batch_bytes,
        };
        let (data_tx, data_rx) = bounded(0);
        let (recycle_tx, recycle_rx) = bounded(2);
        recycle_tx
            .send(RowBatch::new(options.initial_capacity, limits))
            .expect("recycle ring has free capacity");

        let stop = Arc::new(AtomicBool::new(false));
        let writer = BatchWriter::new(
            data_tx,
            recycle_rx,
            RowBatch::new(options.initial_capacity, limits),
            stop.clone(),
            stats,
            options,
        );

        let worker_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name("row-producer".to_owned())
            .spawn(move || {
                let span = tracing::debug_span!("row_producer");
                let _enter = span.enter();
                run(source, step, writer, pending, worker_stop, errors)
            })
            .into_report()
            .change_context(Error::SpawnProducer)?;

        Ok(Self {
            data_rx,
            recycle_tx,
            stop,
            join,
        })
    }

    /// Request cooperative stop. The worker observes it within one poll
    /// interval, or at its next per-row check.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the worker and reclaim the source and step.
    pub fn join(self) -> error_stack::Result<Reclaimed, Error> {
        self.join
            .join()
            .map_err(|_| report!(Error::ProducerPanic))
    }

    /// Wait for the worker up to `limit`. Returns `Ok(None)` when the
    /// worker is still running; the handle is dropped and the worker left
    /// to finish detached.
    pub fn join_bounded(
        self,
        limit: Duration,
        poll: Duration,
    ) -> error_stack::Result<Option<Reclaimed>, Error> {
        let deadline = Instant::now() + limit;
        while !self.join.is_finished() {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(poll.min(Duration::from_millis(10)));
        }
        self.join().map(Some)
    }
}

fn run(
    mut source: Box<dyn RowSource>,
    mut step: Option<Box<dyn PipelineStep>>,
    mut writer: BatchWriter,
    pending: Option<Row>,
    stop: Arc<AtomicBool>,
    errors: Arc<ErrorState>,
) -> Reclaimed {
    match produce(source.as_mut(), &mut step, &mut writer, pending, &stop) {
        Ok(()) => {
            if stop.load(Ordering::Relaxed) {
                if let Some(step) = &mut step {
                    step.request_no_more();
                }
            }
            match finish_step(&mut step, &mut writer) {
                Ok(()) => {
                    // No end-of-stream marker once an error is recorded.
                    if !errors.is_set() {
                        if let Err(error) = writer.finish_stream() {
                            errors.set(error);
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                }
                Err(error) => {
                    errors.set(error);
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }
        Err(error) => {
            errors.set(error);
            stop.store(true, Ordering::Relaxed);
            // The step is still finished exactly once; anything it emits
            // now has nowhere to go.
            if let Some(step) = &mut step {
                step.request_no_more();
                if let Err(finish_error) = step.finish(&mut DiscardSink) {
                    tracing::warn!(
                        "error finishing pipeline step after stream failure: {finish_error:?}"
                    );
                }
            }
        }
    }
    // Cleanup guarantee: the source is closed on success, cancellation
    // and error alike.
    if let Err(error) = source.close() {
        tracing::warn!("error closing row source: {error:?}");
    }
    (source, step)
}

fn produce(
    source: &mut dyn RowSource,
    step: &mut Option<Box<dyn PipelineStep>>,
    writer: &mut BatchWriter,
    pending: Option<Row>,
    stop: &AtomicBool,
) -> error_stack::Result<(), Error> {
    if let Some(row) = pending {
        push_row(step, writer, row)?;
    }
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if step.as_ref().is_some_and(|s| s.wants_no_more()) {
            break;
        }
        let Some(row) = source.try_next().change_context(Error::Source)? else {
            break;
        };
        push_row(step, writer, row)?;
    }
    Ok(())
}

fn push_row(
    step: &mut Option<Box<dyn PipelineStep>>,
    writer: &mut BatchWriter,
    row: Row,
) -> error_stack::Result<(), Error> {
    match step {
        Some(step) => {
            if let Err(error) = step.process(row, writer) {
                return Err(writer
                    .take_fatal()
                    .unwrap_or_else(|| error.change_context(Error::Step)));
            }
            Ok(())
        }
        None => writer.append(row),
    }
}

fn finish_step(
    step: &mut Option<Box<dyn PipelineStep>>,
    writer: &mut BatchWriter,
) -> error_stack::Result<(), Error> {
    let Some(step) = step else {
        return Ok(());
    };
    if let Err(error) = step.finish(writer) {
        return Err(writer
            .take_fatal()
            .unwrap_or_else(|| error.change_context(Error::Step)));
    }
    Ok(())
}

/// Sink for rows emitted after the stream has already failed.
pub(crate) struct DiscardSink;

impl RowSink for DiscardSink {
    fn push(&mut self, _row: Row) -> error_stack::Result<(), SinkError> {
        Ok(())
    }
}
