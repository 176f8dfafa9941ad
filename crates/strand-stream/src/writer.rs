use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use error_stack::{report, Report};
use strand_batch::{Row, RowBatch};
use strand_interfaces::{RowSink, SinkError, StreamOptions};

use crate::error::Error;
use crate::stats::StreamStats;

/// Fills the current batch and applies the adaptive flush policy when it
/// runs full.
///
/// The policy balances throughput against latency:
/// - without a time trigger it never blocks while the batch can still
///   grow: a refused handoff grows the batch x8 up to the row and byte
///   bounds, and only then falls back to a blocking handoff;
/// - with a time trigger, a batch older than the trigger is flushed
///   eagerly and its successor shrunk to half capacity to tighten the
///   latency bound, while a young batch keeps growing x8 (x2 once the
///   trigger has fired but the consumer is not ready).
///
/// Bursty slow consumers push capacity up; a live consumer pulls it back
/// down after each flush.
pub(crate) struct BatchWriter {
    tx: Sender<RowBatch>,
    recycle: Receiver<RowBatch>,
    current: Option<RowBatch>,
    stop: Arc<AtomicBool>,
    stats: Arc<StreamStats>,
    flush_trigger: Option<Duration>,
    poll_interval: Duration,
    handoff_timeout: Duration,
    polls_before_log: u64,
    polls_before_timeout: u64,
    last_flush: Instant,
    fatal: Option<Report<Error>>,
}

impl BatchWriter {
    pub fn new(
        tx: Sender<RowBatch>,
        recycle: Receiver<RowBatch>,
        first: RowBatch,
        stop: Arc<AtomicBool>,
        stats: Arc<StreamStats>,
        options: &StreamOptions,
    ) -> Self {
        Self {
            tx,
            recycle,
            current: Some(first),
            stop,
            stats,
            flush_trigger: options.flush_trigger,
            poll_interval: options.poll_interval,
            handoff_timeout: options.handoff_timeout,
            polls_before_log: options.polls_before_log(),
            polls_before_timeout: options.polls_before_timeout(),
            last_flush: Instant::now(),
            fatal: None,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Append one row, flushing per the policy when the batch runs full.
    ///
    /// After a cancelled handoff the writer has no batch to fill; rows
    /// arriving then are silently dropped, the producer loop exits on its
    /// next stop check.
    pub fn append(&mut self, row: Row) -> error_stack::Result<(), Error> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        current.add(row);
        if current.is_full() {
            self.flush_full_batch()?;
        }
        Ok(())
    }

    fn flush_full_batch(&mut self) -> error_stack::Result<(), Error> {
        match self.flush_trigger {
            None => {
                if self.try_handoff() {
                    self.rotate(true)?;
                } else if !self.grow_current(8) && self.blocking_handoff()? {
                    self.rotate(false)?;
                }
            }
            Some(trigger) => {
                if self.last_flush.elapsed() > trigger {
                    if self.try_handoff() {
                        self.rotate(true)?;
                    } else if !self.grow_current(2) && self.blocking_handoff()? {
                        self.rotate(false)?;
                    }
                } else if !self.grow_current(8) && self.blocking_handoff()? {
                    self.rotate(false)?;
                }
            }
        }
        Ok(())
    }

    /// End-of-input: flush a full batch, append the end-of-stream marker
    /// and hand it off. Not called when the stream is in an error state.
    pub fn finish_stream(&mut self) -> error_stack::Result<(), Error> {
        if self.current.as_ref().is_some_and(|b| b.is_full()) {
            if !self.blocking_handoff()? {
                return Ok(());
            }
            self.rotate(false)?;
        }
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        current.add(Row::end_marker());
        self.blocking_handoff()?;
        Ok(())
    }

    fn grow_current(&mut self, factor: usize) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };
        current.try_grow(current.capacity() * factor)
    }

    /// Non-blocking handoff; succeeds only when the consumer is already
    /// waiting on the rendezvous.
    fn try_handoff(&mut self) -> bool {
        let Some(batch) = self.current.take() else {
            return false;
        };
        let rows = batch.len() as u64 - batch.contains_end_marker() as u64;
        match self.tx.try_send(batch) {
            Ok(()) => {
                self.stats.record_batch(rows, self.last_flush.elapsed());
                self.last_flush = Instant::now();
                true
            }
            Err(TrySendError::Full(batch)) => {
                self.current = Some(batch);
                false
            }
            Err(TrySendError::Disconnected(batch)) => {
                self.stop.store(true, Ordering::Relaxed);
                self.current = Some(batch);
                false
            }
        }
    }

    /// Blocking handoff with the poll/log/timeout protocol.
    ///
    /// Returns false when the handoff was abandoned because of a stop
    /// request; the undelivered batch stays current.
    fn blocking_handoff(&mut self) -> error_stack::Result<bool, Error> {
        let Some(mut batch) = self.current.take() else {
            return Ok(false);
        };
        let rows = batch.len() as u64 - batch.contains_end_marker() as u64;
        let mut polls: u64 = 0;
        loop {
            if self.stopped() {
                self.current = Some(batch);
                return Ok(false);
            }
            match self.tx.send_timeout(batch, self.poll_interval) {
                Ok(()) => {
                    self.stats.record_batch(rows, self.last_flush.elapsed());
                    self.last_flush = Instant::now();
                    return Ok(true);
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    batch = returned;
                    polls += 1;
                    if polls > self.polls_before_timeout {
                        return Err(report!(Error::HandoffTimeout(self.handoff_timeout)));
                    }
                    if polls % self.polls_before_log == 0 {
                        tracing::debug!(
                            rows,
                            waited = ?self.poll_interval * polls as u32,
                            "still offering batch, consumer not draining"
                        );
                    }
                }
                Err(SendTimeoutError::Disconnected(returned)) => {
                    self.stop.store(true, Ordering::Relaxed);
                    self.current = Some(returned);
                    return Ok(false);
                }
            }
        }
    }

    /// Bring the recycled sibling in as the new current batch.
    fn rotate(&mut self, shrink: bool) -> error_stack::Result<(), Error> {
        debug_assert!(self.current.is_none());
        let mut polls: u64 = 0;
        loop {
            if self.stopped() {
                return Ok(());
            }
            match self.recycle.recv_timeout(self.poll_interval) {
                Ok(mut batch) => {
                    batch.reset();
                    if shrink {
                        batch.shrink_to(batch.capacity() / 2);
                    }
                    self.current = Some(batch);
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    polls += 1;
                    if polls > self.polls_before_timeout {
                        return Err(report!(Error::HandoffTimeout(self.handoff_timeout)));
                    }
                    if polls % self.polls_before_log == 0 {
                        tracing::debug!("waiting for recycled batch");
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop.store(true, Ordering::Relaxed);
                    return Ok(());
                }
            }
        }
    }

    /// The precise engine error behind the most recent `SinkError`, if
    /// any. The producer prefers this over the step's wrapped error.
    pub fn take_fatal(&mut self) -> Option<Report<Error>> {
        self.fatal.take()
    }
}

impl RowSink for BatchWriter {
    fn push(&mut self, row: Row) -> error_stack::Result<(), SinkError> {
        match self.append(row) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.fatal = Some(error);
                Err(report!(SinkError))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam_channel::{bounded, Receiver, Sender};
    use strand_batch::{CapacityLimits, Row, RowBatch};
    use strand_interfaces::StreamOptions;

    use super::BatchWriter;
    use crate::error::Error;
    use crate::stats::StreamStats;

    fn writer_fixture(
        max_capacity: usize,
        options: &StreamOptions,
    ) -> (BatchWriter, Receiver<RowBatch>, Sender<RowBatch>) {
        let (tx, data_rx) = bounded(0);
        let (recycle_tx, recycle_rx) = bounded(2);
        let limits = CapacityLimits {
            min: options.min_capacity,
            max: max_capacity,
            max_bytes: options.max_batch_bytes,
        };
        recycle_tx
            .send(RowBatch::new(options.initial_capacity, limits))
            .unwrap();
        let writer = BatchWriter::new(
            tx,
            recycle_rx,
            RowBatch::new(options.initial_capacity, limits),
            Arc::new(AtomicBool::new(false)),
            Arc::new(StreamStats::default()),
            options,
        );
        (writer, data_rx, recycle_tx)
    }

    fn row(pos: i64) -> Row {
        Row::new("chr1", pos, vec![])
    }

    #[test]
    fn test_grows_instead_of_blocking_when_consumer_not_ready() {
        let options = StreamOptions {
            initial_capacity: 1,
            ..StreamOptions::default()
        };
        let (mut writer, _data_rx, _recycle_tx) = writer_fixture(64, &options);

        // No-one is receiving: each full batch is refused and grown x8.
        for pos in 0..8 {
            writer.append(row(pos)).unwrap();
        }
        let capacity = writer.current.as_ref().unwrap().capacity();
        assert_eq!(capacity, 64);
        assert_eq!(writer.current.as_ref().unwrap().len(), 8);
    }

    #[test]
    fn test_shrinks_after_live_handoff() {
        let options = StreamOptions {
            initial_capacity: 8,
            poll_interval: Duration::from_millis(10),
            ..StreamOptions::default()
        };
        let (mut writer, data_rx, _recycle_tx) = writer_fixture(64, &options);

        let consumer = std::thread::spawn(move || data_rx.recv().unwrap());
        // Give the consumer time to block on the rendezvous so the
        // non-blocking handoff is accepted.
        std::thread::sleep(Duration::from_millis(50));
        for pos in 0..8 {
            writer.append(row(pos)).unwrap();
        }
        let batch = consumer.join().unwrap();
        assert_eq!(batch.len(), 8);
        // The recycled sibling was shrunk to half capacity.
        assert_eq!(writer.current.as_ref().unwrap().capacity(), 4);
    }

    #[test]
    fn test_blocking_handoff_times_out_as_fatal() {
        let options = StreamOptions {
            initial_capacity: 1,
            poll_interval: Duration::from_millis(5),
            handoff_timeout: Duration::from_millis(25),
            log_interval: Duration::from_millis(10),
            ..StreamOptions::default()
        };
        let (mut writer, _data_rx, _recycle_tx) = writer_fixture(2, &options);

        writer.append(row(0)).unwrap();
        // Batch is at max capacity and no-one is draining: the second fill
        // forces a blocking handoff that must trip the liveness guard.
        let error = writer.append(row(1)).unwrap_err();
        assert!(matches!(
            error.current_context(),
            Error::HandoffTimeout(_)
        ));
    }

    #[test]
    fn test_abandons_handoff_on_stop() {
        let options = StreamOptions {
            initial_capacity: 1,
            poll_interval: Duration::from_millis(5),
            ..StreamOptions::default()
        };
        let (mut writer, _data_rx, _recycle_tx) = writer_fixture(1, &options);
        writer.stop.store(true, Ordering::Relaxed);

        writer.append(row(0)).unwrap();
        assert!(!writer.blocking_handoff().unwrap());
        assert!(writer.current.is_some());
    }
}
