use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use error_stack::{report, ResultExt};
use strand_batch::{ChromOrder, Row, RowBatch};
use strand_interfaces::{PipelineStep, RowSource, StreamOptions};

use crate::error::{Error, ErrorState};
use crate::producer::{DiscardSink, ProducerHandle};
use crate::stats::StreamStats;

/// How long `close` waits for the producer before detaching it.
const CLOSE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The consumer-facing stream over batched rows.
///
/// A pull iterator: `has_next` must be called (and return true) before
/// each `next`. The background producer starts lazily on the first
/// `has_next`, is replaced wholesale by `set_position`, and is torn down
/// by `close`.
pub struct BatchedStream {
    source: Option<Box<dyn RowSource>>,
    step: Option<Box<dyn PipelineStep>>,
    producer: Option<ProducerHandle>,
    current: Option<RowBatch>,
    /// First at-or-after row consumed by a linear reseek skip, delivered
    /// ahead of the source by the next producer.
    pending: Option<Row>,
    pub(crate) options: StreamOptions,
    pub(crate) order: Arc<ChromOrder>,
    stats: Arc<StreamStats>,
    errors: Arc<ErrorState>,
    /// Chromosome of the row most recently returned by `next`.
    pub(crate) current_chrom: Option<String>,
    /// Exclusive upper chromosome bound set when this stream was split.
    pub(crate) split_bound: Option<String>,
    pub(crate) no_split: bool,
    /// Cursor and step clones stashed at construction for a later split;
    /// the live ones are owned by the producer thread.
    pub(crate) split_source: Option<Box<dyn RowSource>>,
    pub(crate) split_step: Option<Box<dyn PipelineStep>>,
    started: bool,
    exhausted: bool,
    pub(crate) closed: bool,
}

enum Peeked {
    Row,
    End,
    PastSplit,
}

impl BatchedStream {
    /// Create a stream over `source` with the human reference chromosome
    /// ordering.
    pub fn new(
        source: Box<dyn RowSource>,
        step: Option<Box<dyn PipelineStep>>,
        options: StreamOptions,
    ) -> Self {
        Self::with_order(source, step, options, ChromOrder::human())
    }

    /// Create a stream with an injected chromosome ordering.
    pub fn with_order(
        source: Box<dyn RowSource>,
        step: Option<Box<dyn PipelineStep>>,
        options: StreamOptions,
        order: Arc<ChromOrder>,
    ) -> Self {
        let split_source = source.try_clone();
        let split_step = step.as_ref().map(|s| s.clone_step());
        Self {
            source: Some(source),
            step,
            producer: None,
            current: None,
            pending: None,
            options,
            order,
            stats: Arc::new(StreamStats::default()),
            errors: Arc::new(ErrorState::default()),
            current_chrom: None,
            split_bound: None,
            no_split: false,
            split_source,
            split_step,
            started: false,
            exhausted: false,
            closed: false,
        }
    }

    /// True when another row is available. Blocks while waiting for the
    /// next batch handoff.
    ///
    /// The sticky error is checked only after a batch has been obtained:
    /// once the producer has failed, a batch of valid rows it produced
    /// before failing is discarded in favor of raising promptly. Rows
    /// already delivered stay delivered.
    pub fn has_next(&mut self) -> error_stack::Result<bool, Error> {
        if self.closed || self.exhausted {
            return Ok(false);
        }
        let need_refresh = self.current.as_ref().map_or(true, |b| !b.has_unread());
        if need_refresh {
            if !self.started {
                self.start_producer()?;
            }
            self.refresh_batch()?;
        }
        if let Some(error) = self.errors.take() {
            self.current = None;
            self.exhausted = true;
            return Err(error);
        }
        let peeked = match self.current.as_ref().and_then(RowBatch::peek) {
            None => Peeked::End,
            Some(row) if row.is_end_marker() => Peeked::End,
            Some(row) => match &self.split_bound {
                Some(bound) if self.order.cmp_chrom(&row.chrom, bound) != Ordering::Less => {
                    Peeked::PastSplit
                }
                _ => Peeked::Row,
            },
        };
        match peeked {
            Peeked::Row => Ok(true),
            Peeked::End => {
                self.mark_exhausted()?;
                Ok(false)
            }
            Peeked::PastSplit => {
                // The rest of the genome belongs to the split-off stream.
                if let Some(producer) = &self.producer {
                    producer.stop();
                }
                self.current = None;
                self.mark_exhausted()?;
                Ok(false)
            }
        }
    }

    /// The next row. `has_next` must have been called and returned true;
    /// anything else is a caller bug.
    pub fn next(&mut self) -> Row {
        let batch = self
            .current
            .as_mut()
            .expect("has_next must be called before next");
        let row = batch
            .next_row()
            .expect("has_next must be called before next");
        if self.current_chrom.as_deref() != Some(row.chrom.as_str()) {
            self.current_chrom = Some(row.chrom.clone());
        }
        row
    }

    /// Reposition the stream to the first row at or after `(chrom, pos)`.
    ///
    /// The running producer is stopped and joined, the source repositioned
    /// (natively or by linear skip), and a fresh producer started with the
    /// same, reset, pipeline step. No pre-seek row is ever delivered after
    /// this returns.
    pub fn set_position(&mut self, chrom: &str, pos: i64) -> error_stack::Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        let seek_started = Instant::now();
        if self.started {
            self.stop_and_reclaim()?;
        }
        self.exhausted = false;
        self.current = None;
        self.current_chrom = None;
        self.pending = None;
        if let Some(step) = &mut self.step {
            step.reset();
        }
        let source = self.source.as_mut().expect("source reclaimed for reseek");
        let native = source.seek(chrom, pos).change_context(Error::Source)?;
        if !native {
            self.pending = self.skip_forward(chrom, pos)?;
        }
        self.start_producer()?;
        self.stats.record_seek(seek_started.elapsed());
        Ok(())
    }

    /// Tear the stream down. Idempotent; raises the sticky error unless a
    /// `has_next` call already surfaced it.
    pub fn close(&mut self) -> error_stack::Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;
        if let Some(producer) = self.producer.take() {
            producer.stop();
            // Free a producer blocked mid-rendezvous.
            let _ = producer.data_rx.try_recv();
            match producer.join_bounded(CLOSE_JOIN_TIMEOUT, self.options.poll_interval) {
                Ok(Some(_reclaimed)) => {}
                Ok(None) => {
                    tracing::warn!(
                        "producer thread still running after {CLOSE_JOIN_TIMEOUT:?}, detaching"
                    );
                }
                Err(error) => self.errors.set(error),
            }
        } else {
            // Producer never started: finish the step and close the
            // source from here.
            if let Some(mut step) = self.step.take() {
                if let Err(error) = step.finish(&mut DiscardSink) {
                    self.errors.set(error.change_context(Error::Step));
                }
            }
            if let Some(mut source) = self.source.take() {
                if let Err(error) = source.close() {
                    self.errors.set(error.change_context(Error::Source));
                }
            }
        }
        if let Some(error) = self.errors.take() {
            return Err(error);
        }
        Ok(())
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn mark_exhausted(&mut self) -> error_stack::Result<(), Error> {
        self.exhausted = true;
        if self.options.auto_close {
            self.close()?;
        }
        Ok(())
    }

    fn start_producer(&mut self) -> error_stack::Result<(), Error> {
        debug_assert!(!self.started);
        let source = self.source.take().expect("row source present before start");
        let step = self.step.take();
        let pending = self.pending.take();
        let handle = ProducerHandle::spawn(
            source,
            step,
            pending,
            &self.options,
            self.stats.clone(),
            self.errors.clone(),
        )?;
        self.producer = Some(handle);
        self.started = true;
        Ok(())
    }

    /// Return the drained batch to the ring and wait for the next one.
    fn refresh_batch(&mut self) -> error_stack::Result<(), Error> {
        if let Some(mut drained) = self.current.take() {
            drained.reset();
            if let Some(producer) = &self.producer {
                let _ = producer.recycle_tx.try_send(drained);
            }
        }
        self.current = self.poll_batch()?;
        Ok(())
    }

    /// Wait for a handed-off batch with the poll/log/timeout protocol.
    ///
    /// `Ok(None)` means the producer exited without a further batch:
    /// either cancelled, or failed (the caller checks the sticky error).
    fn poll_batch(&mut self) -> error_stack::Result<Option<RowBatch>, Error> {
        let Some(producer) = &self.producer else {
            return Ok(None);
        };
        let polls_before_log = self.options.polls_before_log();
        let polls_before_timeout = self.options.polls_before_timeout();
        let mut polls: u64 = 0;
        loop {
            match producer.data_rx.recv_timeout(self.options.poll_interval) {
                Ok(batch) => return Ok(Some(batch)),
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
                Err(RecvTimeoutError::Timeout) => {
                    polls += 1;
                    if polls > polls_before_timeout {
                        return Err(report!(Error::HandoffTimeout(
                            self.options.handoff_timeout
                        )));
                    }
                    if polls % polls_before_log == 0 {
                        tracing::debug!(
                            waited = ?self.options.poll_interval * polls as u32,
                            "still polling for next batch"
                        );
                    }
                }
            }
        }
    }

    /// Stop the running producer and take the source and step back.
    fn stop_and_reclaim(&mut self) -> error_stack::Result<(), Error> {
        if let Some(producer) = self.producer.take() {
            producer.stop();
            // Free a producer blocked mid-rendezvous.
            let _ = producer.data_rx.try_recv();
            let (source, step) = producer.join()?;
            self.source = Some(source);
            self.step = step;
        }
        self.started = false;
        self.current = None;
        Ok(())
    }

    /// Linear-skip fallback for sources without native seek. The first
    /// at-or-after row has already been pulled off the source and is kept
    /// for delivery.
    fn skip_forward(
        &mut self,
        chrom: &str,
        pos: i64,
    ) -> error_stack::Result<Option<Row>, Error> {
        let order = self.order.clone();
        let source = self.source.as_mut().expect("source reclaimed for reseek");
        loop {
            match source.try_next().change_context(Error::Source)? {
                None => return Ok(None),
                Some(row) => {
                    if order.cmp_locus((&row.chrom, row.pos), (chrom, pos)) != Ordering::Less {
                        return Ok(Some(row));
                    }
                }
            }
        }
    }
}

impl Drop for BatchedStream {
    fn drop(&mut self) {
        // Best effort: wake the producer so it can exit; never block in
        // drop.
        if let Some(producer) = self.producer.take() {
            producer.stop();
        }
    }
}
