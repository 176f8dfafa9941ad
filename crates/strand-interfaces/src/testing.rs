//! Test doubles for the boundary traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strand_batch::Row;

use crate::{PipelineStep, RowSink, RowSource, SinkError, SourceError, StepError};

/// A vector-backed row source with optional native seek and fault
/// injection. Rows must be supplied in (chromosome, position) order;
/// comparisons during seek are lexical on the chromosome name, which is
/// sufficient for the contig names used in tests.
#[derive(Clone)]
pub struct VecSource {
    rows: Arc<Vec<Row>>,
    cursor: usize,
    pulls: usize,
    fail_after: Option<usize>,
    native_seek: bool,
    cloneable: bool,
    closed: Arc<AtomicBool>,
}

impl VecSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
            cursor: 0,
            pulls: 0,
            fail_after: None,
            native_seek: true,
            cloneable: true,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail the pull after `n` successful ones.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Report no native seek so the engine exercises its linear skip.
    pub fn without_native_seek(mut self) -> Self {
        self.native_seek = false;
        self
    }

    pub fn without_clone(mut self) -> Self {
        self.cloneable = false;
        self
    }

    /// Flag observable after the source has been moved into a producer.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl RowSource for VecSource {
    fn try_next(&mut self) -> error_stack::Result<Option<Row>, SourceError> {
        if self.fail_after == Some(self.pulls) {
            return Err(error_stack::report!(SourceError::Internal(
                "injected source failure"
            )));
        }
        self.pulls += 1;
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn seek(&mut self, chrom: &str, pos: i64) -> error_stack::Result<bool, SourceError> {
        if !self.native_seek {
            return Ok(false);
        }
        self.closed.store(false, Ordering::Relaxed);
        self.cursor = self
            .rows
            .partition_point(|row| (row.chrom.as_str(), row.pos) < (chrom, pos));
        Ok(true)
    }

    fn close(&mut self) -> error_stack::Result<(), SourceError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn try_clone(&self) -> Option<Box<dyn RowSource>> {
        if !self.cloneable {
            return None;
        }
        let mut clone = self.clone();
        clone.cursor = 0;
        clone.pulls = 0;
        clone.closed = Arc::new(AtomicBool::new(false));
        Some(Box::new(clone))
    }
}

/// A sink that retains every pushed row.
#[derive(Default)]
pub struct CollectSink {
    pub rows: Vec<Row>,
}

impl RowSink for CollectSink {
    fn push(&mut self, row: Row) -> error_stack::Result<(), SinkError> {
        self.rows.push(row);
        Ok(())
    }
}

/// A pass-through step that appends a tag column to every row, counts what
/// it saw, and can be told to stop wanting input after a fixed number of
/// rows.
pub struct TagStep {
    tag: String,
    pub processed: usize,
    pub finished: bool,
    no_more_after: Option<usize>,
}

impl TagStep {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            processed: 0,
            finished: false,
            no_more_after: None,
        }
    }

    pub fn no_more_after(mut self, n: usize) -> Self {
        self.no_more_after = Some(n);
        self
    }
}

impl PipelineStep for TagStep {
    fn process(
        &mut self,
        mut row: Row,
        out: &mut dyn RowSink,
    ) -> error_stack::Result<(), StepError> {
        self.processed += 1;
        row.columns.push(self.tag.clone());
        out.push(row)
            .map_err(|e| e.change_context(StepError::Process))
    }

    fn finish(&mut self, _out: &mut dyn RowSink) -> error_stack::Result<(), StepError> {
        assert!(!self.finished, "finish called twice");
        self.finished = true;
        Ok(())
    }

    fn wants_no_more(&self) -> bool {
        self.no_more_after.is_some_and(|n| self.processed >= n)
    }

    fn reset(&mut self) {
        self.processed = 0;
        self.finished = false;
    }

    fn clone_step(&self) -> Box<dyn PipelineStep> {
        Box::new(Self {
            tag: self.tag.clone(),
            processed: 0,
            finished: false,
            no_more_after: self.no_more_after,
        })
    }
}
