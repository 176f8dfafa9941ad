use strand_batch::Row;

/// Raised by a sink when a pushed row cannot be delivered downstream.
///
/// The engine records the underlying cause separately; steps should
/// propagate this error rather than attempt recovery.
#[derive(derive_more::Display, Debug)]
#[display(fmt = "failed to deliver row downstream")]
pub struct SinkError;

impl error_stack::Context for SinkError {}

/// Errors reported by pipeline steps.
#[non_exhaustive]
#[derive(derive_more::Display, Debug)]
pub enum StepError {
    #[display(fmt = "internal error: {_0}")]
    Internal(&'static str),
    #[display(fmt = "failed to process row")]
    Process,
    #[display(fmt = "failed to finish step")]
    Finish,
}

impl error_stack::Context for StepError {}

/// Destination for rows leaving a pipeline step. Implemented by the
/// engine's batch writer.
pub trait RowSink {
    fn push(&mut self, row: Row) -> error_stack::Result<(), SinkError>;
}

/// A processing stage applied to every row before it enters a batch.
///
/// A step is owned by exactly one stream at a time. Cooperation is by
/// polling, not interruption: the engine polls `wants_no_more` once per
/// row, and a cancelled engine simply stops calling `process`.
pub trait PipelineStep: Send {
    /// Process one row, emitting zero or more rows into the sink. A step
    /// may buffer internally and emit later (in `finish`).
    fn process(
        &mut self,
        row: Row,
        out: &mut dyn RowSink,
    ) -> error_stack::Result<(), StepError>;

    /// Called exactly once after the last processed row, even on early
    /// termination. Buffered rows should be flushed into the sink here.
    fn finish(&mut self, out: &mut dyn RowSink) -> error_stack::Result<(), StepError>;

    /// True when the step wants no further input. Polled once per row.
    fn wants_no_more(&self) -> bool {
        false
    }

    /// Notification that no further `process` calls will be made before
    /// `finish`. Default is to do nothing.
    fn request_no_more(&mut self) {}

    /// Return the step to its initial state ahead of a mid-stream reseek.
    fn reset(&mut self);

    /// An independent copy with fresh state, for partitioned consumption.
    fn clone_step(&self) -> Box<dyn PipelineStep>;
}
