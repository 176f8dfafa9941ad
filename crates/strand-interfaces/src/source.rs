use strand_batch::Row;

/// Errors reported by row sources.
#[non_exhaustive]
#[derive(derive_more::Display, Debug)]
pub enum SourceError {
    #[display(fmt = "internal error: {_0}")]
    Internal(&'static str),
    #[display(fmt = "failed to read row")]
    Read,
    #[display(fmt = "failed to reposition source")]
    Seek,
    #[display(fmt = "failed to close source")]
    Close,
}

impl error_stack::Context for SourceError {}

/// A pull iterator over rows sorted by (chromosome, position).
///
/// A source is owned by exactly one stream at a time; it is not required
/// to be safe for concurrent access. The engine guarantees `close` is
/// called on every exit path. `seek` may be invoked after `close`:
/// implementations backed by files or network cursors are expected to
/// reopen as needed.
pub trait RowSource: Send {
    /// The next row, or `None` once the source is exhausted.
    fn try_next(&mut self) -> error_stack::Result<Option<Row>, SourceError>;

    /// Reposition to the first row at or after `(chrom, pos)`.
    ///
    /// Returns false when the source has no native seek; the engine then
    /// falls back to a linear forward skip.
    fn seek(&mut self, chrom: &str, pos: i64) -> error_stack::Result<bool, SourceError> {
        let _ = (chrom, pos);
        Ok(false)
    }

    fn close(&mut self) -> error_stack::Result<(), SourceError> {
        Ok(())
    }

    /// An independent cursor over the same underlying data, positioned at
    /// the start. Returns `None` when the source cannot provide one;
    /// such a stream is not splittable.
    fn try_clone(&self) -> Option<Box<dyn RowSource>> {
        None
    }
}
