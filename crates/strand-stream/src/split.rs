use crate::error::Error;
use crate::stream::BatchedStream;

impl BatchedStream {
    /// Split the stream at a chromosome boundary for parallel consumption.
    ///
    /// The split point is the successor of the chromosome currently being
    /// read. This stream keeps the rows strictly before it; the returned
    /// stream is an independent cursor over the same data repositioned to
    /// its start, with its own copy of the pipeline step. Within each
    /// half, rows stay in (chromosome, position) order.
    ///
    /// A stream is splittable at most once. `Ok(None)` means no split is
    /// available (not yet reading, an unknown or final chromosome, a
    /// source without independent cursors, or a split already taken);
    /// the stream then delivers everything remaining, including the
    /// final partial chromosome.
    pub fn try_split(&mut self) -> error_stack::Result<Option<BatchedStream>, Error> {
        if self.no_split || self.closed {
            return Ok(None);
        }
        let Some(current_chrom) = self.current_chrom.clone() else {
            self.no_split = true;
            return Ok(None);
        };
        let Some(split_chrom) = self
            .order
            .successor(&current_chrom)
            .map(str::to_owned)
        else {
            self.no_split = true;
            return Ok(None);
        };
        let Some(source) = self.split_source.take() else {
            self.no_split = true;
            return Ok(None);
        };
        let step = self.split_step.take();

        let mut split = BatchedStream::with_order(
            source,
            step,
            self.options.clone(),
            self.order.clone(),
        );
        split.no_split = true;
        split.set_position(&split_chrom, 0)?;

        tracing::debug!(split_chrom, "split stream at chromosome boundary");
        self.split_bound = Some(split_chrom);
        self.no_split = true;
        Ok(Some(split))
    }
}
