use crate::Row;

/// Number of rows whose exact encoded length is measured before the batch
/// switches to the running per-line estimate.
const LINES_FOR_SIZE_ESTIMATION: usize = 100;

/// Bounds on how far a batch may grow or shrink between fill cycles.
#[derive(Clone, Copy, Debug)]
pub struct CapacityLimits {
    /// Smallest row capacity a batch may shrink to.
    pub min: usize,
    /// Largest row capacity a batch may grow to.
    pub max: usize,
    /// Upper bound on the estimated byte footprint of a single batch. A
    /// batch at or over this bound reports full and refuses to grow.
    pub max_bytes: usize,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            min: 1,
            max: 1024,
            max_bytes: 1 << 30,
        }
    }
}

/// A growable, reusable, ordered container of rows.
///
/// One of a pair circulating between the producer and the consumer. There
/// is no locking in here: the handoff protocol guarantees that exactly one
/// side holds a given batch at any time, and capacity only changes between
/// a drain and the next fill.
#[derive(Debug)]
pub struct RowBatch {
    rows: Vec<Row>,
    read: usize,
    capacity: usize,
    limits: CapacityLimits,
    byte_count: usize,
    estimated_line: usize,
}

impl RowBatch {
    pub fn new(initial_capacity: usize, limits: CapacityLimits) -> Self {
        Self {
            rows: Vec::with_capacity(initial_capacity.clamp(limits.min, limits.max)),
            read: 0,
            capacity: initial_capacity.clamp(limits.min, limits.max),
            limits,
            byte_count: 0,
            estimated_line: 0,
        }
    }

    /// Append a row. The caller must have checked `is_full()` first.
    pub fn add(&mut self, row: Row) {
        debug_assert!(!self.is_full(), "add called on a full batch");
        if self.rows.len() < LINES_FOR_SIZE_ESTIMATION {
            self.byte_count += row.encoded_len();
            self.estimated_line = self.byte_count / (self.rows.len() + 1);
        } else {
            self.byte_count += self.estimated_line;
        }
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity || self.byte_count >= self.limits.max_bytes
    }

    /// Raise the capacity towards `new_capacity`, clamped to the maximum.
    ///
    /// Returns false when the capacity did not change: already at the row
    /// bound, or the batch is over its byte bound.
    pub fn try_grow(&mut self, new_capacity: usize) -> bool {
        if self.byte_count >= self.limits.max_bytes {
            return false;
        }
        let new_capacity = new_capacity.min(self.limits.max);
        if new_capacity == self.capacity {
            return false;
        }
        debug_assert!(new_capacity > self.capacity);
        self.capacity = new_capacity;
        true
    }

    /// Lower the target capacity for the next fill cycle. Not destructive
    /// to rows already in the batch.
    pub fn shrink_to(&mut self, new_capacity: usize) {
        self.capacity = new_capacity.clamp(self.limits.min, self.limits.max);
    }

    /// Clear content for the next fill cycle. Capacity is preserved.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.read = 0;
        self.byte_count = 0;
        self.estimated_line = 0;
    }

    pub fn has_unread(&self) -> bool {
        self.read < self.rows.len()
    }

    /// The row the next `next_row` call would return.
    pub fn peek(&self) -> Option<&Row> {
        self.rows.get(self.read)
    }

    /// Take the next unread row out of the batch.
    pub fn next_row(&mut self) -> Option<Row> {
        let row = self.rows.get_mut(self.read)?;
        self.read += 1;
        Some(std::mem::take(row))
    }

    /// True when the last row is the end-of-stream marker.
    pub fn contains_end_marker(&self) -> bool {
        self.rows.last().is_some_and(Row::is_end_marker)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn read_cursor(&self) -> usize {
        self.read
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn limits(&self) -> CapacityLimits {
        self.limits
    }
}
