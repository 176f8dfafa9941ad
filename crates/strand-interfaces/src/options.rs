use std::time::Duration;

/// Options affecting a batched stream, supplied at construction.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Row capacity of a batch on its first fill cycle.
    pub initial_capacity: usize,
    /// Smallest row capacity a batch may shrink to.
    pub min_capacity: usize,
    /// Largest row capacity a batch may grow to.
    pub max_capacity: usize,
    /// Upper bound on the estimated byte footprint of a single batch.
    pub max_batch_bytes: usize,
    /// Maximum age of a batch before the producer prefers flushing it over
    /// growing it. `None` disables the time trigger: the policy is then
    /// size-only.
    pub flush_trigger: Option<Duration>,
    /// How long a single handoff attempt waits before re-checking the
    /// stop flag.
    pub poll_interval: Duration,
    /// Total time a handoff may stall before it is treated as a fatal
    /// liveness error.
    pub handoff_timeout: Duration,
    /// How often a stalled handoff emits a diagnostic log line.
    pub log_interval: Duration,
    /// Close the stream as soon as it reports exhaustion.
    pub auto_close: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            initial_capacity: 1,
            min_capacity: 1,
            max_capacity: 1024,
            max_batch_bytes: 1 << 30,
            flush_trigger: None,
            poll_interval: Duration::from_millis(100),
            handoff_timeout: Duration::from_secs(30 * 60),
            log_interval: Duration::from_secs(10),
            auto_close: false,
        }
    }
}

impl StreamOptions {
    /// Number of handoff polls between diagnostic log lines.
    pub fn polls_before_log(&self) -> u64 {
        (self.log_interval.as_millis() / self.poll_interval.as_millis().max(1)).max(1) as u64
    }

    /// Number of handoff polls before the overall timeout trips.
    pub fn polls_before_timeout(&self) -> u64 {
        (self.handoff_timeout.as_millis() / self.poll_interval.as_millis().max(1)).max(1) as u64
    }
}
