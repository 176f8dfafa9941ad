use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Best-effort stream counters, written by the producer and read by the
/// facade. Observability only; nothing here affects correctness.
#[derive(Debug, Default)]
pub struct StreamStats {
    rows_handed_off: AtomicU64,
    batches_handed_off: AtomicU64,
    fill_time_ns: AtomicU64,
    seek_time_ns: AtomicU64,
    seeks: AtomicU64,
}

impl StreamStats {
    pub(crate) fn record_batch(&self, rows: u64, fill_time: Duration) {
        self.rows_handed_off.fetch_add(rows, Ordering::Relaxed);
        self.batches_handed_off.fetch_add(1, Ordering::Relaxed);
        self.fill_time_ns
            .fetch_add(fill_time.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_seek(&self, elapsed: Duration) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
        self.seek_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn rows_handed_off(&self) -> u64 {
        self.rows_handed_off.load(Ordering::Relaxed)
    }

    pub fn batches_handed_off(&self) -> u64 {
        self.batches_handed_off.load(Ordering::Relaxed)
    }

    pub fn avg_batch_size(&self) -> f64 {
        let batches = self.batches_handed_off();
        if batches == 0 {
            return 0.0;
        }
        self.rows_handed_off() as f64 / batches as f64
    }

    pub fn avg_rows_per_milli(&self) -> f64 {
        let fill_ms = self.fill_time_ns.load(Ordering::Relaxed) as f64 / 1e6;
        if fill_ms == 0.0 {
            return 0.0;
        }
        self.rows_handed_off() as f64 / fill_ms
    }

    pub fn avg_seek_millis(&self) -> f64 {
        let seeks = self.seeks.load(Ordering::Relaxed);
        if seeks == 0 {
            return 0.0;
        }
        self.seek_time_ns.load(Ordering::Relaxed) as f64 / 1e6 / seeks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages() {
        let stats = StreamStats::default();
        assert_eq!(stats.avg_batch_size(), 0.0);
        assert_eq!(stats.avg_seek_millis(), 0.0);

        stats.record_batch(10, Duration::from_millis(2));
        stats.record_batch(30, Duration::from_millis(2));
        assert_eq!(stats.rows_handed_off(), 40);
        assert_eq!(stats.batches_handed_off(), 2);
        assert_eq!(stats.avg_batch_size(), 20.0);
        assert_eq!(stats.avg_rows_per_milli(), 10.0);

        stats.record_seek(Duration::from_millis(4));
        stats.record_seek(Duration::from_millis(2));
        assert_eq!(stats.avg_seek_millis(), 3.0);
    }
}
