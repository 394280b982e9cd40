use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free per-collector message counters.
///
/// `snapshot()` atomically reads and resets all counters, making it
/// suitable for periodic reporting without contention.
pub struct MessageStats {
    received: AtomicU64,
    replied: AtomicU64,
    records: AtomicU64,
    frame_errors: AtomicU64,
}

impl MessageStats {
    /// Create a new zeroed MessageStats.
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            replied: AtomicU64::new(0),
            records: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
        }
    }

    /// Count one complete request message.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one reply written back to a peer.
    pub fn record_replied(&self) {
        self.replied.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `n` metric records processed.
    pub fn record_records(&self, n: u64) {
        self.records.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one connection torn down for a shape violation.
    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically read and reset all counters.
    pub fn snapshot(&self) -> MessageStatsSnapshot {
        MessageStatsSnapshot {
            received: self.received.swap(0, Ordering::Relaxed),
            replied: self.replied.swap(0, Ordering::Relaxed),
            records: self.records.swap(0, Ordering::Relaxed),
            frame_errors: self.frame_errors.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for MessageStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the message counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStatsSnapshot {
    pub received: u64,
    pub replied: u64,
    pub records: u64,
    pub frame_errors: u64,
}

impl MessageStatsSnapshot {
    /// True when nothing happened in the window, so the reporter can
    /// stay quiet.
    pub fn is_empty(&self) -> bool {
        self.received == 0 && self.replied == 0 && self.records == 0 && self.frame_errors == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = MessageStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_replied();
        stats.record_records(5);
        stats.record_frame_error();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.replied, 1);
        assert_eq!(snap.records, 5);
        assert_eq!(snap.frame_errors, 1);
    }

    #[test]
    fn test_snapshot_resets_counters() {
        let stats = MessageStats::new();
        stats.record_received();

        let snap1 = stats.snapshot();
        assert_eq!(snap1.received, 1);

        let snap2 = stats.snapshot();
        assert!(snap2.is_empty());
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(MessageStats::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_received();
                    stats.record_records(2);
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        let snap = stats.snapshot();
        assert_eq!(snap.received, 4000);
        assert_eq!(snap.records, 8000);
    }
}
