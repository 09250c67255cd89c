use super::chunk::Chunker;
use coarsetime::{Duration as CoarseDuration, Instant as CoarseInstant};
use std::time::Duration;

/// Ends a chunk once `interval` has passed since the last flush.
///
/// Checked at the start of every group so uses a coarse clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByTime {
    pub interval: CoarseDuration,
    last_flush: CoarseInstant,
}

impl ByTime {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: CoarseDuration::new(interval.as_secs(), interval.subsec_nanos()),
            last_flush: CoarseInstant::now(),
        }
    }
}

impl Default for ByTime {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Chunker for ByTime {
    fn flush_group_start(&mut self) -> bool {
        self.last_flush.elapsed() > self.interval
    }

    fn note_flush(&mut self) {
        self.last_flush = CoarseInstant::now();
    }
}
