use super::chunk::{ChunkSummary, Chunker};
use super::Id;

/// Ends a chunk whenever a counter reaches a multiple of `interval`.
///
/// The flush happens at the end of the group in which the counter was incremented,
/// so values logged in the same group as the increment belong to the ending chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByCounter {
    pub counter: Id,
    pub interval: u64,
    flush_pending: bool,
}

impl ByCounter {
    pub const fn new(counter: Id, interval: u64) -> Self {
        Self {
            counter,
            interval,
            flush_pending: false,
        }
    }

    /// Count by the counter at the given ID path.
    pub fn of_path<T: IntoIterator<Item = &'static str>>(path: T, interval: u64) -> Self {
        Self::new(path.into_iter().collect(), interval)
    }
}

impl Chunker for ByCounter {
    fn note_logged(&mut self, id: &Id, summary: &ChunkSummary) {
        if let ChunkSummary::Counter { total, .. } = summary {
            if self.interval > 0 && *id == self.counter && *total % self.interval == 0 {
                self.flush_pending = true;
            }
        }
    }

    fn flush_group_end(&mut self) -> bool {
        self.flush_pending
    }

    fn note_flush(&mut self) {
        self.flush_pending = false;
    }
}
