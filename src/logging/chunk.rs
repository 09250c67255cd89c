use super::{Id, LogError, Loggable, StatsLogger};
use crate::utils::stats::RunningStats;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Decides when a [`ChunkLogger`] ends the current chunk.
pub trait Chunker {
    /// Whether to flush before the group that is starting.
    fn flush_group_start(&mut self) -> bool {
        false
    }

    /// Observe the summary of `id` right after a value was added to it.
    fn note_logged(&mut self, _id: &Id, _summary: &ChunkSummary) {}

    /// Whether to flush after the group that just ended.
    fn flush_group_end(&mut self) -> bool {
        false
    }

    /// The current chunk was written out.
    fn note_flush(&mut self);
}

/// Backend that receives the summaries of each chunk.
pub trait SummaryWriter {
    /// Write the summaries updated during a chunk, in ID order.
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>;
}

/// Splits the logged time series into chunks and writes a summary of each chunk.
///
/// The current chunk is flushed when the logger is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLogger<C: Chunker, W: SummaryWriter> {
    chunker: C,
    writer: W,
    /// Sorted so that the writer sees IDs in a stable order
    entries: BTreeMap<Id, Entry>,
    chunk_start: Instant,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    summary: ChunkSummary,
    /// Updated since the last flush
    updated: bool,
}

impl<C: Chunker, W: SummaryWriter> ChunkLogger<C, W> {
    pub fn new(chunker: C, writer: W) -> Self {
        Self {
            chunker,
            writer,
            entries: BTreeMap::new(),
            chunk_start: Instant::now(),
        }
    }

    pub const fn writer(&self) -> &W {
        &self.writer
    }
}

impl<C: Chunker, W: SummaryWriter> StatsLogger for ChunkLogger<C, W> {
    fn group_start(&mut self) {
        if self.chunker.flush_group_start() {
            self.flush();
        }
    }

    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        let entry = self.entries.entry(id.clone()).or_insert_with(|| Entry {
            summary: ChunkSummary::empty_for(&value),
            updated: false,
        });
        entry.summary.push(value)?;
        entry.updated = true;
        self.chunker.note_logged(&id, &entry.summary);
        Ok(())
    }

    fn group_end(&mut self) {
        if self.chunker.flush_group_end() {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.entries.values().any(|entry| entry.updated) {
            let updated = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.updated)
                .map(|(id, entry)| (id, &entry.summary));
            self.writer
                .write_summaries(updated, self.chunk_start.elapsed());
        }
        for entry in self.entries.values_mut() {
            entry.summary.start_chunk();
            entry.updated = false;
        }
        self.chunk_start = Instant::now();
        self.chunker.note_flush();
    }
}

impl<C: Chunker, W: SummaryWriter> Drop for ChunkLogger<C, W> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Summary of the values logged under one ID.
///
/// Counters keep their running total across chunks; the other summaries cover one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSummary {
    Scalar(RunningStats),
    Counter {
        /// Total over all chunks so far
        total: u64,
        /// Increase within the current chunk
        increment: u64,
    },
    /// Durations in seconds.
    Duration(RunningStats),
    /// Number of occurrences of each index.
    Index(Vec<u64>),
}

impl ChunkSummary {
    /// An empty summary for values of the same kind as `value`.
    fn empty_for(value: &Loggable) -> Self {
        match value {
            Loggable::Scalar(_) => Self::Scalar(RunningStats::new()),
            Loggable::CounterIncrement(_) => Self::Counter {
                total: 0,
                increment: 0,
            },
            Loggable::Duration(_) => Self::Duration(RunningStats::new()),
            Loggable::Index { size, .. } => Self::Index(vec![0; *size]),
        }
    }

    /// Add a value. The summary is unchanged if the value is incompatible.
    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        match (self, value) {
            (Self::Scalar(stats), Loggable::Scalar(x)) => stats.push(x),
            (Self::Counter { total, increment }, Loggable::CounterIncrement(n)) => {
                *total += n;
                *increment += n;
            }
            (Self::Duration(stats), Loggable::Duration(d)) => stats.push(d.as_secs_f64()),
            (Self::Index(counts), Loggable::Index { value, size }) => {
                if counts.len() != size {
                    return Err(LogError::IndexSizeMismatch {
                        prev: counts.len(),
                        now: size,
                    });
                }
                if let Some(count) = counts.get_mut(value) {
                    *count += 1;
                }
            }
            (summary, value) => {
                return Err(LogError::KindMismatch {
                    prev: summary.kind(),
                    now: value.kind(),
                })
            }
        }
        Ok(())
    }

    fn start_chunk(&mut self) {
        match self {
            Self::Scalar(stats) | Self::Duration(stats) => *stats = RunningStats::new(),
            Self::Counter { increment, .. } => *increment = 0,
            Self::Index(counts) => counts.iter_mut().for_each(|c| *c = 0),
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Counter { .. } => "counter",
            Self::Duration(_) => "duration",
            Self::Index(_) => "index",
        }
    }
}
