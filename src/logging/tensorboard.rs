//! TensorBoard logger
use super::chunk::{ChunkLogger, ChunkSummary, SummaryWriter};
use super::{ByTime, Id};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tensorboard_rs::summary_writer::SummaryWriter as EventWriter;

/// Logger that writes chunk summaries to a TensorBoard event file.
pub type TensorBoardLogger<C = ByTime> = ChunkLogger<C, TensorBoardBackend>;

/// Writes each chunk as one TensorBoard step.
///
/// Scalars and durations are written as their chunk mean, counters as their total,
/// and index histograms as one `tag/i` scalar per index holding its share of the chunk.
pub struct TensorBoardBackend {
    writer: EventWriter,
    step: usize,
}

impl fmt::Debug for TensorBoardBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TensorBoardBackend")
            .field("step", &self.step)
            .finish()
    }
}

impl TensorBoardBackend {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            writer: EventWriter::new(log_dir),
            step: 0,
        }
    }
}

impl SummaryWriter for TensorBoardBackend {
    #[allow(clippy::cast_possible_truncation)]
    fn write_summaries<'a, I>(&mut self, summaries: I, _: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        for (id, summary) in summaries {
            let tag = id.to_string();
            match summary {
                ChunkSummary::Scalar(stats) | ChunkSummary::Duration(stats) => {
                    if let Some(mean) = stats.mean() {
                        self.writer.add_scalar(&tag, mean as f32, self.step);
                    }
                }
                ChunkSummary::Counter { total, .. } => {
                    self.writer.add_scalar(&tag, *total as f32, self.step);
                }
                ChunkSummary::Index(counts) => {
                    let n = counts.iter().sum::<u64>().max(1) as f32;
                    for (i, count) in counts.iter().enumerate() {
                        let share = *count as f32 / n;
                        self.writer
                            .add_scalar(&format!("{}/{}", tag, i), share, self.step);
                    }
                }
            }
        }
        self.step += 1;
        self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ByCounter, StatsLogger};
    use super::*;

    #[test]
    fn writes_event_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut logger = TensorBoardLogger::new(
                ByCounter::of_path(["episodes"], 1),
                TensorBoardBackend::new(dir.path()),
            );
            logger.log_scalar("episode_reward", 3.0);
            logger.log_index("lane", 2, 4);
            logger.log_counter_increment("episodes", 1);
        }
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(files > 0);
    }
}
