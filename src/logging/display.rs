//! Terminal logger
use super::chunk::{ChunkLogger, ChunkSummary, SummaryWriter};
use super::{ByTime, Id};
use crate::utils::fmt::{Compact, DisplayFn, Rate};
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Logger that prints chunk summaries to standard output.
pub type DisplayLogger<C = ByTime> = ChunkLogger<C, DisplayBackend>;

/// Prints one line per summary.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        println!(
            "{}",
            Paint::fixed(8, format!("---- {:.1?} ----", elapsed))
        );
        for (id, summary) in summaries {
            println!(
                "{:<28} {}",
                Paint::fixed(35, id),
                SummaryLine { summary, elapsed }
            );
        }
    }
}

struct SummaryLine<'a> {
    summary: &'a ChunkSummary,
    elapsed: Duration,
}

impl fmt::Display for SummaryLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.summary {
            ChunkSummary::Scalar(stats) => {
                if let (Some(mean), Some(stddev), Some((min, max))) =
                    (stats.mean(), stats.stddev(), stats.range())
                {
                    write!(f, "{:.3}", Compact(mean))?;
                    if stats.count() > 1 {
                        let spread = DisplayFn(|f| {
                            write!(
                                f,
                                "(σ {:.3})  [{:.3}, {:.3}]",
                                Compact(stddev),
                                Compact(min),
                                Compact(max)
                            )
                        });
                        write!(f, " {}", Paint::fixed(8, spread))?;
                    }
                }
                Ok(())
            }
            ChunkSummary::Counter { total, increment } => {
                write!(f, "{}  (+{})", total, Paint::fixed(253, increment))?;
                if *increment > 1 {
                    let rate = Rate::new(*increment, self.elapsed);
                    write!(f, "  {:.2}", Paint::fixed(111, rate))?;
                }
                Ok(())
            }
            ChunkSummary::Duration(stats) => {
                if let Some(mean) = stats.mean() {
                    write!(f, "{:.3?}", Duration::from_secs_f64(mean))?;
                    let total = mean * stats.count() as f64;
                    let share = DisplayFn(|f| {
                        write!(f, "{:.1}%", total / self.elapsed.as_secs_f64() * 100.0)
                    });
                    write!(f, "  {}", Paint::fixed(221, share))?;
                }
                Ok(())
            }
            ChunkSummary::Index(counts) => {
                let n: u64 = counts.iter().sum();
                write!(f, "(n {})  [", n)?;
                for (i, count) in counts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", count * 100 / n.max(1))?;
                }
                f.write_str("]%")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stats::RunningStats;

    fn line(summary: &ChunkSummary) -> String {
        Paint::disable();
        SummaryLine {
            summary,
            elapsed: Duration::from_secs(2),
        }
        .to_string()
    }

    #[test]
    fn scalar() {
        let stats: RunningStats = [1.0, 3.0].into_iter().collect();
        assert_eq!(
            line(&ChunkSummary::Scalar(stats)),
            "2.000 (σ 1.000)  [1.000, 3.000]"
        );
    }

    #[test]
    fn single_scalar_has_no_spread() {
        let stats: RunningStats = [0.5].into_iter().collect();
        assert_eq!(line(&ChunkSummary::Scalar(stats)), "0.500");
    }

    #[test]
    fn counter_rate() {
        let summary = ChunkSummary::Counter {
            total: 10,
            increment: 4,
        };
        assert_eq!(line(&summary), "10  (+4)  2.00/s");
    }

    #[test]
    fn index_percentages() {
        assert_eq!(line(&ChunkSummary::Index(vec![1, 3])), "(n 4)  [25 75]%");
    }
}
