//! Parameter schedules --- functions of the global step count during training.
use crate::agents::ActorMode;
use serde::{Deserialize, Serialize};

/// Selects the exploration rate as a function the elapsed step count.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorationRateSchedule {
    Constant(f64),
    LinearAnnealed {
        start: f64,
        end: f64,
        /// Number of steps to reach the `end` value.
        period: u64,
    },
}

/// Anneal from fully random to 5% random actions over 15% of a 40k step run.
impl Default for ExplorationRateSchedule {
    fn default() -> Self {
        Self::LinearAnnealed {
            start: 1.0,
            end: 0.05,
            period: 6_000,
        }
    }
}

impl ExplorationRateSchedule {
    /// Linear schedule reaching `end` after `fraction` of `total_steps`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn annealed_over_fraction(start: f64, end: f64, fraction: f64, total_steps: u64) -> Self {
        Self::LinearAnnealed {
            start,
            end,
            period: (fraction * total_steps as f64).round() as u64,
        }
    }

    #[must_use]
    pub fn exploration_rate(&self, global_steps: u64, mode: ActorMode) -> f64 {
        use ExplorationRateSchedule::{Constant, LinearAnnealed};
        match (mode, self) {
            (ActorMode::Evaluation, _) => 0.0,
            (ActorMode::Training, Constant(rate)) => *rate,
            (ActorMode::Training, LinearAnnealed { end, period: 0, .. }) => *end,
            (ActorMode::Training, LinearAnnealed { start, end, period }) => {
                (global_steps as f64 / *period as f64).min(1.0) * (end - start) + start
            }
        }
    }
}
