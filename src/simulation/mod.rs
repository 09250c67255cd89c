//! Training and evaluating agents in the highway environment
mod evaluate;
mod monitor;
mod train;

pub use evaluate::{
    run_evaluation, EpisodeRecorder, EpisodeReport, EvaluationConfig, EvaluationReport,
    HighwayPolicy,
};
pub use monitor::{EpisodesSummary, Monitor};
pub use train::{
    run_training, Trainer, TrainingArtifacts, TrainingConfig, TrainingReport, TrainingSchedule,
};
