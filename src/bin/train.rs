//! Train a DQN agent on the highway environment and save early and final checkpoints.
use clap::Parser;
use highway_dqn::logging::{
    init_console, ByCounter, ByTime, DisplayBackend, DisplayLogger, TensorBoardBackend,
    TensorBoardLogger,
};
use highway_dqn::{run_training, TrainingConfig};
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "train", author, about = "Train a DQN agent to drive on a highway")]
pub struct Args {
    /// JSON training configuration. Missing fields keep their default values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for the policies, reward curve and logs
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_console(std::io::stderr)?;
    let config: TrainingConfig = match &args.config {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => TrainingConfig::default(),
    };
    println!("Training Config\n{:#?}\n", config);

    let log_dir = args.out_dir.join("logs");
    println!("Logging to {:?}", log_dir);
    let mut logger = (
        DisplayLogger::new(ByTime::new(Duration::from_secs(5)), DisplayBackend),
        TensorBoardLogger::new(
            ByCounter::of_path(["episodes"], 10),
            TensorBoardBackend::new(&log_dir),
        ),
    );

    println!(
        "Training {} for {} steps ({} early, {} final)",
        config.env_id,
        config.schedule.total_timesteps,
        config.schedule.early_steps(),
        config.schedule.final_steps()
    );
    let report = run_training(&config, &args.out_dir, &mut logger)?;
    drop(logger); // Flush output before the following prints

    println!("Early policy saved as {:?}", report.early_policy);
    println!("Final policy saved as {:?}", report.final_policy);
    println!("Training curve saved as {:?}", report.reward_curve);
    println!("Training configuration saved as {:?}", report.config);
    println!("\nTraining Summary\n{}", report.summary);
    Ok(())
}
