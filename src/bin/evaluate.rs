//! Record a comparison video of a random agent and two trained checkpoints.
use clap::Parser;
use highway_dqn::logging::{init_console, ByTime, DisplayBackend, DisplayLogger};
use highway_dqn::{run_evaluation, EvaluationConfig};
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "evaluate",
    author,
    about = "Record an evaluation video of the trained highway agents"
)]
pub struct Args {
    /// JSON evaluation configuration. Missing fields keep their default values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory containing the trained policies; the video is written here too
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_console(std::io::stderr)?;
    let config: EvaluationConfig = match &args.config {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => EvaluationConfig::default(),
    };
    println!("Evaluation Config\n{:#?}\n", config);

    let mut logger = DisplayLogger::new(ByTime::new(Duration::from_secs(5)), DisplayBackend);
    let report = run_evaluation(&config, &args.out_dir, &mut logger)?;
    drop(logger);

    for episode in &report.episodes {
        println!("{}", episode);
    }
    println!(
        "Evolution video saved as {:?} ({} frames)",
        report.output, report.num_frames
    );
    Ok(())
}
