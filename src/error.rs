//! Error type
use crate::envs::EnvError;
use crate::render::RenderError;
use crate::torch::agents::PolicyError;
use std::io;
use tch::TchError;
use thiserror::Error;

/// Error from training or evaluating a highway agent.
#[derive(Error, Debug)]
pub enum HighwayError {
    #[error("environment error")]
    Env(#[from] EnvError),
    #[error("policy error")]
    Policy(#[from] PolicyError),
    #[error("rendering error")]
    Render(#[from] RenderError),
    #[error("torch error")]
    Tch(#[from] TchError),
    #[error("configuration error")]
    Config(#[from] serde_json::Error),
    #[error("i/o error")]
    Io(#[from] io::Error),
}
