//! History buffers
mod replay;

pub use replay::ReplayBuffer;
