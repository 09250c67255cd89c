use super::Actor;
use crate::spaces::SampleSpace;
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An actor that always acts randomly.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomActor<AS> {
    action_space: AS,
}

impl<AS> RandomActor<AS> {
    pub const fn new(action_space: AS) -> Self {
        Self { action_space }
    }
}

impl<O, AS: SampleSpace> Actor<O, AS::Element> for RandomActor<AS> {
    fn act(&self, _: &O, rng: &mut Prng) -> AS::Element {
        self.action_space.sample(rng)
    }
}

impl<AS: fmt::Debug> fmt::Display for RandomActor<AS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RandomActor({:?})", self.action_space)
    }
}
