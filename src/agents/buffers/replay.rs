use super::super::PartialStep;
use crate::Prng;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Fixed-capacity buffer of the most recent steps.
///
/// Once full, each new step replaces the oldest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBuffer<O, A> {
    /// A circular buffer of steps.
    steps: Vec<PartialStep<O, A>>,
    capacity: usize,
    /// Index in `steps` at which the next step is written once the buffer is full.
    next_index: usize,
    /// Total number of steps pushed over the lifetime of the buffer.
    total_step_count: u64,
}

impl<O, A> ReplayBuffer<O, A> {
    /// Create a new `ReplayBuffer` holding at most `capacity` steps.
    ///
    /// # Panics
    /// If `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            steps: Vec::new(),
            capacity,
            next_index: 0,
            total_step_count: 0,
        }
    }

    /// The maximum number of stored steps.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of steps stored in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total number of steps pushed over the lifetime of the buffer, including evicted steps.
    #[must_use]
    pub const fn total_step_count(&self) -> u64 {
        self.total_step_count
    }

    /// Add a step, evicting the oldest step if the buffer is full.
    pub fn push(&mut self, step: PartialStep<O, A>) {
        if self.steps.len() < self.capacity {
            self.steps.push(step);
        } else {
            self.steps[self.next_index] = step;
        }
        self.next_index = (self.next_index + 1) % self.capacity;
        self.total_step_count += 1;
    }

    /// Iterator over the stored steps, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PartialStep<O, A>> {
        let (newer, older) = if self.steps.len() < self.capacity {
            self.steps.split_at(0)
        } else {
            self.steps.split_at(self.next_index)
        };
        older.iter().chain(newer)
    }

    /// Sample `batch_size` steps uniformly at random with replacement.
    ///
    /// Returns an empty batch if the buffer is empty.
    pub fn sample(&self, batch_size: usize, rng: &mut Prng) -> Vec<&PartialStep<O, A>> {
        if self.steps.is_empty() {
            return Vec::new();
        }
        let dist = Uniform::new(0, self.steps.len());
        (0..batch_size)
            .map(|_| &self.steps[dist.sample(rng)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::Successor;
    use rand::SeedableRng;

    fn step(i: u32) -> PartialStep<u32, ()> {
        PartialStep::new(i, (), f64::from(i), Successor::Continue(i + 1))
    }

    #[test]
    fn fills_to_capacity() {
        let mut buffer = ReplayBuffer::with_capacity(3);
        assert!(buffer.is_empty());
        buffer.push(step(0));
        buffer.push(step(1));
        assert_eq!(buffer.len(), 2);
        assert_eq!(
            buffer.iter().map(|s| s.observation).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut buffer = ReplayBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(step(i));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.total_step_count(), 5);
        assert_eq!(
            buffer.iter().map(|s| s.observation).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn sample_with_replacement() {
        let mut buffer = ReplayBuffer::with_capacity(10);
        for i in 0..4 {
            buffer.push(step(i));
        }
        let mut rng = Prng::seed_from_u64(0);
        let batch = buffer.sample(64, &mut rng);
        assert_eq!(batch.len(), 64);
        assert!(batch.iter().all(|s| s.observation < 4));
        // With 64 draws from 4 items every item appears
        for i in 0..4 {
            assert!(batch.iter().any(|s| s.observation == i));
        }
    }

    #[test]
    fn sample_empty() {
        let buffer = ReplayBuffer::<u32, ()>::with_capacity(10);
        assert!(buffer.sample(8, &mut Prng::seed_from_u64(0)).is_empty());
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = ReplayBuffer::<u32, ()>::with_capacity(0);
    }
}
