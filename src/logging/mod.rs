//! Statistics logging for training and evaluation runs
//!
//! Values are logged under hierarchical [`Id`]s in groups, one group per environment step or
//! agent update. A [`ChunkLogger`] summarizes the values over chunks delimited by a [`Chunker`]
//! and hands each chunk to a [`SummaryWriter`] backend.
mod chunk;
mod chunk_by_counter;
mod chunk_by_time;
mod console;
mod display;
mod tensorboard;

pub use chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
pub use chunk_by_counter::ByCounter;
pub use chunk_by_time::ByTime;
pub use console::init_console;
pub use display::{DisplayBackend, DisplayLogger};
pub use tensorboard::{TensorBoardBackend, TensorBoardLogger};

use log::warn;
use std::borrow::Cow;
use std::fmt;
use std::iter::FromIterator;
use std::time::Duration;
use thiserror::Error;

/// A logged value.
#[derive(Debug, Clone, PartialEq)]
pub enum Loggable {
    /// A real number. Summarized by its mean.
    Scalar(f64),
    /// Increment of a monotonic counter.
    CounterIncrement(u64),
    /// Elapsed time. Summarized by its mean.
    Duration(Duration),
    /// A sample from `0 .. size`. Summarized by a histogram.
    Index { value: usize, size: usize },
}

impl Loggable {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::CounterIncrement(_) => "counter",
            Self::Duration(_) => "duration",
            Self::Index { .. } => "index",
        }
    }
}

impl From<f64> for Loggable {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Duration> for Loggable {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

/// A value could not be combined with earlier values of the same [`Id`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("value kind changed from {prev} to {now}")]
    KindMismatch {
        prev: &'static str,
        now: &'static str,
    },
    #[error("index size changed from {prev} to {now}")]
    IndexSizeMismatch { prev: usize, now: usize },
}

/// Slash-separated name of a logged value, like `agent/loss`.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(Vec<Cow<'static, str>>);

impl Id {
    pub fn new<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Self(vec![name.into()])
    }

    /// Nest this ID inside `scope`.
    #[must_use]
    pub fn with_prefix(mut self, scope: &'static str) -> Self {
        self.0.insert(0, scope.into());
        self
    }
}

impl From<&'static str> for Id {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl FromIterator<&'static str> for Id {
    fn from_iter<I: IntoIterator<Item = &'static str>>(iter: I) -> Self {
        Self(iter.into_iter().map(Cow::Borrowed).collect())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

/// Log statistics.
///
/// Values are logged in groups that belong to the same time step.
/// Loggers only flush between groups.
pub trait StatsLogger {
    fn group_start(&mut self);

    /// Log a value in the current group.
    ///
    /// Fails if the value cannot be combined with earlier values logged under `id`.
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError>;

    fn group_end(&mut self);

    /// Write out the current chunk.
    fn flush(&mut self);

    /// Log a single value as its own group.
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.group_start();
        let result = self.group_log(id, value);
        self.group_end();
        result
    }

    fn log_scalar(&mut self, name: &'static str, value: f64) {
        warn_on_error(name, self.log(name.into(), Loggable::Scalar(value)));
    }

    fn log_counter_increment(&mut self, name: &'static str, increment: u64) {
        warn_on_error(
            name,
            self.log(name.into(), Loggable::CounterIncrement(increment)),
        );
    }

    fn log_duration(&mut self, name: &'static str, duration: Duration) {
        warn_on_error(name, self.log(name.into(), Loggable::Duration(duration)));
    }

    fn log_index(&mut self, name: &'static str, value: usize, size: usize) {
        warn_on_error(name, self.log(name.into(), Loggable::Index { value, size }));
    }

    /// Prefix every logged ID with `scope`.
    fn with_scope(&mut self, scope: &'static str) -> ScopedLogger<&mut Self>
    where
        Self: Sized,
    {
        ScopedLogger::new(self, scope)
    }
}

fn warn_on_error(name: &str, result: Result<(), LogError>) {
    if let Err(err) = result {
        warn!("not logging {:?}: {}", name, err);
    }
}

/// Discards everything.
impl StatsLogger for () {
    fn group_start(&mut self) {}
    fn group_log(&mut self, _: Id, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }
    fn group_end(&mut self) {}
    fn flush(&mut self) {}
}

/// Logs to both.
impl<A: StatsLogger, B: StatsLogger> StatsLogger for (A, B) {
    fn group_start(&mut self) {
        self.0.group_start();
        self.1.group_start();
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        let first = self.0.group_log(id.clone(), value.clone());
        let second = self.1.group_log(id, value);
        first.and(second)
    }
    fn group_end(&mut self) {
        self.0.group_end();
        self.1.group_end();
    }
    fn flush(&mut self) {
        self.0.flush();
        self.1.flush();
    }
}

impl<T: StatsLogger + ?Sized> StatsLogger for &'_ mut T {
    fn group_start(&mut self) {
        T::group_start(self)
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        T::group_log(self, id, value)
    }
    fn group_end(&mut self) {
        T::group_end(self)
    }
    fn flush(&mut self) {
        T::flush(self)
    }
}

/// Prefixes the IDs logged to the inner logger with a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedLogger<L> {
    inner: L,
    scope: &'static str,
}

impl<L> ScopedLogger<L> {
    pub const fn new(inner: L, scope: &'static str) -> Self {
        Self { inner, scope }
    }
}

impl<L: StatsLogger> StatsLogger for ScopedLogger<L> {
    fn group_start(&mut self) {
        self.inner.group_start()
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.inner.group_log(id.with_prefix(self.scope), value)
    }
    fn group_end(&mut self) {
        self.inner.group_end()
    }
    fn flush(&mut self) {
        self.inner.flush()
    }
}
