//! Formatting helpers for terminal output
use std::fmt;
use std::time::Duration;

/// Displays a number in scientific notation when it is very large or very small.
#[derive(Debug, Default, Copy, Clone, PartialEq, PartialOrd)]
pub struct Compact(pub f64);

impl fmt::Display for Compact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let magnitude = self.0.abs();
        if self.0 != 0.0 && !(1e-4..1e6).contains(&magnitude) {
            fmt::LowerExp::fmt(&self.0, f)
        } else {
            fmt::Display::fmt(&self.0, f)
        }
    }
}

/// Number of events per second, with a `k` suffix above one thousand.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Rate(pub f64);

impl Rate {
    /// Rate of `count` events over `elapsed`.
    pub fn new(count: u64, elapsed: Duration) -> Self {
        Self(count as f64 / elapsed.as_secs_f64())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 >= 1e3 {
            fmt::Display::fmt(&Compact(self.0 / 1e3), f)?;
            f.write_str("k/s")
        } else {
            fmt::Display::fmt(&Compact(self.0), f)?;
            f.write_str("/s")
        }
    }
}

/// Display implemented by a closure
pub struct DisplayFn<F>(pub F)
where
    F: Fn(&mut fmt::Formatter) -> fmt::Result;

impl<F> fmt::Display for DisplayFn<F>
where
    F: Fn(&mut fmt::Formatter) -> fmt::Result,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self.0)(f)
    }
}
