//! Console output of diagnostic messages
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Print `log` and `tracing` records at info level and above to `make_writer`.
///
/// Fails if a global logger is already installed.
pub fn init_console<W>(make_writer: W) -> Result<(), TryInitError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_target(false)
        .finish()
        .try_init()
}
