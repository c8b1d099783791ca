//! Epoch logging sink and subscriber setup.

use tracing_subscriber::EnvFilter;

/// Receives the per-epoch training messages.
pub trait EpochLogger {
    fn info(&mut self, message: &str);
}

/// Forwards epoch messages to `tracing` at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EpochLogger for TracingLogger {
    fn info(&mut self, message: &str) {
        tracing::info!(target: "seg_training::epoch", "{message}");
    }
}

/// Collects messages in memory.
impl EpochLogger for Vec<String> {
    fn info(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Install a fmt subscriber. `RUST_LOG` wins over `verbose` when set.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
