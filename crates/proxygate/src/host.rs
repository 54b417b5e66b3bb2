//! The hosting process, as far as the gateway is concerned.

/// Lifecycle hooks the gateway calls into.
pub trait Host: Send + Sync + 'static {
    /// Called after a `quit` acknowledgement has been sent.
    fn quit(&self);
}

/// Terminates the process with status 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Host for ProcessExit {
    fn quit(&self) {
        tracing::info!("quit requested, exiting process");
        std::process::exit(0);
    }
}

/// Leaves the process running. The gateway loop still stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Host for Detached {
    fn quit(&self) {
        tracing::info!("quit requested, process left running");
    }
}
