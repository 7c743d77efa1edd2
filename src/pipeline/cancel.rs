use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Cooperative stop request shared between the signal listener and the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    requested: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Set the flag on the first Ctrl+C. Must be called inside a tokio runtime.
    pub fn cancel_on_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, finishing current repository");
                    eprintln!("\nInterrupt received, saving progress...");
                    flag.cancel();
                }
                Err(err) => warn!(error = %err, "could not listen for Ctrl+C"),
            }
        });
    }
}
