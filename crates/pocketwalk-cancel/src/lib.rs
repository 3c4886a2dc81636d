//! Ctrl-C handling: the first interrupt sets a flag the supervisor polls
//! each tick to begin a graceful shutdown; a second interrupt exits at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    /// Install the Ctrl-C handler and return a handle for polling it.
    ///
    /// Spawns a task that awaits `tokio::signal::ctrl_c()` in a loop: the
    /// first signal sets the flag, every signal after that exits the
    /// process immediately rather than waiting for a graceful shutdown that
    /// may never come.
    pub fn install() -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = Self {
            cancelled: Arc::clone(&cancelled),
        };

        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if cancelled.swap(true, Ordering::SeqCst) {
                    eprintln!("EXITING DUE TO MULTIPLE SIGINTS RECEIVED.");
                    std::process::exit(1);
                }
                info!("\n\nCTRL-C detected.");
            }
        });

        handle
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn for_testing() -> (Self, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: Arc::clone(&cancelled),
            },
            cancelled,
        )
    }
}
