//! The shared shutdown flag.
//!
//! Set in-process on `SIGINT`/`SIGTERM`; a second signal within 5 s forces
//! an immediate exit instead of waiting for in-flight work to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::{signal, SignalKind};

const FORCE_EXIT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a task that sets `flag` on `SIGINT`/`SIGTERM`. A second such
/// signal within [`FORCE_EXIT_WINDOW`] of the first exits the process
/// immediately with code 130, per the external interface's signal handling.
pub fn install_signal_handlers(flag: ShutdownFlag) {
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        let mut first_signal_at: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = sigint.recv() => {},
                _ = sigterm.recv() => {},
            }

            match first_signal_at {
                Some(at) if at.elapsed() < FORCE_EXIT_WINDOW => {
                    tracing::warn!("second interrupt received, exiting immediately");
                    std::process::exit(130);
                }
                _ => {
                    tracing::info!("shutdown signal received, finishing in-flight work");
                    flag.set();
                    first_signal_at = Some(Instant::now());
                }
            }
        }
    });
}
