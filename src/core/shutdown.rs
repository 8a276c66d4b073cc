//! Process-level shutdown coordination
//!
//! Turns SIGINT/SIGTERM (or Ctrl-C elsewhere) into a broadcast that the
//! binary uses to stop its listener containers. A second signal exits the
//! process immediately.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the application
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let coordinator = Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, shutdown_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Spawn signal listeners that trigger this coordinator
    ///
    /// Must be called from within a tokio runtime.
    pub fn install_signal_handlers(&self) {
        let signal_count = Arc::new(AtomicUsize::new(0));

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
                let tx = self.shutdown_tx.clone();
                let requested = self.shutdown_requested.clone();
                let counter = signal_count.clone();
                tokio::spawn(async move {
                    if let Ok(mut sig) = signal(kind) {
                        while sig.recv().await.is_some() {
                            on_signal(&tx, &requested, &counter);
                        }
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let tx = self.shutdown_tx.clone();
            let requested = self.shutdown_requested.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    on_signal(&tx, &requested, &signal_count);
                }
            });
        }
    }
}

fn on_signal(tx: &broadcast::Sender<()>, requested: &AtomicBool, counter: &AtomicUsize) {
    let previous = counter.fetch_add(1, Ordering::AcqRel);
    requested.store(true, Ordering::Release);
    let _ = tx.send(());
    if previous >= 1 {
        log::warn!("Second shutdown signal received; exiting");
        std::process::exit(130);
    }
    log::info!("Shutdown requested, draining listeners (signal again to force exit)");
}
