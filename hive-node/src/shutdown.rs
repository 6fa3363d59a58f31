use std::sync::Arc;

use tokio::sync::watch;

/// The `ShouldShutdown` flag from §6: driven by OS signals, polled by the
/// main cycle loop, which terminates after the current cycle once it
/// flips. Re-scoped as an explicit subsystem with init/teardown rather
/// than a file-scope global, per Design Note "Global timer/profiler
/// singletons".
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = watch::channel(false);
        Arc::new(Self { tx, rx })
    }

    pub fn should_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Installs a Ctrl-C handler that triggers shutdown. Spawned as a
    /// background task; returns immediately.
    pub fn watch_signals(self: &std::sync::Arc<Self>) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received shutdown signal");
                shutdown.trigger();
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
