use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs a process-wide `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (falling back to `default_directive`) feeding a `fmt` layer.
/// Grounded on the `EnvFilter` + `fmt` composition used across the teacher's
/// services; hive nodes have no HTTP/gRPC surface of their own so no
/// request-scoped span layer is added.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    // A second call (e.g. in tests that each spin up a node) would panic on
    // `set_global_default`; ignore the error rather than letting later
    // subsystems fail to boot because logging was already installed.
    let _ = subscriber.try_init();
}
