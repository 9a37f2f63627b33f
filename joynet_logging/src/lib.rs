//! Log setup shared by every JoyNet crate. Library code logs through the `log` facade with
//! `target: "joynet"`; the subscriber installed here picks those records up alongside `tracing` events.
pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Sets up the logging for any crate. A panic anywhere is logged, then the process exits
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "joynet", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber without touching the panic hook. Safe to call more than once; only the
/// first call installs anything. Filtering is controlled through `RUST_LOG`
pub fn setup_log_no_panic_hook() {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init();
}
