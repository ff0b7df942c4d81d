//! Tracing setup.
//!
//! Foreground runs log to the terminal; daemonized runs log to a file,
//! since stdio is redirected to /dev/null after the fork. `RUST_LOG`
//! overrides the verbosity chosen on the command line.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;

pub const LOG_DIR: &str = "/var/log";
pub const LOG_FILE: &str = "cconfd.log";

pub fn init(config: &RuntimeConfig, daemonized: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose { "debug" } else { "info" })
    });

    if daemonized {
        let appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(appender)
            .with_ansi(false);
        let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer();
        let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    }
}
