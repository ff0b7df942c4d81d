//! cconfd binary: parse the command line, daemonize, then run the
//! dispatch loop on a single-threaded runtime until a termination
//! signal arrives.

mod cli;
mod handlers;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info};

use cconfd::config::RuntimeConfig;
use cconfd::dispatch::Dispatcher;
use cconfd::lockfile::LockFile;
use cconfd::{bootstrap_sockets, daemon, monitor, VERSION};
use cconfd_multicast::{join_group, JoinOptions};

use cli::Cli;
use handlers::{ClusterBroadcastHandler, ConfigFileMonitor, FileConfigHandler};

fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cconfd: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Returns only in the serving process; the intermediate parent
    // exits inside start() once the handshake resolves.
    let lock = match daemon::start(&config) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("cconfd: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config, lock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RuntimeConfig, lock: LockFile) -> Result<()> {
    info!(
        version = VERSION,
        pid = std::process::id(),
        lockfile = %lock.path().display(),
        "starting cconfd"
    );
    debug!(?config, "resolved configuration");

    monitor::spawn(ConfigFileMonitor::new(config.config_path.clone()))
        .context("unable to start cluster monitor thread")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("unable to build the runtime")?;
    runtime.block_on(run_daemon(config))
}

async fn run_daemon(config: &RuntimeConfig) -> Result<()> {
    let listeners = bootstrap_sockets(config)?;
    info!(
        family = %listeners.family,
        frontend = %listeners.frontend.local_addr().context("frontend address")?,
        backend = %listeners.backend.local_addr().context("backend address")?,
        "listening"
    );

    if config.wants_multicast(listeners.family) {
        let group = config.multicast_group_or_default();
        let options = JoinOptions {
            loopback: true,
            ttl: config.ttl,
        };
        let joined = join_group(&listeners.backend, listeners.family, &group, &options)
            .context("unable to join the cluster multicast group")?;
        info!(group = %joined, "joined cluster multicast group");
    }

    let dispatcher = Dispatcher::new(
        listeners,
        FileConfigHandler::new(config.config_path.clone()),
        ClusterBroadcastHandler,
    );

    tokio::select! {
        _ = dispatcher.run() => unreachable!("the dispatch loop never returns"),
        result = shutdown_signal() => {
            let signal = result.context("unable to install signal handlers")?;
            info!(signal, "stopping cconfd");
            Ok(())
        }
    }
}

/// Resolves when any termination signal arrives.
async fn shutdown_signal() -> io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = quit.recv() => Ok("SIGQUIT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}
