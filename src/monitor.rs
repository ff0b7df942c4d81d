//! Cluster monitor thread.
//!
//! Membership monitoring is blocking work with its own cadence, so it
//! runs on a dedicated OS thread beside the dispatch loop rather than
//! inside the runtime.

use std::io;
use std::thread;

/// Long-running cluster observation loop. `run` is expected to block
/// for the life of the daemon.
pub trait ClusterMonitor: Send + 'static {
    fn run(self);
}

/// Spawn `monitor` on its own named thread. The handle is discarded;
/// the thread lives as long as the process does.
pub fn spawn<M: ClusterMonitor>(monitor: M) -> io::Result<()> {
    thread::Builder::new()
        .name("cluster-monitor".into())
        .spawn(move || monitor.run())?;
    Ok(())
}
