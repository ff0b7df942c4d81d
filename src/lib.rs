//! cconfd: a node-local rendezvous daemon for cluster configuration.
//!
//! The daemon holds a single-instance lock, detaches from the terminal
//! with a startup handshake, negotiates an address family, then serves
//! two descriptors from one loop: a loopback TCP frontend for local
//! clients and a wildcard UDP backend joined to the cluster multicast
//! group.

pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod lockfile;
pub mod logging;
pub mod monitor;
mod version;

pub use bootstrap::{bootstrap_sockets, BootstrapError, ListenerPair};
pub use config::{FamilyPreference, RuntimeConfig};
pub use daemon::DaemonError;
pub use dispatch::{BroadcastHandler, Dispatcher, RequestHandler};
pub use lockfile::{LockError, LockFile};
pub use monitor::ClusterMonitor;
pub use version::VERSION;
