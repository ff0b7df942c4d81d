//! Runtime configuration.
//!
//! One immutable `RuntimeConfig` is resolved from the command line at
//! startup and passed by reference to every component that needs it;
//! nothing mutates it afterwards, so it crosses threads freely.

use std::path::PathBuf;

use cconfd_multicast::{AddressFamily, GroupAddress};

/// Default frontend (local client) TCP port.
pub const DEFAULT_FRONTEND_PORT: u16 = 50006;

/// Default backend (cluster datagram) UDP port.
pub const DEFAULT_BACKEND_PORT: u16 = 50007;

/// Default base port for cluster-side communication.
pub const DEFAULT_CLUSTER_BASE_PORT: u16 = 50008;

/// Runtime-state directory the daemon may create on its own.
pub const RUNTIME_STATE_ROOT: &str = "/var/run/cconfd";

/// Default single-instance lock file.
pub const DEFAULT_LOCKFILE: &str = "/var/run/cconfd/cconfd.pid";

/// Default cluster configuration file served to local clients.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/cluster/cluster.conf";

/// Protocol family preference prior to socket creation.
///
/// `PreferV6` is the unresolved state: the bootstrap tries IPv6 first
/// and may fall back to IPv4. The forced variants never fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyPreference {
    V4Only,
    V6Only,
    PreferV6,
}

/// Immutable daemon configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub family: FamilyPreference,
    /// Multicast group to join on the backend socket, when configured.
    pub multicast_group: Option<GroupAddress>,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub cluster_base_port: u16,
    /// Multicast TTL / hop limit; kernel default when unset.
    pub ttl: Option<u32>,
    pub lockfile_path: PathBuf,
    pub config_path: PathBuf,
    /// Detach from the terminal (inverse of "run in foreground").
    pub daemonize: bool,
    pub verbose: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            family: FamilyPreference::PreferV6,
            multicast_group: None,
            frontend_port: DEFAULT_FRONTEND_PORT,
            backend_port: DEFAULT_BACKEND_PORT,
            cluster_base_port: DEFAULT_CLUSTER_BASE_PORT,
            ttl: None,
            lockfile_path: PathBuf::from(DEFAULT_LOCKFILE),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            daemonize: true,
            verbose: false,
        }
    }
}

impl RuntimeConfig {
    /// Whether the backend socket must join a multicast group: always
    /// under IPv6, and under IPv4 whenever any group (including the
    /// `"default"` sentinel) was configured.
    pub fn wants_multicast(&self, family: AddressFamily) -> bool {
        family.is_ipv6() || self.multicast_group.is_some()
    }

    /// The group to join, falling back to the protocol default.
    pub fn multicast_group_or_default(&self) -> GroupAddress {
        self.multicast_group.unwrap_or(GroupAddress::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.family, FamilyPreference::PreferV6);
        assert_eq!(config.frontend_port, 50006);
        assert_eq!(config.backend_port, 50007);
        assert_eq!(config.cluster_base_port, 50008);
        assert!(config.daemonize);
        assert!(!config.verbose);
    }

    #[test]
    fn test_multicast_required_under_ipv6() {
        let config = RuntimeConfig::default();
        assert!(config.wants_multicast(AddressFamily::Ipv6));
        assert!(!config.wants_multicast(AddressFamily::Ipv4));
    }

    #[test]
    fn test_multicast_required_under_ipv4_with_group() {
        let config = RuntimeConfig {
            multicast_group: Some(GroupAddress::Default),
            ..RuntimeConfig::default()
        };
        assert!(config.wants_multicast(AddressFamily::Ipv4));
    }
}
