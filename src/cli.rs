//! Command-line interface.
//!
//! The flag surface is the legacy single-letter one init scripts
//! already depend on, so every option is short-only. Parsing produces a
//! `Cli`, which `into_config` resolves into the immutable
//! `RuntimeConfig` the rest of the daemon runs from.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use cconfd::config::{FamilyPreference, RuntimeConfig, DEFAULT_CONFIG_FILE, DEFAULT_LOCKFILE};
use cconfd::VERSION;
use cconfd_multicast::{AddressFamily, GroupAddress, GroupAddressError};

/// Cluster configuration rendezvous daemon
#[derive(Parser)]
#[command(name = "cconfd")]
#[command(version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Restrict the daemon to IPv4
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Restrict the daemon to IPv6
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Multicast group address, or "default" for the protocol default
    #[arg(short = 'm', value_name = "ADDR")]
    pub multicast: Option<String>,

    /// Stay in the foreground (do not daemonize)
    #[arg(short = 'n')]
    pub no_daemon: bool,

    /// Multicast TTL / hop limit
    #[arg(short = 't', value_name = "TTL")]
    pub ttl: Option<u32>,

    /// Override a port: b:PORT (backend), c:PORT (cluster base),
    /// f:PORT (frontend); may be given more than once
    #[arg(short = 'P', value_name = "[bcf]:PORT")]
    pub ports: Vec<String>,

    /// Cluster configuration file
    #[arg(short = 'f', value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Lock file path
    #[arg(short = 'p', value_name = "FILE", default_value = DEFAULT_LOCKFILE)]
    pub lockfile: PathBuf,

    /// Verbose logging
    #[arg(short = 'v')]
    pub verbose: bool,

    /// No longer supported
    #[arg(short = 'c', hide = true)]
    pub legacy_comparison: bool,

    /// No longer supported
    #[arg(short = 'd', hide = true)]
    pub legacy_debug: bool,

    /// No longer supported
    #[arg(short = 'l', hide = true)]
    pub legacy_local: bool,

    /// No longer supported
    #[arg(short = 's', hide = true)]
    pub legacy_sync: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("the -{0} option is no longer supported")]
    Deprecated(char),
    #[error("multicast address {addr} does not match the forced {family} family")]
    FamilyConflict {
        family: AddressFamily,
        addr: String,
    },
    #[error(transparent)]
    Multicast(#[from] GroupAddressError),
    #[error("invalid port specification {0:?} (expected [bcf]:PORT)")]
    BadPortSpec(String),
}

impl Cli {
    /// Resolve the parsed flags into a `RuntimeConfig`.
    pub fn into_config(self) -> Result<RuntimeConfig, ConfigError> {
        for (flag, set) in [
            ('c', self.legacy_comparison),
            ('d', self.legacy_debug),
            ('l', self.legacy_local),
            ('s', self.legacy_sync),
        ] {
            if set {
                return Err(ConfigError::Deprecated(flag));
            }
        }

        let mut config = RuntimeConfig {
            ttl: self.ttl,
            config_path: self.config_file,
            lockfile_path: self.lockfile,
            daemonize: !self.no_daemon,
            verbose: self.verbose,
            ..RuntimeConfig::default()
        };

        for spec in &self.ports {
            apply_port_spec(&mut config, spec)?;
        }

        let forced = if self.ipv4 {
            Some(AddressFamily::Ipv4)
        } else if self.ipv6 {
            Some(AddressFamily::Ipv6)
        } else {
            None
        };

        if let Some(raw) = &self.multicast {
            let group: GroupAddress = raw.parse()?;
            match (group.family(), forced) {
                (Some(addr_family), Some(family)) if addr_family != family => {
                    return Err(ConfigError::FamilyConflict {
                        family,
                        addr: raw.clone(),
                    });
                }
                // An explicit group pins the family on its own.
                (Some(AddressFamily::Ipv4), None) => config.family = FamilyPreference::V4Only,
                (Some(AddressFamily::Ipv6), None) => config.family = FamilyPreference::V6Only,
                _ => {}
            }
            config.multicast_group = Some(group);
        }

        if let Some(family) = forced {
            config.family = match family {
                AddressFamily::Ipv4 => FamilyPreference::V4Only,
                AddressFamily::Ipv6 => FamilyPreference::V6Only,
            };
        }

        Ok(config)
    }
}

fn apply_port_spec(config: &mut RuntimeConfig, spec: &str) -> Result<(), ConfigError> {
    let bad = || ConfigError::BadPortSpec(spec.to_string());
    let (class, port) = spec.split_once(':').ok_or_else(bad)?;
    let port: u16 = port.parse().map_err(|_| bad())?;
    if port == 0 {
        return Err(bad());
    }
    match class {
        "b" => config.backend_port = port,
        "c" => config.cluster_base_port = port,
        "f" => config.frontend_port = port,
        _ => return Err(bad()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cconfd::config::{DEFAULT_BACKEND_PORT, DEFAULT_FRONTEND_PORT};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cconfd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.family, FamilyPreference::PreferV6);
        assert_eq!(config.frontend_port, DEFAULT_FRONTEND_PORT);
        assert_eq!(config.backend_port, DEFAULT_BACKEND_PORT);
        assert_eq!(config.lockfile_path, PathBuf::from(DEFAULT_LOCKFILE));
        assert_eq!(config.config_path, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(config.daemonize);
        assert!(config.multicast_group.is_none());
        assert!(config.ttl.is_none());
    }

    #[test]
    fn test_port_overrides() {
        let config = parse(&["-P", "f:6000", "-P", "b:6001", "-P", "c:6002"])
            .into_config()
            .unwrap();
        assert_eq!(config.frontend_port, 6000);
        assert_eq!(config.backend_port, 6001);
        assert_eq!(config.cluster_base_port, 6002);
    }

    #[test]
    fn test_bad_port_specs() {
        for spec in ["b50100", "x:1", "b:0", "f:notaport", "f:70000"] {
            let err = parse(&["-P", spec]).into_config().unwrap_err();
            assert_eq!(err, ConfigError::BadPortSpec(spec.to_string()));
        }
    }

    #[test]
    fn test_forced_family_conflicts_with_group() {
        let err = parse(&["-6", "-m", "224.0.2.5"]).into_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::FamilyConflict {
                family: AddressFamily::Ipv6,
                ..
            }
        ));

        let err = parse(&["-4", "-m", "ff02::3:1"]).into_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::FamilyConflict {
                family: AddressFamily::Ipv4,
                ..
            }
        ));
    }

    #[test]
    fn test_explicit_group_pins_family() {
        let config = parse(&["-m", "239.1.2.3"]).into_config().unwrap();
        assert_eq!(config.family, FamilyPreference::V4Only);
        assert!(config.multicast_group.is_some());
    }

    #[test]
    fn test_default_group_keeps_negotiation() {
        let config = parse(&["-m", "default"]).into_config().unwrap();
        assert_eq!(config.family, FamilyPreference::PreferV6);
        assert_eq!(config.multicast_group, Some(GroupAddress::Default));
    }

    #[test]
    fn test_non_multicast_group_rejected() {
        let err = parse(&["-m", "10.0.0.1"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Multicast(_)));
    }

    #[test]
    fn test_deprecated_flags() {
        let err = parse(&["-c"]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::Deprecated('c'));
        let err = parse(&["-s"]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::Deprecated('s'));
    }

    #[test]
    fn test_paths_and_foreground() {
        let config = parse(&["-n", "-p", "/tmp/cconfd.pid", "-f", "/tmp/cluster.conf", "-v"])
            .into_config()
            .unwrap();
        assert!(!config.daemonize);
        assert!(config.verbose);
        assert_eq!(config.lockfile_path, PathBuf::from("/tmp/cconfd.pid"));
        assert_eq!(config.config_path, PathBuf::from("/tmp/cluster.conf"));
    }

    #[test]
    fn test_family_flags_conflict() {
        assert!(Cli::try_parse_from(["cconfd", "-4", "-6"]).is_err());
    }

    #[test]
    fn test_ttl_flag() {
        let config = parse(&["-t", "8"]).into_config().unwrap();
        assert_eq!(config.ttl, Some(8));
    }
}
