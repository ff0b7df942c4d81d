//! Joining the backend socket to the cluster multicast group.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use socket2::SockRef;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::group::{AddressFamily, GroupAddress, GroupAddressError};

/// Errors from group membership setup. Each failing step gets its own
/// variant so startup diagnostics name the exact socket option that
/// was refused.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error(transparent)]
    Group(#[from] GroupAddressError),
    #[error("unable to set multicast loopback to {enabled}: {source}")]
    Loopback { enabled: bool, source: io::Error },
    #[error("unable to set multicast hop limit to {ttl}: {source}")]
    HopLimit { ttl: u32, source: io::Error },
    #[error("unable to join multicast group {group}: {source}")]
    Membership { group: IpAddr, source: io::Error },
}

/// Options applied before the membership request.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Deliver our own datagrams back to us. The daemon always wants
    /// this so a node answers its own cluster-wide requests.
    pub loopback: bool,
    /// Multicast TTL (IPv4) / hop limit (IPv6); left at the kernel
    /// default when unset.
    pub ttl: Option<u32>,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            loopback: true,
            ttl: None,
        }
    }
}

/// Join `socket` to `group` on the local wildcard interface.
///
/// The socket must already be bound in `family`. Returns the concrete
/// group address that was joined.
pub fn join_group(
    socket: &UdpSocket,
    family: AddressFamily,
    group: &GroupAddress,
    opts: &JoinOptions,
) -> Result<IpAddr, MembershipError> {
    let group = group.resolve(family)?;

    match group {
        IpAddr::V4(v4) => {
            socket
                .set_multicast_loop_v4(opts.loopback)
                .map_err(|source| MembershipError::Loopback {
                    enabled: opts.loopback,
                    source,
                })?;
            if let Some(ttl) = opts.ttl {
                socket
                    .set_multicast_ttl_v4(ttl)
                    .map_err(|source| MembershipError::HopLimit { ttl, source })?;
            }
            socket
                .join_multicast_v4(v4, Ipv4Addr::UNSPECIFIED)
                .map_err(|source| MembershipError::Membership { group, source })?;
        }
        IpAddr::V6(v6) => {
            socket
                .set_multicast_loop_v6(opts.loopback)
                .map_err(|source| MembershipError::Loopback {
                    enabled: opts.loopback,
                    source,
                })?;
            if let Some(ttl) = opts.ttl {
                // tokio's UdpSocket has no hop-limit setter; go through
                // the raw descriptor.
                SockRef::from(socket)
                    .set_multicast_hops_v6(ttl)
                    .map_err(|source| MembershipError::HopLimit { ttl, source })?;
            }
            socket
                .join_multicast_v6(&v6, 0)
                .map_err(|source| MembershipError::Membership { group, source })?;
        }
    }

    debug!(group = %group, "joined multicast group");
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_options_default_enables_loopback() {
        let opts = JoinOptions::default();
        assert!(opts.loopback);
        assert!(opts.ttl.is_none());
    }

    #[test]
    fn test_family_mismatch_surfaces_before_socket_work() {
        // Resolution fails first, so no socket is needed to observe it.
        let group: GroupAddress = "224.0.2.5".parse().unwrap();
        let err = group.resolve(AddressFamily::Ipv6).unwrap_err();
        assert!(matches!(err, GroupAddressError::FamilyMismatch { .. }));
    }

    #[tokio::test]
    async fn test_loopback_option_applies_to_bound_socket() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.set_multicast_loop_v4(true).unwrap();
        assert!(socket.multicast_loop_v4().unwrap());
    }
}
