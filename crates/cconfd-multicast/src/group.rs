//! Multicast group addresses and address-family resolution.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Default IPv6 group joined when no explicit address is configured.
pub const DEFAULT_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0x3, 0x1);

/// Default IPv4 group, used when the operator asked for `"default"`.
pub const DEFAULT_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 2, 5);

/// Command-line sentinel selecting the protocol-default group.
pub const DEFAULT_SENTINEL: &str = "default";

/// A concrete, resolved protocol family. Socket creation only ever
/// sees one of these; the "prefer IPv6" soft default lives upstream
/// in the daemon's configuration and is resolved before any socket
/// work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// The family a given address belongs to.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn is_ipv6(self) -> bool {
        self == AddressFamily::Ipv6
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Errors produced while parsing or resolving a group address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupAddressError {
    #[error("{0} is not a valid IP address")]
    Invalid(String),
    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),
    #[error("{addr} is not a valid {family} multicast address")]
    FamilyMismatch { addr: IpAddr, family: AddressFamily },
}

/// The multicast group the backend socket should join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAddress {
    /// Use the protocol-default group for whatever family is resolved.
    Default,
    /// An operator-supplied group, already validated as multicast.
    Explicit(IpAddr),
}

impl GroupAddress {
    /// The family this group pins the daemon to, if any. `Default`
    /// follows whatever family the sockets end up in.
    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            GroupAddress::Default => None,
            GroupAddress::Explicit(addr) => Some(AddressFamily::of(addr)),
        }
    }

    /// The concrete group to join for the resolved family.
    pub fn resolve(&self, family: AddressFamily) -> Result<IpAddr, GroupAddressError> {
        match self {
            GroupAddress::Default => Ok(match family {
                AddressFamily::Ipv6 => IpAddr::V6(DEFAULT_GROUP_V6),
                AddressFamily::Ipv4 => IpAddr::V4(DEFAULT_GROUP_V4),
            }),
            GroupAddress::Explicit(addr) => {
                if AddressFamily::of(addr) != family {
                    return Err(GroupAddressError::FamilyMismatch {
                        addr: *addr,
                        family,
                    });
                }
                Ok(*addr)
            }
        }
    }
}

impl FromStr for GroupAddress {
    type Err = GroupAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DEFAULT_SENTINEL {
            return Ok(GroupAddress::Default);
        }
        let addr: IpAddr = s
            .parse()
            .map_err(|_| GroupAddressError::Invalid(s.to_string()))?;
        if !addr.is_multicast() {
            return Err(GroupAddressError::NotMulticast(addr));
        }
        Ok(GroupAddress::Explicit(addr))
    }
}
