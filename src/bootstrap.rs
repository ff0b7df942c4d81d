//! Listening-socket bootstrap.
//!
//! Builds the daemon's two descriptors: a loopback TCP listener for
//! local clients (the frontend) and a wildcard UDP socket for cluster
//! datagrams (the backend). Family negotiation happens here, before
//! either socket exists, so both always share one family.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tracing::debug;

use cconfd_multicast::AddressFamily;

use crate::config::{FamilyPreference, RuntimeConfig};

const LISTEN_BACKLOG: i32 = 5;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("unable to create an {family} socket: {source}")]
    Create {
        family: AddressFamily,
        #[source]
        source: io::Error,
    },
    #[error("unable to bind the frontend listener on {addr}: {source}")]
    FrontendBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("unable to bind the backend socket on {addr}: {source}")]
    BackendBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("unable to register {addr} with the runtime: {source}")]
    Register {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// The daemon's two listening descriptors plus the family they were
/// negotiated under.
pub struct ListenerPair {
    pub frontend: TcpListener,
    pub backend: UdpSocket,
    pub family: AddressFamily,
}

/// Negotiate the address family and bring up both sockets.
///
/// Under `PreferV6` an IPv6 frontend is attempted first. Only socket
/// creation failure (no IPv6 support) falls back to IPv4; a bind or
/// registration failure is fatal in every family, since falling back
/// there would silently bring the daemon up on the wrong family.
pub fn bootstrap_sockets(config: &RuntimeConfig) -> Result<ListenerPair, BootstrapError> {
    let (frontend, family) = match config.family {
        FamilyPreference::V4Only => {
            (bind_frontend(AddressFamily::Ipv4, config)?, AddressFamily::Ipv4)
        }
        FamilyPreference::V6Only => {
            (bind_frontend(AddressFamily::Ipv6, config)?, AddressFamily::Ipv6)
        }
        FamilyPreference::PreferV6 => match bind_frontend(AddressFamily::Ipv6, config) {
            Ok(listener) => (listener, AddressFamily::Ipv6),
            Err(BootstrapError::Create { source, .. }) => {
                debug!(error = %source, "IPv6 unavailable, falling back to IPv4");
                (bind_frontend(AddressFamily::Ipv4, config)?, AddressFamily::Ipv4)
            }
            Err(e) => return Err(e),
        },
    };

    let backend = bind_backend(family, config)?;
    Ok(ListenerPair {
        frontend,
        backend,
        family,
    })
}

fn loopback(family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
        AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
    }
}

fn wildcard(family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

fn domain(family: AddressFamily) -> Domain {
    match family {
        AddressFamily::Ipv4 => Domain::IPV4,
        AddressFamily::Ipv6 => Domain::IPV6,
    }
}

/// Frontend: TCP listener bound to the loopback address only. Remote
/// hosts never reach the request interface.
fn bind_frontend(
    family: AddressFamily,
    config: &RuntimeConfig,
) -> Result<TcpListener, BootstrapError> {
    let addr = SocketAddr::new(loopback(family), config.frontend_port);
    let socket = Socket::new(domain(family), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| BootstrapError::Create { family, source })?;

    let register = |source| BootstrapError::Register { addr, source };
    socket.set_reuse_address(true).map_err(register)?;
    socket
        .bind(&addr.into())
        .map_err(|source| BootstrapError::FrontendBind { addr, source })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| BootstrapError::FrontendBind { addr, source })?;
    socket.set_nonblocking(true).map_err(register)?;
    TcpListener::from_std(socket.into()).map_err(register)
}

/// Backend: UDP socket bound to the wildcard address so cluster
/// datagrams arrive via any interface, unicast or multicast.
fn bind_backend(
    family: AddressFamily,
    config: &RuntimeConfig,
) -> Result<UdpSocket, BootstrapError> {
    let addr = SocketAddr::new(wildcard(family), config.backend_port);
    let socket = Socket::new(domain(family), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| BootstrapError::Create { family, source })?;

    let register = |source| BootstrapError::Register { addr, source };
    socket.set_reuse_address(true).map_err(register)?;
    socket
        .bind(&addr.into())
        .map_err(|source| BootstrapError::BackendBind { addr, source })?;
    socket.set_nonblocking(true).map_err(register)?;
    UdpSocket::from_std(socket.into()).map_err(register)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral_config(family: FamilyPreference) -> RuntimeConfig {
        RuntimeConfig {
            family,
            frontend_port: 0,
            backend_port: 0,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_v4_pair() {
        let config = ephemeral_config(FamilyPreference::V4Only);
        let pair = bootstrap_sockets(&config).unwrap();
        assert_eq!(pair.family, AddressFamily::Ipv4);

        let frontend = pair.frontend.local_addr().unwrap();
        assert_eq!(frontend.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(frontend.port(), 0);

        let backend = pair.backend.local_addr().unwrap();
        assert_eq!(backend.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal_under_preferred_family() {
        // Occupy the v6 frontend port. A bind conflict must surface as
        // an error, not as a silent IPv4 daemon on a different group;
        // only missing IPv6 support may fall back.
        let placeholder = match std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)) {
            Ok(listener) => listener,
            // No IPv6 loopback on this host; nothing to exercise.
            Err(_) => return,
        };
        let port = placeholder.local_addr().unwrap().port();

        let config = RuntimeConfig {
            family: FamilyPreference::PreferV6,
            frontend_port: port,
            backend_port: 0,
            ..RuntimeConfig::default()
        };
        match bootstrap_sockets(&config) {
            Err(BootstrapError::FrontendBind { addr, .. }) => assert_eq!(addr.port(), port),
            Err(other) => panic!("expected FrontendBind, got {other:?}"),
            Ok(pair) => panic!("bind conflict should be fatal, got family {}", pair.family),
        }
    }

    #[tokio::test]
    async fn test_forced_family_reports_bind_conflict() {
        let placeholder = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = placeholder.local_addr().unwrap().port();

        let config = RuntimeConfig {
            family: FamilyPreference::V4Only,
            frontend_port: port,
            backend_port: 0,
            ..RuntimeConfig::default()
        };
        match bootstrap_sockets(&config) {
            Err(BootstrapError::FrontendBind { addr, .. }) => assert_eq!(addr.port(), port),
            other => panic!("expected FrontendBind, got {:?}", other.map(|p| p.family)),
        }
    }
}
