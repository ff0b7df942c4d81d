//! Two-descriptor dispatch loop.
//!
//! One task multiplexes the frontend listener and the backend socket,
//! serving frontend connections to completion before looking at the
//! backend again. Frontend admission requires the peer to connect from
//! a privileged source port.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, error, warn};

use crate::bootstrap::ListenerPair;

/// Highest source port accepted on the frontend. Binding at or below
/// it requires root, which is what the admission check leans on.
pub const PRIVILEGED_PORT_MAX: u16 = 1024;

/// Whether a frontend peer passes the privileged-port admission check.
pub fn admitted(peer: &SocketAddr) -> bool {
    peer.port() <= PRIVILEGED_PORT_MAX
}

/// Serves one accepted frontend connection. The stream is closed
/// unconditionally when the handler returns.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn process_request(&self, stream: &mut TcpStream) -> io::Result<()>;
}

/// Drains whatever is pending on the backend socket.
#[async_trait]
pub trait BroadcastHandler: Send + Sync {
    async fn process_broadcast(&self, socket: &UdpSocket) -> io::Result<()>;
}

pub struct Dispatcher<R, B> {
    listeners: ListenerPair,
    request: R,
    broadcast: B,
}

impl<R: RequestHandler, B: BroadcastHandler> Dispatcher<R, B> {
    pub fn new(listeners: ListenerPair, request: R, broadcast: B) -> Self {
        Self {
            listeners,
            request,
            broadcast,
        }
    }

    pub fn frontend_addr(&self) -> io::Result<SocketAddr> {
        self.listeners.frontend.local_addr()
    }

    pub fn backend_addr(&self) -> io::Result<SocketAddr> {
        self.listeners.backend.local_addr()
    }

    /// Run the dispatch loop. Never returns; handler failures are
    /// logged and the loop moves on to the next descriptor event.
    pub async fn run(self) {
        loop {
            tokio::select! {
                biased;

                accepted = self.listeners.frontend.accept() => {
                    match accepted {
                        Ok((mut stream, peer)) => {
                            if !admitted(&peer) {
                                debug!(%peer, "refusing connection from unprivileged port");
                                continue;
                            }
                            match self.request.process_request(&mut stream).await {
                                Ok(()) => debug!(%peer, "request served"),
                                Err(e) => error!(%peer, error = %e, "request handler failed"),
                            }
                        }
                        Err(e) => warn!(error = %e, "frontend accept failed"),
                    }
                }

                readable = self.listeners.backend.readable() => {
                    match readable {
                        Ok(()) => {
                            match self.broadcast.process_broadcast(&self.listeners.backend).await {
                                Ok(()) => debug!("broadcast handled"),
                                Err(e) => error!(error = %e, "broadcast handler failed"),
                            }
                        }
                        Err(e) => warn!(error = %e, "backend readiness failed"),
                    }
                }
            }
        }
    }
}
