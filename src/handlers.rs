//! Concrete frontend, backend and monitor implementations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

use cconfd::dispatch::{BroadcastHandler, RequestHandler};
use cconfd::monitor::ClusterMonitor;

const BROADCAST_BUF_LEN: usize = 2048;

/// Serves the cluster configuration file to admitted frontend clients:
/// the whole file, then the connection is shut down.
pub struct FileConfigHandler {
    path: PathBuf,
}

impl FileConfigHandler {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RequestHandler for FileConfigHandler {
    async fn process_request(&self, stream: &mut TcpStream) -> io::Result<()> {
        let contents = tokio::fs::read(&self.path).await?;
        stream.write_all(&contents).await?;
        stream.shutdown().await?;
        debug!(path = %self.path.display(), bytes = contents.len(), "served configuration");
        Ok(())
    }
}

/// Drains cluster datagrams off the backend socket. Peers are logged
/// so an operator can see who is announcing on the group.
pub struct ClusterBroadcastHandler;

#[async_trait]
impl BroadcastHandler for ClusterBroadcastHandler {
    async fn process_broadcast(&self, socket: &UdpSocket) -> io::Result<()> {
        let mut buf = [0u8; BROADCAST_BUF_LEN];
        match socket.try_recv_from(&mut buf) {
            Ok((len, peer)) => {
                debug!(%peer, len, "received cluster datagram");
                Ok(())
            }
            // Lost the race with another readiness event.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Watches the cluster configuration file for modification-time
/// changes on a fixed cadence.
pub struct ConfigFileMonitor {
    path: PathBuf,
    interval: Duration,
}

impl ConfigFileMonitor {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            interval: Duration::from_secs(30),
        }
    }
}

impl ClusterMonitor for ConfigFileMonitor {
    fn run(self) {
        let mut last_modified = None;
        loop {
            match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
                Ok(modified) => {
                    if last_modified.is_some() && last_modified != Some(modified) {
                        info!(path = %self.path.display(), "cluster configuration changed");
                    }
                    last_modified = Some(modified);
                }
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "configuration unreadable");
                    last_modified = None;
                }
            }
            std::thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_file_handler_serves_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<cluster name=\"alpha\" config_version=\"3\"/>\n").unwrap();
        let handler = FileConfigHandler::new(file.path().to_path_buf());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            handler.process_request(&mut stream).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut body = String::new();
        client.read_to_string(&mut body).await.unwrap();
        server.await.unwrap();

        assert_eq!(body, "<cluster name=\"alpha\" config_version=\"3\"/>\n");
    }

    #[tokio::test]
    async fn test_missing_config_is_a_handler_error() {
        let handler = FileConfigHandler::new(PathBuf::from("/no/such/cluster.conf"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            handler.process_request(&mut stream).await
        });

        let _client = TcpStream::connect(addr).await.unwrap();
        let result = server.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_broadcast_handler_tolerates_spurious_readiness() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        ClusterBroadcastHandler
            .process_broadcast(&socket)
            .await
            .unwrap();
    }
}
