//! Process detachment and the parent/child startup handshake.
//!
//! When daemonizing, the child reports its startup outcome to the
//! waiting parent over a pipe. The parent's exit status therefore
//! reflects whether the daemon actually came up, which lets init
//! scripts fail fast instead of succeeding against a dead daemon.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::path::Path;
use std::process::exit;

use nix::sys::stat::{umask, Mode};
use nix::unistd::{dup2, fork, pipe, setsid, ForkResult};
use thiserror::Error;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::lockfile::{LockError, LockFile};
use crate::logging;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("unable to create handshake channel: {0}")]
    Channel(#[source] io::Error),
    #[error("unable to fork: {0}")]
    Fork(#[source] io::Error),
    #[error("unable to start a new session: {0}")]
    Session(#[source] io::Error),
    #[error("unable to change to the root directory: {0}")]
    Chdir(#[source] io::Error),
    #[error("unable to redirect standard descriptors: {0}")]
    Redirect(#[source] io::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Startup outcome the child reports over the handshake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The daemon holds the lock and is about to serve.
    Ready,
    /// Another instance holds the lock file.
    LockFailed,
    /// Startup failed for some other reason; details are in the log.
    Failed,
}

impl HandshakeOutcome {
    fn to_byte(self) -> u8 {
        match self {
            HandshakeOutcome::Ready => 0,
            HandshakeOutcome::LockFailed => 1,
            HandshakeOutcome::Failed => 2,
        }
    }

    fn from_byte(byte: u8) -> HandshakeOutcome {
        match byte {
            0 => HandshakeOutcome::Ready,
            1 => HandshakeOutcome::LockFailed,
            _ => HandshakeOutcome::Failed,
        }
    }
}

pub struct HandshakeSender(File);

impl HandshakeSender {
    fn send(mut self, outcome: HandshakeOutcome) {
        // The parent treats a closed pipe as Failed, so a write error
        // here needs no separate handling.
        let _ = self.0.write_all(&[outcome.to_byte()]);
    }
}

pub struct HandshakeReceiver(File);

impl HandshakeReceiver {
    fn recv(mut self) -> HandshakeOutcome {
        let mut byte = [0u8; 1];
        match self.0.read_exact(&mut byte) {
            Ok(()) => HandshakeOutcome::from_byte(byte[0]),
            // EOF means the child died before reporting.
            Err(_) => HandshakeOutcome::Failed,
        }
    }
}

fn handshake_channel() -> Result<(HandshakeSender, HandshakeReceiver), DaemonError> {
    let (rx, tx) = pipe().map_err(|e| DaemonError::Channel(e.into()))?;
    Ok((HandshakeSender(File::from(tx)), HandshakeReceiver(File::from(rx))))
}

/// Detach from the terminal (when configured), initialize logging and
/// acquire the instance lock. Returns in the serving process only; the
/// intermediate parent exits with a status derived from the handshake.
pub fn start(config: &RuntimeConfig) -> Result<LockFile, DaemonError> {
    if !config.daemonize {
        logging::init(config, false);
        return Ok(LockFile::acquire(&config.lockfile_path)?);
    }

    let (tx, rx) = handshake_channel()?;

    match unsafe { fork() }.map_err(|e| DaemonError::Fork(e.into()))? {
        ForkResult::Parent { .. } => {
            drop(tx);
            wait_and_exit(rx, &config.lockfile_path)
        }
        ForkResult::Child => {
            drop(rx);
            if let Err(e) = detach() {
                tx.send(HandshakeOutcome::Failed);
                return Err(e);
            }
            logging::init(config, true);
            match LockFile::acquire(&config.lockfile_path) {
                Ok(lock) => {
                    tx.send(HandshakeOutcome::Ready);
                    debug!("detached from the controlling terminal");
                    Ok(lock)
                }
                Err(e @ LockError::AlreadyRunning { .. }) => {
                    tx.send(HandshakeOutcome::LockFailed);
                    Err(e.into())
                }
                Err(e) => {
                    tx.send(HandshakeOutcome::Failed);
                    Err(e.into())
                }
            }
        }
    }
}

fn wait_and_exit(rx: HandshakeReceiver, lockfile: &Path) -> ! {
    match rx.recv() {
        HandshakeOutcome::Ready => exit(0),
        HandshakeOutcome::LockFailed => {
            eprintln!(
                "cconfd: failed to acquire lock file {} (is cconfd already running?)",
                lockfile.display()
            );
            exit(1)
        }
        HandshakeOutcome::Failed => {
            eprintln!("cconfd: daemon startup failed; see the log");
            exit(1)
        }
    }
}

/// Complete the child's detachment: new session, root working
/// directory, clear umask, stdio onto /dev/null.
fn detach() -> Result<(), DaemonError> {
    setsid().map_err(|e| DaemonError::Session(e.into()))?;
    std::env::set_current_dir("/").map_err(DaemonError::Chdir)?;
    umask(Mode::empty());

    let null = File::options()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(DaemonError::Redirect)?;
    let null_fd = null.into_raw_fd();
    for fd in 0..=2 {
        if null_fd != fd {
            dup2(null_fd, fd).map_err(|e| DaemonError::Redirect(e.into()))?;
        }
    }
    if null_fd > 2 {
        drop(unsafe { File::from_raw_fd(null_fd) });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_byte_round_trip() {
        for outcome in [
            HandshakeOutcome::Ready,
            HandshakeOutcome::LockFailed,
            HandshakeOutcome::Failed,
        ] {
            assert_eq!(HandshakeOutcome::from_byte(outcome.to_byte()), outcome);
        }
        assert_eq!(HandshakeOutcome::from_byte(0xff), HandshakeOutcome::Failed);
    }

    #[test]
    fn test_handshake_delivers_outcome() {
        let (tx, rx) = handshake_channel().unwrap();
        let writer = std::thread::spawn(move || tx.send(HandshakeOutcome::LockFailed));
        assert_eq!(rx.recv(), HandshakeOutcome::LockFailed);
        writer.join().unwrap();
    }

    #[test]
    fn test_closed_channel_reads_as_failed() {
        let (tx, rx) = handshake_channel().unwrap();
        drop(tx);
        assert_eq!(rx.recv(), HandshakeOutcome::Failed);
    }
}
