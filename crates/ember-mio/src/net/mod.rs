//! Non-blocking socket helpers.

pub mod partial;

use std::{
    io::{self, ErrorKind},
    net::Shutdown,
};

/// Split off would-block from an I/O result.
///
/// Returns `Ok(None)` if the operation would block, which just means there is nothing left to
/// handle right now.
pub fn check_io<T>(value: Result<T, std::io::Error>) -> Result<Option<T>, std::io::Error> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

/// A stream whose sending half can be closed while it keeps receiving.
pub trait CloseWrite {
    /// Signal end-of-stream to the peer, reads continue to work.
    fn close_write(&mut self) -> io::Result<()>;
}

impl CloseWrite for mio::net::TcpStream {
    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// How draining a listener's pending connections ended.
#[derive(Debug)]
pub enum AcceptEnd {
    /// Nothing is pending anymore, the next readiness event reports new connections.
    Exhausted,
    /// Accepting failed, connections may still be pending without a new readiness event.
    Failed(io::Error),
}

/// Accept until the listener would block, handing every accepted connection to `handle`.
///
/// Interrupted calls and connections aborted during the handshake are skipped.
pub fn accept_pending<T, A, H>(mut accept: A, mut handle: H) -> AcceptEnd
where
    A: FnMut() -> io::Result<T>,
    H: FnMut(T),
{
    loop {
        match check_io(accept()) {
            Ok(Some(accepted)) => handle(accepted),
            Ok(None) => return AcceptEnd::Exhausted,
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::Interrupted | ErrorKind::ConnectionAborted
                ) => {}
            Err(error) => return AcceptEnd::Failed(error),
        }
    }
}
