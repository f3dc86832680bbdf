use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};

use crate::domain::ports::DetachedConnection;

/// Takes a socket out of async I/O so it can be written to directly and
/// shared with the pipeline sink.
pub fn detach(stream: tokio::net::TcpStream) -> io::Result<std::net::TcpStream> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}

impl DetachedConnection for std::net::TcpStream {
    fn duplicate(&self) -> io::Result<OwnedFd> {
        self.as_fd().try_clone_to_owned()
    }

    fn write_preamble(&mut self, preamble: &[u8]) -> io::Result<()> {
        self.write_all(preamble)?;
        self.flush()
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
impl DetachedConnection for std::os::unix::net::UnixStream {
    fn duplicate(&self) -> io::Result<OwnedFd> {
        self.as_fd().try_clone_to_owned()
    }

    fn write_preamble(&mut self, preamble: &[u8]) -> io::Result<()> {
        self.write_all(preamble)?;
        self.flush()
    }

    fn peer(&self) -> String {
        "unix".to_string()
    }
}
