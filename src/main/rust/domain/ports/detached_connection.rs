use std::io;
use std::os::fd::OwnedFd;

/// A client connection taken out of HTTP framing.
///
/// Once detached, nothing else reads from or frames the connection; the
/// fan-out writes the preamble itself and hands a duplicate descriptor to
/// the pipeline sink.
pub trait DetachedConnection: Send + 'static {
    /// New descriptor referring to the same transport, closable on its own
    fn duplicate(&self) -> io::Result<OwnedFd>;

    /// Write raw bytes ahead of the pipeline output
    fn write_preamble(&mut self, preamble: &[u8]) -> io::Result<()>;

    /// Peer description for logs
    fn peer(&self) -> String;
}
