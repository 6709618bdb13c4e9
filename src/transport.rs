//! The socket-facing collaborator of the response framer.

use std::io::{self, IoSlice, Write};
use std::net::TcpStream;

/// Byte-level output primitives supplied by the I/O layer.
///
/// Both calls are blocking from the handler's point of view. An
/// implementation backed by a non-blocking socket is expected to yield
/// [`Yield::MayResume`](crate::coro::Yield::MayResume) from inside the call
/// when the socket is not writable and pick the write back up once the
/// event loop resumes the coroutine; the framer never sees `WouldBlock`.
///
/// `more` hints that another frame follows immediately, so small writes
/// may be held back (`MSG_MORE` on Linux).
pub trait Transport {
    fn send(&mut self, buf: &[u8], more: bool) -> io::Result<()>;

    /// Vectored analog of [`send`](Self::send); the slices must reach the
    /// wire contiguously and in order.
    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()>;
}

/// Plain blocking-socket transport, for servers that dedicate a thread per
/// connection or for tests against a real listener. Ignores `more`.
impl Transport for TcpStream {
    fn send(&mut self, buf: &[u8], _more: bool) -> io::Result<()> {
        self.write_all(buf)
    }

    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        let written = self.write_vectored(bufs)?;
        if written == total {
            return Ok(());
        }
        // Partial vectored write; flatten the remainder and finish it.
        let mut rest = Vec::with_capacity(total - written);
        let mut skip = written;
        for buf in bufs {
            if skip >= buf.len() {
                skip -= buf.len();
                continue;
            }
            rest.extend_from_slice(&buf[skip..]);
            skip = 0;
        }
        self.write_all(&rest)
    }
}
