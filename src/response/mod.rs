//! Response framing.
//!
//! Three mutually exclusive emission modes, all driven from inside the
//! connection's coroutine:
//!
//! - **Whole response**: [`Request::respond`] assembles the head into a
//!   stack buffer and sends head and body with one vectored write.
//! - **Chunked**: [`Request::set_chunked`] commits the head, then each
//!   [`Request::send_chunk`] frames the body buffer per
//!   [RFC 7230 §4.1](https://tools.ietf.org/html/rfc7230#section-4.1) and
//!   yields [`Yield::MayResume`] so the I/O thread can wait for
//!   writability between frames.
//! - **Event stream**: [`Request::set_event_stream`] plus
//!   [`Request::send_event`], emitting Server-Sent Events frames with the
//!   same yield discipline.
//!
//! Nothing here returns an error to the handler: a response either reaches
//! the wire well-formed, falls back to the default error page, or the
//! coroutine yields [`Yield::Abort`] and the I/O thread drops the
//! connection.

mod error;
mod header;
mod template;

pub use error::ResponseError;
pub use header::SERVER_PRODUCT;
pub use template::ErrorTemplate;

use crate::coro::Yield;
use crate::protocol::request::has_response_body;
use crate::protocol::status::{describe, reason};
use crate::protocol::{Request, RequestFlags};
use template::error_template;

use http::StatusCode;
use std::fmt::{self, Write as _};
use std::io::IoSlice;
use tracing::{debug, error};

/// Size of the stack buffer [`Request::respond`] assembles the head into.
pub const DEFAULT_HEADERS_SIZE: usize = 512;

/// Size of the stack buffer used when committing chunked or event-stream
/// heads, which may carry more user headers.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

// Heads are assembled on the coroutine stack; they must fit with room for
// the handler's own frames.
const _: () = assert!(DEFAULT_BUFFER_SIZE + DEFAULT_HEADERS_SIZE < crate::coro::MIN_STACK_SIZE);

const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Hex digits of a usize plus CRLF.
const CHUNK_SIZE_LINE_MAX: usize = usize::BITS as usize / 4 + 2;

struct SizeLine {
    buf: [u8; CHUNK_SIZE_LINE_MAX],
    len: usize,
}

impl fmt::Write for SizeLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

impl<'conn> Request<'conn> {
    /// Commits a whole response.
    ///
    /// Decision ladder, in order: a chunked response gets its terminating
    /// zero chunk; an already-committed response is ignored; a missing
    /// MIME type routes to the default error page; a registered stream
    /// callback is taken and invoked once, falling back to the error page
    /// when it reports a status of 400 or above; otherwise the head is
    /// assembled and sent, together with the body for methods that carry
    /// one.
    pub fn respond(&mut self, status: StatusCode) {
        if self.flags.contains(RequestFlags::CHUNKED) {
            self.response.buffer.clear();
            self.send_chunk();
            self.log_request(status);
            return;
        }

        if self.flags.contains(RequestFlags::SENT_HEADERS) {
            debug!("headers already sent, ignoring response");
            return;
        }

        if self.response.mime_type.is_none() {
            self.default_response(status);
            return;
        }

        self.log_request(status);

        if let Some(callback) = self.response.stream.take() {
            let callback_status = callback(&mut *self);
            if callback_status.as_u16() >= 400 {
                self.default_response(callback_status);
            }
            return;
        }

        let mut head = [0u8; DEFAULT_HEADERS_SIZE];
        let Some(head_len) = self.prepare_response_header(status, &mut head) else {
            self.default_response(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        };

        let result = if has_response_body(&self.method) {
            let iov = [
                IoSlice::new(&head[..head_len]),
                IoSlice::new(&self.response.buffer),
            ];
            self.transport.writev(&iov)
        } else {
            self.transport.send(&head[..head_len], false)
        };

        match result {
            Ok(()) => self.flags.insert(RequestFlags::SENT_HEADERS),
            Err(err) => self.abort(err.into()),
        }
    }

    /// Renders the default error page for `status` into the body buffer
    /// and commits it as `text/html`.
    pub fn default_response(&mut self, status: StatusCode) {
        self.response.mime_type = Some(mime::TEXT_HTML);
        error_template().render_into(
            &mut self.response.buffer,
            reason(status),
            describe(status),
        );
        self.respond(status);
    }

    /// Assembles the response head for `status` into `buf`; `None` on
    /// overflow. The written bytes are not NUL-terminated.
    pub fn prepare_response_header(&self, status: StatusCode, buf: &mut [u8]) -> Option<usize> {
        header::prepare(self.flags, &self.response, &self.dates, status, buf)
    }

    /// Switches this response to chunked transfer encoding and commits the
    /// head. Returns false when the head was already sent or does not fit.
    pub fn set_chunked(&mut self, status: StatusCode) -> bool {
        if self.flags.contains(RequestFlags::SENT_HEADERS) {
            return false;
        }
        self.flags.insert(RequestFlags::CHUNKED);

        let mut head = [0u8; DEFAULT_BUFFER_SIZE];
        let Some(head_len) = self.prepare_response_header(status, &mut head) else {
            return false;
        };
        self.flags.insert(RequestFlags::SENT_HEADERS);

        if let Err(err) = self.transport.send(&head[..head_len], true) {
            self.abort(err.into());
            return false;
        }
        true
    }

    /// Frames the body buffer as one chunk, clears it, and yields
    /// [`Yield::MayResume`]. An empty body buffer emits the terminating
    /// zero chunk instead and returns without yielding. Commits a `200 OK`
    /// chunked head first if none was sent yet.
    pub fn send_chunk(&mut self) {
        if !self.flags.contains(RequestFlags::SENT_HEADERS)
            && !self.set_chunked(StatusCode::OK)
        {
            return;
        }

        let length = self.response.buffer.len();
        if length == 0 {
            if let Err(err) = self.transport.send(LAST_CHUNK, false) {
                self.abort(err.into());
            }
            return;
        }

        let mut size = SizeLine { buf: [0; CHUNK_SIZE_LINE_MAX], len: 0 };
        if write!(size, "{length:x}\r\n").is_err() {
            self.abort(ResponseError::ChunkLength { length });
            return;
        }

        let iov = [
            IoSlice::new(&size.buf[..size.len]),
            IoSlice::new(&self.response.buffer),
            IoSlice::new(b"\r\n"),
        ];
        if let Err(err) = self.transport.writev(&iov) {
            self.abort(err.into());
            return;
        }

        self.response.buffer.clear();
        self.coro.yield_with(Yield::MayResume.raw());
    }

    /// Switches this response to a Server-Sent Events stream: MIME type
    /// `text/event-stream`, no `Content-Length`, head committed. Returns
    /// false when the head was already sent or does not fit.
    pub fn set_event_stream(&mut self, status: StatusCode) -> bool {
        if self.flags.contains(RequestFlags::SENT_HEADERS) {
            return false;
        }
        self.response.mime_type = Some(mime::TEXT_EVENT_STREAM);
        self.flags.insert(RequestFlags::NO_CONTENT_LENGTH);

        let mut head = [0u8; DEFAULT_BUFFER_SIZE];
        let Some(head_len) = self.prepare_response_header(status, &mut head) else {
            return false;
        };
        self.flags.insert(RequestFlags::SENT_HEADERS);

        if let Err(err) = self.transport.send(&head[..head_len], true) {
            self.abort(err.into());
            return false;
        }
        true
    }

    /// Emits one event frame (optional `event:` line, optional `data:`
    /// line from the body buffer, blank-line terminator), then clears the
    /// buffer and yields [`Yield::MayResume`]. Commits a `200 OK` event
    /// stream head first if none was sent yet.
    pub fn send_event(&mut self, event: Option<&str>) {
        if !self.flags.contains(RequestFlags::SENT_HEADERS)
            && !self.set_event_stream(StatusCode::OK)
        {
            return;
        }

        let mut iov = [IoSlice::new(&[]); 6];
        let mut at = 0;

        if let Some(name) = event {
            iov[at] = IoSlice::new(b"event: ");
            iov[at + 1] = IoSlice::new(name.as_bytes());
            iov[at + 2] = IoSlice::new(b"\r\n");
            at += 3;
        }

        if !self.response.buffer.is_empty() {
            iov[at] = IoSlice::new(b"data: ");
            iov[at + 1] = IoSlice::new(&self.response.buffer);
            at += 2;
        }

        iov[at] = IoSlice::new(b"\r\n\r\n");
        at += 1;

        if let Err(err) = self.transport.writev(&iov[..at]) {
            self.abort(err.into());
            return;
        }

        self.response.buffer.clear();
        self.coro.yield_with(Yield::MayResume.raw());
    }

    fn abort(&mut self, err: ResponseError) {
        error!(error = %err, "unrecoverable response failure, aborting connection");
        self.coro.yield_with(Yield::Abort.raw());
    }

    fn log_request(&self, status: StatusCode) {
        debug!(
            method = %self.method,
            status = status.as_u16(),
            mime = self
                .response
                .mime_type
                .as_ref()
                .map(|m| m.as_ref())
                .unwrap_or("-"),
            http_1_0 = self.flags.contains(RequestFlags::HTTP_1_0),
            "response committed"
        );
    }
}
