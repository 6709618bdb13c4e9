//! The handler-owned view of one in-flight exchange.
//!
//! A [`Request`] is assembled by the request parser before the connection's
//! coroutine handler runs and torn down after the coroutine ends. It
//! bundles what the response framer needs: the connection flags, the
//! coroutine to yield through, the [`Transport`] to write to, the
//! pre-rendered date stamps and the mutable [`ResponseContext`].

use crate::coro::Coroutine;
use crate::date::HttpDates;
use crate::transport::Transport;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Connection and response state bits.
///
/// `SENT_HEADERS` is the framer's latch: once set, further attempts to
/// emit a response head are quietly ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u32);

impl RequestFlags {
    /// Emit an `HTTP/1.0` status line.
    pub const HTTP_1_0: RequestFlags = RequestFlags(1 << 0);
    /// Emit `Connection: keep-alive` instead of `close`.
    pub const KEEP_ALIVE: RequestFlags = RequestFlags(1 << 1);
    /// Body uses chunked transfer encoding.
    pub const CHUNKED: RequestFlags = RequestFlags(1 << 2);
    /// Omit `Content-Length` entirely (streaming until close).
    pub const NO_CONTENT_LENGTH: RequestFlags = RequestFlags(1 << 3);
    /// The response head is already on the wire.
    pub const SENT_HEADERS: RequestFlags = RequestFlags(1 << 4);
    /// Emit the four permissive CORS headers.
    pub const ALLOW_CORS: RequestFlags = RequestFlags(1 << 5);

    pub const fn empty() -> RequestFlags {
        RequestFlags(0)
    }

    pub const fn contains(self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RequestFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RequestFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for RequestFlags {
    type Output = RequestFlags;

    fn bitor(self, rhs: RequestFlags) -> RequestFlags {
        RequestFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: RequestFlags) {
        self.0 |= rhs.0;
    }
}

/// One-shot streaming callback. The framer takes it out of the context
/// before invoking it, so a callback that fails and falls back to the
/// default error response can never re-enter itself.
pub type StreamCallback<'conn> = Box<dyn FnOnce(&mut Request<'conn>) -> StatusCode + 'conn>;

/// Everything a handler may shape about the response before (or while) it
/// goes on the wire.
pub struct ResponseContext<'conn> {
    /// Body bytes for whole responses, the current chunk in chunked mode,
    /// or the current `data:` payload in event-stream mode.
    pub buffer: BytesMut,
    /// Must be set before a response can be framed; a missing MIME type
    /// routes the response through the default error page.
    pub mime_type: Option<Mime>,
    /// `Content-Length` hint used instead of `buffer.len()` when set;
    /// streaming callbacks that know the total size fill this in.
    pub content_length: Option<u64>,
    /// Additional headers, emitted in insertion order. `Server` entries
    /// are dropped; `Date`/`Expires` entries suppress the generated ones.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Registered by handlers that produce the body themselves (e.g. from
    /// a file); invoked once by `respond`.
    pub stream: Option<StreamCallback<'conn>>,
}

impl fmt::Debug for ResponseContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseContext")
            .field("buffer_len", &self.buffer.len())
            .field("mime_type", &self.mime_type)
            .field("content_length", &self.content_length)
            .field("headers", &self.headers)
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

impl Default for ResponseContext<'_> {
    fn default() -> Self {
        ResponseContext {
            buffer: BytesMut::new(),
            mime_type: None,
            content_length: None,
            headers: Vec::new(),
            stream: None,
        }
    }
}

/// The handler-owned view described in the module docs. Response emission
/// lives in [`crate::response`].
pub struct Request<'conn> {
    pub(crate) method: Method,
    pub(crate) flags: RequestFlags,
    pub(crate) coro: &'conn Coroutine,
    pub(crate) transport: &'conn mut dyn Transport,
    pub(crate) dates: HttpDates,
    pub response: ResponseContext<'conn>,
}

impl<'conn> Request<'conn> {
    pub fn builder(
        coro: &'conn Coroutine,
        transport: &'conn mut dyn Transport,
    ) -> RequestBuilder<'conn> {
        RequestBuilder {
            coro,
            transport,
            method: Method::GET,
            flags: RequestFlags::empty(),
            dates: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut RequestFlags {
        &mut self.flags
    }

    /// The coroutine this exchange runs on, for handlers that need to
    /// yield or register cleanup directly.
    pub fn coro(&self) -> &'conn Coroutine {
        self.coro
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("flags", &self.flags)
            .field("response", &self.response)
            .finish()
    }
}

/// GET and POST responses carry a body; responses to other methods are
/// head-only on this wire path.
pub(crate) fn has_response_body(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::POST)
}

pub struct RequestBuilder<'conn> {
    coro: &'conn Coroutine,
    transport: &'conn mut dyn Transport,
    method: Method,
    flags: RequestFlags,
    dates: Option<HttpDates>,
}

impl<'conn> RequestBuilder<'conn> {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn dates(mut self, dates: HttpDates) -> Self {
        self.dates = Some(dates);
        self
    }

    pub fn build(self) -> Request<'conn> {
        Request {
            coro: self.coro,
            transport: self.transport,
            method: self.method,
            flags: self.flags,
            dates: self
                .dates
                .unwrap_or_else(|| HttpDates::now(Duration::ZERO)),
            response: ResponseContext::default(),
        }
    }
}
