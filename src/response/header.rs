//! Response head assembly.
//!
//! The head is built into a caller-provided fixed buffer, normally a stack
//! array inside the framer, so committing a response allocates nothing.
//! Assembly is all-or-nothing: any append that would run past the buffer
//! makes [`prepare`] return `None` and the caller falls back to the
//! default error response.
//!
//! Header order is fixed: status line, body framing, `Content-Type`,
//! `Connection`, user headers, `Date`, `Expires`, CORS, `Server`. The
//! `Server` line is always ours: a user-supplied `Server` entry is
//! silently dropped, while user `Date`/`Expires` entries replace the
//! generated ones.

use crate::date::HttpDates;
use crate::protocol::status::reason;
use crate::protocol::{RequestFlags, ResponseContext};

use http::{header, StatusCode};

/// Product token emitted in the `Server` header.
pub const SERVER_PRODUCT: &str = "strand";

const CORS_HEADERS: &[u8] = b"\r\nAccess-Control-Allow-Origin: *\
\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\
\r\nAccess-Control-Allow-Credentials: true\
\r\nAccess-Control-Allow-Headers: Origin, Accept, Content-Type";

/// Bounded cursor over the destination buffer. Every append reports
/// overflow instead of writing past the end.
struct HeadBuf<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> HeadBuf<'a> {
    fn new(buf: &'a mut [u8]) -> HeadBuf<'a> {
        HeadBuf { buf, len: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Option<()> {
        let end = self.len.checked_add(bytes.len())?;
        if end > self.buf.len() {
            return None;
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Some(())
    }

    fn put_str(&mut self, s: &str) -> Option<()> {
        self.put(s.as_bytes())
    }

    fn put_uint(&mut self, value: u64) -> Option<()> {
        let mut digits = [0u8; 20];
        let mut at = digits.len();
        let mut value = value;
        loop {
            at -= 1;
            digits[at] = b'0' + (value % 10) as u8;
            value /= 10;
            if value == 0 {
                break;
            }
        }
        self.put(&digits[at..])
    }
}

/// Assembles the full response head for `status` into `buf`.
///
/// Returns the number of bytes written, or `None` when the head does not
/// fit `buf` or no MIME type has been set.
pub(crate) fn prepare(
    flags: RequestFlags,
    response: &ResponseContext<'_>,
    dates: &HttpDates,
    status: StatusCode,
    buf: &mut [u8],
) -> Option<usize> {
    let mime = response.mime_type.as_ref()?;
    let mut out = HeadBuf::new(buf);

    if flags.contains(RequestFlags::HTTP_1_0) {
        out.put(b"HTTP/1.0 ")?;
    } else {
        out.put(b"HTTP/1.1 ")?;
    }
    out.put_str(status.as_str())?;
    out.put(b" ")?;
    out.put_str(reason(status))?;

    if flags.contains(RequestFlags::CHUNKED) {
        out.put(b"\r\nTransfer-Encoding: chunked")?;
    } else if flags.contains(RequestFlags::NO_CONTENT_LENGTH) {
        // Body runs until the connection closes.
    } else {
        out.put(b"\r\nContent-Length: ")?;
        let length = response
            .content_length
            .unwrap_or(response.buffer.len() as u64);
        out.put_uint(length)?;
    }

    out.put(b"\r\nContent-Type: ")?;
    out.put_str(mime.as_ref())?;

    if flags.contains(RequestFlags::KEEP_ALIVE) {
        out.put(b"\r\nConnection: keep-alive")?;
    } else {
        out.put(b"\r\nConnection: close")?;
    }

    let mut date_overridden = false;
    let mut expires_overridden = false;

    if status.as_u16() < 400 {
        for (key, value) in &response.headers {
            if *key == header::SERVER {
                continue;
            }
            if *key == header::DATE {
                date_overridden = true;
            }
            if *key == header::EXPIRES {
                expires_overridden = true;
            }
            out.put(b"\r\n")?;
            out.put_str(key.as_str())?;
            out.put(b": ")?;
            out.put(value.as_bytes())?;
        }
    } else if status == StatusCode::UNAUTHORIZED {
        for (key, value) in &response.headers {
            if *key == header::WWW_AUTHENTICATE {
                out.put(b"\r\nWWW-Authenticate: ")?;
                out.put(value.as_bytes())?;
                break;
            }
        }
    }

    if !date_overridden {
        out.put(b"\r\nDate: ")?;
        out.put_str(dates.date())?;
    }
    if !expires_overridden {
        out.put(b"\r\nExpires: ")?;
        out.put_str(dates.expires())?;
    }

    if flags.contains(RequestFlags::ALLOW_CORS) {
        out.put(CORS_HEADERS)?;
    }

    out.put(b"\r\nServer: ")?;
    out.put_str(SERVER_PRODUCT)?;
    out.put(b"\r\n\r\n")?;

    Some(out.len)
}
