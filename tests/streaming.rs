//! End-to-end conversations between an event-loop stand-in and connection
//! coroutines, exercising the runtime and the framer together.

use strand_http::{
    Config, Coroutine, HttpDates, Request, RequestFlags, Switcher, Transport, Yield,
};

use http::{Method, StatusCode};
use std::cell::RefCell;
use std::io::{self, IoSlice};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

struct SharedWire(Rc<RefCell<Vec<u8>>>);

impl Transport for SharedWire {
    fn send(&mut self, buf: &[u8], _more: bool) -> io::Result<()> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(())
    }

    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let mut wire = self.0.borrow_mut();
        for buf in bufs {
            wire.extend_from_slice(buf);
        }
        Ok(())
    }
}

fn epoch_dates() -> HttpDates {
    HttpDates::at(SystemTime::UNIX_EPOCH, Duration::from_secs(600))
}

/// Event-loop stand-in: resume until the handler finishes, collecting
/// every intermediate yield.
fn run_to_completion(coro: &Coroutine) -> (Vec<i32>, i32) {
    let mut yields = Vec::new();
    loop {
        let value = coro.resume();
        if coro.ended() {
            return (yields, value);
        }
        assert_eq!(
            Yield::from_raw(value),
            Some(Yield::MayResume),
            "streaming handlers only ever ask to be re-armed"
        );
        yields.push(value);
    }
}

fn split_head(wire: &[u8]) -> (String, Vec<u8>) {
    let at = wire
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("wire has a complete head");
    (
        String::from_utf8(wire[..at + 4].to_vec()).unwrap(),
        wire[at + 4..].to_vec(),
    )
}

/// Minimal RFC 7230 §4.1 chunked-body decoder.
fn decode_chunked(mut body: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    loop {
        let line_end = body
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("chunk size line");
        let size_hex = std::str::from_utf8(&body[..line_end]).unwrap();
        let size = usize::from_str_radix(size_hex, 16).unwrap();
        body = &body[line_end + 2..];
        if size == 0 {
            assert_eq!(body, b"\r\n", "terminator ends the body");
            return decoded;
        }
        decoded.extend_from_slice(&body[..size]);
        assert_eq!(&body[size..size + 2], b"\r\n");
        body = &body[size + 2..];
    }
}

#[test]
fn chunked_conversation_round_trips() {
    let frames: Vec<&[u8]> = vec![b"hello ", b"streaming ", b"world"];
    let expected: Vec<u8> = frames.concat();

    let wire = Rc::new(RefCell::new(Vec::new()));
    let handler_wire = Rc::clone(&wire);
    let handler_frames: Vec<Vec<u8>> = frames.iter().map(|f| f.to_vec()).collect();

    let switcher = Switcher::new();
    let coro = Coroutine::new(switcher, move |c| {
        let mut transport = SharedWire(handler_wire);
        let mut request = Request::builder(c, &mut transport)
            .method(Method::GET)
            .flags(RequestFlags::KEEP_ALIVE)
            .dates(epoch_dates())
            .build();

        request.response.mime_type = Some(mime::TEXT_PLAIN);
        assert!(request.set_chunked(StatusCode::OK));
        for frame in &handler_frames {
            request.response.buffer.extend_from_slice(frame);
            request.send_chunk();
        }
        request.respond(StatusCode::OK);
        Yield::Finished.raw()
    })
    .unwrap();

    let (yields, final_value) = run_to_completion(&coro);
    assert_eq!(yields.len(), frames.len());
    assert_eq!(Yield::from_raw(final_value), Some(Yield::Finished));

    let bytes = wire.borrow();
    let (head, body) = split_head(&bytes);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("\r\nTransfer-Encoding: chunked\r\n"));
    assert_eq!(decode_chunked(&body), expected);
}

#[test]
fn event_stream_conversation() {
    let wire = Rc::new(RefCell::new(Vec::new()));
    let handler_wire = Rc::clone(&wire);

    let switcher = Switcher::new();
    let coro = Coroutine::new(switcher, move |c| {
        let mut transport = SharedWire(handler_wire);
        let mut request = Request::builder(c, &mut transport)
            .method(Method::GET)
            .flags(RequestFlags::KEEP_ALIVE)
            .dates(epoch_dates())
            .build();

        assert!(request.set_event_stream(StatusCode::OK));
        for tick in 1..=3u32 {
            request
                .response
                .buffer
                .extend_from_slice(format!("t={tick}").as_bytes());
            request.send_event(Some("tick"));
        }
        request.send_event(Some("done"));
        Yield::Finished.raw()
    })
    .unwrap();

    let (yields, _) = run_to_completion(&coro);
    assert_eq!(yields.len(), 4);

    let bytes = wire.borrow();
    let (head, body) = split_head(&bytes);
    assert!(head.contains("\r\nContent-Type: text/event-stream\r\n"));
    assert!(!head.contains("Content-Length"));
    assert_eq!(
        body,
        b"event: tick\r\ndata: t=1\r\n\r\n\
          event: tick\r\ndata: t=2\r\n\r\n\
          event: tick\r\ndata: t=3\r\n\r\n\
          event: done\r\n\r\n"
    );
}

#[test]
fn dropping_a_suspended_stream_runs_registered_cleanup() {
    struct OpenHandle(Rc<RefCell<Vec<&'static str>>>);

    impl Drop for OpenHandle {
        fn drop(&mut self) {
            self.0.borrow_mut().push("handle closed");
        }
    }

    let wire = Rc::new(RefCell::new(Vec::new()));
    let events = Rc::new(RefCell::new(Vec::new()));
    let handler_wire = Rc::clone(&wire);
    let handler_events = Rc::clone(&events);

    let switcher = Switcher::new();
    let coro = Coroutine::new(switcher, move |c| {
        // Cleanup must be deferred: a coroutine dropped mid-stream is
        // never resumed, so nothing after a yield is reached again.
        c.scratch(OpenHandle(handler_events));

        let mut transport = SharedWire(handler_wire);
        let mut request = Request::builder(c, &mut transport)
            .method(Method::GET)
            .flags(RequestFlags::KEEP_ALIVE)
            .dates(epoch_dates())
            .build();

        request.response.mime_type = Some(mime::TEXT_PLAIN);
        loop {
            request.response.buffer.extend_from_slice(b"tick");
            request.send_chunk();
        }
    })
    .unwrap();

    assert_eq!(coro.resume(), Yield::MayResume.raw());
    assert_eq!(coro.resume(), Yield::MayResume.raw());
    assert!(!coro.ended());

    // Deadline passed: the event loop gives up on the connection.
    drop(coro);
    assert_eq!(*events.borrow(), vec!["handle closed"]);
}

#[test]
fn coroutine_is_recycled_across_requests() {
    let wire = Rc::new(RefCell::new(Vec::new()));
    let config = Config::new().stack_size(32 * 1024);
    let switcher = Switcher::new();

    let make_handler = |wire: Rc<RefCell<Vec<u8>>>, body: &'static str| {
        move |c: &Coroutine| {
            let mut transport = SharedWire(wire);
            let mut request = Request::builder(c, &mut transport)
                .method(Method::GET)
                .flags(RequestFlags::KEEP_ALIVE)
                .dates(epoch_dates())
                .build();
            request.response.mime_type = Some(mime::TEXT_PLAIN);
            request.response.buffer.extend_from_slice(body.as_bytes());
            request.respond(StatusCode::OK);
            Yield::Finished.raw()
        }
    };

    let coro = config
        .spawn(switcher, make_handler(Rc::clone(&wire), "first"))
        .unwrap();
    let (_, value) = run_to_completion(&coro);
    assert_eq!(Yield::from_raw(value), Some(Yield::Finished));

    coro.reset(make_handler(Rc::clone(&wire), "second"));
    let (_, value) = run_to_completion(&coro);
    assert_eq!(Yield::from_raw(value), Some(Yield::Finished));

    let text = String::from_utf8(wire.borrow().clone()).unwrap();
    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    assert!(text.contains("first"));
    assert!(text.contains("second"));
}
