//! Core of a high-performance HTTP/1.x server: a stackful coroutine
//! runtime and the response framing layer built on it.
//!
//! The I/O thread creates one [`Coroutine`] per accepted connection and
//! resumes it whenever the socket is ready; the handler writes through a
//! [`Request`], whose chunked and event-stream modes yield back to the
//! event loop at every frame boundary. Accepting, routing and request
//! parsing are collaborators living outside this crate.

pub mod config;
pub mod coro;
pub mod date;
pub mod protocol;
pub mod response;
pub mod transport;

pub use config::Config;
pub use coro::{Coroutine, Switcher, Yield};
pub use date::HttpDates;
pub use protocol::{Request, RequestBuilder, RequestFlags, ResponseContext};
pub use response::{ResponseError, SERVER_PRODUCT};
pub use transport::Transport;
