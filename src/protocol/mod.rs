pub mod request;
pub mod status;

pub use request::{Request, RequestBuilder, RequestFlags, ResponseContext, StreamCallback};
