use std::io;
use thiserror::Error;

/// Failure kinds inside the framer.
///
/// None of these escape a coroutine: header overflow falls back to the
/// default error response, the rest are logged and turn into an `Abort`
/// yield so the I/O thread drops the connection.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head does not fit the header buffer")]
    HeaderOverflow,

    #[error("chunk length {length} is not representable")]
    ChunkLength { length: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
