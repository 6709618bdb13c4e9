//! Tunables the I/O layer applies when wiring connections to the core.

use crate::coro::{Coroutine, Switcher, DEFAULT_STACK_SIZE};
use crate::date::HttpDates;

use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

/// Builder-style configuration, one per I/O thread.
#[derive(Debug, Clone)]
pub struct Config {
    stack_size: usize,
    expires_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_size: DEFAULT_STACK_SIZE,
            expires_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Stack size for connection coroutines; values below the platform
    /// minimum are rounded up at spawn time.
    pub fn stack_size(mut self, stack_size: usize) -> Config {
        self.stack_size = stack_size;
        self
    }

    /// How far ahead of `Date` the generated `Expires` header lies.
    pub fn expires_ttl(mut self, ttl: Duration) -> Config {
        self.expires_ttl = ttl;
        self
    }

    /// Creates a connection coroutine with this configuration's stack
    /// size. `None` when the stack allocation fails.
    pub fn spawn<F>(&self, switcher: Rc<Switcher>, entry: F) -> Option<Pin<Box<Coroutine>>>
    where
        F: FnOnce(&Coroutine) -> i32 + 'static,
    {
        Coroutine::with_stack_size(switcher, self.stack_size, entry)
    }

    /// Fresh date stamps using this configuration's `Expires` TTL.
    pub fn dates(&self) -> HttpDates {
        HttpDates::now(self.expires_ttl)
    }
}
