//! Stackful cooperative tasks.
//!
//! Each I/O thread owns one [`Switcher`] and drives any number of
//! [`Coroutine`]s on it, one at a time. A coroutine runs a handler on its
//! own stack; the handler suspends with [`Coroutine::yield_with`] and the
//! I/O thread continues it with [`Coroutine::resume`]. Values travel both
//! ways: the argument of `yield_with` becomes `resume`'s return value, and
//! the argument of [`Coroutine::resume_value`] becomes what the in-flight
//! `yield_with` returns.
//!
//! Cleanup is expressed as *deferred actions*: closures registered with
//! [`Coroutine::defer`] that run in LIFO order when the coroutine is reset,
//! dropped, or explicitly rolled back to a [generation]. Freeing a
//! suspended coroutine does not unwind its stack, so values living on that
//! stack are leaked unless their cleanup was registered as a deferred
//! action.
//!
//! Everything here is single-owner, single-thread: no locks, no atomics.
//! The types are `!Send` by construction.
//!
//! [generation]: Coroutine::deferred_generation

mod context;
mod stack;

pub use stack::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE};

use context::{switch_context, Context};
use stack::Stack;

use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::marker::PhantomPinned;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;

use tracing::error;

/// The protocol a coroutine speaks to its I/O thread through yield values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Yield {
    /// Discard the coroutine; the connection is beyond saving.
    Abort = -1,
    /// Re-arm the connection in the event loop and resume later.
    MayResume = 0,
    /// The handler is done with the connection.
    Finished = 1,
}

impl Yield {
    pub const fn raw(self) -> i32 {
        self as i32
    }

    pub const fn from_raw(value: i32) -> Option<Yield> {
        match value {
            -1 => Some(Yield::Abort),
            0 => Some(Yield::MayResume),
            1 => Some(Yield::Finished),
            _ => None,
        }
    }
}

/// Per-I/O-thread storage for the two saved contexts every switch on that
/// thread goes through: the resuming thread's (`caller`) and the suspended
/// coroutine's (`callee`).
pub struct Switcher {
    caller: UnsafeCell<Context>,
    callee: UnsafeCell<Context>,
    // One coroutine at a time; used to catch misuse of resume/yield.
    active: Cell<bool>,
}

impl Switcher {
    pub fn new() -> Rc<Switcher> {
        Rc::new(Switcher {
            caller: UnsafeCell::new(Context::default()),
            callee: UnsafeCell::new(Context::default()),
            active: Cell::new(false),
        })
    }
}

type Entry = Box<dyn FnOnce(&Coroutine) -> i32>;
type Deferred = Box<dyn FnOnce()>;

/// A cooperatively-scheduled task with its own stack.
///
/// Created with [`Coroutine::new`], recycled with [`Coroutine::reset`],
/// destroyed by dropping. All operations take `&self`: while the coroutine
/// runs, both the handler and the resuming thread alias it on one thread.
pub struct Coroutine {
    switcher: Rc<Switcher>,
    ctx: UnsafeCell<Context>,
    stack: Stack,
    deferred: RefCell<Vec<Deferred>>,
    entry: RefCell<Option<Entry>>,
    yield_value: Cell<i32>,
    ended: Cell<bool>,
    // The primed context stores our address; the coroutine must not move.
    _pin: PhantomPinned,
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("stack_size", &self.stack.size())
            .field("deferred", &self.deferred.borrow().len())
            .field("ended", &self.ended.get())
            .finish()
    }
}

/// First activation of every coroutine. Runs the handler, records its
/// return value, marks the coroutine ended and switches back to the caller
/// for good.
extern "C" fn coro_entry(coro: *mut Coroutine) -> ! {
    let coro = unsafe { &*coro };
    // Everything that can panic stays inside the catch: this frame was
    // entered by a context switch, so an unwind must never escape it.
    let value = match panic::catch_unwind(AssertUnwindSafe(|| {
        let entry = coro
            .entry
            .borrow_mut()
            .take()
            .expect("coroutine resumed without an entry");
        entry(coro)
    })) {
        Ok(value) => value,
        Err(_) => {
            error!("coroutine handler panicked");
            Yield::Abort.raw()
        }
    };
    coro.yield_value.set(value);
    coro.ended.set(true);
    unsafe {
        switch_context(coro.switcher.callee.get(), coro.switcher.caller.get());
    }
    unreachable!("ended coroutine was resumed")
}

impl Coroutine {
    /// Creates a coroutine with the default stack size.
    ///
    /// Returns `None` when the stack allocation fails; nothing is partially
    /// constructed in that case. The first [`resume`](Self::resume) enters
    /// `entry`; its return value becomes the final yield value.
    pub fn new<F>(switcher: Rc<Switcher>, entry: F) -> Option<Pin<Box<Coroutine>>>
    where
        F: FnOnce(&Coroutine) -> i32 + 'static,
    {
        Self::with_stack_size(switcher, DEFAULT_STACK_SIZE, entry)
    }

    /// Like [`new`](Self::new) with an explicit stack size, rounded up to
    /// [`MIN_STACK_SIZE`].
    pub fn with_stack_size<F>(
        switcher: Rc<Switcher>,
        stack_size: usize,
        entry: F,
    ) -> Option<Pin<Box<Coroutine>>>
    where
        F: FnOnce(&Coroutine) -> i32 + 'static,
    {
        let stack = Stack::new(stack_size)?;
        let coro = Box::new(Coroutine {
            switcher,
            ctx: UnsafeCell::new(Context::default()),
            stack,
            deferred: RefCell::new(Vec::new()),
            entry: RefCell::new(None),
            yield_value: Cell::new(0),
            ended: Cell::new(false),
            _pin: PhantomPinned,
        });
        coro.reset(entry);
        Some(Box::into_pin(coro))
    }

    /// Recycles this coroutine for a new handler without reallocating its
    /// stack: pending deferred actions run in LIFO order, `ended` is
    /// cleared, and the saved context is re-primed at the entry trampoline.
    /// The deferred storage keeps its capacity.
    pub fn reset<F>(&self, entry: F)
    where
        F: FnOnce(&Coroutine) -> i32 + 'static,
    {
        self.deferred_run(0);
        self.ended.set(false);
        *self.entry.borrow_mut() = Some(Box::new(entry));
        let ctx = unsafe { &mut *self.ctx.get() };
        ctx.prime(
            coro_entry as usize,
            self as *const Coroutine as usize,
            self.stack.top(),
        );
    }

    /// Runs the coroutine until it yields or ends; returns the yield value
    /// (or the handler's return value if it ended).
    ///
    /// # Panics
    ///
    /// Panics when called on an ended coroutine, or from inside a coroutine
    /// of the same switcher.
    pub fn resume(&self) -> i32 {
        assert!(!self.ended.get(), "resume called on an ended coroutine");
        assert!(
            !self.switcher.active.get(),
            "resume called from inside a running coroutine"
        );
        self.switcher.active.set(true);
        unsafe {
            switch_context(self.switcher.caller.get(), self.ctx.get());
            if !self.ended.get() {
                // Continue from the yield point on the next resume.
                *self.ctx.get() = *self.switcher.callee.get();
            }
        }
        self.switcher.active.set(false);
        self.yield_value.get()
    }

    /// Stores `value` as what the coroutine's in-flight
    /// [`yield_with`](Self::yield_with) will return, then resumes.
    pub fn resume_value(&self, value: i32) -> i32 {
        self.yield_value.set(value);
        self.resume()
    }

    /// Suspends the coroutine, handing `value` to whoever resumed it.
    /// Returns the value passed to the [`resume_value`](Self::resume_value)
    /// that continues this coroutine. Must be called from inside the
    /// coroutine.
    pub fn yield_with(&self, value: i32) -> i32 {
        assert!(
            self.switcher.active.get(),
            "yield outside a running coroutine"
        );
        self.yield_value.set(value);
        unsafe {
            switch_context(self.switcher.callee.get(), self.switcher.caller.get());
        }
        self.yield_value.get()
    }

    /// True once the handler has returned. A terminal coroutine can only be
    /// [`reset`](Self::reset) or dropped.
    pub fn ended(&self) -> bool {
        self.ended.get()
    }

    /// Registers a cleanup action, run in LIFO order at rollback, reset or
    /// drop. O(1) amortized.
    ///
    /// When the allocator refuses to grow the deferred storage the
    /// registration is logged and dropped; callers with strict cleanup
    /// requirements must register eagerly, not under memory pressure.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + 'static,
    {
        let mut deferred = self.deferred.borrow_mut();
        if let Err(err) = deferred.try_reserve(1) {
            error!(error = %err, "could not register deferred action");
            return;
        }
        deferred.push(Box::new(action));
    }

    /// Snapshots the current length of the deferred sequence, bounding a
    /// rollback region for [`deferred_run`](Self::deferred_run).
    pub fn deferred_generation(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Executes and discards deferred actions down to `generation`, newest
    /// first. Actions registered while running are executed as well.
    pub fn deferred_run(&self, generation: usize) {
        loop {
            let action = {
                let mut deferred = self.deferred.borrow_mut();
                if deferred.len() <= generation {
                    break;
                }
                deferred.pop()
            };
            if let Some(action) = action {
                action();
            }
        }
    }

    /// Hands `value` to this coroutine, keeping it alive until the next
    /// rollback, reset or drop releases the coroutine's reference. The
    /// value's `Drop` is its cleanup.
    pub fn scratch<T: 'static>(&self, value: T) -> Rc<T> {
        self.park(Rc::new(value))
    }

    /// Copies `s` into coroutine-owned storage.
    pub fn scratch_str(&self, s: &str) -> Rc<str> {
        self.park(Rc::from(s))
    }

    /// Copies at most `max_len` bytes of `s`, never splitting a character.
    pub fn scratch_str_bounded(&self, s: &str, max_len: usize) -> Rc<str> {
        let mut end = max_len.min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.park(Rc::from(&s[..end]))
    }

    /// Formats into coroutine-owned storage:
    /// `coro.scratch_fmt(format_args!("{addr}:{port}"))`.
    pub fn scratch_fmt(&self, args: fmt::Arguments<'_>) -> Rc<str> {
        self.park(Rc::from(args.to_string().as_str()))
    }

    fn park<T: ?Sized + 'static>(&self, value: Rc<T>) -> Rc<T> {
        let parked = Rc::clone(&value);
        self.defer(move || drop(parked));
        value
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        self.deferred_run(0);
    }
}
