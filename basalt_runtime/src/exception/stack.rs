//! Per-thread caught-exception bookkeeping.
//!
//! Headers of exceptions currently being handled form a LIFO chain
//! through their `next_exception` field; the thread context owns the
//! chain head and the uncaught counter. Rethrowing a caught exception
//! while its handler is still unwinding keeps it chained (with a
//! negated handler count), so `throw;` deep inside helper calls can
//! always find the exception it re-raises.

use super::header::ExceptionHeader;
use std::cell::Cell;
use std::ptr;

/// Counters describing a thread's exception traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaughtStackStats {
    /// Exceptions pushed onto the caught stack.
    pub catches: u64,
    /// Rethrows of already-caught exceptions.
    pub rethrows: u64,
    /// Deepest simultaneous nesting observed.
    pub max_depth: u32,
}

/// Per-thread exception state.
///
/// Reached through [`with_thread_context`] in the runtime entry points;
/// constructible directly so the state machine can be unit-tested
/// without touching thread-local storage.
pub struct ThreadContext {
    caught_top: Cell<*mut ExceptionHeader>,
    uncaught: Cell<usize>,
    depth: Cell<u32>,
    catches: Cell<u64>,
    rethrows: Cell<u64>,
    max_depth: Cell<u32>,
}

impl ThreadContext {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            caught_top: Cell::new(ptr::null_mut()),
            uncaught: Cell::new(0),
            depth: Cell::new(0),
            catches: Cell::new(0),
            rethrows: Cell::new(0),
            max_depth: Cell::new(0),
        }
    }

    /// The most recently caught exception, or null.
    #[inline]
    #[must_use]
    pub fn caught_top(&self) -> *mut ExceptionHeader {
        self.caught_top.get()
    }

    /// True when no exception is being handled on this thread.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caught_top.get().is_null()
    }

    /// Current caught-stack depth.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Exceptions raised but not yet caught on this thread.
    #[inline]
    #[must_use]
    pub fn uncaught(&self) -> usize {
        self.uncaught.get()
    }

    /// Pushes a header onto the caught stack.
    ///
    /// # Safety
    ///
    /// `header` must be a live exception header not currently chained.
    pub unsafe fn push(&self, header: *mut ExceptionHeader) {
        unsafe { (*header).next_exception = self.caught_top.get() };
        self.caught_top.set(header);
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        self.catches.set(self.catches.get() + 1);
        if depth > self.max_depth.get() {
            self.max_depth.set(depth);
        }
    }

    /// Unlinks the top of the caught stack.
    ///
    /// # Safety
    ///
    /// The stack must be non-empty.
    pub unsafe fn unlink_top(&self) {
        let top = self.caught_top.get();
        debug_assert!(!top.is_null());
        self.caught_top.set(unsafe { (*top).next_exception });
        unsafe { (*top).next_exception = ptr::null_mut() };
        self.depth.set(self.depth.get() - 1);
    }

    /// Records a raise: one more exception in flight.
    #[inline]
    pub fn note_raised(&self) {
        self.uncaught.set(self.uncaught.get() + 1);
    }

    /// Records a rethrow: in flight again.
    #[inline]
    pub fn note_rethrown(&self) {
        self.uncaught.set(self.uncaught.get() + 1);
        self.rethrows.set(self.rethrows.get() + 1);
    }

    /// Records a catch: one fewer exception in flight.
    #[inline]
    pub fn note_caught(&self) {
        self.uncaught.set(self.uncaught.get().saturating_sub(1));
    }

    /// Snapshot of this thread's counters.
    #[must_use]
    pub fn stats(&self) -> CaughtStackStats {
        CaughtStackStats {
            catches: self.catches.get(),
            rethrows: self.rethrows.get(),
            max_depth: self.max_depth.get(),
        }
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static THREAD_CONTEXT: ThreadContext = const { ThreadContext::new() };
}

/// Runs `f` with the calling thread's exception context.
pub fn with_thread_context<R>(f: impl FnOnce(&ThreadContext) -> R) -> R {
    THREAD_CONTEXT.with(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> Box<ExceptionHeader> {
        // Zeroed is the allocator's initial header state.
        Box::new(unsafe { std::mem::MaybeUninit::zeroed().assume_init() })
    }

    #[test]
    fn test_push_and_unlink_are_lifo() {
        let ctx = ThreadContext::new();
        let mut first = make_header();
        let mut second = make_header();
        let first: *mut ExceptionHeader = &mut *first;
        let second: *mut ExceptionHeader = &mut *second;

        unsafe {
            ctx.push(first);
            ctx.push(second);
        }
        assert_eq!(ctx.caught_top(), second);
        assert_eq!(ctx.depth(), 2);

        unsafe { ctx.unlink_top() };
        assert_eq!(ctx.caught_top(), first);
        unsafe { ctx.unlink_top() };
        assert!(ctx.is_empty());

        let stats = ctx.stats();
        assert_eq!(stats.catches, 2);
        assert_eq!(stats.max_depth, 2);
    }

    #[test]
    fn test_uncaught_counter() {
        let ctx = ThreadContext::new();
        ctx.note_raised();
        ctx.note_raised();
        assert_eq!(ctx.uncaught(), 2);
        ctx.note_caught();
        ctx.note_caught();
        assert_eq!(ctx.uncaught(), 0);
        // Defensive floor: never wraps.
        ctx.note_caught();
        assert_eq!(ctx.uncaught(), 0);
    }

    #[test]
    fn test_thread_local_context_is_isolated() {
        with_thread_context(|ctx| ctx.note_raised());
        let other = std::thread::spawn(|| with_thread_context(ThreadContext::uncaught));
        assert_eq!(other.join().unwrap(), 0);
        with_thread_context(|ctx| {
            assert_eq!(ctx.uncaught(), 1);
            ctx.note_caught();
        });
    }
}
