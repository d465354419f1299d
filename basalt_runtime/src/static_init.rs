//! Static-initialization support.
//!
//! Two services the compiler leans on for static storage:
//!
//! - **Guards**: a function-local static is constructed on first pass
//!   through its declaration. The compiler emits an 8-byte guard slot
//!   per such object and brackets the construction with
//!   [`guard_acquire`] / [`guard_release`] (or [`guard_abort`] if the
//!   constructor throws, so a later pass retries).
//! - **At-exit registration**: dynamically registered destructors, run
//!   in reverse registration order by [`finalize`] at shutdown.
//!
//! The linker-array walks that schedule statically registered
//! constructors and destructors live outside the runtime; only the
//! bookkeeping the compiler calls into is here. The registry and the
//! guard flags are process-wide and mutex-protected; blocking a second
//! thread for the duration of another thread's in-flight constructor
//! is outside the single-thread execution model.

use crate::policy;
use parking_lot::Mutex;

// Guard slot bytes: the first marks the object initialized, the second
// an initialization in progress.
const GUARD_DONE: u8 = 1 << 0;
const GUARD_IN_PROGRESS: u8 = 1 << 1;

static GUARD_LOCK: Mutex<()> = Mutex::new(());

/// Begins one-time initialization guarded by `guard`.
///
/// Returns true if the caller must run the initializer; false if the
/// object is already initialized. Re-entering a guard whose
/// initializer is still running is unrecoverable and terminates.
///
/// # Safety
///
/// `guard` must point at a zero-initialized 8-byte guard slot emitted
/// for exactly one static object.
pub unsafe fn guard_acquire(guard: *mut u64) -> bool {
    let _lock = GUARD_LOCK.lock();
    let flags = guard.cast::<u8>();
    unsafe {
        if flags.read() & GUARD_DONE != 0 {
            return false;
        }
        let in_progress = flags.add(1);
        if in_progress.read() & GUARD_IN_PROGRESS != 0 {
            policy::fatal("recursive initialization of a static object");
        }
        in_progress.write(GUARD_IN_PROGRESS);
    }
    true
}

/// Completes the initialization begun by a successful
/// [`guard_acquire`].
///
/// # Safety
///
/// `guard` must be the slot a matching acquire returned true for.
pub unsafe fn guard_release(guard: *mut u64) {
    let _lock = GUARD_LOCK.lock();
    let flags = guard.cast::<u8>();
    unsafe {
        flags.write(GUARD_DONE);
        flags.add(1).write(0);
    }
}

/// Abandons the initialization begun by a successful
/// [`guard_acquire`]; a later pass will retry.
///
/// # Safety
///
/// Same contract as [`guard_release`].
pub unsafe fn guard_abort(guard: *mut u64) {
    let _lock = GUARD_LOCK.lock();
    unsafe { guard.cast::<u8>().add(1).write(0) };
}

// =============================================================================
// At-exit registration
// =============================================================================

/// A registered destructor call.
pub type AtExitFn = unsafe extern "C" fn(*mut u8);

struct AtExitEntry {
    func: AtExitFn,
    arg: *mut u8,
    dso: *mut u8,
}

// Raw pointers keep the entry !Send; the registry hands them back only
// to `finalize`, which runs them on the calling thread.
unsafe impl Send for AtExitEntry {}

static AT_EXIT: Mutex<Vec<AtExitEntry>> = Mutex::new(Vec::new());

/// Registers `func(arg)` to run at shutdown, associated with the given
/// shared-object handle.
pub fn register_at_exit(func: AtExitFn, arg: *mut u8, dso: *mut u8) {
    AT_EXIT.lock().push(AtExitEntry { func, arg, dso });
}

/// Runs destructors registered for `dso` (all of them if `dso` is
/// null) once, in reverse registration order.
///
/// # Safety
///
/// Every registered `func` must be safe to call with its `arg`;
/// objects they destroy must not be used afterwards.
pub unsafe fn finalize(dso: *mut u8) {
    // Drain under the lock, run outside it: a destructor may register
    // further work.
    let drained: Vec<AtExitEntry> = {
        let mut registry = AT_EXIT.lock();
        let mut kept = Vec::new();
        let mut drained = Vec::new();
        for entry in registry.drain(..) {
            if dso.is_null() || entry.dso == dso {
                drained.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *registry = kept;
        drained
    };
    for entry in drained.into_iter().rev() {
        unsafe { (entry.func)(entry.arg) };
    }
}

/// Shutdown entry: runs every dynamically registered destructor.
///
/// # Safety
///
/// Same contract as [`finalize`].
pub unsafe fn run_destructors() {
    unsafe { finalize(std::ptr::null_mut()) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_guard_lifecycle() {
        let mut slot: u64 = 0;
        assert!(unsafe { guard_acquire(&mut slot) });
        unsafe { guard_release(&mut slot) };
        // Initialized: later passes skip the initializer.
        assert!(!unsafe { guard_acquire(&mut slot) });
        assert!(!unsafe { guard_acquire(&mut slot) });
    }

    #[test]
    fn test_guard_abort_allows_retry() {
        let mut slot: u64 = 0;
        assert!(unsafe { guard_acquire(&mut slot) });
        unsafe { guard_abort(&mut slot) };
        assert!(unsafe { guard_acquire(&mut slot) });
        unsafe { guard_release(&mut slot) };
        assert!(!unsafe { guard_acquire(&mut slot) });
    }

    // Shutdown-order bookkeeping. The registry is process-global, so
    // this test owns a distinct dso handle to stay isolated.
    static RUN_ORDER: Mutex<Vec<u32>> = Mutex::new(Vec::new());
    static DSO_TAG: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn record(arg: *mut u8) {
        RUN_ORDER.lock().push(arg as u32);
    }

    #[test]
    fn test_finalize_runs_in_reverse_order_once() {
        let dso = &DSO_TAG as *const AtomicU32 as *mut u8;
        register_at_exit(record, 1 as *mut u8, dso);
        register_at_exit(record, 2 as *mut u8, dso);
        register_at_exit(record, 3 as *mut u8, dso);

        unsafe { finalize(dso) };
        assert_eq!(*RUN_ORDER.lock(), vec![3, 2, 1]);

        // Already drained: running again is a no-op.
        unsafe { finalize(dso) };
        assert_eq!(RUN_ORDER.lock().len(), 3);
    }
}
