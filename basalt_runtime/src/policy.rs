//! Termination policy hooks.
//!
//! User code may replace the terminate and unexpected handlers; the
//! raise path snapshots both into the exception header so the policy in
//! force at throw time governs that exception. The runtime itself only
//! ever calls [`terminate`]; the unexpected handler is invoked by
//! compiler-emitted landing-pad code, never from here.

use std::mem;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A terminate or unexpected handler installed by user code.
pub type PolicyHandler = extern "C" fn();

static TERMINATE_HANDLER: AtomicUsize = AtomicUsize::new(0);
static UNEXPECTED_HANDLER: AtomicUsize = AtomicUsize::new(0);

fn swap_handler(slot: &AtomicUsize, handler: Option<PolicyHandler>) -> Option<PolicyHandler> {
    let raw = handler.map_or(0, |h| h as usize);
    let previous = slot.swap(raw, Ordering::AcqRel);
    // Handlers are stored as their address; zero is "none".
    unsafe { mem::transmute::<usize, Option<PolicyHandler>>(previous) }
}

fn load_handler(slot: &AtomicUsize) -> Option<PolicyHandler> {
    unsafe { mem::transmute::<usize, Option<PolicyHandler>>(slot.load(Ordering::Acquire)) }
}

/// Installs a new terminate handler, returning the previous one.
pub fn set_terminate(handler: Option<PolicyHandler>) -> Option<PolicyHandler> {
    swap_handler(&TERMINATE_HANDLER, handler)
}

/// The terminate handler currently in force.
#[must_use]
pub fn terminate_handler() -> Option<PolicyHandler> {
    load_handler(&TERMINATE_HANDLER)
}

/// Installs a new unexpected handler, returning the previous one.
pub fn set_unexpected(handler: Option<PolicyHandler>) -> Option<PolicyHandler> {
    swap_handler(&UNEXPECTED_HANDLER, handler)
}

/// The unexpected handler currently in force.
#[must_use]
pub fn unexpected_handler() -> Option<PolicyHandler> {
    load_handler(&UNEXPECTED_HANDLER)
}

/// Ends the process: runs the installed terminate handler, then aborts.
///
/// The handler is not required to return; if it does, abort anyway.
pub fn terminate() -> ! {
    if let Some(handler) = terminate_handler() {
        handler();
    }
    process::abort()
}

/// Reports an unrecoverable runtime condition and terminates.
pub(crate) fn fatal(reason: &str) -> ! {
    eprintln!("basalt runtime: {reason}");
    terminate()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_handler() {}

    #[test]
    fn test_handler_installation_round_trips() {
        let previous = set_terminate(Some(noop_handler));
        let replaced = set_terminate(previous);
        assert_eq!(replaced.map(|h| h as usize), Some(noop_handler as usize));
    }

    #[test]
    fn test_unexpected_handler_slot_is_independent() {
        let previous = set_unexpected(Some(noop_handler));
        assert_eq!(unexpected_handler().map(|h| h as usize), Some(noop_handler as usize));
        set_unexpected(previous);
    }
}
