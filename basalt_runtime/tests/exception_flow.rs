//! Exception state-machine integration tests.
//!
//! These drive the raise / begin-catch / end-catch / rethrow protocol
//! exactly as compiled code does, with the personality's phase-1 work
//! (caching the adjusted payload) simulated where a real unwinder
//! would run. Every test runs on its own thread, so the per-thread
//! caught stack and uncaught counter start clean each time.

use basalt_rtti::TypeDescriptor;
use basalt_runtime::exception::{
    allocate_exception, begin_catch, current_exception_type, end_catch, prepare_raise,
    prepare_rethrow, uncaught_exceptions, with_thread_context, ExceptionHeader,
};
use std::sync::atomic::{AtomicUsize, Ordering};

static BOOM: TypeDescriptor = TypeDescriptor::class("Boom");
static OTHER: TypeDescriptor = TypeDescriptor::class("Other");

/// Payload destructor: bumps the counter the payload points at.
unsafe extern "C" fn count_drop(payload: *mut u8) {
    let counter = unsafe { payload.cast::<*const AtomicUsize>().read() };
    unsafe { (*counter).fetch_add(1, Ordering::SeqCst) };
}

/// Allocates, populates, and "raises" an exception whose destructor
/// bumps `counter`, then simulates the personality's phase-1 caching.
fn throw_counted(ty: &'static TypeDescriptor, counter: &'static AtomicUsize) -> *mut u8 {
    let payload = allocate_exception(std::mem::size_of::<*const AtomicUsize>());
    unsafe {
        payload
            .cast::<*const AtomicUsize>()
            .write(counter as *const AtomicUsize);
        let _ = prepare_raise(payload, ty, Some(count_drop));
        let header = ExceptionHeader::from_payload(payload);
        (*header).adjusted_payload = payload;
        (*header).handler_switch_value = 1;
    }
    payload
}

fn caught_depth() -> u32 {
    with_thread_context(basalt_runtime::ThreadContext::depth)
}

#[test]
fn test_throw_catch_destroys_payload_exactly_once() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let payload = throw_counted(&BOOM, &DROPS);
    assert_eq!(uncaught_exceptions(), 1);
    assert!(current_exception_type().is_none());

    let caught = unsafe { begin_catch(payload) };
    assert_eq!(caught, payload);
    assert_eq!(uncaught_exceptions(), 0);
    assert!(current_exception_type().unwrap().same_as(&BOOM));
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);

    unsafe { end_catch() };
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    assert!(current_exception_type().is_none());
    assert_eq!(uncaught_exceptions(), 0);
    assert_eq!(caught_depth(), 0);
}

#[test]
fn test_rethrow_keeps_the_same_exception_object() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let payload = throw_counted(&BOOM, &DROPS);
    let header = unsafe { ExceptionHeader::from_payload(payload) };

    let _ = unsafe { begin_catch(payload) };

    // `throw;` inside the handler: same header goes back in flight.
    let unwind = unsafe { prepare_rethrow() };
    assert_eq!(unwind, ExceptionHeader::unwind_of(header));
    assert_eq!(uncaught_exceptions(), 1);
    assert_eq!(unsafe { (*header).handler_count }, -1);

    // The rethrowing handler's own exit edge runs end-catch: the
    // exception unchains but must survive, it is in flight.
    unsafe { end_catch() };
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);
    assert_eq!(caught_depth(), 0);
    assert_eq!(unsafe { (*header).handler_count }, 0);

    // The next frame catches it again, then finishes for real.
    let caught = unsafe { begin_catch(payload) };
    assert_eq!(caught, payload);
    assert_eq!(uncaught_exceptions(), 0);
    unsafe { end_catch() };
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    assert!(current_exception_type().is_none());
}

#[test]
fn test_rethrow_recaught_inside_the_handler() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let payload = throw_counted(&BOOM, &DROPS);
    let header = unsafe { ExceptionHeader::from_payload(payload) };

    let _ = unsafe { begin_catch(payload) };
    assert_eq!(caught_depth(), 1);

    // Rethrow and re-catch while the original handler is still live:
    // two handlers now handle one exception, chained once.
    let _ = unsafe { prepare_rethrow() };
    let _ = unsafe { begin_catch(payload) };
    assert_eq!(unsafe { (*header).handler_count }, 2);
    assert_eq!(caught_depth(), 1);
    assert_eq!(uncaught_exceptions(), 0);

    // Inner handler completes: nothing destroyed yet.
    unsafe { end_catch() };
    assert_eq!(unsafe { (*header).handler_count }, 1);
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);

    // Outer handler completes: now it goes.
    unsafe { end_catch() };
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    assert_eq!(caught_depth(), 0);
}

#[test]
fn test_nested_distinct_exceptions_unwind_lifo() {
    static OUTER_DROPS: AtomicUsize = AtomicUsize::new(0);
    static INNER_DROPS: AtomicUsize = AtomicUsize::new(0);

    let outer = throw_counted(&BOOM, &OUTER_DROPS);
    let _ = unsafe { begin_catch(outer) };
    assert!(current_exception_type().unwrap().same_as(&BOOM));

    // A new exception thrown from inside the outer handler.
    let inner = throw_counted(&OTHER, &INNER_DROPS);
    let _ = unsafe { begin_catch(inner) };
    assert!(current_exception_type().unwrap().same_as(&OTHER));
    assert_eq!(caught_depth(), 2);

    unsafe { end_catch() };
    assert_eq!(INNER_DROPS.load(Ordering::SeqCst), 1);
    assert_eq!(OUTER_DROPS.load(Ordering::SeqCst), 0);
    assert!(current_exception_type().unwrap().same_as(&BOOM));

    unsafe { end_catch() };
    assert_eq!(OUTER_DROPS.load(Ordering::SeqCst), 1);
    assert!(current_exception_type().is_none());
    assert_eq!(uncaught_exceptions(), 0);
}

#[test]
fn test_trivially_destructible_payload_needs_no_destructor() {
    let payload = allocate_exception(8);
    unsafe {
        payload.cast::<u64>().write(0x5151);
        let _ = prepare_raise(payload, &BOOM, None);
        let header = ExceptionHeader::from_payload(payload);
        (*header).adjusted_payload = payload;
    }

    let caught = unsafe { begin_catch(payload) };
    assert_eq!(unsafe { caught.cast::<u64>().read() }, 0x5151);
    unsafe { end_catch() };
    assert_eq!(uncaught_exceptions(), 0);
}

#[test]
fn test_stats_track_catches_and_rethrows() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let payload = throw_counted(&BOOM, &DROPS);
    let _ = unsafe { begin_catch(payload) };
    let _ = unsafe { prepare_rethrow() };
    unsafe { end_catch() };
    let _ = unsafe { begin_catch(payload) };
    unsafe { end_catch() };

    let stats = with_thread_context(basalt_runtime::ThreadContext::stats);
    assert_eq!(stats.catches, 2);
    assert_eq!(stats.rethrows, 1);
    assert_eq!(stats.max_depth, 1);
}
