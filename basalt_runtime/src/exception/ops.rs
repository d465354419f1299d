//! Exception-propagation primitives.
//!
//! These are the operations compiled code calls, in the order a throw
//! plays out: `allocate_exception` and `raise_exception` at the throw
//! site, `begin_catch`/`end_catch` bracketing each handler body, and
//! `rethrow` for a bare re-raise inside a handler.
//!
//! The handler-count protocol (see the module docs in
//! [`super`]): begin-catch on a fresh exception chains it and bumps the
//! count; rethrow negates the count and leaves it chained; end-catch
//! walks the count back toward zero from either side, unchains at zero,
//! and destroys the payload only on the positive (not-rethrown) side
//! once the reference count agrees.

use super::header::{
    ExceptionHeader, PayloadDestructor, EXCEPTION_CLASS, HEADER_SIZE, PAYLOAD_ALIGN,
};
use super::stack::with_thread_context;
use crate::policy;
use crate::unwind::{sys, ReasonCode, UnwindException};
use basalt_rtti::TypeDescriptor;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

/// Allocates backing storage for a payload of `payload_size` bytes.
///
/// Returns the payload pointer; the header prefix is zeroed. Allocation
/// failure terminates; a throw site has nowhere to report failure to.
#[must_use]
pub fn allocate_exception(payload_size: usize) -> *mut u8 {
    let layout = exception_layout(payload_size);
    let base = unsafe { alloc(layout) };
    if base.is_null() {
        policy::fatal("exception allocation failed");
    }
    unsafe {
        ptr::write_bytes(base, 0, HEADER_SIZE);
        let header = base.cast::<ExceptionHeader>();
        (*header).payload_size = payload_size;
        base.add(HEADER_SIZE)
    }
}

/// Releases storage obtained from [`allocate_exception`].
///
/// # Safety
///
/// `payload` must come from [`allocate_exception`] and must not be used
/// afterwards.
pub unsafe fn free_exception(payload: *mut u8) {
    let header = unsafe { ExceptionHeader::from_payload(payload) };
    let layout = exception_layout(unsafe { (*header).payload_size });
    unsafe { dealloc(header.cast(), layout) };
}

fn exception_layout(payload_size: usize) -> Layout {
    let Some(total) = HEADER_SIZE.checked_add(payload_size) else {
        policy::fatal("exception size overflow");
    };
    match Layout::from_size_align(total, PAYLOAD_ALIGN) {
        Ok(layout) => layout,
        Err(_) => policy::fatal("exception size overflow"),
    }
}

/// Cleanup hook handed to the unwinder. Only a foreign runtime that
/// takes ownership of the exception would call it.
unsafe extern "C" fn exception_cleanup(_reason: ReasonCode, _exception: *mut UnwindException) {}

/// Populates the header of a constructed payload, making it ready to
/// raise, and returns the unwinder sub-header.
///
/// Counts the exception as uncaught. Split from [`raise_exception`] so
/// the state machine can be exercised without a live unwinder.
///
/// # Safety
///
/// `payload` must come from [`allocate_exception`] and hold a fully
/// constructed object described by `descriptor`.
pub unsafe fn prepare_raise(
    payload: *mut u8,
    descriptor: &'static TypeDescriptor,
    destructor: Option<PayloadDestructor>,
) -> *mut UnwindException {
    let header = unsafe { ExceptionHeader::from_payload(payload) };
    unsafe {
        (*header).reference_count = 1;
        (*header).type_descriptor = descriptor;
        (*header).destructor = destructor;
        (*header).unexpected_handler = policy::unexpected_handler();
        (*header).terminate_handler = policy::terminate_handler();
        (*header).handler_count = 0;
        (*header).unwind_header.class = EXCEPTION_CLASS;
        (*header).unwind_header.cleanup = Some(exception_cleanup);
    }
    with_thread_context(super::stack::ThreadContext::note_raised);
    ExceptionHeader::unwind_of(header)
}

/// Raises a constructed exception; does not return.
///
/// If the unwinder finds no handler the exception is entered on the
/// caught stack (so post-mortem code can see it) and the process
/// terminates.
///
/// # Safety
///
/// Same contract as [`prepare_raise`].
pub unsafe fn raise_exception(
    payload: *mut u8,
    descriptor: &'static TypeDescriptor,
    destructor: Option<PayloadDestructor>,
) -> ! {
    let unwind = unsafe { prepare_raise(payload, descriptor, destructor) };
    let _ = unsafe { sys::_Unwind_RaiseException(unwind) };
    // Raise only returns when unwinding failed outright.
    let _ = unsafe { begin_catch(payload) };
    policy::fatal("no handler found for raised exception");
}

/// Enters a handler: chains the exception, adjusts the handler count,
/// and returns the payload pointer the handler binds.
///
/// A negative handler count marks a rethrown exception being re-caught
/// while still chained from its original catch; it is flipped back
/// positive without re-chaining.
///
/// # Safety
///
/// `payload` must be the (un-adjusted) payload pointer of a native
/// exception delivered to a landing pad.
pub unsafe fn begin_catch(payload: *mut u8) -> *mut u8 {
    let header = unsafe { ExceptionHeader::from_payload(payload) };
    with_thread_context(|ctx| {
        let count = unsafe { (*header).handler_count };
        if count < 0 {
            unsafe { (*header).handler_count = -count + 1 };
        } else {
            unsafe {
                (*header).handler_count = count + 1;
                ctx.push(header);
            }
        }
        ctx.note_caught();
    });
    unsafe { (*header).adjusted_payload }
}

/// Leaves the innermost handler.
///
/// Emitted by the compiler on every exit edge of a handler body,
/// including the unwind edge a rethrow escapes through.
pub unsafe fn end_catch() {
    with_thread_context(|ctx| {
        let top = ctx.caught_top();
        if top.is_null() {
            policy::fatal("end-catch with no exception being handled");
        }
        let count = unsafe { (*top).handler_count };
        if count > 0 {
            // Normal completion.
            unsafe { (*top).handler_count = count - 1 };
            if count == 1 {
                unsafe {
                    ctx.unlink_top();
                    (*top).reference_count -= 1;
                    if (*top).reference_count == 0 {
                        destroy_exception(top);
                    }
                }
            }
        } else {
            // The handler rethrew: step toward zero, unchain at zero,
            // and leave the payload alive for the next catch.
            unsafe { (*top).handler_count = count + 1 };
            if count == -1 {
                unsafe { ctx.unlink_top() };
            }
        }
    });
}

/// Marks the innermost caught exception as in flight again and returns
/// its unwinder sub-header for re-raising.
///
/// The exception stays chained; the end-catch of the rethrowing handler
/// recognizes the negated count and unchains without destroying.
///
/// Terminates if no exception is being handled.
pub unsafe fn prepare_rethrow() -> *mut UnwindException {
    with_thread_context(|ctx| {
        let top = ctx.caught_top();
        if top.is_null() {
            policy::fatal("rethrow with no exception being handled");
        }
        unsafe { (*top).handler_count = -(*top).handler_count };
        ctx.note_rethrown();
        ExceptionHeader::unwind_of(top)
    })
}

/// Re-raises the innermost caught exception; does not return.
pub unsafe fn rethrow() -> ! {
    let unwind = unsafe { prepare_rethrow() };
    let payload = ExceptionHeader::payload_of(unsafe { ExceptionHeader::from_unwind(unwind) });
    let _ = unsafe { sys::_Unwind_RaiseException(unwind) };
    let _ = unsafe { begin_catch(payload) };
    policy::fatal("no handler found for rethrown exception");
}

/// Number of exceptions raised but not yet caught on this thread.
#[must_use]
pub fn uncaught_exceptions() -> usize {
    with_thread_context(super::stack::ThreadContext::uncaught)
}

/// Type descriptor of the innermost exception being handled, if any.
#[must_use]
pub fn current_exception_type() -> Option<&'static TypeDescriptor> {
    with_thread_context(|ctx| {
        let top = ctx.caught_top();
        if top.is_null() {
            return None;
        }
        unsafe { (*top).type_descriptor.as_ref() }
    })
}

/// Runs the payload destructor, if any, and releases the storage.
unsafe fn destroy_exception(header: *mut ExceptionHeader) {
    let payload = ExceptionHeader::payload_of(header);
    if let Some(destructor) = unsafe { (*header).destructor } {
        unsafe { destructor(payload) };
    }
    unsafe { free_exception(payload) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroes_header_and_aligns_payload() {
        let payload = allocate_exception(24);
        assert_eq!(payload as usize % PAYLOAD_ALIGN, 0);
        let header = unsafe { ExceptionHeader::from_payload(payload) };
        unsafe {
            assert_eq!((*header).payload_size, 24);
            assert_eq!((*header).reference_count, 0);
            assert_eq!((*header).handler_count, 0);
            assert!((*header).next_exception.is_null());
            assert!((*header).destructor.is_none());
            free_exception(payload);
        }
    }

    #[test]
    fn test_prepare_raise_stamps_class_and_counts() {
        static TY: TypeDescriptor = TypeDescriptor::class("Boom");
        let payload = allocate_exception(8);
        let unwind = unsafe { prepare_raise(payload, &TY, None) };
        unsafe {
            assert_eq!((*unwind).class, EXCEPTION_CLASS);
            assert!((*unwind).cleanup.is_some());
        }
        assert_eq!(uncaught_exceptions(), 1);

        let header = unsafe { ExceptionHeader::from_payload(payload) };
        unsafe {
            assert_eq!((*header).reference_count, 1);
            assert!(std::ptr::eq((*header).type_descriptor, &TY));
            // Undo the raise so other assertions in this thread start clean.
            (*header).adjusted_payload = payload;
            let _ = begin_catch(payload);
            end_catch();
        }
        assert_eq!(uncaught_exceptions(), 0);
    }
}
