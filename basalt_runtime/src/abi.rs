//! The `extern "C"` surface the Basalt compiler emits calls to.
//!
//! Thin shims over the crate's typed entry points. Symbol names are
//! part of the compiler contract; the personality is named by the
//! well-known `__basalt_personality_v0` every EH-annotated frame
//! references.

use crate::exception;
use crate::personality;
use crate::policy;
use crate::static_init;
use crate::unwind::{RawFrame, RawUnwindContext, ReasonCode, UnwindActions, UnwindException};
use basalt_rtti::TypeDescriptor;
use std::os::raw::c_int;

/// Shared-object handle whose address compiler-emitted registration
/// passes to [`basalt_atexit`].
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static __basalt_dso_handle: u8 = 0;

/// The personality routine referenced by frame unwind information.
///
/// # Safety
///
/// Called by the unwinder with a live exception and frame context.
#[no_mangle]
pub unsafe extern "C" fn __basalt_personality_v0(
    version: c_int,
    actions: c_int,
    class: u64,
    exception: *mut UnwindException,
    context: *mut RawUnwindContext,
) -> ReasonCode {
    let mut frame = unsafe { RawFrame::new(context) };
    unsafe {
        personality::personality_routine(
            version,
            UnwindActions::from_bits_retain(actions),
            class,
            exception,
            &mut frame,
        )
    }
}

/// Allocates storage for a payload of `size` bytes; terminates on
/// exhaustion.
#[no_mangle]
pub extern "C" fn basalt_allocate_exception(size: usize) -> *mut u8 {
    exception::allocate_exception(size)
}

/// Releases storage for a never-raised exception (e.g. the payload
/// constructor itself threw).
///
/// # Safety
///
/// `payload` must come from [`basalt_allocate_exception`].
#[no_mangle]
pub unsafe extern "C" fn basalt_free_exception(payload: *mut u8) {
    unsafe { exception::free_exception(payload) }
}

/// Raises a constructed exception; never returns.
///
/// # Safety
///
/// `payload` must hold a constructed object described by `descriptor`;
/// `destructor` must accept the payload pointer.
#[no_mangle]
// The descriptor layout is fixed by our own compiler contract, not the
// platform C ABI.
#[allow(improper_ctypes_definitions)]
pub unsafe extern "C" fn basalt_throw(
    payload: *mut u8,
    descriptor: &'static TypeDescriptor,
    destructor: Option<exception::PayloadDestructor>,
) -> ! {
    unsafe { exception::raise_exception(payload, descriptor, destructor) }
}

/// Enters a catch handler; returns the adjusted payload.
///
/// # Safety
///
/// `payload` must be the exception-register value delivered to the
/// landing pad for a native exception.
#[no_mangle]
pub unsafe extern "C" fn basalt_begin_catch(payload: *mut u8) -> *mut u8 {
    unsafe { exception::begin_catch(payload) }
}

/// Leaves the innermost catch handler.
///
/// # Safety
///
/// Must pair with a preceding [`basalt_begin_catch`] on this thread.
#[no_mangle]
pub unsafe extern "C" fn basalt_end_catch() {
    unsafe { exception::end_catch() }
}

/// Re-raises the exception being handled; never returns.
///
/// # Safety
///
/// Callable wherever compiled code emits a bare re-raise.
#[no_mangle]
pub unsafe extern "C" fn basalt_rethrow() -> ! {
    unsafe { exception::rethrow() }
}

/// Exceptions raised but not yet caught on the calling thread.
#[no_mangle]
pub extern "C" fn basalt_uncaught_exceptions() -> usize {
    exception::uncaught_exceptions()
}

/// Begins one-time initialization; non-zero means "run the initializer".
///
/// # Safety
///
/// `guard` must be a compiler-emitted 8-byte guard slot.
#[no_mangle]
pub unsafe extern "C" fn basalt_guard_acquire(guard: *mut u64) -> c_int {
    c_int::from(unsafe { static_init::guard_acquire(guard) })
}

/// Completes one-time initialization.
///
/// # Safety
///
/// Must pair with a successful [`basalt_guard_acquire`].
#[no_mangle]
pub unsafe extern "C" fn basalt_guard_release(guard: *mut u64) {
    unsafe { static_init::guard_release(guard) }
}

/// Abandons one-time initialization after a throwing constructor.
///
/// # Safety
///
/// Must pair with a successful [`basalt_guard_acquire`].
#[no_mangle]
pub unsafe extern "C" fn basalt_guard_abort(guard: *mut u64) {
    unsafe { static_init::guard_abort(guard) }
}

/// Registers a destructor to run at shutdown. Returns zero on success,
/// matching the registration contract compilers expect.
#[no_mangle]
pub extern "C" fn basalt_atexit(
    func: static_init::AtExitFn,
    arg: *mut u8,
    dso: *mut u8,
) -> c_int {
    static_init::register_at_exit(func, arg, dso);
    0
}

/// Runs destructors registered for `dso` (all, if null) in reverse
/// registration order.
///
/// # Safety
///
/// Registered destructors must be safe to run; see
/// [`static_init::finalize`].
#[no_mangle]
pub unsafe extern "C" fn basalt_finalize(dso: *mut u8) {
    unsafe { static_init::finalize(dso) }
}

/// Shutdown entry combining every dynamically registered destructor.
///
/// # Safety
///
/// Same contract as [`basalt_finalize`].
#[no_mangle]
pub unsafe extern "C" fn basalt_run_destructors() {
    unsafe { static_init::run_destructors() }
}

/// Installs a terminate handler, returning the previous one.
#[no_mangle]
pub extern "C" fn basalt_set_terminate(
    handler: Option<policy::PolicyHandler>,
) -> Option<policy::PolicyHandler> {
    policy::set_terminate(handler)
}

/// Installs an unexpected handler, returning the previous one.
#[no_mangle]
pub extern "C" fn basalt_set_unexpected(
    handler: Option<policy::PolicyHandler>,
) -> Option<policy::PolicyHandler> {
    policy::set_unexpected(handler)
}
