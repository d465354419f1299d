//! Exception runtime state and primitives.
//!
//! Three pieces cooperate here:
//!
//! - [`header`]: the fixed-layout prefix in front of every exception
//!   payload, shared with the personality routine;
//! - [`stack`]: the per-thread caught-exception stack and uncaught
//!   counter;
//! - [`ops`]: the primitives compiled code calls: allocate, raise,
//!   begin-catch, end-catch, rethrow.
//!
//! An exception's lifetime is governed by the pair (reference count,
//! handler count): the payload is destroyed when its last handler
//! completes without rethrowing and no captured reference remains. A
//! negative handler count marks an exception that was rethrown and is
//! in flight again while its original handler unwinds.

mod header;
mod ops;
mod stack;

pub use header::{
    is_native_class, ExceptionHeader, PayloadDestructor, EXCEPTION_CLASS,
    EXCEPTION_CLASS_LANGUAGE, HEADER_SIZE, PAYLOAD_ALIGN,
};
pub use ops::{
    allocate_exception, begin_catch, current_exception_type, end_catch, free_exception,
    prepare_raise, prepare_rethrow, raise_exception, rethrow, uncaught_exceptions,
};
pub use stack::{with_thread_context, CaughtStackStats, ThreadContext};
