//! The exception header.
//!
//! Every in-flight exception is backed by this fixed prefix immediately
//! preceding the user payload. The raise path fills in the ownership
//! and policy fields, the personality caches its phase-1 decision in
//! the scratch fields, and begin/end-catch drive the handler count and
//! stack linkage.
//!
//! The unwinder sub-header MUST stay the trailing field: the unwinder
//! and personality are handed a pointer to it, and everything else is
//! recovered by subtracting its offset.

use crate::policy::PolicyHandler;
use crate::unwind::UnwindException;
use basalt_rtti::TypeDescriptor;
use std::mem;

/// Destructor for an exception payload, emitted by the compiler.
pub type PayloadDestructor = unsafe extern "C" fn(*mut u8);

/// The Basalt exception class tag: vendor `BSLT`, language `C++\0`.
///
/// The low four bytes are the Itanium-conventional language magic; the
/// high four identify the vendor and are ignored on receipt.
pub const EXCEPTION_CLASS: u64 = u64::from_be_bytes(*b"BSLTC++\0");

/// The language half of the class tag, used to recognize exceptions we
/// own regardless of vendor.
pub const EXCEPTION_CLASS_LANGUAGE: u32 = u32::from_be_bytes(*b"C++\0");

/// Returns true if the class tag denotes an exception of our language.
#[inline]
#[must_use]
pub const fn is_native_class(class: u64) -> bool {
    class as u32 == EXCEPTION_CLASS_LANGUAGE
}

/// Fixed-layout prefix preceding every exception payload.
#[repr(C)]
pub struct ExceptionHeader {
    /// Size of the trailing payload, kept so `free` can rebuild the
    /// allocation layout.
    pub payload_size: usize,

    /// Captured-handle references; raise initializes it to one.
    pub reference_count: usize,

    /// Descriptor of the payload's dynamic type.
    pub type_descriptor: *const TypeDescriptor,

    /// Payload destructor, or null for trivially destructible payloads.
    pub destructor: Option<PayloadDestructor>,

    /// Unexpected handler current at throw time.
    pub unexpected_handler: Option<PolicyHandler>,

    /// Terminate handler current at throw time.
    pub terminate_handler: Option<PolicyHandler>,

    /// Next-older entry on the caught-exception stack.
    pub next_exception: *mut ExceptionHeader,

    /// Count of handlers currently handling this exception; negative
    /// while rethrown and in flight again.
    pub handler_count: i32,

    /// Switch value for the landing pad: the matched action's type
    /// index, cached in phase 1.
    pub handler_switch_value: i32,

    /// Matched action record, cached in phase 1.
    pub action_record: *const u8,

    /// The handler frame's LSDA, cached in phase 1.
    pub lsda: *const u8,

    /// Landing-pad address of the chosen handler, cached in phase 1.
    pub catch_landing_pad: usize,

    /// Payload pointer adjusted to the handler's expected sub-object,
    /// cached in phase 1.
    pub adjusted_payload: *mut u8,

    /// The unwinder's view of this exception. Keep last.
    pub unwind_header: UnwindException,
}

/// Size of the header prefix; the payload lives at this offset.
pub const HEADER_SIZE: usize = mem::size_of::<ExceptionHeader>();

/// Payload alignment guaranteed by the allocator.
pub const PAYLOAD_ALIGN: usize = 16;

impl ExceptionHeader {
    /// Recovers the header from a payload pointer.
    ///
    /// # Safety
    ///
    /// `payload` must come from [`super::allocate_exception`].
    #[inline]
    #[must_use]
    pub unsafe fn from_payload(payload: *mut u8) -> *mut ExceptionHeader {
        unsafe { payload.sub(HEADER_SIZE) }.cast()
    }

    /// Recovers the header from the unwinder's sub-header pointer.
    ///
    /// # Safety
    ///
    /// `unwind` must point at the `unwind_header` field of a live
    /// header, i.e. the exception must be native.
    #[inline]
    #[must_use]
    pub unsafe fn from_unwind(unwind: *mut UnwindException) -> *mut ExceptionHeader {
        unsafe { unwind.cast::<u8>().sub(mem::offset_of!(ExceptionHeader, unwind_header)) }.cast()
    }

    /// The payload trailing this header.
    #[inline]
    #[must_use]
    pub fn payload_of(header: *mut ExceptionHeader) -> *mut u8 {
        unsafe { header.cast::<u8>().add(HEADER_SIZE) }
    }

    /// The unwinder sub-header of this header.
    #[inline]
    #[must_use]
    pub fn unwind_of(header: *mut ExceptionHeader) -> *mut UnwindException {
        unsafe { std::ptr::addr_of_mut!((*header).unwind_header) }
    }
}
