//! The lower-level unwinder contract.
//!
//! The unwinder itself is an external collaborator; this module pins
//! down everything the runtime exchanges with it: the action flags and
//! reason codes of the two-phase protocol, the unwinder's view of an
//! in-flight exception, and the per-frame context the personality
//! queries and writes registers through.
//!
//! The personality is generic over [`FrameContext`] so the whole state
//! machine can be driven by a synthetic frame in tests; [`RawFrame`]
//! binds the trait to the real unwinder for the linked-in entry point.

use std::os::raw::c_int;

bitflags::bitflags! {
    /// Action flags passed to the personality on each frame visit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnwindActions: c_int {
        /// Phase 1: looking for a handler, nothing is unwound yet.
        const SEARCH_PHASE = 1;
        /// Phase 2: frames are being torn down.
        const CLEANUP_PHASE = 2;
        /// Phase 2, on the frame phase 1 chose: install the handler.
        const HANDLER_FRAME = 4;
        /// External cancellation: run destructors only, catch nothing.
        const FORCE_UNWIND = 8;
        /// The walk ran off the end of the stack.
        const END_OF_STACK = 16;
    }
}

/// Reason codes returned by the personality and the raise routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ReasonCode {
    /// No error.
    NoReason = 0,
    /// A foreign exception traversed this frame.
    ForeignExceptionCaught = 1,
    /// Unrecoverable error during phase 2.
    FatalPhase2Error = 2,
    /// Unrecoverable error during phase 1 (malformed unwind data).
    FatalPhase1Error = 3,
    /// A forced unwind was stopped by its stop function.
    NormalStop = 4,
    /// The walk reached the end of the stack without a handler.
    EndOfStack = 5,
    /// Phase 1: this frame will handle the exception.
    HandlerFound = 6,
    /// Phase 2: registers are staged, resume in the landing pad.
    InstallContext = 7,
    /// Keep walking.
    ContinueUnwind = 8,
}

/// Cleanup callback installed into the unwinder header at raise time.
pub type ExceptionCleanupFn = unsafe extern "C" fn(ReasonCode, *mut UnwindException);

/// The unwinder's view of an in-flight exception.
///
/// This is the trailing sub-struct of the runtime's exception header;
/// the unwinder and the personality pass pointers to it, and the
/// runtime recovers its own header by subtracting the field offset.
#[repr(C)]
pub struct UnwindException {
    /// Eight-byte language/vendor tag; see
    /// [`crate::exception::EXCEPTION_CLASS`].
    pub class: u64,
    /// Invoked if a foreign runtime takes ownership of the exception.
    pub cleanup: Option<ExceptionCleanupFn>,
    /// Unwinder scratch.
    pub private_1: usize,
    /// Unwinder scratch.
    pub private_2: usize,
}

impl UnwindException {
    /// Creates a zeroed header with the given class tag.
    #[must_use]
    pub const fn new(class: u64) -> Self {
        Self {
            class,
            cleanup: None,
            private_1: 0,
            private_2: 0,
        }
    }
}

// =============================================================================
// Frame context
// =============================================================================

/// Per-frame queries and register writes the personality performs.
///
/// One implementation wraps the live unwinder context; the test suites
/// substitute a synthetic frame.
pub trait FrameContext {
    /// Address of the frame's language-specific data area, or null.
    fn language_specific_data(&self) -> *const u8;

    /// The instruction pointer within this frame.
    ///
    /// Points one past the faulting call, as the unwinder reports it.
    fn instruction_pointer(&self) -> usize;

    /// Start address of the frame's function.
    fn region_start(&self) -> usize;

    /// The (exception, handler-switch) data register numbers for the
    /// target architecture.
    fn exception_data_registers(&self) -> (c_int, c_int);

    /// Stages a value into a general-purpose register.
    fn set_general_register(&mut self, index: c_int, value: usize);

    /// Stages the resume instruction pointer.
    fn set_instruction_pointer(&mut self, value: usize);
}

// =============================================================================
// Live unwinder binding
// =============================================================================

/// Opaque unwinder-owned frame context.
#[repr(C)]
pub struct RawUnwindContext {
    _opaque: [u8; 0],
}

/// Raw bindings to the system unwinder.
pub mod sys {
    use super::{RawUnwindContext, ReasonCode, UnwindException};

    extern "C" {
        /// Begins propagation of a raised exception.
        pub fn _Unwind_RaiseException(exception: *mut UnwindException) -> ReasonCode;
        /// Returns the current frame's LSDA address, or zero.
        pub fn _Unwind_GetLanguageSpecificData(context: *mut RawUnwindContext) -> usize;
        /// Returns the current instruction pointer.
        pub fn _Unwind_GetIP(context: *mut RawUnwindContext) -> usize;
        /// Returns the start address of the current function.
        pub fn _Unwind_GetRegionStart(context: *mut RawUnwindContext) -> usize;
        /// Stages a general-purpose register for the landing pad.
        pub fn _Unwind_SetGR(context: *mut RawUnwindContext, index: i32, value: usize);
        /// Stages the resume instruction pointer.
        pub fn _Unwind_SetIP(context: *mut RawUnwindContext, value: usize);
    }
}

/// Exception-data register numbers for the compilation target.
///
/// These mirror the registers the compiler's landing pads read the
/// exception pointer and handler switch from.
#[cfg(target_arch = "x86_64")]
const EH_DATA_REGISTERS: (c_int, c_int) = (0, 1); // RAX, RDX
#[cfg(target_arch = "x86")]
const EH_DATA_REGISTERS: (c_int, c_int) = (0, 2); // EAX, EDX
#[cfg(target_arch = "aarch64")]
const EH_DATA_REGISTERS: (c_int, c_int) = (0, 1); // X0, X1
#[cfg(target_arch = "arm")]
const EH_DATA_REGISTERS: (c_int, c_int) = (0, 1); // R0, R1
#[cfg(any(target_arch = "riscv64", target_arch = "riscv32"))]
const EH_DATA_REGISTERS: (c_int, c_int) = (10, 11); // a0, a1
#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv64",
    target_arch = "riscv32"
)))]
const EH_DATA_REGISTERS: (c_int, c_int) = (0, 1);

/// A live unwinder frame.
pub struct RawFrame(*mut RawUnwindContext);

impl RawFrame {
    /// Wraps an unwinder-supplied context pointer.
    ///
    /// # Safety
    ///
    /// `context` must be the context the unwinder passed to the current
    /// personality invocation, and must not be retained past it.
    #[must_use]
    pub unsafe fn new(context: *mut RawUnwindContext) -> Self {
        Self(context)
    }
}

impl FrameContext for RawFrame {
    fn language_specific_data(&self) -> *const u8 {
        unsafe { sys::_Unwind_GetLanguageSpecificData(self.0) as *const u8 }
    }

    fn instruction_pointer(&self) -> usize {
        unsafe { sys::_Unwind_GetIP(self.0) }
    }

    fn region_start(&self) -> usize {
        unsafe { sys::_Unwind_GetRegionStart(self.0) }
    }

    fn exception_data_registers(&self) -> (c_int, c_int) {
        EH_DATA_REGISTERS
    }

    fn set_general_register(&mut self, index: c_int, value: usize) {
        unsafe { sys::_Unwind_SetGR(self.0, index, value) }
    }

    fn set_instruction_pointer(&mut self, value: usize) {
        unsafe { sys::_Unwind_SetIP(self.0, value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_flag_values_match_the_abi() {
        assert_eq!(UnwindActions::SEARCH_PHASE.bits(), 1);
        assert_eq!(UnwindActions::CLEANUP_PHASE.bits(), 2);
        assert_eq!(UnwindActions::HANDLER_FRAME.bits(), 4);
        assert_eq!(UnwindActions::FORCE_UNWIND.bits(), 8);
    }

    #[test]
    fn test_unwind_exception_layout() {
        // The class tag must be the leading field: the unwinder reads
        // it without knowing our header.
        assert_eq!(std::mem::offset_of!(UnwindException, class), 0);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(std::mem::size_of::<UnwindException>(), 32);
    }
}
