//! The two-phase personality routine.
//!
//! The unwinder calls this once per frame during each phase. In the
//! search phase the routine decodes the frame's LSDA, scans the
//! call-site table for the instruction pointer, walks the matched
//! action chain, and asks the RTTI layer whether any catch clause takes
//! the thrown type; a hit is cached in the exception header and
//! reported as handler-found. In the cleanup phase it installs cleanup
//! landing pads along the way until it reaches the frame flagged
//! handler-frame, where it replays the cached decision into the frame's
//! registers.
//!
//! The routine is a pure transition function over (action flags, cached
//! decision, LSDA): no state survives between invocations outside the
//! exception header.

mod encode;
mod lsda;

pub use encode::LsdaBuilder;
pub use lsda::{ActionIter, ActionRecord, CallSite, CallSiteIter, LsdaTables, SpecListIter};

use crate::exception::{is_native_class, ExceptionHeader};
use crate::unwind::{FrameContext, ReasonCode, UnwindActions, UnwindException};
use basalt_core::error::{BasaltError, BasaltResult};
use basalt_rtti::{QualifierPath, TypeDescriptor};

/// The personality ABI version this routine implements.
const ABI_VERSION: i32 = 1;

/// The personality routine, generic over the frame access seam.
///
/// Returns `HandlerFound`, `ContinueUnwind`, `InstallContext`, or
/// `FatalPhase1Error` per the two-phase protocol.
///
/// # Safety
///
/// `exception` must point at a live unwinder exception header; if the
/// class tag is native it must be embedded in an [`ExceptionHeader`].
/// The frame context must describe a frame whose LSDA, if present, is
/// well formed.
pub unsafe fn personality_routine<C: FrameContext>(
    version: i32,
    actions: UnwindActions,
    class: u64,
    exception: *mut UnwindException,
    frame: &mut C,
) -> ReasonCode {
    if version != ABI_VERSION {
        return ReasonCode::FatalPhase1Error;
    }
    let native = is_native_class(class);

    if actions.contains(UnwindActions::HANDLER_FRAME) {
        if !native {
            // Phase 1 never chooses a handler for a foreign exception;
            // a foreign handler frame is a protocol violation.
            return ReasonCode::FatalPhase1Error;
        }
        return unsafe { install_handler(exception, frame) };
    }

    let lsda = frame.language_specific_data();
    if lsda.is_null() {
        return ReasonCode::ContinueUnwind;
    }

    match unsafe { scan_frame(actions, native, exception, frame, lsda) } {
        Ok(code) => code,
        Err(_) => ReasonCode::FatalPhase1Error,
    }
}

/// Replays the phase-1 decision on the chosen handler frame.
unsafe fn install_handler<C: FrameContext>(
    exception: *mut UnwindException,
    frame: &mut C,
) -> ReasonCode {
    let header = unsafe { ExceptionHeader::from_unwind(exception) };
    let (exception_reg, switch_reg) = frame.exception_data_registers();
    // The landing pad receives the payload pointer; begin-catch
    // recovers the header from it and hands back the adjusted pointer.
    let switch_value = unsafe { (*header).handler_switch_value };
    frame.set_general_register(exception_reg, ExceptionHeader::payload_of(header) as usize);
    frame.set_general_register(switch_reg, switch_value as isize as usize);
    frame.set_instruction_pointer(unsafe { (*header).catch_landing_pad });
    ReasonCode::InstallContext
}

/// Decodes the LSDA and decides this frame's fate for the current phase.
unsafe fn scan_frame<C: FrameContext>(
    actions: UnwindActions,
    native: bool,
    exception: *mut UnwindException,
    frame: &mut C,
    lsda: *const u8,
) -> BasaltResult<ReasonCode> {
    let tables = unsafe { LsdaTables::parse(lsda, frame.region_start())? };

    // The stored IP points one past the faulting call.
    let ip_offset = frame
        .instruction_pointer()
        .wrapping_sub(1)
        .wrapping_sub(frame.region_start());

    for site in tables.call_sites() {
        let site = site?;
        if ip_offset < site.start {
            // Entries are sorted ascending: no later entry can match,
            // and an EH-annotated frame with no matching entry is
            // malformed.
            return Err(BasaltError::IpPrecedesCallSites(ip_offset));
        }
        if ip_offset >= site.start + site.length {
            continue;
        }
        if site.landing_pad == 0 {
            // Nothing to run in this frame.
            return Ok(ReasonCode::ContinueUnwind);
        }
        let landing_pad = tables.landing_pad(&site);
        if site.action == 0 {
            return Ok(unsafe { cleanup_disposition(actions, exception, frame, landing_pad) });
        }
        return unsafe { walk_actions(actions, native, exception, frame, &tables, &site) };
    }

    Ok(ReasonCode::ContinueUnwind)
}

/// A cleanup landing pad: skipped while searching, installed while
/// unwinding. The pad receives the unwinder header and a zero switch.
unsafe fn cleanup_disposition<C: FrameContext>(
    actions: UnwindActions,
    exception: *mut UnwindException,
    frame: &mut C,
    landing_pad: usize,
) -> ReasonCode {
    if actions.contains(UnwindActions::SEARCH_PHASE) {
        return ReasonCode::ContinueUnwind;
    }
    let (exception_reg, switch_reg) = frame.exception_data_registers();
    frame.set_general_register(exception_reg, exception as usize);
    frame.set_general_register(switch_reg, 0);
    frame.set_instruction_pointer(landing_pad);
    ReasonCode::InstallContext
}

/// Walks one call site's action chain.
unsafe fn walk_actions<C: FrameContext>(
    actions: UnwindActions,
    native: bool,
    exception: *mut UnwindException,
    frame: &mut C,
    tables: &LsdaTables,
    site: &CallSite,
) -> BasaltResult<ReasonCode> {
    let landing_pad = tables.landing_pad(site);

    for action in unsafe { tables.actions(site.action) } {
        if action.type_index == 0 {
            // Cleanup action.
            return Ok(unsafe { cleanup_disposition(actions, exception, frame, landing_pad) });
        }
        if actions.contains(UnwindActions::FORCE_UNWIND) {
            // Forced unwinding runs destructors only.
            continue;
        }
        if !native {
            // Foreign exceptions pass catch clauses by.
            continue;
        }

        let header = unsafe { ExceptionHeader::from_unwind(exception) };
        let payload = ExceptionHeader::payload_of(header);
        let thrown = unsafe { (*header).type_descriptor.as_ref() };

        if action.type_index > 0 {
            let clause = unsafe { tables.type_descriptor(action.type_index)? };
            let matched = if clause.is_null() {
                // Catch-all clause.
                Some(payload)
            } else if let Some(thrown) = thrown {
                let clause = unsafe { &*clause };
                let mut adjusted = payload;
                unsafe { clause.catches(thrown, &mut adjusted, QualifierPath::OUTERMOST) }
                    .then_some(adjusted)
            } else {
                None
            };
            if let Some(adjusted) = matched {
                unsafe { cache_decision(header, tables, &action, adjusted, landing_pad) };
                return Ok(ReasonCode::HandlerFound);
            }
        } else if unsafe { !spec_accepts(tables, &action, thrown, payload)? } {
            // No listed type takes the thrown one: the specification
            // is violated. Cache the handler with the un-adjusted
            // payload; the landing pad dispatches to the unexpected
            // handler itself.
            unsafe { cache_decision(header, tables, &action, payload, landing_pad) };
            return Ok(ReasonCode::HandlerFound);
        }
    }

    Ok(ReasonCode::ContinueUnwind)
}

/// Tests whether any type listed in an exception specification accepts
/// the thrown type.
unsafe fn spec_accepts(
    tables: &LsdaTables,
    action: &ActionRecord,
    thrown: Option<&'static TypeDescriptor>,
    payload: *mut u8,
) -> BasaltResult<bool> {
    let Some(thrown) = thrown else {
        return Ok(false);
    };
    for listed in unsafe { tables.exception_spec(action.type_index)? } {
        let clause = unsafe { tables.type_descriptor(listed)? };
        if clause.is_null() {
            return Ok(true);
        }
        let clause = unsafe { &*clause };
        // Fresh scratch pointer per attempt; only acceptance matters.
        let mut scratch = payload;
        if unsafe { clause.catches(thrown, &mut scratch, QualifierPath::OUTERMOST) } {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Caches the phase-1 decision for the phase-2 replay.
unsafe fn cache_decision(
    header: *mut ExceptionHeader,
    tables: &LsdaTables,
    action: &ActionRecord,
    adjusted: *mut u8,
    landing_pad: usize,
) {
    unsafe {
        (*header).adjusted_payload = adjusted;
        (*header).handler_switch_value = action.type_index as i32;
        (*header).catch_landing_pad = landing_pad;
        (*header).action_record = action.record;
        (*header).lsda = tables.lsda();
    }
}
