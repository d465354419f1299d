//! # Basalt Runtime
//!
//! The language-level runtime support library for Basalt: exception
//! propagation, the stack-unwinding personality routine, and the static
//! initialization primitives the compiler emits calls to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Exception Machinery                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  compiled code          this crate              external         │
//! │  ─────────────          ──────────              ────────         │
//! │  throw expr ──────────▶ exception::ops ───────▶ unwinder raise   │
//! │                            │    ▲                    │           │
//! │                            ▼    │                    ▼           │
//! │                     ExceptionHeader ◀──────── personality        │
//! │                     (cached decision)         (LSDA decode,      │
//! │                            │                   catch match via   │
//! │  landing pad ◀─────────────┘                   basalt_rtti)      │
//! │  begin/end catch                                                 │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The unwinder walks frames twice: a search phase that asks each
//! frame's personality whether it wants the exception, and a cleanup
//! phase that re-enters the frames, running cleanup landing pads, until
//! the chosen handler frame is reinstalled. Everything the personality
//! decides in phase one is cached in the exception header; no other
//! state survives between callbacks.
//!
//! Per-thread state is confined to [`exception::ThreadContext`]: the
//! caught-exception stack and the uncaught counter. Guard flags and the
//! at-exit table in [`static_init`] are process-wide.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod abi;
pub mod exception;
pub mod personality;
pub mod policy;
pub mod static_init;
pub mod unwind;

pub use exception::{ExceptionHeader, ThreadContext, EXCEPTION_CLASS};
pub use personality::{personality_routine, LsdaBuilder, LsdaTables};
pub use unwind::{FrameContext, ReasonCode, UnwindActions, UnwindException};
