//! # Basalt Core
//!
//! Foundational primitives for the Basalt runtime support library.
//!
//! This crate provides the building blocks shared by the RTTI and
//! exception-runtime crates:
//!
//! - **Error Handling**: Result types and error definitions for the
//!   binary-format codecs
//! - **LEB128**: variable-length integer readers and writers
//! - **DWARF EH Values**: the encoded-value scheme used by the
//!   language-specific data area (LSDA) tables
//!
//! The readers operate over raw byte cursors rather than slices: the
//! tables they decode are located through the unwinder and carry no
//! out-of-band length, exactly as the compiler emits them.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dwarf;
pub mod error;
pub mod leb128;

pub use dwarf::EhEncoding;
pub use error::{BasaltError, BasaltResult};

/// Basalt runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
