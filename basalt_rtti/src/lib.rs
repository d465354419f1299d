//! # Basalt RTTI
//!
//! Runtime type information for the Basalt language.
//!
//! The Basalt compiler emits one [`TypeDescriptor`] record per type that
//! can be thrown or caught. Descriptors are compared by identity (two
//! descriptors denote the same type iff they are the same record) and
//! support the three queries the exception machinery needs:
//!
//! - **catch matching** ([`TypeDescriptor::catches`]): can a handler of
//!   this declared type bind a payload of the thrown type, and where in
//!   the payload does the bound sub-object live?
//! - **upcasting** ([`TypeDescriptor::upcast`]): does one class publicly
//!   and unambiguously derive from another, and at what sub-object
//!   offset?
//! - **pointer classification** ([`TypeDescriptor::as_pointer`]).
//!
//! Descriptors form a DAG: classes reference their base-class
//! descriptors, pointers their pointee. The records are emitted into
//! static storage by the compiler and never freed, so everything here
//! borrows with `'static`.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

mod catch_match;
mod descriptor;
mod qualifiers;
mod upcast;

pub use descriptor::{
    BaseRecord, DescriptorKind, InheritanceFlags, PointerShape, Shape, TypeDescriptor, NULL_TYPE,
};
pub use qualifiers::{QualifierPath, Qualifiers};
