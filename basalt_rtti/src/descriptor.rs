//! Type descriptor records.
//!
//! One `TypeDescriptor` exists per throwable or catchable type, emitted
//! into static storage by the Basalt compiler. The record stores its
//! kind inline as the discriminant of [`Shape`]; the field order of the
//! record and of every shape payload is part of the compiler contract.

use crate::qualifiers::Qualifiers;
use std::fmt;
use std::ptr;

// =============================================================================
// Shapes
// =============================================================================

/// The per-kind payload of a type descriptor.
#[repr(C, u8)]
pub enum Shape {
    /// Primitive scalar type.
    Fundamental,
    /// Enumerated type.
    Enum,
    /// Array type.
    Array,
    /// Function type.
    Function,
    /// Class without base classes.
    Class,
    /// Class with a single public, non-virtual base at offset zero.
    SingleInheritance {
        /// The sole base class.
        base: &'static TypeDescriptor,
    },
    /// Class with virtual, multiple, non-public, or offset bases.
    VirtualOrMultiple {
        /// Properties of the full inheritance graph.
        flags: InheritanceFlags,
        /// Direct bases in declaration order.
        bases: &'static [BaseRecord],
    },
    /// Pointer type.
    Pointer(PointerShape),
    /// Pointer-to-member type.
    PointerToMember(PointerShape),
}

/// Payload common to pointer and pointer-to-member descriptors.
#[repr(C)]
pub struct PointerShape {
    /// Qualifiers applying to the pointee.
    pub qualifiers: Qualifiers,
    /// The pointed-to type.
    pub pointee: &'static TypeDescriptor,
}

bitflags::bitflags! {
    /// Flags summarizing a class's full inheritance graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InheritanceFlags: u32 {
        /// Some base type occurs more than once outside a virtual
        /// diamond; an upcast hit must keep scanning for ambiguity.
        const NON_DIAMOND_REPEAT = 1 << 0;
        /// Some virtual base is shared along multiple paths.
        const DIAMOND = 1 << 1;
    }
}

/// Descriptor kind, as stored in the shape discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorKind {
    /// Primitive scalar type.
    Fundamental,
    /// Enumerated type.
    Enum,
    /// Array type.
    Array,
    /// Function type.
    Function,
    /// Class without bases.
    Class,
    /// Single-inheritance class.
    SingleInheritance,
    /// Virtual- or multiple-inheritance class.
    VirtualOrMultiple,
    /// Pointer.
    Pointer,
    /// Pointer to member.
    PointerToMember,
}

// =============================================================================
// Base records
// =============================================================================

/// One direct base class of a virtual-or-multiple-inheritance class.
///
/// The offset-flags word packs the access bits into the low byte and the
/// sub-object offset into the remaining bits. For virtual bases the
/// offset selects a slot in the object's vtable holding the real
/// (signed) displacement.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct BaseRecord {
    base: &'static TypeDescriptor,
    offset_flags: isize,
}

impl BaseRecord {
    /// Base is inherited virtually.
    pub const VIRTUAL: isize = 1 << 0;
    /// Base is publicly accessible.
    pub const PUBLIC: isize = 1 << 1;
    /// Offset field position within the offset-flags word.
    pub const OFFSET_SHIFT: u32 = 8;

    /// Creates a base record.
    ///
    /// `offset` is the constant sub-object displacement for a
    /// non-virtual base, or the vtable slot offset for a virtual one.
    #[must_use]
    pub const fn new(
        base: &'static TypeDescriptor,
        offset: isize,
        virtual_base: bool,
        public: bool,
    ) -> Self {
        let mut flags = 0;
        if virtual_base {
            flags |= Self::VIRTUAL;
        }
        if public {
            flags |= Self::PUBLIC;
        }
        Self {
            base,
            offset_flags: (offset << Self::OFFSET_SHIFT) | flags,
        }
    }

    /// The base-class descriptor.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> &'static TypeDescriptor {
        self.base
    }

    /// Returns true for a publicly accessible base.
    #[inline]
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.offset_flags & Self::PUBLIC != 0
    }

    /// Returns true for a virtually inherited base.
    #[inline]
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        self.offset_flags & Self::VIRTUAL != 0
    }

    /// The encoded offset: sub-object displacement or vtable slot.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> isize {
        self.offset_flags >> Self::OFFSET_SHIFT
    }

    /// Computes the address of this base's sub-object within `object`.
    ///
    /// # Safety
    ///
    /// `object` must point at a live object of the deriving class laid
    /// out by the Basalt compiler; for a virtual base the object's
    /// leading word must be its vtable pointer and the vtable must
    /// carry a signed displacement at this record's slot offset.
    #[must_use]
    pub unsafe fn subobject(&self, object: *mut u8) -> *mut u8 {
        let mut offset = self.offset();
        if self.is_virtual() {
            let vtable = unsafe { (object as *const *const u8).read() };
            offset = unsafe { vtable.offset(offset).cast::<isize>().read() };
        }
        unsafe { object.offset(offset) }
    }
}

impl fmt::Debug for BaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRecord")
            .field("base", &self.base.name())
            .field("offset", &self.offset())
            .field("virtual", &self.is_virtual())
            .field("public", &self.is_public())
            .finish()
    }
}

// =============================================================================
// Type descriptor
// =============================================================================

/// A compiler-emitted runtime type record.
///
/// Identity is address identity: the compiler emits exactly one record
/// per type, so two descriptors describe the same type iff they are the
/// same record.
#[repr(C)]
pub struct TypeDescriptor {
    name: &'static str,
    shape: Shape,
}

/// The descriptor for the null-pointer literal's type.
///
/// A thrown null literal carries this descriptor; any pointer-typed
/// handler accepts it.
pub static NULL_TYPE: TypeDescriptor = TypeDescriptor::fundamental("null_t");

impl TypeDescriptor {
    /// Creates a fundamental-type descriptor.
    #[must_use]
    pub const fn fundamental(name: &'static str) -> Self {
        Self {
            name,
            shape: Shape::Fundamental,
        }
    }

    /// Creates an enum-type descriptor.
    #[must_use]
    pub const fn enumeration(name: &'static str) -> Self {
        Self {
            name,
            shape: Shape::Enum,
        }
    }

    /// Creates an array-type descriptor.
    #[must_use]
    pub const fn array(name: &'static str) -> Self {
        Self {
            name,
            shape: Shape::Array,
        }
    }

    /// Creates a function-type descriptor.
    #[must_use]
    pub const fn function(name: &'static str) -> Self {
        Self {
            name,
            shape: Shape::Function,
        }
    }

    /// Creates a descriptor for a class without bases.
    #[must_use]
    pub const fn class(name: &'static str) -> Self {
        Self {
            name,
            shape: Shape::Class,
        }
    }

    /// Creates a descriptor for a single-inheritance class.
    #[must_use]
    pub const fn with_base(name: &'static str, base: &'static TypeDescriptor) -> Self {
        Self {
            name,
            shape: Shape::SingleInheritance { base },
        }
    }

    /// Creates a descriptor for a virtual-or-multiple-inheritance class.
    #[must_use]
    pub const fn with_bases(
        name: &'static str,
        flags: InheritanceFlags,
        bases: &'static [BaseRecord],
    ) -> Self {
        Self {
            name,
            shape: Shape::VirtualOrMultiple { flags, bases },
        }
    }

    /// Creates a pointer-type descriptor.
    #[must_use]
    pub const fn pointer(
        name: &'static str,
        qualifiers: Qualifiers,
        pointee: &'static TypeDescriptor,
    ) -> Self {
        Self {
            name,
            shape: Shape::Pointer(PointerShape {
                qualifiers,
                pointee,
            }),
        }
    }

    /// Creates a pointer-to-member descriptor.
    #[must_use]
    pub const fn pointer_to_member(
        name: &'static str,
        qualifiers: Qualifiers,
        pointee: &'static TypeDescriptor,
    ) -> Self {
        Self {
            name,
            shape: Shape::PointerToMember(PointerShape {
                qualifiers,
                pointee,
            }),
        }
    }

    /// The type's name, as emitted by the compiler.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The per-kind payload.
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The descriptor kind.
    #[must_use]
    pub const fn kind(&self) -> DescriptorKind {
        match self.shape {
            Shape::Fundamental => DescriptorKind::Fundamental,
            Shape::Enum => DescriptorKind::Enum,
            Shape::Array => DescriptorKind::Array,
            Shape::Function => DescriptorKind::Function,
            Shape::Class => DescriptorKind::Class,
            Shape::SingleInheritance { .. } => DescriptorKind::SingleInheritance,
            Shape::VirtualOrMultiple { .. } => DescriptorKind::VirtualOrMultiple,
            Shape::Pointer(_) => DescriptorKind::Pointer,
            Shape::PointerToMember(_) => DescriptorKind::PointerToMember,
        }
    }

    /// Identity comparison: same record, same type.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &TypeDescriptor) -> bool {
        ptr::eq(self, other)
    }

    /// Returns the pointer payload if this descriptor is a pointer.
    #[inline]
    #[must_use]
    pub fn as_pointer(&self) -> Option<&PointerShape> {
        match &self.shape {
            Shape::Pointer(shape) => Some(shape),
            _ => None,
        }
    }

    /// Returns true for any of the three class kinds.
    #[inline]
    #[must_use]
    pub const fn is_class(&self) -> bool {
        matches!(
            self.shape,
            Shape::Class | Shape::SingleInheritance { .. } | Shape::VirtualOrMultiple { .. }
        )
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({:?}, {})", self.kind(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INT: TypeDescriptor = TypeDescriptor::fundamental("int");
    static INT_TOO: TypeDescriptor = TypeDescriptor::fundamental("int");
    static INT_PTR: TypeDescriptor =
        TypeDescriptor::pointer("int*", Qualifiers::empty(), &INT);

    #[test]
    fn test_identity_is_by_address() {
        assert!(INT.same_as(&INT));
        // Equal spelling, distinct record: different type.
        assert!(!INT.same_as(&INT_TOO));
    }

    #[test]
    fn test_as_pointer() {
        assert!(INT.as_pointer().is_none());
        let shape = INT_PTR.as_pointer().expect("pointer shape");
        assert!(shape.pointee.same_as(&INT));
    }

    #[test]
    fn test_base_record_packing() {
        static BASE: TypeDescriptor = TypeDescriptor::class("Base");
        let record = BaseRecord::new(&BASE, 24, false, true);
        assert_eq!(record.offset(), 24);
        assert!(record.is_public());
        assert!(!record.is_virtual());

        let record = BaseRecord::new(&BASE, -16, true, false);
        assert_eq!(record.offset(), -16);
        assert!(record.is_virtual());
        assert!(!record.is_public());
    }

    #[test]
    fn test_nonvirtual_subobject_adds_offset() {
        static BASE: TypeDescriptor = TypeDescriptor::class("Base");
        let record = BaseRecord::new(&BASE, 8, false, true);
        let mut storage = [0u8; 16];
        let object = storage.as_mut_ptr();
        assert_eq!(unsafe { record.subobject(object) }, unsafe { object.add(8) });
    }

    #[test]
    fn test_virtual_subobject_reads_vtable_slot() {
        static BASE: TypeDescriptor = TypeDescriptor::class("Base");
        // vtable slot at byte 8 holds displacement 16
        let vtable: [isize; 2] = [0, 16];
        #[repr(C)]
        struct Object {
            vptr: *const isize,
            payload: [u8; 24],
        }
        let mut object = Object {
            vptr: vtable.as_ptr(),
            payload: [0; 24],
        };
        let record = BaseRecord::new(&BASE, 8, true, true);
        let base_ptr = unsafe { record.subobject((&mut object as *mut Object).cast()) };
        assert_eq!(base_ptr as usize, (&object as *const Object as usize) + 16);
    }
}
