//! Catch matching.
//!
//! `catches` decides whether a handler declared with this descriptor can
//! bind a payload whose dynamic type is `thrown`, adjusting the payload
//! pointer to the sub-object (or stored pointer value) the handler
//! expects. The rules, per descriptor kind:
//!
//! - identity kinds (fundamental, enum, array, function, pointer to
//!   member): same descriptor or nothing;
//! - classes: identity, or a public unambiguous upcast of the thrown
//!   class, provided at most one pointer level has been traversed;
//! - pointers: identity, the null-literal rule, or a qualifier-
//!   compatible match of the pointee one level down.

use crate::descriptor::{PointerShape, Shape, TypeDescriptor, NULL_TYPE};
use crate::qualifiers::QualifierPath;

impl TypeDescriptor {
    /// Tests whether a handler of this type catches a `thrown` payload.
    ///
    /// `adjusted` holds the payload pointer and is rewritten to the
    /// address the handler binds: the base sub-object for a class
    /// catch, the stored pointer value for a pointer catch. `outer`
    /// carries the qualifier-conversion state; handlers start matching
    /// at [`QualifierPath::OUTERMOST`].
    ///
    /// On a failed match `adjusted` may hold an intermediate value and
    /// must be reset by the caller before the next attempt.
    ///
    /// # Safety
    ///
    /// `*adjusted` must point at the thrown payload, and the payload
    /// must be a live object of the `thrown` type (including, for
    /// pointer types, a readable stored pointer).
    pub unsafe fn catches(
        &'static self,
        thrown: &'static TypeDescriptor,
        adjusted: &mut *mut u8,
        outer: QualifierPath,
    ) -> bool {
        match self.shape() {
            Shape::Pointer(shape) => unsafe { self.pointer_catches(shape, thrown, adjusted, outer) },
            Shape::Class | Shape::SingleInheritance { .. } | Shape::VirtualOrMultiple { .. } => {
                unsafe { self.class_catches(thrown, adjusted, outer) }
            }
            _ => self.same_as(thrown),
        }
    }

    /// Class handler: identity, else upcast through at most one pointer level.
    unsafe fn class_catches(
        &'static self,
        thrown: &'static TypeDescriptor,
        adjusted: &mut *mut u8,
        outer: QualifierPath,
    ) -> bool {
        if self.same_as(thrown) {
            return true;
        }
        // One pointer level is fine (Derived* caught as Base*); more
        // would let Derived** bind Base**, which is unsound.
        if !outer.at_most_one_level() {
            return false;
        }
        unsafe { thrown.upcast(self, adjusted) }
    }

    /// Pointer handler: deref at the outermost level, then identity,
    /// null-literal, or qualifier-checked pointee recursion.
    unsafe fn pointer_catches(
        &'static self,
        shape: &PointerShape,
        thrown: &'static TypeDescriptor,
        adjusted: &mut *mut u8,
        outer: QualifierPath,
    ) -> bool {
        if outer.is_outermost() {
            // The handler binds the stored pointer value, not the
            // container it was thrown in.
            unsafe { *adjusted = (*adjusted as *mut *mut u8).read() };
        }
        if self.same_as(thrown) {
            return true;
        }
        if thrown.same_as(&NULL_TYPE) {
            // A thrown null literal converts to any pointer type.
            return true;
        }
        let Some(thrown_shape) = thrown.as_pointer() else {
            return false;
        };
        if thrown_shape.qualifiers != shape.qualifiers {
            // The handler may add qualifiers but never drop any.
            if !shape.qualifiers.contains(thrown_shape.qualifiers) {
                return false;
            }
            // Adding one deeper in requires const at every outer level.
            if !outer.all_const() {
                return false;
            }
        }
        unsafe {
            shape
                .pointee
                .catches(thrown_shape.pointee, adjusted, outer.descend(shape.qualifiers))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifiers::Qualifiers;

    static INT: TypeDescriptor = TypeDescriptor::fundamental("int");
    static LONG: TypeDescriptor = TypeDescriptor::fundamental("long");

    fn null_payload() -> Box<usize> {
        Box::new(0)
    }

    #[test]
    fn test_identity_kinds_match_by_identity_only() {
        let mut payload = 7u64;
        let mut adjusted = (&mut payload as *mut u64).cast::<u8>();
        assert!(unsafe { INT.catches(&INT, &mut adjusted, QualifierPath::OUTERMOST) });
        assert!(!unsafe { INT.catches(&LONG, &mut adjusted, QualifierPath::OUTERMOST) });
    }

    #[test]
    fn test_pointer_catch_dereferences_payload() {
        static INT_PTR: TypeDescriptor =
            TypeDescriptor::pointer("int*", Qualifiers::empty(), &INT);
        let mut value = 42i32;
        let mut stored: *mut u8 = (&mut value as *mut i32).cast();
        let mut adjusted = (&mut stored as *mut *mut u8).cast::<u8>();
        assert!(unsafe { INT_PTR.catches(&INT_PTR, &mut adjusted, QualifierPath::OUTERMOST) });
        // The handler sees the pointer value itself.
        assert_eq!(adjusted, (&mut value as *mut i32).cast::<u8>());
    }

    #[test]
    fn test_null_literal_caught_by_any_pointer() {
        static INT_PTR: TypeDescriptor =
            TypeDescriptor::pointer("int*", Qualifiers::empty(), &INT);
        let mut payload = null_payload();
        let mut adjusted = (&mut *payload as *mut usize).cast::<u8>();
        assert!(unsafe { INT_PTR.catches(&NULL_TYPE, &mut adjusted, QualifierPath::OUTERMOST) });
        assert!(adjusted.is_null());
    }

    #[test]
    fn test_null_literal_not_caught_by_value_handler() {
        let mut payload = null_payload();
        let mut adjusted = (&mut *payload as *mut usize).cast::<u8>();
        assert!(!unsafe { INT.catches(&NULL_TYPE, &mut adjusted, QualifierPath::OUTERMOST) });
    }

    #[test]
    fn test_added_const_needs_const_outer_levels() {
        static CHAR: TypeDescriptor = TypeDescriptor::fundamental("char");
        static CHAR_PTR: TypeDescriptor =
            TypeDescriptor::pointer("char*", Qualifiers::empty(), &CHAR);
        static CHAR_PTR_PTR: TypeDescriptor =
            TypeDescriptor::pointer("char**", Qualifiers::empty(), &CHAR_PTR);
        static CONST_CHAR_PTR: TypeDescriptor =
            TypeDescriptor::pointer("const char*", Qualifiers::CONST, &CHAR);
        static CONST_CHAR_PTR_MUT_PTR: TypeDescriptor = TypeDescriptor::pointer(
            "const char**",
            Qualifiers::empty(),
            &CONST_CHAR_PTR,
        );
        static CONST_CHAR_PTR_CONST_PTR: TypeDescriptor = TypeDescriptor::pointer(
            "const char* const*",
            Qualifiers::CONST,
            &CONST_CHAR_PTR,
        );

        // char** -> const char** is the classic unsound conversion.
        let mut inner: *mut u8 = std::ptr::null_mut();
        let mut stored: *mut u8 = (&mut inner as *mut *mut u8).cast();
        let mut adjusted = (&mut stored as *mut *mut u8).cast::<u8>();
        assert!(!unsafe {
            CONST_CHAR_PTR_MUT_PTR.catches(&CHAR_PTR_PTR, &mut adjusted, QualifierPath::OUTERMOST)
        });

        // char** -> const char* const* is fine.
        let mut adjusted = (&mut stored as *mut *mut u8).cast::<u8>();
        assert!(unsafe {
            CONST_CHAR_PTR_CONST_PTR.catches(&CHAR_PTR_PTR, &mut adjusted, QualifierPath::OUTERMOST)
        });
    }

    #[test]
    fn test_thrown_qualifiers_cannot_be_dropped() {
        static CHAR: TypeDescriptor = TypeDescriptor::fundamental("char");
        static CHAR_PTR: TypeDescriptor =
            TypeDescriptor::pointer("char*", Qualifiers::empty(), &CHAR);
        static CONST_CHAR_PTR: TypeDescriptor =
            TypeDescriptor::pointer("const char*", Qualifiers::CONST, &CHAR);

        let mut value = 0u8;
        let mut stored: *mut u8 = &mut value;
        let mut adjusted = (&mut stored as *mut *mut u8).cast::<u8>();
        assert!(!unsafe {
            CHAR_PTR.catches(&CONST_CHAR_PTR, &mut adjusted, QualifierPath::OUTERMOST)
        });
    }
}
