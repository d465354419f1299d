//! Public-base upcasting with ambiguity detection.
//!
//! `upcast` answers "is this class, or does it publicly derive from, the
//! target class" and rewrites the object pointer to the target's
//! sub-object. Derivation through a non-public base does not count, and
//! a target reachable as two sub-objects at different addresses is
//! ambiguous and does not count either. A virtual base shared along
//! several paths lands on one address and stays unambiguous.

use crate::descriptor::{InheritanceFlags, Shape, TypeDescriptor};
use std::ptr;

impl TypeDescriptor {
    /// Upcasts `*adjusted` from this (thrown) class to `target`.
    ///
    /// On success `*adjusted` points at the unique public `target`
    /// sub-object and true is returned; on failure `*adjusted` is left
    /// unchanged.
    ///
    /// # Safety
    ///
    /// `*adjusted` must point at a live object of this class laid out
    /// by the Basalt compiler (see [`crate::BaseRecord::subobject`]).
    pub unsafe fn upcast(
        &'static self,
        target: &'static TypeDescriptor,
        adjusted: &mut *mut u8,
    ) -> bool {
        if !self.is_class() || !target.is_class() {
            return false;
        }
        let mut found: *mut u8 = ptr::null_mut();
        if !unsafe { self.upcast_search(target, *adjusted, &mut found) } {
            // Ambiguous derivation.
            return false;
        }
        if found.is_null() {
            return false;
        }
        *adjusted = found;
        true
    }

    /// Recursive sub-object search.
    ///
    /// `found` accumulates the unique hit across the whole walk; a
    /// second hit at a different address makes the derivation ambiguous
    /// and the search returns false. Returning true with `*found` still
    /// null simply means this subtree does not contain the target.
    pub(crate) unsafe fn upcast_search(
        &'static self,
        target: &'static TypeDescriptor,
        object: *mut u8,
        found: &mut *mut u8,
    ) -> bool {
        if self.same_as(target) {
            return note_subobject(found, object);
        }
        match self.shape() {
            Shape::SingleInheritance { base } => {
                // The sole base lives at offset zero.
                unsafe { base.upcast_search(target, object, found) }
            }
            Shape::VirtualOrMultiple { flags, bases } => {
                let repeats = flags.contains(InheritanceFlags::NON_DIAMOND_REPEAT);
                for record in *bases {
                    if !record.is_public() {
                        continue;
                    }
                    let unseen = found.is_null();
                    let sub = unsafe { record.subobject(object) };
                    if !unsafe { record.base().upcast_search(target, sub, found) } {
                        return false;
                    }
                    // A first hit ends the scan unless a repeated base
                    // could produce a second, distinct sub-object.
                    if unseen && !found.is_null() && !repeats {
                        break;
                    }
                }
                true
            }
            _ => true,
        }
    }
}

/// Records a sub-object hit, detecting ambiguity.
fn note_subobject(found: &mut *mut u8, object: *mut u8) -> bool {
    if found.is_null() {
        *found = object;
        true
    } else {
        // The same address twice is a shared virtual base; anything
        // else is an ambiguous derivation.
        *found == object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BaseRecord;

    static ROOT: TypeDescriptor = TypeDescriptor::class("Root");
    static MID: TypeDescriptor = TypeDescriptor::with_base("Mid", &ROOT);
    static LEAF: TypeDescriptor = TypeDescriptor::with_base("Leaf", &MID);

    #[test]
    fn test_single_inheritance_chain() {
        let mut storage = 0u64;
        let object = (&mut storage as *mut u64).cast::<u8>();
        let mut adjusted = object;
        assert!(unsafe { LEAF.upcast(&ROOT, &mut adjusted) });
        assert_eq!(adjusted, object);
    }

    #[test]
    fn test_upcast_to_unrelated_fails() {
        static OTHER: TypeDescriptor = TypeDescriptor::class("Other");
        let mut storage = 0u64;
        let mut adjusted = (&mut storage as *mut u64).cast::<u8>();
        let before = adjusted;
        assert!(!unsafe { LEAF.upcast(&OTHER, &mut adjusted) });
        assert_eq!(adjusted, before);
    }

    #[test]
    fn test_private_base_is_invisible() {
        static HIDDEN_BASES: [BaseRecord; 1] = [BaseRecord::new(&ROOT, 0, false, false)];
        static HIDER: TypeDescriptor =
            TypeDescriptor::with_bases("Hider", InheritanceFlags::empty(), &HIDDEN_BASES);
        let mut storage = 0u64;
        let mut adjusted = (&mut storage as *mut u64).cast::<u8>();
        assert!(!unsafe { HIDER.upcast(&ROOT, &mut adjusted) });
    }

    #[test]
    fn test_repeated_base_is_ambiguous() {
        static TWICE_BASES: [BaseRecord; 2] = [
            BaseRecord::new(&ROOT, 0, false, true),
            BaseRecord::new(&ROOT, 8, false, true),
        ];
        static TWICE: TypeDescriptor = TypeDescriptor::with_bases(
            "Twice",
            InheritanceFlags::NON_DIAMOND_REPEAT,
            &TWICE_BASES,
        );
        let mut storage = [0u64; 2];
        let mut adjusted = storage.as_mut_ptr().cast::<u8>();
        assert!(!unsafe { TWICE.upcast(&ROOT, &mut adjusted) });
    }
}
