use core::{ffi::c_void, fmt, ptr};

use crate::VTable;

/// A managed reference: an object pointer paired with the dispatch table of
/// the object's dynamic type.
///
/// Layout matches the compiler's `%ref = type { i8*, i8* }` and is passed by
/// value across the ABI. References are plain copies; nothing is counted.
///
/// ```text
/// word 0: object, start of the allocation (the monitor header), or null
/// word 1: vtable, dispatch table of the dynamic type, or null
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    pub object: *mut c_void,
    pub vtable: *const VTable,
}

// SAFETY: object memory is shared freely between threads; synchronization is
// the managed program's business through the per-object monitor.
unsafe impl Send for Ref {}
// SAFETY: see above
unsafe impl Sync for Ref {}

impl Ref {
    pub const NULL: Ref = Ref {
        object: ptr::null_mut(),
        vtable: ptr::null(),
    };

    #[inline(always)]
    pub const fn new(object: *mut c_void, vtable: *const VTable) -> Self {
        Self { object, vtable }
    }

    #[inline(always)]
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Only the object pointer decides nullness.
    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.object.is_null()
    }

    /// Identity hash: the low 32 bits of the object address.
    #[inline(always)]
    pub fn identity_hash(self) -> u32 {
        self.object as usize as u32
    }

    /// # Safety
    ///
    /// The reference must carry a valid dispatch table.
    #[inline(always)]
    pub unsafe fn vtable_ref<'a>(self) -> &'a VTable {
        debug_assert!(!self.vtable.is_null(), "reference has no dispatch table");
        // SAFETY: by contract
        unsafe { &*self.vtable }
    }
}

impl Default for Ref {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Ref(null)");
        }
        f.debug_struct("Ref")
            .field("object", &self.object)
            .field("vtable", &self.vtable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_two_pointers() {
        assert_eq!(size_of::<Ref>(), 2 * size_of::<*const ()>());
        assert_eq!(core::mem::offset_of!(Ref, object), 0);
        assert_eq!(core::mem::offset_of!(Ref, vtable), size_of::<*const ()>());
    }

    #[test]
    fn nullness_ignores_the_vtable() {
        assert!(Ref::NULL.is_null());
        assert!(Ref::default().is_null());

        let table = 0usize;
        let only_vtable = Ref::new(ptr::null_mut(), (&raw const table).cast());
        assert!(only_vtable.is_null());
    }

    #[test]
    fn identity_hash_is_truncated_address() {
        let mut cell = 0u64;
        let object = (&raw mut cell).cast::<c_void>();
        let r = Ref::new(object, ptr::null());
        assert_eq!(r.identity_hash(), object as usize as u32);
        assert_eq!(r.identity_hash(), r.identity_hash());
    }
}
