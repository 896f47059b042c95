use core::alloc::Layout;

use crate::{
    Monitor, Ref,
    error::Trap,
};

/// The fixed prefix of every heap object. Generated code never sees it:
/// field offsets are relative to the end of the header.
///
/// ```text
/// +----------------------+  <- Ref::object
/// | monitor              |
/// +----------------------+  <- field_pointer(ref), 16-byte aligned
/// | declared fields ...  |
/// +----------------------+
/// ```
#[repr(C, align(16))]
#[derive(Debug, Default)]
pub struct ObjectHeader {
    pub monitor: Monitor,
}

pub const HEADER_SIZE: usize = size_of::<ObjectHeader>();
pub const OBJECT_ALIGN: usize = align_of::<ObjectHeader>();

const _: () = assert!(HEADER_SIZE % OBJECT_ALIGN == 0);

impl ObjectHeader {
    pub fn new() -> Self {
        Self {
            monitor: Monitor::new(),
        }
    }

    /// Layout of an object with `size` bytes of fields.
    pub fn layout_for(size: u64) -> Result<Layout, Trap> {
        let too_large = || Trap::AllocationTooLarge {
            requested: size as u128,
        };
        let size = usize::try_from(size).map_err(|_| too_large())?;
        let total = HEADER_SIZE.checked_add(size).ok_or_else(too_large)?;
        Layout::from_size_align(total, OBJECT_ALIGN).map_err(|_| too_large())
    }
}

/// # Safety
///
/// `r` must be a non-null reference to an object built by this runtime.
#[inline(always)]
pub unsafe fn header<'a>(r: Ref) -> &'a ObjectHeader {
    debug_assert!(!r.is_null(), "header of null reference");
    // SAFETY: by contract
    unsafe { &*r.object.cast::<ObjectHeader>() }
}

/// # Safety
///
/// Same as [`header`].
#[inline(always)]
pub unsafe fn monitor<'a>(r: Ref) -> &'a Monitor {
    // SAFETY: by contract
    unsafe { &header(r).monitor }
}

/// Address of the first declared field. The reference must be non-null; the
/// compiler proves that or emits a trapping null check first.
///
/// # Safety
///
/// Same as [`header`].
#[inline(always)]
pub unsafe fn field_pointer(r: Ref) -> *mut u8 {
    debug_assert!(!r.is_null(), "field access through null reference");
    // SAFETY: by contract, the allocation is at least HEADER_SIZE long
    unsafe { r.object.cast::<u8>().add(HEADER_SIZE) }
}
