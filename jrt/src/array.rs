use std::{
    ptr,
    sync::{
        OnceLock,
        atomic::{AtomicPtr, Ordering},
    },
};

use crate::{
    Ref, VTable, VTableBuilder,
    error::{Trap, trap},
    object::field_pointer,
};

/// The first fields of every array object, followed by
/// `length * width` bytes of untyped element storage.
#[repr(C)]
#[derive(Debug)]
pub struct ArrayHeader {
    pub length: u32,
    pub width: u64,
    pub elements: [u8; 0],
}

pub const ARRAY_HEADER_SIZE: usize = size_of::<ArrayHeader>();

impl ArrayHeader {
    pub const fn new(length: u32, width: u64) -> Self {
        Self {
            length,
            width,
            elements: [],
        }
    }
}

static REGISTERED_ARRAY_VTABLE: AtomicPtr<VTable> = AtomicPtr::new(ptr::null_mut());
static DEFAULT_ARRAY_VTABLE: OnceLock<&'static VTable> = OnceLock::new();

/// The dispatch table installed on new arrays: `java/lang/Object`'s table
/// once the class library registered it, an empty runtime table before.
pub fn array_vtable() -> *const VTable {
    let registered = REGISTERED_ARRAY_VTABLE.load(Ordering::Acquire);
    if !registered.is_null() {
        return registered;
    }
    *DEFAULT_ARRAY_VTABLE.get_or_init(|| match VTableBuilder::new().build() {
        Ok(table) => table,
        Err(err) => trap(Trap::RuntimeTable(err)),
    })
}

pub fn set_array_vtable(vtable: *const VTable) {
    log::debug!("array dispatch table set to {vtable:p}");
    REGISTERED_ARRAY_VTABLE.store(vtable.cast_mut(), Ordering::Release);
}

/// # Safety
///
/// `r` must be a non-null array reference.
#[inline(always)]
pub unsafe fn header<'a>(r: Ref) -> &'a ArrayHeader {
    // SAFETY: by contract
    unsafe { &*field_pointer(r).cast::<ArrayHeader>() }
}

/// # Safety
///
/// Same as [`header`].
#[inline(always)]
pub unsafe fn length(r: Ref) -> u32 {
    // SAFETY: by contract
    unsafe { header(r).length }
}

/// # Safety
///
/// Same as [`header`].
#[inline(always)]
pub unsafe fn width(r: Ref) -> u64 {
    // SAFETY: by contract
    unsafe { header(r).width }
}

/// Start of the element storage.
///
/// # Safety
///
/// Same as [`header`].
#[inline(always)]
pub unsafe fn data_pointer(r: Ref) -> *mut u8 {
    // SAFETY: by contract
    unsafe { field_pointer(r).add(ARRAY_HEADER_SIZE) }
}

/// Copies `count` elements from `src[src_pos..]` to `dst[dst_pos..]`.
/// Overlapping ranges, including `src == dst`, are copied as if through an
/// intermediate buffer. Element widths must match; bounds are the caller's
/// responsibility.
///
/// # Safety
///
/// Both references must be non-null arrays and both ranges must lie inside
/// their arrays.
pub unsafe fn copy(
    src: Ref,
    src_pos: isize,
    dst: Ref,
    dst_pos: isize,
    count: isize,
) -> Result<(), Trap> {
    // SAFETY: by contract
    let (source_width, destination_width) = unsafe { (width(src), width(dst)) };
    if source_width != destination_width {
        return Err(Trap::ArrayWidthMismatch {
            source_width,
            destination_width,
        });
    }
    if count <= 0 {
        return Ok(());
    }

    debug_assert!(
        source_width <= isize::MAX as u64,
        "element width {source_width} does not fit an offset"
    );
    let width = source_width as isize;
    // SAFETY: ranges are in bounds by contract; ptr::copy is a memmove
    unsafe {
        let from = data_pointer(src).offset(width * src_pos);
        let to = data_pointer(dst).offset(width * dst_pos);
        ptr::copy(from, to, width as usize * count as usize);
    }
    Ok(())
}
