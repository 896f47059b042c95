use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    ArrayHeader, ObjectHeader, Ref, VTable,
    array::array_vtable,
    error::Trap,
    object::field_pointer,
};

static OBJECTS_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static BYTES_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

pub trait Allocator {
    /// Returns zero-filled memory for `layout`. Exhaustion is fatal.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Allocates `size` bytes of fields behind an initialized header and
    /// returns a reference typed by `vtable`.
    fn allocate_object(
        &self,
        size: u64,
        vtable: *const VTable,
    ) -> Result<Ref, Trap> {
        let layout = ObjectHeader::layout_for(size)?;
        let raw = self.allocate(layout);
        // SAFETY: fresh allocation sized and aligned for the header
        unsafe { raw.cast::<ObjectHeader>().as_ptr().write(ObjectHeader::new()) };
        log::trace!("allocated object {:p} ({} bytes)", raw, layout.size());
        Ok(Ref::new(raw.as_ptr().cast(), vtable))
    }

    /// Allocates an array of `length` elements of `width` bytes each. Arrays
    /// are full objects carrying the array dispatch table.
    fn allocate_array(&self, length: u32, width: u64) -> Result<Ref, Trap> {
        let payload = (length as u128) * (width as u128) + size_of::<ArrayHeader>() as u128;
        let size = u64::try_from(payload)
            .map_err(|_| Trap::AllocationTooLarge { requested: payload })?;
        let r = self.allocate_object(size, array_vtable())?;
        // SAFETY: the object was sized to hold the array header
        unsafe {
            field_pointer(r)
                .cast::<ArrayHeader>()
                .write(ArrayHeader::new(length, width));
        }
        Ok(r)
    }
}

/// Hands out memory from the global allocator and never takes it back:
/// objects live for the rest of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        // SAFETY: object layouts always include the header, never zero-sized
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let Some(raw) = NonNull::new(raw) else {
            log::error!("out of memory allocating {} bytes", layout.size());
            std::alloc::handle_alloc_error(layout)
        };
        OBJECTS_ALLOCATED.fetch_add(1, Ordering::Relaxed);
        BYTES_ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed);
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub objects: usize,
    pub bytes: usize,
}

/// Totals for every allocation made through [`SystemAllocator`].
pub fn allocation_stats() -> AllocationStats {
    AllocationStats {
        objects: OBJECTS_ALLOCATED.load(Ordering::Relaxed),
        bytes: BYTES_ALLOCATED.load(Ordering::Relaxed),
    }
}
