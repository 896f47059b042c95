//! Dispatch tables emitted by the compiler and the lookups generated code
//! performs against them.
//!
//! ```text
//! VTable                         ITable (directly after the last slot)
//! +--------------+               +--------------------+
//! | length: u32  |               | length: u32        |
//! +--------------+               +--------------------+
//! | methods[0]   |               | entries[0]         |
//! | ...          |  ───────────▶ |   interface: *void |
//! | methods[n-1] |               |   offset: u32      |
//! +--------------+               | ...                |
//!                                +--------------------+
//! ```
//!
//! Slot order is fixed per class at compile time. An interface's methods
//! occupy `offset..offset + k` of the implementing class's slots.

use core::{alloc::Layout, ffi::c_void, mem, ptr, slice};
use std::collections::HashSet;

use crate::{Ref, error::LayoutError};

/// An untyped code pointer; generated code casts it to the callee type.
pub type MethodPtr = *const c_void;

/// Identity of an interface: the address of that interface's own table.
/// Compared by address, never by contents.
pub type InterfaceId = *const c_void;

#[repr(C)]
pub struct VTable {
    length: u32,
    methods: [MethodPtr; 0],
}

#[repr(C)]
pub struct ITable {
    length: u32,
    entries: [ITableEntry; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ITableEntry {
    pub interface: InterfaceId,
    pub offset: u32,
}

// SAFETY: tables are immutable after construction
unsafe impl Sync for VTable {}
// SAFETY: see above
unsafe impl Sync for ITable {}

impl VTable {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline(always)]
    pub fn methods(&self) -> &[MethodPtr] {
        // SAFETY: `length` slots follow the header by construction
        unsafe { slice::from_raw_parts(self.methods.as_ptr(), self.len()) }
    }

    /// # Safety
    ///
    /// `index` must be below [`VTable::len`].
    #[inline(always)]
    pub unsafe fn method_unchecked(&self, index: usize) -> MethodPtr {
        debug_assert!(index < self.len(), "slot {index} out of {}", self.len());
        // SAFETY: by contract
        unsafe { *self.methods.as_ptr().add(index) }
    }

    #[inline(always)]
    pub fn itable(&self) -> &ITable {
        // SAFETY: the itable is laid out directly after the last slot
        unsafe { &*self.methods.as_ptr().add(self.len()).cast::<ITable>() }
    }
}

impl ITable {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline(always)]
    pub fn entries(&self) -> &[ITableEntry] {
        // SAFETY: `length` entries follow the header by construction
        unsafe { slice::from_raw_parts(self.entries.as_ptr(), self.len()) }
    }

    /// Linear scan for `interface`; the first match wins.
    #[inline]
    pub fn find(&self, interface: InterfaceId) -> Option<u32> {
        self.entries()
            .iter()
            .find(|entry| ptr::eq(entry.interface, interface))
            .map(|entry| entry.offset)
    }
}

impl core::fmt::Debug for VTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VTable")
            .field("methods", &self.methods())
            .field("interfaces", &self.itable().entries())
            .finish()
    }
}

// ── Lookups ────────────────────────────────────────────────────────

/// O(1) virtual dispatch.
///
/// # Safety
///
/// `receiver` must be non-null with a valid table and `index` must be a slot
/// of that table. The compiler checks both statically.
#[inline(always)]
pub unsafe fn vtable_lookup(receiver: Ref, index: usize) -> MethodPtr {
    // SAFETY: by contract
    unsafe { receiver.vtable_ref().method_unchecked(index) }
}

/// Interface dispatch: itable scan followed by an indexed slot read.
/// `None` means the receiver's class does not implement `interface`, which a
/// well-typed program never does.
///
/// # Safety
///
/// Same as [`vtable_lookup`]; `index` must be a method of `interface`.
#[inline]
pub unsafe fn itable_lookup(
    receiver: Ref,
    interface: InterfaceId,
    index: usize,
) -> Option<MethodPtr> {
    // SAFETY: by contract
    let vtable = unsafe { receiver.vtable_ref() };
    let offset = vtable.itable().find(interface)?;
    // SAFETY: interface slots lie inside the class table
    Some(unsafe { vtable.method_unchecked(offset as usize + index) })
}

// ── Construction ───────────────────────────────────────────────────

/// Builds a dispatch table with the compiler's binary layout. Used for
/// runtime-owned classes and in tests; the compiler emits its tables as
/// static data.
#[derive(Debug, Default, Clone)]
pub struct VTableBuilder {
    methods: Vec<MethodPtr>,
    interfaces: Vec<ITableEntry>,
}

impl VTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: MethodPtr) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = MethodPtr>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// `offset` is the slot at which the interface's methods begin.
    pub fn interface(mut self, interface: InterfaceId, offset: u32) -> Self {
        self.interfaces.push(ITableEntry { interface, offset });
        self
    }

    pub fn layout(&self) -> Result<Layout, LayoutError> {
        table_layout(self.methods.len(), self.interfaces.len())
    }

    /// Writes the table into process-lifetime memory.
    pub fn build(self) -> Result<&'static VTable, LayoutError> {
        let length = u32::try_from(self.methods.len())
            .map_err(|_| LayoutError::TooManyMethods(self.methods.len()))?;
        let itable_length = u32::try_from(self.interfaces.len())
            .map_err(|_| LayoutError::TooManyMethods(self.interfaces.len()))?;

        let mut seen = HashSet::with_capacity(self.interfaces.len());
        for entry in &self.interfaces {
            let interface = entry.interface as usize;
            if !seen.insert(interface) {
                return Err(LayoutError::DuplicateInterface { interface });
            }
            if entry.offset as usize > self.methods.len() {
                return Err(LayoutError::OffsetOutOfRange {
                    interface,
                    offset: entry.offset,
                    methods: self.methods.len(),
                });
            }
        }

        let layout = self.layout()?;
        // SAFETY: the layout is never zero-sized, it always holds the length
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        if base.is_null() {
            std::alloc::handle_alloc_error(layout);
        }

        // SAFETY: every write stays inside `layout`, offsets come from the
        // repr(C) definitions above
        unsafe {
            let vtable = base.cast::<VTable>();
            (&raw mut (*vtable).length).write(length);
            let slots = (&raw mut (*vtable).methods).cast::<MethodPtr>();
            ptr::copy_nonoverlapping(self.methods.as_ptr(), slots, self.methods.len());

            let itable = slots.add(self.methods.len()).cast::<ITable>();
            (&raw mut (*itable).length).write(itable_length);
            let entries = (&raw mut (*itable).entries).cast::<ITableEntry>();
            ptr::copy_nonoverlapping(
                self.interfaces.as_ptr(),
                entries,
                self.interfaces.len(),
            );

            log::trace!(
                "built dispatch table at {base:p}: {length} methods, {itable_length} interfaces"
            );
            Ok(&*vtable)
        }
    }
}

/// Size and alignment of a table with `methods` slots and `interfaces`
/// itable entries.
pub fn table_layout(methods: usize, interfaces: usize) -> Result<Layout, LayoutError> {
    let too_large = || LayoutError::TableTooLarge {
        methods,
        interfaces,
    };
    let slots = methods
        .checked_mul(size_of::<MethodPtr>())
        .ok_or_else(too_large)?;
    let entries = interfaces
        .checked_mul(size_of::<ITableEntry>())
        .ok_or_else(too_large)?;
    let size = (mem::offset_of!(VTable, methods) + mem::offset_of!(ITable, entries))
        .checked_add(slots)
        .and_then(|size| size.checked_add(entries))
        .ok_or_else(too_large)?;
    let align = align_of::<VTable>().max(align_of::<ITable>());
    Layout::from_size_align(size, align).map_err(|_| too_large())
}
