//! The `_Jrt_*` entry points called by generated code.
//!
//! Every function here is a thin shim over the Rust API: argument
//! conversion, then a call, then `trap` for any error the call reports.
//! Entry points that managed exceptions may cross are `C-unwind`.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_void};

use crate::{
    Allocator, Ref, SystemAllocator, VTable, array,
    dispatch::{self, InterfaceId, MethodPtr},
    error::{Trap, trap},
    natives, object,
    start::{self, EntryPoint},
    string, unwind,
};

/// Body of a catch region entered through [`_Jrt_try`].
pub type TryBody = unsafe extern "C-unwind" fn(*mut c_void);

/// Every entry point exported by this module.
pub const RUNTIME_SYMBOLS: &[&str] = &[
    "_Jrt_start",
    "_Jrt_object_new",
    "_Jrt_object_field_ptr",
    "_Jrt_object_vtable_lookup",
    "_Jrt_object_itable_lookup",
    "_Jrt_object_monitorenter",
    "_Jrt_object_monitorexit",
    "_Jrt_object_wait",
    "_Jrt_object_notify",
    "_Jrt_object_notify_all",
    "_Jrt_array_new",
    "_Jrt_array_length",
    "_Jrt_array_element_ptr",
    "_Jrt_array_copy",
    "_Jrt_set_array_vtable",
    "_Jrt_throw",
    "_Jrt_try",
    "_Jrt_abstract",
    "_Jrt_ldstr",
    "_Jrt_native_lookup",
];

#[inline]
fn or_trap<T>(result: Result<T, Trap>) -> T {
    match result {
        Ok(value) => value,
        Err(reason) => trap(reason),
    }
}

// ── Bootstrap ──────────────────────────────────────────────────────

/// # Safety
///
/// `argv` must hold `argc` valid C strings; `entry` must be the compiled
/// `main`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn _Jrt_start(
    argc: u32,
    argv: *const *const c_char,
    entry: EntryPoint,
) -> u32 {
    // SAFETY: by contract
    or_trap(unsafe { start::start(argc, argv, entry) });
    0
}

// ── Objects ────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _Jrt_object_new(size: u64, vtable: *const VTable) -> Ref {
    or_trap(SystemAllocator.allocate_object(size, vtable))
}

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_field_ptr(r: Ref) -> *mut u8 {
    // SAFETY: by contract
    unsafe { object::field_pointer(r) }
}

/// # Safety
///
/// `r` must be non-null with a valid table; `index` must be one of its slots.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_vtable_lookup(r: Ref, index: u64) -> MethodPtr {
    // SAFETY: by contract
    unsafe { dispatch::vtable_lookup(r, index as usize) }
}

/// Returns null when the receiver does not implement `interface`; the call
/// site faults on it.
///
/// # Safety
///
/// Same as [`_Jrt_object_vtable_lookup`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_itable_lookup(
    r: Ref,
    interface: InterfaceId,
    index: u64,
) -> MethodPtr {
    // SAFETY: by contract
    match unsafe { dispatch::itable_lookup(r, interface, index as usize) } {
        Some(method) => method,
        None => {
            log::error!("{}", Trap::InterfaceNotImplemented {
                interface: interface as usize,
            });
            std::ptr::null()
        }
    }
}

// ── Monitors ───────────────────────────────────────────────────────

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_monitorenter(r: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(r) }.enter();
}

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_monitorexit(r: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(r) }.exit();
}

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_wait(r: Ref, timeout_ms: u64) {
    // SAFETY: by contract
    unsafe { object::monitor(r) }.wait(timeout_ms);
}

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_notify(r: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(r) }.notify_one();
}

/// # Safety
///
/// `r` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_object_notify_all(r: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(r) }.notify_all();
}

// ── Arrays ─────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _Jrt_array_new(length: u32, width: u64) -> Ref {
    or_trap(SystemAllocator.allocate_array(length, width))
}

/// # Safety
///
/// `r` must be a non-null array reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_array_length(r: Ref) -> u32 {
    // SAFETY: by contract
    unsafe { array::length(r) }
}

/// # Safety
///
/// `r` must be a non-null array reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_array_element_ptr(r: Ref) -> *mut u8 {
    // SAFETY: by contract
    unsafe { array::data_pointer(r) }
}

/// # Safety
///
/// Both references must be non-null arrays and both ranges in bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_array_copy(
    src: Ref,
    src_pos: i32,
    dst: Ref,
    dst_pos: i32,
    length: i32,
) {
    // SAFETY: by contract
    or_trap(unsafe {
        array::copy(src, src_pos as isize, dst, dst_pos as isize, length as isize)
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn _Jrt_set_array_vtable(vtable: *const VTable) {
    array::set_array_vtable(vtable);
}

// ── Exceptions ─────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C-unwind" fn _Jrt_throw(throwable: Ref) -> ! {
    unwind::throw(throwable)
}

/// Runs `body(context)` as a catch region. Returns 0 when the body returned
/// normally, 1 when it threw; the thrown reference is stored to `caught`
/// unless `caught` is null.
///
/// # Safety
///
/// `body` must be callable with `context`; `caught` must be null or valid for
/// writes.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn _Jrt_try(
    body: TryBody,
    context: *mut c_void,
    caught: *mut Ref,
) -> u32 {
    // SAFETY: by contract
    match unwind::catch(|| unsafe { body(context) }) {
        Ok(()) => 0,
        Err(throwable) => {
            if !caught.is_null() {
                // SAFETY: by contract
                unsafe { caught.write(throwable) };
            }
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn _Jrt_abstract() -> ! {
    unwind::abstract_method_called()
}

// ── Strings and natives ────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _Jrt_ldstr(bytes: *const c_char) -> Ref {
    string::ldstr(bytes)
}

/// Address of a registered native, or null.
///
/// # Safety
///
/// `symbol` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _Jrt_native_lookup(symbol: *const c_char) -> *const c_void {
    // SAFETY: by contract
    match unsafe { natives::lookup_cstr(symbol) } {
        Some(native) => native.address,
        None => std::ptr::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VTableBuilder;

    extern "C" fn slot_a() {}
    extern "C" fn slot_b() {}

    static LIST: u8 = 0;

    #[test]
    fn object_entry_points_agree_with_the_rust_api() {
        let vtable = VTableBuilder::new()
            .method(slot_a as MethodPtr)
            .method(slot_b as MethodPtr)
            .interface((&raw const LIST).cast(), 1)
            .build()
            .unwrap();
        let r = _Jrt_object_new(24, vtable);

        unsafe {
            assert_eq!(_Jrt_object_field_ptr(r), object::field_pointer(r));
            assert_eq!(_Jrt_object_vtable_lookup(r, 0), slot_a as MethodPtr);
            assert_eq!(
                _Jrt_object_itable_lookup(r, (&raw const LIST).cast(), 0),
                slot_b as MethodPtr
            );
            assert!(_Jrt_object_itable_lookup(r, std::ptr::null(), 0).is_null());
        }
    }

    #[test]
    fn monitor_entry_points_nest() {
        let r = _Jrt_object_new(0, VTableBuilder::new().build().unwrap());
        unsafe {
            _Jrt_object_monitorenter(r);
            _Jrt_object_monitorenter(r);
            assert_eq!(object::monitor(r).depth(), 2);
            _Jrt_object_notify(r);
            _Jrt_object_notify_all(r);
            _Jrt_object_wait(r, 1);
            assert_eq!(object::monitor(r).depth(), 2);
            _Jrt_object_monitorexit(r);
            _Jrt_object_monitorexit(r);
            assert_eq!(object::monitor(r).depth(), 0);
        }
    }

    #[test]
    fn array_entry_points() {
        let a = _Jrt_array_new(3, 4);
        let b = _Jrt_array_new(3, 4);
        unsafe {
            assert_eq!(_Jrt_array_length(a), 3);
            let data = _Jrt_array_element_ptr(a).cast::<i32>();
            data.write(7);
            data.add(1).write(8);
            _Jrt_array_copy(a, 0, b, 1, 2);
            let copied = std::slice::from_raw_parts(_Jrt_array_element_ptr(b).cast::<i32>(), 3);
            assert_eq!(copied, &[0, 7, 8]);
        }
    }

    unsafe extern "C-unwind" fn throwing_body(context: *mut c_void) {
        let throwable = unsafe { *context.cast::<Ref>() };
        _Jrt_throw(throwable);
    }

    unsafe extern "C-unwind" fn quiet_body(context: *mut c_void) {
        unsafe { *context.cast::<u32>() += 1 };
    }

    #[test]
    fn try_reports_normal_completion_and_caught_exceptions() {
        let mut counter = 0u32;
        let mut caught = Ref::NULL;
        let status = unsafe {
            _Jrt_try(quiet_body, (&raw mut counter).cast(), &raw mut caught)
        };
        assert_eq!(status, 0);
        assert_eq!(counter, 1);
        assert!(caught.is_null());

        let mut thrown = _Jrt_object_new(8, VTableBuilder::new().build().unwrap());
        let status = unsafe {
            _Jrt_try(throwing_body, (&raw mut thrown).cast(), &raw mut caught)
        };
        assert_eq!(status, 1);
        assert_eq!(caught, thrown);

        let status = unsafe {
            _Jrt_try(throwing_body, (&raw mut thrown).cast(), std::ptr::null_mut())
        };
        assert_eq!(status, 1);
    }

    #[test]
    fn ldstr_and_native_lookup() {
        let s = _Jrt_ldstr(c"constant".as_ptr());
        assert!(s.vtable.is_null());
        assert_eq!(unsafe { string::as_cstr(s) }, c"constant");

        let hash = unsafe { _Jrt_native_lookup(c"_ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv".as_ptr()) };
        assert!(!hash.is_null());
        assert!(unsafe { _Jrt_native_lookup(c"missing".as_ptr()) }.is_null());
    }

    #[test]
    fn symbol_list_has_no_duplicates() {
        let mut symbols = RUNTIME_SYMBOLS.to_vec();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), RUNTIME_SYMBOLS.len());
    }
}
