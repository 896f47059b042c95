//! Native methods of the bootstrap class library.
//!
//! Each stub is exported under the mangled name the compiler derives for the
//! corresponding `native` (or not yet compiled) method. The registry maps
//! those names back to the Java method and the code address, for lookup at
//! run time and for the inspector.

#![allow(non_snake_case, non_upper_case_globals)]

use std::{
    collections::HashMap,
    ffi::{CStr, c_char, c_void},
    io::{self, Write},
    ptr,
    sync::OnceLock,
};

use crate::{
    Ref, VTable, array,
    dispatch::MethodPtr,
    error::{Trap, trap},
    object, string,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Function,
    Data,
}

#[derive(Debug, Clone, Copy)]
pub struct NativeMethod {
    pub symbol: &'static str,
    pub name: &'static str,
    pub kind: NativeKind,
    pub address: *const c_void,
}

// SAFETY: addresses of code and immutable statics
unsafe impl Send for NativeMethod {}
// SAFETY: see above
unsafe impl Sync for NativeMethod {}

static REGISTRY: OnceLock<HashMap<&'static str, NativeMethod>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, NativeMethod> {
    REGISTRY.get_or_init(|| {
        let natives = builtin_natives();
        log::debug!("registered {} native symbols", natives.len());
        natives.into_iter().map(|n| (n.symbol, n)).collect()
    })
}

/// Looks up a stub by its exported symbol.
pub fn lookup(symbol: &str) -> Option<&'static NativeMethod> {
    registry().get(symbol)
}

/// Every registered stub, sorted by Java name.
pub fn natives() -> Vec<&'static NativeMethod> {
    let mut all: Vec<_> = registry().values().collect();
    all.sort_by_key(|n| n.name);
    all
}

macro_rules! native {
    ($name:literal, fn $symbol:ident) => {
        NativeMethod {
            symbol: stringify!($symbol),
            name: $name,
            kind: NativeKind::Function,
            address: $symbol as *const c_void,
        }
    };
    ($name:literal, static $symbol:ident) => {
        NativeMethod {
            symbol: stringify!($symbol),
            name: $name,
            kind: NativeKind::Data,
            address: (&raw const $symbol).cast(),
        }
    };
}

fn builtin_natives() -> Vec<NativeMethod> {
    vec![
        native!("java.lang.Object.registerNatives", fn _ZN4java4lang6Object15registerNativesIu9Jed9fc4b9EEvv),
        native!("java.lang.Object.getClass", fn _ZN4java4lang6Object8getClassIu9Jd57352f6EEN4java4lang5ClassEv),
        native!("java.lang.Object.hashCode", fn _ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv),
        native!("java.lang.Object.clone", fn _ZN4java4lang6Object5cloneIu9J117cf78dEEN4java4lang6ObjectEv),
        native!("java.lang.Object.notify", fn _ZN4java4lang6Object6notifyIu9Jec9f6595EEvv),
        native!("java.lang.Object.notifyAll", fn _ZN4java4lang6Object9notifyAllIu9J01f1085cEEvv),
        native!("java.lang.Object.wait", fn _ZN4java4lang6Object4waitIu9J70446489EEvl),
        native!("java.lang.System.arraycopy", fn _ZN4java4lang6System9arraycopyIu9Jb7e57d76EEvN4java4lang6ObjectEiN4java4lang6ObjectEii),
        native!("java.lang.System.out", static _ZN4java4lang6System3outE),
        native!("java.lang.Float.floatToRawIntBits", fn _ZN4java4lang5Float17floatToRawIntBitsIu9Jf7687691EEif),
        native!("java.lang.Double.doubleToRawLongBits", fn _ZN4java4lang6Double19doubleToRawLongBitsIu9Jc8bf6376EEld),
        native!("java.lang.Float.isNaN", fn _ZN4java4lang5Float5isNaNIu9Jbff373faEEu7booleanf),
        native!("java.lang.Double.isNaN", fn _ZN4java4lang6Double5isNaNIu9J0cf9d461EEu7booleand),
        native!("java.io.PrintStream.println(String)", fn printstream_println_string),
        native!("java.lang.StringBuilder", static _ZTVN4java4lang13StringBuilderE),
        native!("java.lang.StringBuilder.<init>", fn _ZN4java4lang13StringBuilder4initIu9J8cc45093EEvv),
        native!("java.lang.IllegalArgumentException", static _ZTVN4java4lang24IllegalArgumentExceptionE),
        native!("java.lang.IllegalArgumentException.<init>", fn _ZN4java4lang24IllegalArgumentException4initIu9Jffb6fc97EEvN4java4lang6StringE),
        native!("java.lang.Integer.toHexString", fn _ZN4java4lang7Integer11toHexStringIu9Jab2e85aaEEN4java4lang6StringEi),
    ]
}

// ── Static class tables ────────────────────────────────────────────

/// A dispatch table laid out at compile time: `N` slots and an empty itable.
#[repr(C)]
pub struct StaticTable<const N: usize> {
    length: u32,
    methods: [MethodPtr; N],
    interfaces: u32,
}

// SAFETY: immutable after initialization
unsafe impl<const N: usize> Sync for StaticTable<N> {}

impl<const N: usize> StaticTable<N> {
    pub const fn new(methods: [MethodPtr; N]) -> Self {
        Self {
            length: N as u32,
            methods,
            interfaces: 0,
        }
    }

    pub fn as_vtable(&'static self) -> &'static VTable {
        // SAFETY: same layout as a VTable followed by an empty ITable
        unsafe { &*(self as *const Self).cast::<VTable>() }
    }
}

/// Slot of `println(String)` in `java/io/PrintStream`'s table.
pub const PRINTSTREAM_PRINTLN_STRING: usize = 43;

static PRINTSTREAM_TABLE: StaticTable<44> = {
    let mut methods = [ptr::null::<c_void>(); 44];
    methods[PRINTSTREAM_PRINTLN_STRING] = printstream_println_string as MethodPtr;
    StaticTable::new(methods)
};

/// `System.out`: no instance state, only a table whose `println(String)`
/// writes to the process's stdout. The other slots are unfilled.
#[unsafe(no_mangle)]
pub static _ZN4java4lang6System3outE: Ref = Ref {
    object: ptr::null_mut(),
    vtable: (&raw const PRINTSTREAM_TABLE).cast::<VTable>(),
};

#[unsafe(no_mangle)]
pub static _ZTVN4java4lang13StringBuilderE: StaticTable<0> = StaticTable::new([]);

#[unsafe(no_mangle)]
pub static _ZTVN4java4lang24IllegalArgumentExceptionE: StaticTable<0> = StaticTable::new([]);

fn write_line(out: &mut impl Write, string: Ref) -> io::Result<()> {
    if string.is_null() {
        out.write_all(b"null\n")?;
    } else {
        // SAFETY: strings alias NUL-terminated bytes
        out.write_all(unsafe { string::as_cstr(string) }.to_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

extern "C" fn printstream_println_string(_this: Ref, string: Ref) {
    if let Err(e) = write_line(&mut io::stdout().lock(), string) {
        log::warn!("println failed: {e}");
    }
}

// ── java.lang.Object ───────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Object15registerNativesIu9Jed9fc4b9EEvv() {}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Object8getClassIu9Jd57352f6EEN4java4lang5ClassEv(_this: Ref) -> Ref {
    trap(Trap::Unimplemented("java.lang.Object.getClass"))
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv(this: Ref) -> u32 {
    this.identity_hash()
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Object5cloneIu9J117cf78dEEN4java4lang6ObjectEv(_this: Ref) -> Ref {
    trap(Trap::Unimplemented("java.lang.Object.clone"))
}

/// # Safety
///
/// `this` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ZN4java4lang6Object6notifyIu9Jec9f6595EEvv(this: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(this) }.notify_one();
}

/// # Safety
///
/// `this` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ZN4java4lang6Object9notifyAllIu9J01f1085cEEvv(this: Ref) {
    // SAFETY: by contract
    unsafe { object::monitor(this) }.notify_all();
}

/// # Safety
///
/// `this` must be a non-null object reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ZN4java4lang6Object4waitIu9J70446489EEvl(this: Ref, timeout_ms: u64) {
    // SAFETY: by contract
    unsafe { object::monitor(this) }.wait(timeout_ms);
}

// ── java.lang.System ───────────────────────────────────────────────

/// # Safety
///
/// Both references must be non-null arrays and both ranges in bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ZN4java4lang6System9arraycopyIu9Jb7e57d76EEvN4java4lang6ObjectEiN4java4lang6ObjectEii(
    src: Ref,
    src_pos: i32,
    dst: Ref,
    dst_pos: i32,
    length: i32,
) {
    // SAFETY: by contract
    let copied = unsafe {
        array::copy(src, src_pos as isize, dst, dst_pos as isize, length as isize)
    };
    if let Err(reason) = copied {
        trap(reason);
    }
}

// ── java.lang.Float / java.lang.Double ─────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang5Float17floatToRawIntBitsIu9Jf7687691EEif(value: f32) -> u32 {
    value.to_bits()
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Double19doubleToRawLongBitsIu9Jc8bf6376EEld(value: f64) -> u64 {
    value.to_bits()
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang5Float5isNaNIu9Jbff373faEEu7booleanf(value: f32) -> u32 {
    value.is_nan() as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang6Double5isNaNIu9J0cf9d461EEu7booleand(value: f64) -> u32 {
    value.is_nan() as u32
}

// ── Not yet implemented ────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang13StringBuilder4initIu9J8cc45093EEvv(_this: Ref) {
    trap(Trap::Unimplemented("java.lang.StringBuilder.<init>"))
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang24IllegalArgumentException4initIu9Jffb6fc97EEvN4java4lang6StringE(
    _this: Ref,
    _message: Ref,
) {
    trap(Trap::Unimplemented("java.lang.IllegalArgumentException.<init>"))
}

#[unsafe(no_mangle)]
pub extern "C" fn _ZN4java4lang7Integer11toHexStringIu9Jab2e85aaEEN4java4lang6StringEi(_value: i64) -> Ref {
    trap(Trap::Unimplemented("java.lang.Integer.toHexString"))
}

/// Resolves `symbol` for callers holding a C string.
///
/// # Safety
///
/// `symbol` must be a valid NUL-terminated string.
pub unsafe fn lookup_cstr(symbol: *const c_char) -> Option<&'static NativeMethod> {
    // SAFETY: by contract
    let symbol = unsafe { CStr::from_ptr(symbol) };
    lookup(symbol.to_str().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Allocator, SystemAllocator, VTableBuilder, dispatch::vtable_lookup};
    use std::collections::HashSet;

    #[test]
    fn registry_resolves_exported_symbols() {
        let hash = lookup("_ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv").unwrap();
        assert_eq!(hash.name, "java.lang.Object.hashCode");
        assert_eq!(hash.kind, NativeKind::Function);
        assert_eq!(
            hash.address,
            _ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv as *const c_void
        );

        let out = lookup("_ZN4java4lang6System3outE").unwrap();
        assert_eq!(out.kind, NativeKind::Data);
        assert_eq!(out.address, (&raw const _ZN4java4lang6System3outE).cast());

        assert!(lookup("_ZN4java4lang6Object4fooEv").is_none());
    }

    #[test]
    fn registry_names_are_unique() {
        let all = natives();
        let names: HashSet<_> = all.iter().map(|n| n.name).collect();
        assert_eq!(names.len(), all.len());
        assert!(all.windows(2).all(|w| w[0].name <= w[1].name));
    }

    #[test]
    fn lookup_by_c_string() {
        let found = unsafe { lookup_cstr(c"_ZN4java4lang5Float5isNaNIu9Jbff373faEEu7booleanf".as_ptr()) };
        assert_eq!(found.map(|n| n.name), Some("java.lang.Float.isNaN"));
    }

    #[test]
    fn system_out_dispatches_println() {
        let out = _ZN4java4lang6System3outE;
        assert!(out.is_null());
        let table = unsafe { out.vtable_ref() };
        assert_eq!(table.len(), 44);
        assert!(table.itable().is_empty());
        let println = unsafe { vtable_lookup(out, PRINTSTREAM_PRINTLN_STRING) };
        assert_eq!(println, printstream_println_string as MethodPtr);
    }

    #[test]
    fn println_writes_string_bytes_and_newline() {
        let mut out = Vec::new();
        write_line(&mut out, string::ldstr(c"Hello, world!".as_ptr())).unwrap();
        write_line(&mut out, Ref::NULL).unwrap();
        assert_eq!(out, b"Hello, world!\nnull\n");
    }

    #[test]
    fn empty_class_tables_have_no_slots() {
        assert!(_ZTVN4java4lang13StringBuilderE.as_vtable().is_empty());
        assert!(_ZTVN4java4lang24IllegalArgumentExceptionE.as_vtable().itable().is_empty());
    }

    #[test]
    fn hash_code_is_identity() {
        let vtable = VTableBuilder::new().build().unwrap();
        let a = SystemAllocator.allocate_object(8, vtable).unwrap();
        let b = SystemAllocator.allocate_object(8, vtable).unwrap();
        let hash = _ZN4java4lang6Object8hashCodeIu9J7c7c3589EEiv;
        assert_eq!(hash(a), hash(a));
        assert_eq!(hash(a), a.object as usize as u32);
        assert_ne!(hash(a), hash(b));
    }

    #[test]
    fn raw_bits_and_nan() {
        assert_eq!(_ZN4java4lang5Float17floatToRawIntBitsIu9Jf7687691EEif(1.0), 0x3F80_0000);
        assert_eq!(
            _ZN4java4lang6Double19doubleToRawLongBitsIu9Jc8bf6376EEld(-2.0),
            0xC000_0000_0000_0000
        );
        assert_eq!(_ZN4java4lang5Float5isNaNIu9Jbff373faEEu7booleanf(f32::NAN), 1);
        assert_eq!(_ZN4java4lang5Float5isNaNIu9Jbff373faEEu7booleanf(0.5), 0);
        assert_eq!(_ZN4java4lang6Double5isNaNIu9J0cf9d461EEu7booleand(f64::NAN), 1);
        assert_eq!(_ZN4java4lang6Double5isNaNIu9J0cf9d461EEu7booleand(f64::INFINITY), 0);
    }

    #[test]
    fn arraycopy_moves_elements() {
        let src = SystemAllocator.allocate_array(4, 8).unwrap();
        let dst = SystemAllocator.allocate_array(4, 8).unwrap();
        unsafe {
            let data = array::data_pointer(src).cast::<u64>();
            for i in 0..4 {
                data.add(i).write(i as u64 + 1);
            }
            _ZN4java4lang6System9arraycopyIu9Jb7e57d76EEvN4java4lang6ObjectEiN4java4lang6ObjectEii(
                src, 1, dst, 0, 3,
            );
            let copied = std::slice::from_raw_parts(array::data_pointer(dst).cast::<u64>(), 4);
            assert_eq!(copied, &[2, 3, 4, 0]);
        }
    }
}
