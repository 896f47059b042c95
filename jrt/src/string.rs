//! String constants and argument strings.
//!
//! There is no string class yet: a string reference aliases its
//! NUL-terminated bytes directly and carries no dispatch table. Anything that
//! dispatches on such a reference will crash; passing it to a native that
//! reads the bytes (`println`) works.

use std::ffi::{CStr, CString, c_char, c_void};

use crate::Ref;

/// Wraps a constant emitted by the compiler. The bytes are not copied.
#[inline]
pub fn ldstr(bytes: *const c_char) -> Ref {
    Ref::new(bytes.cast_mut().cast::<c_void>(), std::ptr::null())
}

/// Copies `s` into process-lifetime storage and wraps it.
pub fn string_from_cstr(s: &CStr) -> Ref {
    let owned: CString = s.to_owned();
    let leaked = Box::leak(owned.into_boxed_c_str());
    ldstr(leaked.as_ptr())
}

/// The bytes behind a string reference.
///
/// # Safety
///
/// `r` must come from [`ldstr`] or [`string_from_cstr`] and be non-null.
pub unsafe fn as_cstr<'a>(r: Ref) -> &'a CStr {
    // SAFETY: by contract the object pointer is a NUL-terminated string
    unsafe { CStr::from_ptr(r.object.cast::<c_char>()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldstr_aliases_the_constant() {
        static HELLO: &CStr = c"hello";
        let r = ldstr(HELLO.as_ptr());
        assert_eq!(r.object.cast_const().cast::<c_char>(), HELLO.as_ptr());
        assert!(r.vtable.is_null());
        assert!(!r.is_null());
        assert_eq!(unsafe { as_cstr(r) }, HELLO);
    }

    #[test]
    fn copied_strings_outlive_their_source() {
        let r = {
            let temporary = CString::new("--verbose").unwrap();
            string_from_cstr(&temporary)
        };
        assert_eq!(unsafe { as_cstr(r) }.to_str(), Ok("--verbose"));
    }
}
