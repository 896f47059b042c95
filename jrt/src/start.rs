use std::ffi::{CStr, c_char};

use crate::{
    Allocator, Ref, SystemAllocator, array, config,
    error::Trap,
    string::string_from_cstr,
    thread, unwind,
};

/// The compiled program's static `main(String[])`.
pub type EntryPoint = unsafe extern "C-unwind" fn(Ref);

/// Builds the `String[]` handed to `main`: every argument after the program
/// name, in order. `argc == 0` yields an empty array.
///
/// # Safety
///
/// `argv` must hold `argc` valid NUL-terminated strings.
pub unsafe fn marshal_arguments(argc: u32, argv: *const *const c_char) -> Result<Ref, Trap> {
    let count = argc.saturating_sub(1);
    let args = SystemAllocator.allocate_array(count, size_of::<Ref>() as u64)?;

    // SAFETY: the array was sized for `count` references; argv by contract
    unsafe {
        let slots = array::data_pointer(args).cast::<Ref>();
        for i in 0..count as usize {
            let arg = CStr::from_ptr(*argv.add(i + 1));
            slots.add(i).write(string_from_cstr(arg));
        }
    }
    Ok(args)
}

/// Process bootstrap: sets up logging and configuration, names the calling
/// thread `main` and runs `entry` as the outermost managed frame. An
/// exception escaping `entry` never returns here.
///
/// # Safety
///
/// Same as [`marshal_arguments`]; `entry` must be a compiled entry point.
pub unsafe fn start(argc: u32, argv: *const *const c_char, entry: EntryPoint) -> Result<(), Trap> {
    config::init_logging();
    let config = config::config();
    log::debug!("starting with {argc} argument(s), {config:?}");

    thread::set_current_name("main");
    // SAFETY: by contract
    let args = unsafe { marshal_arguments(argc, argv)? };

    // SAFETY: by contract
    unwind::run_outermost(|| unsafe { entry(args) });
    log::debug!("entry point returned");
    Ok(())
}
