use std::io::Write;

use thiserror::Error;

/// Internal-consistency violations. None of these are visible to the managed
/// program; every one of them ends the process through [`trap`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error(
        "Attempt to copy between arrays of different element widths ({source_width} != {destination_width})."
    )]
    ArrayWidthMismatch {
        source_width: u64,
        destination_width: u64,
    },
    #[error("Allocation of {requested} payload bytes exceeds the address space.")]
    AllocationTooLarge { requested: u128 },
    #[error("Interface {interface:#x} is not implemented by the receiver's class.")]
    InterfaceNotImplemented { interface: usize },
    #[error("Abstract method invoked.")]
    AbstractMethodCalled,
    #[error("Invoked unimplemented method {0}. Aborting.")]
    Unimplemented(&'static str),
    #[error("Exception propagation failed: {0}.")]
    UnwindFailed(&'static str),
    #[error("A foreign unwind reached the bottom of a managed stack.")]
    ForeignUnwind,
    #[error("Monitor {operation} by a thread that does not own it.")]
    MonitorNotOwned { operation: &'static str },
    #[error("Monitor recursion depth overflowed.")]
    MonitorOverflow,
    #[error("Runtime dispatch table could not be built: {0}.")]
    RuntimeTable(LayoutError),
}

/// Reports `reason` and aborts. Never returns and never unwinds.
#[cold]
#[inline(never)]
pub fn trap(reason: Trap) -> ! {
    log::error!("{reason}");
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "fatal runtime error: {reason}");
    let _ = stderr.flush();
    std::process::abort()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: unknown unwind mode {value:?}, expected `propagate` or `terminate`")]
    UnknownUnwindMode { key: &'static str, value: String },
    #[error("{key}: expected a boolean, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
    #[error("{key}: expected a positive integer, got {value:?}")]
    InvalidDepth { key: &'static str, value: String },
    #[error("runtime configuration is already installed")]
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("interface {interface:#x} appears more than once in the itable")]
    DuplicateInterface { interface: usize },
    #[error(
        "interface {interface:#x} starts at slot {offset}, but the class only has {methods} methods"
    )]
    OffsetOutOfRange {
        interface: usize,
        offset: u32,
        methods: usize,
    },
    #[error("dispatch table with {0} methods does not fit the u32 length field")]
    TooManyMethods(usize),
    #[error("dispatch table with {methods} methods and {interfaces} interfaces exceeds the address space")]
    TableTooLarge { methods: usize, interfaces: usize },
}
