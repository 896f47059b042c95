//! Managed exception propagation.
//!
//! `throw` wraps the thrown reference in an [`ExceptionRecord`] and hands it
//! to an [`Unwinder`]. Raising is two-phase: the search phase looks for an
//! active catch region on the current thread, the unwind phase walks the
//! native stack to it, running the cleanup of every frame it passes.
//!
//! ```text
//! raised ──search──▶ propagating ──▶ handled   (a catch region took it)
//!    │
//!    └─────────────▶ end of stack ──▶ report + exit(1)
//! ```
//!
//! Propagation rides on the platform unwinder through the Rust panic
//! runtime. A record is told apart from foreign unwinds (Rust panics, other
//! languages) by its type and its class tag; foreign unwinds pass through
//! catch regions untouched.

use std::{
    any::Any,
    cell::Cell,
    ffi::c_void,
    fmt,
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    process,
};

use crate::{
    Ref,
    config::{self, UnwindMode},
    error::{Trap, trap},
    thread,
};

/// Class tag stamped on every record raised by this runtime.
pub const EXCEPTION_CLASS: u64 = 0x4A41_5641;

thread_local! {
    static HANDLER_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LIVE_RECORDS: Cell<usize> = const { Cell::new(0) };
}

// ── Backtrace ──────────────────────────────────────────────────────

/// Return addresses captured at the throw site, innermost first.
#[derive(Clone, Default)]
pub struct Backtrace {
    frames: Vec<usize>,
}

impl Backtrace {
    /// Captures at most `max_depth` frames; deeper frames are dropped.
    #[inline(never)]
    pub fn capture(max_depth: usize) -> Self {
        let mut frames = Vec::with_capacity(max_depth.min(64));
        if max_depth > 0 {
            backtrace::trace(|frame| {
                frames.push(frame.ip() as usize);
                frames.len() < max_depth
            });
        }
        Self { frames }
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// One printable line per frame.
    pub fn symbolize(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|&ip| {
                let mut name = None;
                backtrace::resolve(ip as *mut c_void, |symbol| {
                    if name.is_none() {
                        name = symbol.name().map(|n| n.to_string());
                    }
                });
                match name {
                    Some(name) => format!("\tat {name} [{ip:#x}]"),
                    None => format!("\tat <unknown> [{ip:#x}]"),
                }
            })
            .collect()
    }
}

impl fmt::Debug for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames.iter().map(|ip| format!("{ip:#x}")))
            .finish()
    }
}

// ── Exception record ───────────────────────────────────────────────

/// The in-flight state of one `throw`. Owned by the unwinding machinery until
/// a catch region takes the throwable out or the process exits; dropping it
/// releases the backtrace.
#[derive(Debug)]
pub struct ExceptionRecord {
    class: u64,
    throwable: Ref,
    backtrace: Backtrace,
}

impl ExceptionRecord {
    pub fn capture(throwable: Ref, max_depth: usize) -> Self {
        LIVE_RECORDS.with(|live| live.set(live.get() + 1));
        Self {
            class: EXCEPTION_CLASS,
            throwable,
            backtrace: Backtrace::capture(max_depth),
        }
    }

    pub fn class(&self) -> u64 {
        self.class
    }

    pub fn throwable(&self) -> Ref {
        self.throwable
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl Drop for ExceptionRecord {
    fn drop(&mut self) {
        LIVE_RECORDS.with(|live| live.set(live.get().saturating_sub(1)));
        log::debug!(
            "released exception record for {:?} ({} frames)",
            self.throwable,
            self.backtrace.len()
        );
    }
}

/// Records created on this thread and not yet released.
pub fn live_exception_records() -> usize {
    LIVE_RECORDS.with(Cell::get)
}

// ── Unwinders ──────────────────────────────────────────────────────

/// What `raise` reports when it returns. A raise that reaches a catch region
/// never returns.
#[derive(Debug)]
pub enum RaiseOutcome {
    /// No catch region exists on this thread.
    EndOfStack(Box<ExceptionRecord>),
    /// The mechanism could not propagate at all.
    Failed(Box<ExceptionRecord>, &'static str),
}

pub trait Unwinder: Sync {
    fn raise(&self, record: Box<ExceptionRecord>) -> RaiseOutcome;
}

/// Searches for a catch region and unwinds to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropagatingUnwinder;

/// Degraded mode: behaves as if no catch region ever exists, so every throw
/// is reported at the throw site.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminatingUnwinder;

impl Unwinder for PropagatingUnwinder {
    fn raise(&self, record: Box<ExceptionRecord>) -> RaiseOutcome {
        if cfg!(panic = "abort") {
            return RaiseOutcome::Failed(record, "the runtime was built without unwinding");
        }
        if handler_depth() == 0 {
            return RaiseOutcome::EndOfStack(record);
        }
        log::debug!(
            "raising {:?} through {} catch region(s)",
            record.throwable,
            handler_depth()
        );
        panic::resume_unwind(record)
    }
}

impl Unwinder for TerminatingUnwinder {
    fn raise(&self, record: Box<ExceptionRecord>) -> RaiseOutcome {
        RaiseOutcome::EndOfStack(record)
    }
}

pub fn unwinder(mode: UnwindMode) -> &'static dyn Unwinder {
    match mode {
        UnwindMode::Propagate => &PropagatingUnwinder,
        UnwindMode::Terminate => &TerminatingUnwinder,
    }
}

// ── Catch regions ──────────────────────────────────────────────────

struct HandlerFrame;

impl HandlerFrame {
    fn push() -> Self {
        HANDLER_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for HandlerFrame {
    fn drop(&mut self) {
        HANDLER_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Catch regions currently active on this thread.
pub fn handler_depth() -> usize {
    HANDLER_DEPTH.with(Cell::get)
}

fn run_protected<R>(f: impl FnOnce() -> R) -> Result<R, Box<dyn Any + Send>> {
    let _frame = HandlerFrame::push();
    panic::catch_unwind(AssertUnwindSafe(f))
}

fn into_record(payload: Box<dyn Any + Send>) -> Result<Box<ExceptionRecord>, Box<dyn Any + Send>> {
    match payload.downcast::<ExceptionRecord>() {
        Ok(record) if record.class == EXCEPTION_CLASS => Ok(record),
        Ok(record) => Err(record),
        Err(foreign) => Err(foreign),
    }
}

/// Runs `f` as a catch region. A managed exception thrown inside it ends up
/// here as `Err(throwable)`; foreign unwinds keep going.
pub fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Ref> {
    match run_protected(f) {
        Ok(value) => Ok(value),
        Err(payload) => match into_record(payload) {
            Ok(record) => {
                let throwable = record.throwable;
                log::debug!("caught {throwable:?}");
                Err(throwable)
            }
            Err(foreign) => panic::resume_unwind(foreign),
        },
    }
}

/// The bottom frame of a managed thread: anything escaping `f` is uncaught.
pub fn run_outermost(f: impl FnOnce()) {
    if let Err(payload) = run_protected(f) {
        match into_record(payload) {
            Ok(record) => uncaught(record),
            Err(_) => trap(Trap::ForeignUnwind),
        }
    }
}

// ── Throw ──────────────────────────────────────────────────────────

/// Throws `throwable`. Returns only by unwinding into a catch region;
/// without one the process reports and exits.
pub fn throw(throwable: Ref) -> ! {
    let config = config::config();
    let record = Box::new(ExceptionRecord::capture(throwable, config.backtrace_depth));
    match unwinder(config.unwind).raise(record) {
        RaiseOutcome::EndOfStack(record) => uncaught(record),
        RaiseOutcome::Failed(_, reason) => trap(Trap::UnwindFailed(reason)),
    }
}

/// Fired through an abstract method's placeholder slot.
#[cold]
pub fn abstract_method_called() -> ! {
    trap(Trap::AbstractMethodCalled)
}

/// Writes the uncaught exception report: the thread line followed by one
/// line per captured frame.
pub fn report_uncaught(
    out: &mut impl Write,
    thread_name: Option<&str>,
    record: &ExceptionRecord,
) -> io::Result<()> {
    match thread_name {
        Some(name) => writeln!(out, "Exception in thread \"{name}\"")?,
        None => writeln!(out, "Exception in unknown thread")?,
    }
    for line in record.backtrace.symbolize() {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn uncaught(record: Box<ExceptionRecord>) -> ! {
    let name = thread::current_name();
    {
        let mut stderr = io::stderr().lock();
        let _ = report_uncaught(&mut stderr, name.as_deref(), &record);
        let _ = stderr.flush();
    }
    drop(record);
    process::exit(1)
}
