use std::{
    cell::{Cell, OnceCell},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::unwind;

/// Token value never handed to a thread; marks an unowned monitor.
pub const NO_THREAD: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(NO_THREAD) };
    static THREAD_NAME: OnceCell<Box<str>> = const { OnceCell::new() };
}

/// A process-unique, never reused identifier for the calling OS thread.
#[inline]
pub fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| {
        let current = token.get();
        if current != NO_THREAD {
            return current;
        }
        let fresh = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
        token.set(fresh);
        fresh
    })
}

/// Names the calling thread. A thread is named at most once; later calls
/// return `false` and leave the first name in place.
pub fn set_current_name(name: &str) -> bool {
    let installed = THREAD_NAME.with(|slot| slot.set(name.into()).is_ok());
    if installed {
        log::trace!("thread {} named {name:?}", current_thread_token());
    }
    installed
}

/// The calling thread's name, falling back to the name the OS thread was
/// spawned with. `None` when neither exists.
pub fn current_name() -> Option<String> {
    THREAD_NAME
        .with(|slot| slot.get().map(|name| name.to_string()))
        .or_else(|| thread::current().name().map(str::to_owned))
}

/// An OS thread running managed code. Its outermost frame applies the
/// uncaught exception policy, so an exception escaping `f` ends the process.
pub struct ManagedThread {
    handle: Mutex<Option<JoinHandle<()>>>,
    done: (Mutex<bool>, Condvar),
}

impl ManagedThread {
    pub fn spawn<F>(name: impl Into<String>, f: F) -> std::io::Result<Arc<Self>>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let thread = Arc::new(Self {
            handle: Mutex::new(None),
            done: (Mutex::new(false), Condvar::new()),
        });

        let shared = Arc::clone(&thread);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            set_current_name(&name);
            unwind::run_outermost(f);
            let (ref mx, ref cv) = shared.done;
            *mx.lock() = true;
            cv.notify_all();
        })?;
        *thread.handle.lock() = Some(handle);
        Ok(thread)
    }

    /// Returns `true` if the thread finished within `dur`.
    pub fn join_timeout(&self, dur: Duration) -> bool {
        let (ref mx, ref cv) = self.done;
        let mut done = mx.lock();
        if *done {
            return true;
        }
        let res = cv.wait_for(&mut done, dur);
        !res.timed_out() || *done
    }

    pub fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
            return;
        }

        let (ref mx, ref cv) = self.done;
        let mut done = mx.lock();
        while !*done {
            cv.wait(&mut done);
        }
    }
}
