use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{
    config,
    error::{Trap, trap},
    thread::{NO_THREAD, current_thread_token},
};

#[derive(Debug, Default)]
struct MonitorState {
    owner: u64,
    depth: u32,
}

/// The per-object monitor: a reentrant lock paired with a condition queue.
///
/// ```text
/// unlocked ──enter──▶ locked(self, 1) ──enter──▶ locked(self, d + 1)
///    ▲                      │                          │
///    └────────exit──────────┘◀─────────exit────────────┘
/// ```
///
/// `wait` gives up every recursion level and restores them once the lock is
/// re-acquired. Ownership of `exit`, `wait` and `notify` is only enforced when
/// `strict_monitors` is configured; otherwise misuse is logged and tolerated.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    released: Condvar,
    notified: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                owner: NO_THREAD,
                depth: 0,
            }),
            released: Condvar::new(),
            notified: Condvar::new(),
        }
    }

    pub fn enter(&self) {
        let me = current_thread_token();
        let mut state = self.state.lock();

        if state.owner == me {
            state.depth = state
                .depth
                .checked_add(1)
                .unwrap_or_else(|| trap(Trap::MonitorOverflow));
            return;
        }

        self.acquire(&mut state, me);
        state.depth = 1;
        log::trace!("monitor {:p} entered by thread {me}", self);
    }

    pub fn exit(&self) {
        let me = current_thread_token();
        let mut state = self.state.lock();

        if state.owner != me {
            Self::misuse("exit", state.owner);
            return;
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = NO_THREAD;
            self.released.notify_one();
            log::trace!("monitor {:p} released by thread {me}", self);
        }
    }

    /// Releases the monitor, blocks until notified or until `timeout_ms`
    /// elapses (0 waits indefinitely), then re-acquires it at the previous
    /// depth. Wakeups may be spurious; callers re-check their condition.
    pub fn wait(&self, timeout_ms: u64) {
        let me = current_thread_token();
        let mut state = self.state.lock();

        let saved_depth = if state.owner == me {
            let depth = state.depth;
            state.owner = NO_THREAD;
            state.depth = 0;
            self.released.notify_one();
            Some(depth)
        } else {
            Self::misuse("wait", state.owner);
            None
        };

        if timeout_ms == 0 {
            self.notified.wait(&mut state);
        } else {
            let _ = self
                .notified
                .wait_for(&mut state, Duration::from_millis(timeout_ms));
        }

        if let Some(depth) = saved_depth {
            self.acquire(&mut state, me);
            state.depth = depth;
        }
    }

    /// Wakes one thread parked in [`Monitor::wait`], if any.
    pub fn notify_one(&self) {
        self.check_notifier("notify");
        self.notified.notify_one();
    }

    /// Wakes every thread parked in [`Monitor::wait`].
    pub fn notify_all(&self) {
        self.check_notifier("notifyAll");
        self.notified.notify_all();
    }

    /// Whether the calling thread currently owns this monitor.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == current_thread_token()
    }

    /// Recursion depth of the current owner, 0 when unlocked.
    pub fn depth(&self) -> u32 {
        self.state.lock().depth
    }

    #[inline]
    fn acquire(&self, state: &mut MutexGuard<'_, MonitorState>, me: u64) {
        while state.owner != NO_THREAD {
            self.released.wait(state);
        }
        state.owner = me;
    }

    fn check_notifier(&self, operation: &'static str) {
        if !config::config().strict_monitors {
            return;
        }
        let owner = self.state.lock().owner;
        if owner != current_thread_token() {
            Self::misuse(operation, owner);
        }
    }

    #[cold]
    fn misuse(operation: &'static str, owner: u64) {
        if config::config().strict_monitors {
            trap(Trap::MonitorNotOwned { operation });
        }
        log::warn!(
            "monitor {operation} by thread {} while owned by thread {owner}",
            current_thread_token()
        );
    }
}
