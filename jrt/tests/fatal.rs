//! Paths that end the process. Each test re-runs this binary filtered to
//! itself with `JRT_TEST_CASE` set; the child runs the scenario and the
//! parent checks how it died.

#![cfg(unix)]

use std::{
    env,
    ffi::c_char,
    os::unix::process::ExitStatusExt,
    process::{self, Command, Output},
    thread,
};

use jrt::{
    Ref, VTableBuilder,
    abi::*,
    catch,
    config::{ENV_BACKTRACE_DEPTH, ENV_LOG, ENV_STRICT_MONITORS, ENV_UNWIND},
    throw,
};

const CASE_VAR: &str = "JRT_TEST_CASE";
const SIGABRT: i32 = 6;
/// Exit code of a child whose scenario unexpectedly returned.
const SCENARIO_RETURNED: i32 = 42;

fn is_child(case: &str) -> bool {
    env::var(CASE_VAR).as_deref() == Ok(case)
}

fn run_child(case: &str, envs: &[(&str, &str)]) -> Output {
    let exe = env::current_exe().expect("test binary path");
    Command::new(exe)
        .args([case, "--exact", "--nocapture", "--test-threads=1"])
        .env(CASE_VAR, case)
        .env_remove(ENV_UNWIND)
        .env_remove(ENV_STRICT_MONITORS)
        .env_remove(ENV_BACKTRACE_DEPTH)
        .env_remove(ENV_LOG)
        .envs(envs.iter().copied())
        .output()
        .expect("spawn child test process")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// The report line for `thread` must be followed by at least one frame.
fn assert_uncaught_report(stderr: &str, thread_line: &str) {
    let lines: Vec<&str> = stderr.lines().collect();
    let at = lines
        .iter()
        .position(|line| line.starts_with(thread_line))
        .unwrap_or_else(|| panic!("no {thread_line:?} line in:\n{stderr}"));
    assert!(
        lines.get(at + 1).is_some_and(|line| line.starts_with("\tat ")),
        "no backtrace after the thread line:\n{stderr}"
    );
}

fn assert_trapped(output: &Output, message: &str) {
    let stderr = stderr_of(output);
    assert_eq!(
        output.status.signal(),
        Some(SIGABRT),
        "status {:?}, stderr:\n{stderr}",
        output.status
    );
    let expected = format!("fatal runtime error: {message}");
    assert!(
        stderr.lines().any(|line| line == expected),
        "missing {expected:?} in:\n{stderr}"
    );
}

fn new_object() -> Ref {
    _Jrt_object_new(8, VTableBuilder::new().build().unwrap())
}

// ── Uncaught exceptions ────────────────────────────────────────────

unsafe extern "C-unwind" fn main_that_throws(_args: Ref) {
    throw_new_object();
}

fn throw_new_object() {
    _Jrt_throw(new_object());
}

#[test]
fn uncaught_exception_in_main_reports_and_exits() {
    if is_child("uncaught_exception_in_main_reports_and_exits") {
        let argv: [*const c_char; 1] = [c"prog".as_ptr()];
        unsafe { _Jrt_start(1, argv.as_ptr(), main_that_throws) };
        process::exit(SCENARIO_RETURNED);
    }

    let output = run_child("uncaught_exception_in_main_reports_and_exits", &[]);
    assert_eq!(output.status.code(), Some(1), "stderr:\n{}", stderr_of(&output));
    assert_uncaught_report(&stderr_of(&output), "Exception in thread \"main\"");
}

#[test]
fn uncaught_exception_on_plain_thread_reports_and_exits() {
    if is_child("uncaught_exception_on_plain_thread_reports_and_exits") {
        let worker = thread::Builder::new()
            .name("worker".into())
            .spawn(throw_new_object)
            .unwrap();
        let _ = worker.join();
        process::exit(SCENARIO_RETURNED);
    }

    let output = run_child("uncaught_exception_on_plain_thread_reports_and_exits", &[]);
    assert_eq!(output.status.code(), Some(1), "stderr:\n{}", stderr_of(&output));
    assert_uncaught_report(&stderr_of(&output), "Exception in thread \"worker\"");
}

#[test]
fn terminate_mode_reports_at_the_throw_site() {
    if is_child("terminate_mode_reports_at_the_throw_site") {
        let e = new_object();
        let caught = catch(|| throw_object(e));
        println!("CAUGHT {caught:?}");
        process::exit(SCENARIO_RETURNED);
    }

    let output = run_child(
        "terminate_mode_reports_at_the_throw_site",
        &[(ENV_UNWIND, "terminate")],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stderr:\n{}", stderr_of(&output));
    assert!(!stdout.contains("CAUGHT"), "catch region was entered:\n{stdout}");
    assert_uncaught_report(&stderr_of(&output), "Exception in ");
}

fn throw_object(e: Ref) {
    throw(e);
}

// ── Traps ──────────────────────────────────────────────────────────

#[test]
fn array_copy_width_mismatch_aborts() {
    if is_child("array_copy_width_mismatch_aborts") {
        let ints = _Jrt_array_new(2, 4);
        let longs = _Jrt_array_new(2, 8);
        unsafe { _Jrt_array_copy(ints, 0, longs, 0, 2) };
        process::exit(SCENARIO_RETURNED);
    }

    let output = run_child("array_copy_width_mismatch_aborts", &[]);
    assert_trapped(
        &output,
        "Attempt to copy between arrays of different element widths (4 != 8).",
    );
}

#[test]
fn strict_monitor_exit_by_non_owner_aborts() {
    if is_child("strict_monitor_exit_by_non_owner_aborts") {
        let lock = new_object();
        unsafe { _Jrt_object_monitorexit(lock) };
        process::exit(SCENARIO_RETURNED);
    }

    let output = run_child(
        "strict_monitor_exit_by_non_owner_aborts",
        &[(ENV_STRICT_MONITORS, "1")],
    );
    assert_trapped(&output, "Monitor exit by a thread that does not own it.");
}

#[test]
fn lenient_monitor_exit_by_non_owner_continues() {
    if is_child("lenient_monitor_exit_by_non_owner_continues") {
        let lock = new_object();
        unsafe {
            _Jrt_object_monitorexit(lock);
            _Jrt_object_monitorenter(lock);
            _Jrt_object_monitorexit(lock);
        }
        process::exit(0);
    }

    let output = run_child("lenient_monitor_exit_by_non_owner_continues", &[]);
    assert_eq!(output.status.code(), Some(0), "stderr:\n{}", stderr_of(&output));
}
