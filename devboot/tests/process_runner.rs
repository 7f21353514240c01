//! Process runner tests against real `/bin/sh` children.
//!
//! Each test spawns small shell scripts to exercise streaming classification,
//! stream merging, pipelines, exit status reporting, and timeout enforcement.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use devboot::core::classifier::{NoProgress, StopClassifier, StreamOrigin};
use devboot::core::pipeline::{Pipeline, Stage};
use devboot::error::EngineError;
use devboot::io::process::{RunRequest, run_pipeline};
use devboot::io::progress::ProgressTracker;

fn sh(script: &str) -> Stage {
    Stage::new("sh", ["-c", script])
}

fn request(pipeline: Pipeline, workdir: &Path, timeout_secs: u64, units: u64) -> RunRequest {
    RunRequest::new(pipeline, workdir, timeout_secs, units)
}

fn count_lines(_origin: StreamOrigin, chunk: &str) -> u64 {
    chunk.lines().filter(|line| line.starts_with("step")).count() as u64
}

#[test]
fn captures_streams_separately_and_classifies() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        Pipeline::single(sh("echo step one; echo step two >&2; echo other")),
        temp.path(),
        10,
        5,
    );
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &count_lines, &mut tracker).expect("run");

    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "step one\nother\n");
    assert_eq!(result.stderr, "step two\n");
    assert_eq!(result.units_observed, 2);
    assert_eq!(tracker.state().total(), 5);
    assert_eq!(tracker.state().current(), 5, "success normalizes to total");
}

#[test]
fn merged_streams_are_tagged_stdout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        Pipeline::single(sh("echo out; echo err >&2")).merged(),
        temp.path(),
        10,
        2,
    );
    let only_stdout = |origin: StreamOrigin, chunk: &str| match origin {
        StreamOrigin::Stdout => chunk.lines().count() as u64,
        StreamOrigin::Stderr => 0,
    };
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &only_stdout, &mut tracker).expect("run");

    assert!(result.stdout.contains("out"));
    assert!(result.stdout.contains("err"));
    assert!(result.stderr.is_empty());
    assert_eq!(result.units_observed, 2);
}

#[test]
fn pipeline_feeds_stages_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let pipeline = Pipeline::new(vec![
        sh("printf 'b\\na\\n'"),
        Stage::new("sort", Vec::<String>::new()),
    ])
    .expect("pipeline");
    let req = request(pipeline, temp.path(), 10, 1);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &NoProgress, &mut tracker).expect("run");

    assert!(result.success);
    assert_eq!(result.stdout, "a\nb\n");
}

#[test]
fn nonzero_exit_is_a_result_not_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(Pipeline::single(sh("echo boom >&2; exit 3")), temp.path(), 10, 4);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &NoProgress, &mut tracker).expect("run");

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stderr, "boom\n");
    assert_eq!(tracker.state().current(), 0, "failure leaves progress where it was");
}

#[test]
fn failing_upstream_stage_fails_the_pipeline() {
    let temp = tempfile::tempdir().expect("tempdir");
    let pipeline = Pipeline::new(vec![
        sh("echo 'cannot decompress' >&2; exit 2"),
        Stage::new("cat", Vec::<String>::new()),
    ])
    .expect("pipeline");
    let req = request(pipeline, temp.path(), 10, 1);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &NoProgress, &mut tracker).expect("run");

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(0), "last stage itself succeeded");
    assert!(result.stderr.contains("cannot decompress"));
}

#[test]
fn command_without_recognized_output_still_terminates() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        Pipeline::single(sh("echo 'Stopping shop_php_1 ...'; echo 'Removing network'")),
        temp.path(),
        10,
        6,
    );
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &StopClassifier, &mut tracker).expect("run");

    assert!(result.success);
    assert_eq!(result.units_observed, 0);
}

#[test]
fn runs_in_requested_workdir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(Pipeline::single(sh("pwd")), temp.path(), 10, 1);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &NoProgress, &mut tracker).expect("run");

    let reported = fs::canonicalize(result.stdout.trim()).expect("canonicalize pwd");
    let expected = fs::canonicalize(temp.path()).expect("canonicalize temp");
    assert_eq!(reported, expected);
}

#[test]
fn large_output_on_both_pipes_does_not_deadlock() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        Pipeline::single(sh(
            "head -c 300000 /dev/zero >&2; head -c 300000 /dev/zero; echo tail",
        )),
        temp.path(),
        20,
        1,
    )
    .with_output_limit(1_000);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let result = run_pipeline(&req, &NoProgress, &mut tracker).expect("run");

    assert!(result.success);
    assert_eq!(result.stdout.len(), 1_000);
    assert_eq!(result.stdout_truncated, 300_005 - 1_000);
    assert_eq!(result.stderr_truncated, 300_000 - 1_000);
}

#[test]
fn timeout_kills_child_and_keeps_partial_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        Pipeline::single(sh("echo started; echo warming >&2; sleep 30")),
        temp.path(),
        1,
        3,
    );
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");
    let started = Instant::now();

    let err = run_pipeline(&req, &NoProgress, &mut tracker).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        EngineError::Timeout {
            timeout_secs,
            stdout,
            stderr,
            ..
        } => {
            assert_eq!(timeout_secs, 1);
            assert_eq!(stdout, "started\n");
            assert_eq!(stderr, "warming\n");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn timeout_leaves_no_orphaned_grandchild() {
    let temp = tempfile::tempdir().expect("tempdir");
    let pid_file = temp.path().join("sleep.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
    let req = request(Pipeline::single(sh(&script)), temp.path(), 1, 1);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");

    let err = run_pipeline(&req, &NoProgress, &mut tracker).unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));

    let pid = fs::read_to_string(&pid_file).expect("read pid file");
    let pid = pid.trim();
    let deadline = Instant::now() + Duration::from_secs(5);
    while process_alive(pid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(!process_alive(pid), "grandchild {pid} survived the timeout");
}

#[cfg(target_os = "linux")]
#[test]
fn writer_outside_the_group_does_not_extend_timeout() {
    if which::which("setsid").is_err() {
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    // Survives the group kill and keeps the stdout pipe busy for ~10s.
    let script = "setsid sh -c 'i=0; while [ $i -lt 100 ]; do echo tick; i=$((i+1)); sleep 0.1; done' & sleep 30";
    let req = request(Pipeline::single(sh(script)), temp.path(), 1, 1);
    let mut tracker = ProgressTracker::hidden(1).expect("tracker");
    let started = Instant::now();

    let err = run_pipeline(&req, &NoProgress, &mut tracker).unwrap_err();

    assert!(matches!(err, EngineError::Timeout { .. }));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "returned after {:?}",
        started.elapsed()
    );
}

/// Running (not zombie) according to `/proc`.
#[cfg(target_os = "linux")]
fn process_alive(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}
