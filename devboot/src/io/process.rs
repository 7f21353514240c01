//! Supervised execution of external pipelines with streaming progress.
//!
//! Every captured pipe is drained by its own reader thread, so a child that
//! fills one pipe while we wait on another never deadlocks. Chunks travel over
//! a channel to the supervising thread, which classifies them, advances the
//! tracker, and enforces the deadline.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::classifier::{OutputClassifier, StreamOrigin};
use crate::core::pipeline::{Pipeline, Stage};
use crate::error::EngineError;
use crate::io::progress::ProgressTracker;

pub const CHUNK_SIZE: usize = 8192;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 10_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to keep reading after every stage exited while a pipe stays open
/// (a detached grandchild can hold it forever).
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One invocation: what to run, where, and within which budget.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub pipeline: Pipeline,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub expected_units: u64,
    /// Bytes kept per captured stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

impl RunRequest {
    pub fn new(
        pipeline: Pipeline,
        workdir: impl Into<PathBuf>,
        timeout_secs: u64,
        expected_units: u64,
    ) -> Self {
        Self {
            pipeline,
            workdir: workdir.into(),
            timeout: Duration::from_secs(timeout_secs),
            expected_units,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_output_limit(mut self, output_limit_bytes: usize) -> Self {
        self.output_limit_bytes = output_limit_bytes;
        self
    }
}

/// Terminal result of an invocation that ran to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Every stage exited with code zero.
    pub success: bool,
    /// Exit code of the last stage (`None` when killed by a signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// Tracker position reached from classified output, before the bar is
    /// normalized on success.
    pub units_observed: u64,
}

enum Event {
    Chunk(StreamOrigin, Vec<u8>),
    ReadFailed(StreamOrigin, io::Error),
}

struct RunningStage {
    program: String,
    child: Child,
    status: Option<ExitStatus>,
}

/// Run `request.pipeline` to completion or timeout.
///
/// The tracker is reset to `request.expected_units` before anything is spawned,
/// finished on success and abandoned at its reached position otherwise.
#[instrument(skip_all, fields(
    command = %request.pipeline.render(),
    timeout_secs = request.timeout.as_secs(),
    expected_units = request.expected_units
))]
pub fn run_pipeline<C>(
    request: &RunRequest,
    classifier: &C,
    tracker: &mut ProgressTracker,
) -> Result<ProcessResult, EngineError>
where
    C: OutputClassifier + ?Sized,
{
    tracker.reset(request.expected_units)?;
    let deadline = Instant::now().checked_add(request.timeout).ok_or_else(|| {
        EngineError::InvalidCommand {
            reason: format!("timeout of {}s is out of range", request.timeout.as_secs()),
        }
    })?;

    let (tx, rx) = mpsc::channel();
    let mut stages = spawn_stages(request, &tx)?;
    drop(tx);

    let mut collector = Collector {
        classifier,
        tracker,
        stdout: Capture::new(request.output_limit_bytes),
        stderr: Capture::new(request.output_limit_bytes),
    };

    let finished = supervise(&rx, &mut stages, deadline, &mut collector)?;
    if !finished {
        warn!(
            timeout_secs = request.timeout.as_secs(),
            "command timed out, killing"
        );
        kill_all(&mut stages);
        collector.drain(&rx, DRAIN_GRACE);
        collector.tracker.abandon();
        let (stdout, _) = collector.stdout.into_string();
        let (stderr, _) = collector.stderr.into_string();
        return Err(EngineError::Timeout {
            command: request.pipeline.render(),
            timeout_secs: request.timeout.as_secs(),
            stdout,
            stderr,
        });
    }

    let success = stages
        .iter()
        .all(|stage| stage.status.is_some_and(|status| status.success()));
    let exit_code = stages
        .last()
        .and_then(|stage| stage.status)
        .and_then(|status| status.code());
    for stage in stages.iter().filter(|s| !s.status.is_some_and(|st| st.success())) {
        debug!(program = %stage.program, status = ?stage.status, "stage failed");
    }

    let units_observed = collector.tracker.state().current();
    if success {
        collector.tracker.finish();
    } else {
        collector.tracker.abandon();
    }

    let (stdout, stdout_truncated) = collector.stdout.into_string();
    let (stderr, stderr_truncated) = collector.stderr.into_string();
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?exit_code, success, units_observed, "command finished");
    Ok(ProcessResult {
        success,
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        units_observed,
    })
}

/// Pump events until every stage has exited and its output is drained.
/// Returns `false` when the deadline passed first.
fn supervise<C: OutputClassifier + ?Sized>(
    rx: &Receiver<Event>,
    stages: &mut [RunningStage],
    deadline: Instant,
    collector: &mut Collector<'_, C>,
) -> Result<bool, EngineError> {
    let mut streams_open = true;
    let mut exited_at: Option<Instant> = None;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        if streams_open {
            match rx.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
                Ok(event) => collector.accept(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => streams_open = false,
            }
        }

        if poll_exits(stages)? {
            if !streams_open {
                return Ok(true);
            }
            let since = *exited_at.get_or_insert_with(Instant::now);
            if since.elapsed() >= DRAIN_GRACE {
                warn!("output pipes still open after exit, detaching readers");
                collector.drain_pending(rx);
                return Ok(true);
            }
        } else if !streams_open {
            // Output is closed; only the exit is left to wait for.
            for stage in stages.iter_mut().filter(|s| s.status.is_none()) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match stage
                    .child
                    .wait_timeout(remaining)
                    .map_err(|e| EngineError::io(format!("wait for {}", stage.program), e))?
                {
                    Some(status) => stage.status = Some(status),
                    None => break,
                }
            }
        }
    }
}

/// Record exits without blocking; true once every stage has exited.
fn poll_exits(stages: &mut [RunningStage]) -> Result<bool, EngineError> {
    for stage in stages.iter_mut().filter(|s| s.status.is_none()) {
        stage.status = stage
            .child
            .try_wait()
            .map_err(|e| EngineError::io(format!("poll {}", stage.program), e))?;
    }
    Ok(stages.iter().all(|stage| stage.status.is_some()))
}

fn spawn_stages(
    request: &RunRequest,
    tx: &Sender<Event>,
) -> Result<Vec<RunningStage>, EngineError> {
    let stages = request.pipeline.stages();
    let merge = request.pipeline.merge_streams();
    let mut running: Vec<RunningStage> = Vec::with_capacity(stages.len());
    let mut upstream: Option<ChildStdout> = None;

    for (index, stage) in stages.iter().enumerate() {
        let is_last = index + 1 == stages.len();
        let mut cmd = stage_command(stage, request, upstream.take(), &running);

        debug!(program = %stage.program, index, "spawning child process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(program = %stage.program, err = %e, "failed to spawn command");
                kill_all(&mut running);
                return Err(EngineError::Spawn {
                    program: stage.program.clone(),
                    source: e,
                });
            }
        };

        let stderr_origin = if merge {
            StreamOrigin::Stdout
        } else {
            StreamOrigin::Stderr
        };
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, stderr_origin, tx.clone());
        }
        if is_last {
            if let Some(stdout) = child.stdout.take() {
                spawn_reader(stdout, StreamOrigin::Stdout, tx.clone());
            }
        } else {
            upstream = child.stdout.take();
        }

        running.push(RunningStage {
            program: stage.program.clone(),
            child,
            status: None,
        });
    }

    Ok(running)
}

fn stage_command(
    stage: &Stage,
    request: &RunRequest,
    upstream: Option<ChildStdout>,
    running: &[RunningStage],
) -> Command {
    let mut cmd = Command::new(&stage.program);
    cmd.args(&stage.args)
        .current_dir(&request.workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    match upstream {
        Some(out) => cmd.stdin(Stdio::from(out)),
        None => cmd.stdin(Stdio::null()),
    };

    // All stages share the first stage's process group so a timeout can take
    // down the whole pipeline, grandchildren included.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let pgid = running
            .first()
            .and_then(|stage| i32::try_from(stage.child.id()).ok())
            .unwrap_or(0);
        cmd.process_group(pgid);
    }
    #[cfg(not(unix))]
    let _ = running;

    cmd
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, origin: StreamOrigin, tx: Sender<Event>) {
    thread::spawn(move || {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Event::Chunk(origin, chunk[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(Event::ReadFailed(origin, e));
                    break;
                }
            }
        }
    });
}

fn kill_all(stages: &mut [RunningStage]) {
    // The group outlives its leader while any member is unreaped, so the id
    // cannot have been recycled yet.
    #[cfg(unix)]
    if let Some(first) = stages.first()
        && stages.iter().any(|stage| stage.status.is_none())
    {
        kill_process_group(first.child.id());
    }
    for stage in stages.iter_mut().filter(|s| s.status.is_none()) {
        if let Err(e) = stage.child.kill() {
            debug!(program = %stage.program, err = %e, "kill failed (already exited?)");
        }
        match stage.child.wait() {
            Ok(status) => stage.status = Some(status),
            Err(e) => warn!(program = %stage.program, err = %e, "wait after kill failed"),
        }
    }
}

/// Signal the whole group through the shell's `kill` builtin, which accepts
/// negative pids everywhere `sh` exists.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -9 -{pgid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => debug!(pgid, "killed process group"),
        Ok(status) => debug!(pgid, code = ?status.code(), "process group already gone"),
        Err(e) => warn!(pgid, err = %e, "failed to run kill for process group"),
    }
}

struct Collector<'a, C: ?Sized> {
    classifier: &'a C,
    tracker: &'a mut ProgressTracker,
    stdout: Capture,
    stderr: Capture,
}

impl<C: OutputClassifier + ?Sized> Collector<'_, C> {
    fn accept(&mut self, event: Event) {
        match event {
            Event::Chunk(origin, bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let units = self.classifier.classify(origin, &text);
                self.tracker.advance(units);
                match origin {
                    StreamOrigin::Stdout => self.stdout.push(&bytes),
                    StreamOrigin::Stderr => self.stderr.push(&bytes),
                }
            }
            Event::ReadFailed(origin, e) => {
                warn!(?origin, err = %e, "failed to read child output");
            }
        }
    }

    fn drain_pending(&mut self, rx: &Receiver<Event>) {
        while let Ok(event) = rx.try_recv() {
            self.accept(event);
        }
    }

    /// Read until every writer hung up or `grace` has passed, whichever
    /// comes first.
    fn drain(&mut self, rx: &Receiver<Event>, grace: Duration) {
        let until = Instant::now() + grace;
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(event) => self.accept(event),
                Err(_) => break,
            }
        }
    }
}

struct Capture {
    buf: Vec<u8>,
    truncated: usize,
    limit: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            truncated: 0,
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let keep = chunk.len().min(remaining);
        self.buf.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }

    fn into_string(self) -> (String, usize) {
        (String::from_utf8_lossy(&self.buf).into_owned(), self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_truncates_beyond_limit() {
        let mut capture = Capture::new(5);
        capture.push(b"abc");
        capture.push(b"defg");
        capture.push(b"h");
        let (text, truncated) = capture.into_string();
        assert_eq!(text, "abcde");
        assert_eq!(truncated, 3);
    }

    #[test]
    fn zero_expected_units_fails_before_spawn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = RunRequest::new(
            Pipeline::single(Stage::new("definitely-not-a-binary-devboot", Vec::<String>::new())),
            temp.path(),
            1,
            0,
        );
        let mut tracker = ProgressTracker::hidden(1).expect("tracker");
        let err = run_pipeline(&request, &crate::core::classifier::NoProgress, &mut tracker)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTotal { total: 0 }));
    }

    #[test]
    fn unrepresentable_timeout_is_rejected_before_spawn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = RunRequest::new(
            Pipeline::single(Stage::new("definitely-not-a-binary-devboot", Vec::<String>::new())),
            temp.path(),
            u64::MAX,
            1,
        );
        let mut tracker = ProgressTracker::hidden(1).expect("tracker");
        let err = run_pipeline(&request, &crate::core::classifier::NoProgress, &mut tracker)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand { .. }));
    }

    #[test]
    fn drain_stops_at_grace_even_while_events_keep_coming() {
        let (tx, rx) = mpsc::channel();
        let writer = thread::spawn(move || {
            for _ in 0..40 {
                if tx.send(Event::Chunk(StreamOrigin::Stdout, b"x\n".to_vec())).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        });
        let mut tracker = ProgressTracker::hidden(1).expect("tracker");
        let mut collector = Collector {
            classifier: &crate::core::classifier::NoProgress,
            tracker: &mut tracker,
            stdout: Capture::new(1_000),
            stderr: Capture::new(1_000),
        };

        let started = Instant::now();
        collector.drain(&rx, Duration::from_millis(200));
        let elapsed = started.elapsed();
        drop(rx);
        writer.join().expect("writer thread");

        assert!(elapsed < Duration::from_millis(1_000), "drain took {elapsed:?}");
        assert!(!collector.stdout.buf.is_empty());
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = RunRequest::new(
            Pipeline::single(Stage::new("definitely-not-a-binary-devboot", ["x"])),
            temp.path(),
            5,
            1,
        );
        let mut tracker = ProgressTracker::hidden(1).expect("tracker");
        let err = run_pipeline(&request, &crate::core::classifier::NoProgress, &mut tracker)
            .unwrap_err();
        match err {
            EngineError::Spawn { program, .. } => {
                assert_eq!(program, "definitely-not-a-binary-devboot");
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
