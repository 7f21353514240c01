//! Output classifiers: map a raw output chunk to a number of progress units.
//!
//! The wrapped tools have no progress channel, so every classifier here is a
//! text heuristic. The runner treats them as opaque; alternative classifiers
//! only need to implement [`OutputClassifier`].

use std::cell::RefCell;

use crate::core::lines::{LineCounter, LineRule};

/// Which pipe a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

pub trait OutputClassifier {
    /// Number of progress units represented by `chunk` (0 when none detected).
    fn classify(&self, origin: StreamOrigin, chunk: &str) -> u64;
}

impl<F> OutputClassifier for F
where
    F: Fn(StreamOrigin, &str) -> u64,
{
    fn classify(&self, origin: StreamOrigin, chunk: &str) -> u64 {
        self(origin, chunk)
    }
}

/// Never reports progress; used where only pass/fail matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl OutputClassifier for NoProgress {
    fn classify(&self, _origin: StreamOrigin, _chunk: &str) -> u64 {
        0
    }
}

/// Environment start: one unit per line announcing a created network, volume
/// or container, or a service transitioning through "Starting ... done".
#[derive(Debug, Clone, Copy, Default)]
pub struct StartClassifier;

impl OutputClassifier for StartClassifier {
    fn classify(&self, _origin: StreamOrigin, chunk: &str) -> u64 {
        chunk.lines().filter(|line| is_start_step(line)).count() as u64
    }
}

fn is_start_step(line: &str) -> bool {
    let creating = line.contains("Creating")
        && (line.contains("network") || line.contains("volume") || line.contains("done"));
    let starting = line.contains("Starting") && line.contains("done");
    creating || starting
}

/// Environment stop: one unit whenever "stopping" and "done" show up in the
/// same chunk, case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopClassifier;

impl OutputClassifier for StopClassifier {
    fn classify(&self, _origin: StreamOrigin, chunk: &str) -> u64 {
        let chunk = chunk.to_ascii_lowercase();
        u64::from(chunk.contains("stopping") && chunk.contains("done"))
    }
}

/// Database import: qualifying lines echoed by the verbose client.
///
/// Line-start state is kept per stream across chunks, so one instance serves
/// exactly one invocation.
#[derive(Debug, Clone)]
pub struct ImportClassifier {
    stdout: RefCell<LineCounter>,
    stderr: RefCell<LineCounter>,
}

impl ImportClassifier {
    pub fn new(rule: LineRule) -> Self {
        Self {
            stdout: RefCell::new(LineCounter::new(rule)),
            stderr: RefCell::new(LineCounter::new(rule)),
        }
    }
}

impl Default for ImportClassifier {
    fn default() -> Self {
        Self::new(LineRule::default())
    }
}

impl OutputClassifier for ImportClassifier {
    fn classify(&self, origin: StreamOrigin, chunk: &str) -> u64 {
        let counter = match origin {
            StreamOrigin::Stdout => &self.stdout,
            StreamOrigin::Stderr => &self.stderr,
        };
        counter.borrow_mut().feed(chunk.as_bytes())
    }
}
