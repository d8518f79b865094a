//! Command Executor - the single seam to external tools
//!
//! Runs one external command, waits for it, captures exit status and
//! output, and tees every output line into the log at debug level.
//! It does NOT interpret results: the step runner classifies them.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;
use tracing::{debug, trace};

/// Maximum output kept in memory per stream
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Exit codes besides 0 that mean "nothing to do"
    pub benign_codes: Vec<i32>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            benign_codes: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn benign_codes(mut self, codes: &[i32]) -> Self {
        self.benign_codes.extend_from_slice(codes);
        self
    }

    /// Command line as it would be typed
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// What a finished command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Zero, or one of the command's benign codes
    pub fn succeeded(&self, spec: &CommandSpec) -> bool {
        match self.exit_code {
            Some(0) => true,
            Some(code) => spec.benign_codes.contains(&code),
            None => false,
        }
    }

    /// True only for a benign non-zero code
    pub fn was_noop(&self, spec: &CommandSpec) -> bool {
        matches!(self.exit_code, Some(code) if code != 0 && spec.benign_codes.contains(&code))
    }

    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit {}", code),
            None => "killed by signal".to_string(),
        }
    }

    /// Last non-empty stderr line, for outcome messages
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// Executes external commands
pub trait CommandRunner {
    /// Run to completion; `Err` only when the process could not be started
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

// ============================================================================
// System runner (production)
// ============================================================================

/// Runs real processes with stdin detached
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let start = Instant::now();
        debug!(target: "hostkeep::exec", "running: {}", spec);

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let program = spec.program.as_str();

        let (stdout, stderr) = thread::scope(|s| {
            let out = s.spawn(|| tee_lines(stdout, program, "stdout"));
            let err = s.spawn(|| tee_lines(stderr, program, "stderr"));
            (out.join().unwrap_or_default(), err.join().unwrap_or_default())
        });

        let status = child.wait()?;
        let output = CommandOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            target: "hostkeep::exec",
            "finished: {} ({}, {}ms)",
            spec,
            output.describe_exit(),
            output.duration_ms
        );
        Ok(output)
    }
}

fn tee_lines<R: Read>(stream: Option<R>, program: &str, channel: &str) -> String {
    let Some(stream) = stream else {
        return String::new();
    };
    let mut reader = BufReader::new(stream);
    let mut captured = String::new();
    let mut truncated = false;
    let mut buf = Vec::new();
    // read to EOF even past the cap so the child never sees a closed pipe
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(target: "hostkeep::exec", "[{} {}] read error: {}", program, channel, e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        debug!(target: "hostkeep::exec", "[{} {}] {}", program, channel, line);
        if truncated {
            continue;
        }
        if captured.len() + line.len() < MAX_OUTPUT_BYTES {
            captured.push_str(line);
            captured.push('\n');
        } else {
            truncated = true;
            trace!(target: "hostkeep::exec", "output of {} truncated in memory", program);
        }
    }
    captured
}

// ============================================================================
// Fake runner (tests)
// ============================================================================

/// Scripted response for a command line prefix
#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Simulate a program that cannot be spawned
    pub spawn_error: bool,
}

impl FakeResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            spawn_error: false,
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
            spawn_error: false,
        }
    }

    pub fn not_found() -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            spawn_error: true,
        }
    }
}

/// Deterministic runner: answers by longest matching command-line prefix,
/// records every invocation, and never touches the host
#[derive(Debug, Default)]
pub struct FakeRunner {
    responses: Vec<(String, FakeResponse)>,
    queued: Mutex<Vec<(String, VecDeque<FakeResponse>)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    /// Every command succeeds with empty output unless scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for commands starting with `prefix`
    pub fn respond(mut self, prefix: &str, response: FakeResponse) -> Self {
        self.responses.push((prefix.to_string(), response));
        self
    }

    /// Script a one-shot response, consumed before the permanent ones
    pub fn respond_once(self, prefix: &str, response: FakeResponse) -> Self {
        {
            let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
            match queued.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, q)) => q.push_back(response),
                None => queued.push((prefix.to_string(), VecDeque::from([response]))),
            }
        }
        self
    }

    /// Command lines run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of invocations whose command line starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn lookup(&self, line: &str) -> FakeResponse {
        {
            let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
            let best = queued
                .iter_mut()
                .filter(|(p, q)| line.starts_with(p.as_str()) && !q.is_empty())
                .max_by_key(|(p, _)| p.len());
            if let Some((_, q)) = best {
                if let Some(resp) = q.pop_front() {
                    return resp;
                }
            }
        }
        self.responses
            .iter()
            .filter(|(p, _)| line.starts_with(p.as_str()))
            .max_by_key(|(p, _)| p.len())
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| FakeResponse::ok(""))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let line = spec.command_line();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        let resp = self.lookup(&line);
        if resp.spawn_error {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", spec.program),
            ));
        }
        Ok(CommandOutput {
            exit_code: resp.exit_code,
            stdout: resp.stdout,
            stderr: resp.stderr,
            duration_ms: 0,
        })
    }
}
