//! Subprocess execution with line streaming and guaranteed cleanup.
//!
//! [`ProcessCommand`] describes a program invocation. [`ProcessCommand::run`]
//! captures stdout as a string, [`ProcessCommand::start`] yields stdout lines
//! as they arrive. Standard error is never yielded; it is drained and logged.
//!
//! A started process is always reaped. Dropping a [`ProcessLines`] before
//! the stream is exhausted sends SIGTERM to the process group, waits for a
//! short grace period, then kills and waits.

use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn, Level};

use crate::error::{Error, Result};

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1000);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How standard error is consumed while stdout is streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Drained on a background thread while stdout is read.
    #[default]
    Background,
    /// Drained on the consuming thread once stdout reaches EOF.
    ///
    /// A process that writes more than a pipe buffer of stderr before
    /// closing stdout will block in this mode.
    Inline,
    /// Sent to the null device.
    Discard,
}

/// A program invocation.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: OsString,
    args: Vec<OsString>,
    program_name: Option<String>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    stdout_log_level: Option<Level>,
    stderr_log_level: Option<Level>,
    stderr_mode: StderrMode,
    check: bool,
    strip: bool,
    grace_period: Duration,
}

impl ProcessCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            program_name: None,
            current_dir: None,
            envs: Vec::new(),
            stdout_log_level: None,
            stderr_log_level: Some(Level::DEBUG),
            stderr_mode: StderrMode::default(),
            check: true,
            strip: true,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Name used as the log prefix. Defaults to the program path.
    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Level at which stdout lines are logged. `None` disables logging.
    pub fn stdout_log_level(mut self, level: Option<Level>) -> Self {
        self.stdout_log_level = level;
        self
    }

    /// Level at which stderr lines are logged. `None` disables logging.
    pub fn stderr_log_level(mut self, level: Option<Level>) -> Self {
        self.stderr_log_level = level;
        self
    }

    pub fn stderr_mode(mut self, mode: StderrMode) -> Self {
        self.stderr_mode = mode;
        self
    }

    /// Whether a non-zero exit code is reported as [`Error::ProcessFailure`].
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Whether [`run`](Self::run) trims surrounding whitespace.
    pub fn strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// The command line, for messages.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn label(&self) -> String {
        self.program_name
            .clone()
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Spawns the process and returns a stream over its stdout lines.
    pub fn start(&self) -> Result<ProcessLines> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(match self.stderr_mode {
                StderrMode::Discard => Stdio::null(),
                _ => Stdio::piped(),
            });
        if let Some(ref dir) = self.current_dir {
            command.current_dir(dir);
        }
        command.envs(self.envs.iter().map(|(k, v)| (k, v)));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let command_line = self.display();
        debug!("Starting process: {}", command_line);
        let mut child = command.spawn().map_err(|source| Error::ProcessSpawn {
            command: command_line.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = child.stderr.take();
        let label = self.label();

        let mut lines = ProcessLines {
            child,
            command: command_line,
            label,
            stdout,
            inline_stderr: None,
            stderr_thread: None,
            stdout_log_level: self.stdout_log_level,
            stderr_log_level: self.stderr_log_level,
            check: self.check,
            grace_period: self.grace_period,
            finished: false,
            reaped: false,
        };

        match (self.stderr_mode, stderr) {
            (StderrMode::Background, Some(stderr)) => {
                let label = lines.label.clone();
                let level = lines.stderr_log_level;
                let handle = std::thread::Builder::new()
                    .name(format!("{}-stderr", label))
                    .spawn(move || drain_stderr(stderr, &label, level))?;
                lines.stderr_thread = Some(handle);
            }
            (StderrMode::Inline, Some(stderr)) => lines.inline_stderr = Some(stderr),
            _ => {}
        }

        Ok(lines)
    }

    /// Runs the process to completion and returns its stdout.
    pub fn run(&self) -> Result<String> {
        let lines = self.start()?.collect::<Result<Vec<String>>>()?;
        let output = lines.join("\n");
        if self.strip {
            Ok(output.trim().to_string())
        } else {
            Ok(output)
        }
    }
}

/// Lazy, finite stream of a running process's stdout lines.
///
/// The final item is an [`Error::ProcessFailure`] when checking is enabled
/// and the process exited non-zero.
pub struct ProcessLines {
    child: Child,
    command: String,
    label: String,
    stdout: Option<BufReader<ChildStdout>>,
    inline_stderr: Option<ChildStderr>,
    stderr_thread: Option<JoinHandle<()>>,
    stdout_log_level: Option<Level>,
    stderr_log_level: Option<Level>,
    check: bool,
    grace_period: Duration,
    finished: bool,
    reaped: bool,
}

impl ProcessLines {
    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn read_line(&mut self) -> Option<std::io::Result<String>> {
        let reader = self.stdout.as_mut()?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        if let Some(stderr) = self.inline_stderr.take() {
            drain_stderr(stderr, &self.label, self.stderr_log_level);
        }
        let status = self.child.wait()?;
        self.reaped = true;
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
        debug!("Process exited: {} ({})", self.command, status);
        if self.check && !status.success() {
            return Err(Error::ProcessFailure {
                command: self.command.clone(),
                code: status.code(),
            });
        }
        Ok(())
    }

    fn terminate(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            self.reaped = true;
            return;
        }

        debug!("Terminating process: {}", self.command);
        self.signal_terminate();

        let deadline = Instant::now() + self.grace_period;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => {
                    self.reaped = true;
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                _ => break,
            }
        }

        warn!("Process ignored termination, killing: {}", self.command);
        self.signal_kill();
        let _ = self.child.wait();
        self.reaped = true;
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // Negative pid addresses the whole process group.
        let pgid = Pid::from_raw(-(self.child.id() as i32));
        if kill(pgid, Signal::SIGTERM).is_err() {
            let _ = kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        let _ = self.child.kill();
    }

    #[cfg(unix)]
    fn signal_kill(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(-(self.child.id() as i32)), Signal::SIGKILL);
        let _ = self.child.kill();
    }

    #[cfg(not(unix))]
    fn signal_kill(&mut self) {
        let _ = self.child.kill();
    }
}

impl Iterator for ProcessLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_line() {
            Some(Ok(line)) => {
                log_line(self.stdout_log_level, &self.label, &line);
                return Some(Ok(line));
            }
            Some(Err(e)) => {
                self.finished = true;
                return Some(Err(Error::Io(e)));
            }
            None => {}
        }
        self.finished = true;
        self.finish().err().map(Err)
    }
}

impl Drop for ProcessLines {
    fn drop(&mut self) {
        if !self.reaped {
            self.stdout = None;
            self.terminate();
        }
    }
}

fn drain_stderr(stderr: impl Read, label: &str, level: Option<Level>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                log_line(level, label, line.trim_end_matches(['\n', '\r']));
            }
        }
    }
}

fn log_line(level: Option<Level>, label: &str, line: &str) {
    let Some(level) = level else {
        return;
    };
    if level == Level::ERROR {
        error!("[{}] | {}", label, line);
    } else if level == Level::WARN {
        warn!("[{}] | {}", label, line);
    } else if level == Level::INFO {
        info!("[{}] | {}", label, line);
    } else if level == Level::DEBUG {
        debug!("[{}] | {}", label, line);
    } else {
        trace!("[{}] | {}", label, line);
    }
}
