// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::error::Error;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Disk-backed capture of a child's merged stdout and stderr.  The backing
/// temporary file is deleted when the buffer is dropped.
pub struct SpillBuffer {
    file: std::fs::File,
}

impl SpillBuffer {
    pub fn new() -> io::Result<SpillBuffer> {
        Ok(SpillBuffer {
            file: tempfile::tempfile()?,
        })
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Read the captured output.  Rewinds first, so repeated reads see the
    /// whole capture.
    pub fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_lossy(&mut self) -> io::Result<String> {
        Ok(String::from_utf8_lossy(&self.read_bytes()?).into_owned())
    }
}

impl fmt::Debug for SpillBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpillBuffer")
    }
}

/// A non-zero child exit, carrying the argv, the return code, and a handle
/// to the spilled output for lazy reading.
#[derive(Debug)]
pub struct SubprocessFailure {
    pub cmd: Vec<String>,
    pub returncode: i32,
    pub message: String,
    output: Option<SpillBuffer>,
}

impl SubprocessFailure {
    pub fn new(
        cmd: Vec<String>,
        returncode: i32,
        message: String,
        output: Option<SpillBuffer>,
    ) -> SubprocessFailure {
        SubprocessFailure {
            cmd,
            returncode,
            message,
            output,
        }
    }

    /// Write a detailed report to a stream.  The captured output is drawn
    /// from the spill file and consumed; a second call reports the command
    /// and code without the output body.
    pub fn write_info(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        if !self.message.is_empty() {
            writeln!(writer, "{}\n", self.message)?;
        }
        writeln!(
            writer,
            "The following command exited with return code: {}\n\n{}",
            self.returncode,
            self.cmd.join(" ")
        )?;

        if let Some(mut spill) = self.output.take() {
            writeln!(writer, "\nCommand Output: {{\n")?;
            let bytes = spill.read_bytes()?;
            writer.write_all(&bytes)?;
            writeln!(writer, "\n}}")?;
        }

        Ok(())
    }
}

impl fmt::Display for SubprocessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command '{}' exited with return code {}",
            self.cmd.join(" "),
            self.returncode
        )
    }
}

#[derive(Debug)]
pub enum ProcessError {
    Failed(SubprocessFailure),
    Timeout { cmd: Vec<String>, timeout: Duration },
    Io { cmd: Vec<String>, source: io::Error },
}

impl Error for ProcessError {}
impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Failed(failure) => write!(f, "{}", failure),
            ProcessError::Timeout { cmd, timeout } => write!(
                f,
                "Command '{}' timed out after {:.1}s",
                cmd.join(" "),
                timeout.as_secs_f64()
            ),
            ProcessError::Io { cmd, source } => {
                write!(f, "Error executing command '{}': {}", cmd.join(" "), source)
            }
        }
    }
}

/// Options accepted by `TaskContext::call` and its convenience variants.
#[derive(Clone)]
pub struct CallOptions {
    /// Bytes piped to the child's stdin.  Without them, stdin is null.
    pub stdin: Option<Vec<u8>>,
    /// Run the command line through the system shell.
    pub shell: bool,
    /// Return the child's exit code instead of failing on non-zero exit.
    pub ignore_errors: bool,
    /// Discard the child's output instead of writing it to the task buffer.
    pub silent: bool,
    /// Write the joined command line to the task buffer before spawning.
    pub print_cmd: bool,
    /// Retain the full output capture on success.
    pub collect_output: bool,
    /// Fail with a timeout error if the child runs longer than this.
    pub timeout: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> CallOptions {
        CallOptions {
            stdin: None,
            shell: false,
            ignore_errors: false,
            silent: false,
            print_cmd: true,
            collect_output: false,
            timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub code: i32,
    pub output: Option<SpillBuffer>,
}

fn process_io_error(cmd: &[String], source: io::Error) -> ProcessError {
    ProcessError::Io {
        cmd: cmd.to_vec(),
        source,
    }
}

#[cfg(unix)]
fn shell_argv(cmd: &[String]) -> Vec<String> {
    vec![
        String::from("/bin/sh"),
        String::from("-c"),
        cmd.join(" "),
    ]
}

#[cfg(windows)]
fn shell_argv(cmd: &[String]) -> Vec<String> {
    vec![String::from("cmd"), String::from("/C"), cmd.join(" ")]
}

/// Spawn a child with stdout and stderr merged into one stream, teeing the
/// stream into `tee` (typically the task's output buffer) and a spill file.
///
/// On non-zero exit with `ignore_errors` unset, the spill file travels in
/// the returned failure for lazy reading.
pub fn run_process(
    cmd: &[String],
    opts: &CallOptions,
    mut tee: Option<&mut dyn Write>,
) -> Result<ProcessOutcome, ProcessError> {
    if cmd.is_empty() {
        return Err(process_io_error(
            cmd,
            io::Error::new(io::ErrorKind::InvalidInput, "no command given"),
        ));
    }

    let argv = if opts.shell { shell_argv(cmd) } else { cmd.to_vec() };

    let (reader, writer) = os_pipe::pipe().map_err(|e| process_io_error(&argv, e))?;
    let writer_clone = writer.try_clone().map_err(|e| process_io_error(&argv, e))?;

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    command.stdout(writer);
    command.stderr(writer_clone);
    if opts.stdin.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    let mut child = command.spawn().map_err(|e| process_io_error(&argv, e))?;
    // The Command keeps copies of the pipe writers; the reader only sees
    // EOF once they are gone
    drop(command);

    if let Some(bytes) = opts.stdin.clone() {
        if let Some(mut child_stdin) = child.stdin.take() {
            thread::spawn(move || {
                let _ = child_stdin.write_all(&bytes);
            });
        }
    }

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let mut pipe_reader = reader;
    let reader_thread = thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe_reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let keep_spill = !opts.ignore_errors || opts.collect_output;
    let mut spill = if keep_spill {
        Some(SpillBuffer::new().map_err(|e| process_io_error(&argv, e))?)
    } else {
        None
    };

    let deadline = opts.timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;

    loop {
        match rx.recv_timeout(Duration::from_millis(25)) {
            Ok(chunk) => {
                if !opts.silent {
                    if let Some(w) = tee.as_mut() {
                        let _ = w.write_all(&chunk);
                    }
                }
                if let Some(s) = spill.as_mut() {
                    let _ = s.append(&chunk);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if !timed_out {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    timed_out = true;
                    let _ = child.kill();
                }
            }
        }
    }

    let _ = reader_thread.join();

    let code = wait_with_deadline(&mut child, deadline, &mut timed_out, &argv)?;

    if timed_out {
        return Err(ProcessError::Timeout {
            cmd: argv,
            timeout: opts.timeout.unwrap_or_default(),
        });
    }

    if code != 0 && !opts.ignore_errors {
        return Err(ProcessError::Failed(SubprocessFailure::new(
            argv,
            code,
            String::new(),
            spill,
        )));
    }

    Ok(ProcessOutcome {
        code,
        output: if opts.collect_output { spill } else { None },
    })
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
    timed_out: &mut bool,
    argv: &[String],
) -> Result<i32, ProcessError> {
    loop {
        match child.try_wait().map_err(|e| process_io_error(argv, e))? {
            Some(status) => return Ok(status.code().unwrap_or(-1)),
            None => {
                if !*timed_out {
                    if let Some(d) = deadline {
                        if Instant::now() >= d {
                            *timed_out = true;
                            let _ = child.kill();
                        }
                    }
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// Run a command and return its merged output, failing on non-zero exit.
pub fn check_output(cmd: &[String], opts: &CallOptions) -> Result<Vec<u8>, ProcessError> {
    let mut opts = opts.clone();
    opts.collect_output = true;
    opts.silent = true;

    let outcome = run_process(cmd, &opts, None)?;
    match outcome.output {
        Some(mut spill) => spill
            .read_bytes()
            .map_err(|e| process_io_error(cmd, e)),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| String::from(*s)).collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_command_tees_output() {
        let mut captured: Vec<u8> = Vec::new();
        let outcome = run_process(
            &cmd(&["echo", "hello"]),
            &CallOptions::default(),
            Some(&mut captured),
        )
        .unwrap();
        assert_eq!(outcome.code, 0);
        assert_eq!(String::from_utf8_lossy(&captured), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_is_merged() {
        let output = check_output(
            &cmd(&["sh", "-c", "echo out; echo err 1>&2"]),
            &CallOptions::default(),
        )
        .unwrap();
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_fails_with_output() {
        let err = run_process(
            &cmd(&["sh", "-c", "echo boom; exit 3"]),
            &CallOptions::default(),
            None,
        )
        .unwrap_err();

        match err {
            ProcessError::Failed(mut failure) => {
                assert_eq!(failure.returncode, 3);
                let mut report: Vec<u8> = Vec::new();
                failure.write_info(&mut report).unwrap();
                let report = String::from_utf8_lossy(&report).into_owned();
                assert!(report.contains("return code: 3"));
                assert!(report.contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_ignore_errors_returns_code() {
        let outcome = run_process(
            &cmd(&["sh", "-c", "exit 5"]),
            &CallOptions {
                ignore_errors: true,
                ..CallOptions::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome.code, 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let start = Instant::now();
        let err = run_process(
            &cmd(&["sleep", "10"]),
            &CallOptions {
                timeout: Some(Duration::from_millis(200)),
                ..CallOptions::default()
            },
            None,
        )
        .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(5));
        match err {
            ProcessError::Timeout { cmd: argv, .. } => assert_eq!(argv[0], "sleep"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_mode() {
        let output = check_output(
            &cmd(&["echo shell_works"]),
            &CallOptions {
                shell: true,
                ..CallOptions::default()
            },
        )
        .unwrap();
        assert!(String::from_utf8_lossy(&output).contains("shell_works"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_bytes() {
        let output = check_output(
            &cmd(&["cat"]),
            &CallOptions {
                stdin: Some(Vec::from(&b"piped input"[..])),
                ..CallOptions::default()
            },
        )
        .unwrap();
        assert_eq!(String::from_utf8_lossy(&output), "piped input");
    }

    #[test]
    fn test_missing_command_is_io_error() {
        let err = run_process(
            &cmd(&["definitely-not-a-real-command-zzz"]),
            &CallOptions::default(),
            None,
        )
        .unwrap_err();
        match err {
            ProcessError::Io { .. } => {}
            other => panic!("unexpected error: {}", other),
        }
    }
}
