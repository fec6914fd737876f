//! Subprocess execution for builder commands
//!
//! Every command races the child against the cancellation token. On
//! cancellation the child gets SIGINT so the builder can abort cleanly, and
//! the call returns `Cancelled` once the child has exited.

use crate::cancel::CancelToken;
use crate::error::{KilnError, KilnResult};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Callback receiving each output line as it arrives
pub type LineSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A finished command with its captured streams
#[derive(Debug, Clone, Default)]
pub struct Finished {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Finished {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a failed run into a `Backend` error carrying the diagnostic
    /// text unmodified. Stderr is preferred; stdout is used when stderr is
    /// empty.
    pub fn into_result(self, command: &str) -> KilnResult<Self> {
        if self.success() {
            return Ok(self);
        }
        let output = if self.stderr.is_empty() {
            self.stdout
        } else {
            self.stderr
        };
        Err(KilnError::Backend {
            command: command.to_string(),
            output,
            code: self.code.unwrap_or(-1),
        })
    }
}

/// Run `command`, feeding `stdin` and passing every line to `on_output`.
///
/// `command_line` is the human readable command used in logs and errors.
pub async fn run(
    mut command: Command,
    command_line: &str,
    stdin: Option<&str>,
    cancel: &CancelToken,
    on_output: LineSink<'_>,
) -> KilnResult<Finished> {
    if cancel.is_cancelled() {
        return Err(KilnError::Cancelled);
    }

    debug!("Executing: {}", command_line);

    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| KilnError::command_failed(command_line, e))?;

    if let Some(input) = stdin {
        feed_stdin(&mut child, input)?;
    }

    let streamed = tokio::select! {
        streams = stream_child_output(&mut child, on_output) => Some(streams),
        _ = cancel.cancelled() => None,
    };

    let Some(streams) = streamed else {
        interrupt(&child);
        let _ = child.wait().await;
        return Err(KilnError::Cancelled);
    };
    let (stdout, stderr) = streams?;

    let status = child
        .wait()
        .await
        .map_err(|e| KilnError::command_failed(command_line, e))?;

    debug!("{} exited with {}", command_line, status);

    Ok(Finished {
        code: status.code(),
        stdout,
        stderr,
    })
}

/// Write `input` to the child's stdin from a separate task so a child that
/// writes before draining stdin cannot block us.
fn feed_stdin(child: &mut Child, input: &str) -> KilnResult<()> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| KilnError::Internal("child stdin not piped".to_string()))?;
    let input = input.to_string();

    tokio::spawn(async move {
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            warn!("Failed to write to builder stdin: {}", e);
        }
        // pipe dropped here, closing stdin
    });
    Ok(())
}

/// Ask the child to stop the way an interactive ^C would
fn interrupt(child: &Child) {
    if let Some(pid) = child.id() {
        debug!("Sending SIGINT to {}", pid);
        // SAFETY: kill(2) with a pid we own has no memory safety concerns
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each
/// line. Returns both streams with line endings normalized to `\n`. Bytes that
/// are not valid UTF-8 are replaced rather than ending the stream, so the pipes
/// are always drained.
async fn stream_child_output(
    child: &mut Child,
    on_output: LineSink<'_>,
) -> KilnResult<(String, String)> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| KilnError::Internal("child stderr not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| KilnError::Internal("child stdout not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr);
    let mut stdout_reader = BufReader::new(stdout);

    // Partial lines survive a losing select! branch in these buffers
    let mut err_line = Vec::new();
    let mut out_line = Vec::new();

    let mut out = String::new();
    let mut err = String::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            read = stderr_reader.read_until(b'\n', &mut err_line), if !stderr_done => {
                let read = read.map_err(|e| KilnError::io("reading builder stderr", e))?;
                if read == 0 {
                    stderr_done = true;
                } else {
                    let line = take_line(&mut err_line);
                    on_output(&line);
                    err.push_str(&line);
                    err.push('\n');
                }
            }
            read = stdout_reader.read_until(b'\n', &mut out_line), if !stdout_done => {
                let read = read.map_err(|e| KilnError::io("reading builder stdout", e))?;
                if read == 0 {
                    stdout_done = true;
                } else {
                    let line = take_line(&mut out_line);
                    on_output(&line);
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
    }

    Ok((out, err))
}

/// Drain `buf` into a line without its terminator
fn take_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

/// Sink that drops every line
pub fn discard(_: &str) {}
