//! Supervisor Side of Sample Isolation
//!
//! Spawns a worker process per sample and exchanges framed messages with it
//! over a pipe pair mapped to fd 3/4 in the child.

use progress_core::Target;
use progress_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, SampleRecord, SupervisorCommand,
    WorkerHello, WorkerMessage, IPC_FD_ENV, PROTOCOL_VERSION, WORKER_FLAG,
};
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll slice while waiting on the worker; bounds how late a crash is noticed
const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),

    #[error("worker crashed: {0}")]
    Crashed(String),

    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },
}

/// What the worker reported for one sample
#[derive(Debug)]
pub enum WorkerReply {
    /// The sample record
    Completed(SampleRecord),
    /// The worker caught a failure and described it
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data on `fd` for at most `timeout`
fn wait_for_data(fd: RawFd, timeout: Duration) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

    // SAFETY: `pollfd` is a valid, initialised array of length 1.
    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return PollResult::Timeout;
        }
        PollResult::Error(err)
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // A dying worker may still have left a complete frame behind
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a close-on-exec pipe, returning (read_fd, write_fd)
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        // SAFETY: `fd` was just returned by pipe(2).
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    // SAFETY: callers only pass descriptors they own and no longer use.
    unsafe {
        libc::close(fd);
    }
}

/// One live worker process
pub struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    hello: WorkerHello,
    timeout: Option<Duration>,
    msg_read_fd: RawFd,
}

impl WorkerHandle {
    /// Start `binary` as a worker and complete the handshake
    pub fn spawn_binary(binary: &Path, timeout: Option<Duration>) -> Result<Self, SupervisorError> {
        // cmd pipe: supervisor writes, worker reads on fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg pipe: worker writes on fd 4, supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::Spawn(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // SAFETY: only async-signal-safe libc calls run between fork and exec.
        unsafe {
            command.pre_exec(move || {
                // Parent-side ends first, so closing them cannot hit fd 3/4 later
                libc::close(cmd_write);
                libc::close(msg_read);

                // Keep msg_write alive while fd 3 is taken over
                let mut msg_fd = msg_write;
                if msg_fd == 3 {
                    msg_fd = libc::dup(msg_fd);
                    if msg_fd < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }

                if cmd_read != 3 {
                    if libc::dup2(cmd_read, 3) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    libc::close(cmd_read);
                }
                let flags = libc::fcntl(3, libc::F_GETFD);
                libc::fcntl(3, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                if msg_fd != 4 {
                    if libc::dup2(msg_fd, 4) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    libc::close(msg_fd);
                }
                let flags = libc::fcntl(4, libc::F_GETFD);
                libc::fcntl(4, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                for fd in [cmd_read, cmd_write, msg_read, msg_write] {
                    close_fd(fd);
                }
                return Err(SupervisorError::Spawn(e));
            }
        };

        // Child-side ends belong to the worker now
        close_fd(cmd_read);
        close_fd(msg_write);

        // SAFETY: the parent-side ends are owned exclusively by this handle.
        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            reader: FrameReader::new(reader_file),
            writer: FrameWriter::new(writer_file),
            hello: WorkerHello::default(),
            timeout,
            msg_read_fd: msg_read,
        };

        handle.hello = match handle.next_message(Instant::now())? {
            WorkerMessage::Hello(hello) => hello,
            other => {
                return Err(SupervisorError::Protocol {
                    expected: "Hello".to_string(),
                    got: describe(&other),
                })
            }
        };
        if handle.hello.protocol_version != PROTOCOL_VERSION {
            return Err(SupervisorError::Protocol {
                expected: format!("protocol version {PROTOCOL_VERSION}"),
                got: format!("protocol version {}", handle.hello.protocol_version),
            });
        }

        tracing::debug!(pid = handle.hello.pid, "worker ready");
        Ok(handle)
    }

    /// Handshake sent by the worker
    pub fn hello(&self) -> &WorkerHello {
        &self.hello
    }

    /// Run one sample of `target` and wait for the reply
    pub fn run_sample(&mut self, target: &Target) -> Result<WorkerReply, SupervisorError> {
        self.writer.write(&SupervisorCommand::Run {
            target_id: target.id.clone(),
            parameters_json: target.parameters.to_json(),
        })?;

        match self.next_message(Instant::now())? {
            WorkerMessage::SampleComplete(record) => Ok(WorkerReply::Completed(record)),
            WorkerMessage::Failure { kind, message } => Ok(WorkerReply::Failed { kind, message }),
            other => Err(SupervisorError::Protocol {
                expected: "SampleComplete/Failure".to_string(),
                got: describe(&other),
            }),
        }
    }

    /// Block until the next message, the worker's death or the timeout
    fn next_message(&mut self, start: Instant) -> Result<WorkerMessage, SupervisorError> {
        loop {
            // A partially buffered frame is completed by the blocking read below
            if !self.reader.has_buffered_data() {
                let slice = match self.timeout {
                    Some(limit) => {
                        let remaining = limit.saturating_sub(start.elapsed());
                        if remaining.is_zero() {
                            self.kill();
                            return Err(SupervisorError::Timeout(limit));
                        }
                        remaining.min(POLL_SLICE)
                    }
                    None => POLL_SLICE,
                };

                match wait_for_data(self.msg_read_fd, slice) {
                    PollResult::DataAvailable => {}
                    PollResult::Timeout => {
                        if !self.is_alive() {
                            // Exit raced the poll; pick up anything it flushed
                            if let PollResult::DataAvailable =
                                wait_for_data(self.msg_read_fd, Duration::ZERO)
                            {
                                continue;
                            }
                            return Err(SupervisorError::Crashed(
                                "worker exited without replying".to_string(),
                            ));
                        }
                        continue;
                    }
                    PollResult::PipeClosed => {
                        return Err(SupervisorError::Crashed(
                            "worker closed its channel".to_string(),
                        ));
                    }
                    PollResult::Error(e) => {
                        return Err(SupervisorError::Crashed(format!("pipe error: {e}")));
                    }
                }
            }

            return match self.reader.read::<WorkerMessage>() {
                Ok(msg) => Ok(msg),
                Err(FrameError::EndOfStream) => Err(SupervisorError::Crashed(
                    "worker closed its channel".to_string(),
                )),
                Err(e) if !self.is_alive() => {
                    Err(SupervisorError::Crashed(format!("worker died mid-frame: {e}")))
                }
                Err(e) => Err(e.into()),
            };
        }
    }

    /// Ask the worker to exit and reap it
    pub fn shutdown(&mut self) -> Result<ExitStatus, SupervisorError> {
        // The worker may already be gone; its exit status says why
        if let Err(e) = self.writer.write(&SupervisorCommand::Shutdown) {
            tracing::debug!(error = %e, "shutdown command not delivered");
        }

        let Some(limit) = self.timeout else {
            return Ok(self.child.wait()?);
        };

        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= limit {
                self.kill();
                return Err(SupervisorError::Timeout(limit));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Whether the worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the worker and reap it
    pub fn kill(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.child.kill() {
                tracing::debug!(error = %e, "failed to kill worker");
            }
        }
        let _ = self.child.wait();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
        }
    }
}

fn describe(msg: &WorkerMessage) -> String {
    match msg {
        WorkerMessage::Hello(_) => "Hello".to_string(),
        WorkerMessage::SampleComplete(_) => "SampleComplete".to_string(),
        WorkerMessage::Failure { kind, .. } => format!("Failure({kind})"),
    }
}
