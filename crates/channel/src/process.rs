//! The process-backed tool channel.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use todoclaw_core::channel::ToolChannel;
use todoclaw_core::credential::{API_BASE_URL_ENV, AUTH_TOKEN_ENV, Credential};
use todoclaw_core::error::ChannelError;
use todoclaw_core::protocol::{Frame, PROTOCOL_VERSION};
use todoclaw_core::tool::{ToolCallRequest, ToolCallResult, ToolFailure, ToolName};

use crate::command::{ChannelTimeouts, ToolCommand};

/// Longest raw payload kept in a `ProtocolViolation`.
const MAX_RAW_CAPTURE: usize = 2048;

/// Longest frame line accepted from the tool process, newline included.
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// How long to wait for a dying process to report its exit status.
const EXIT_CHECK: Duration = Duration::from_millis(500);

/// What the reader task hands to the channel.
#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    Malformed { raw: String, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Unusable,
    Closed,
}

/// One live tool process and the framed pipe to it.
pub struct ProcessChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    inbound: mpsc::Receiver<Inbound>,
    reader: JoinHandle<()>,
    timeouts: ChannelTimeouts,
    state: State,
}

impl ProcessChannel {
    /// Spawn the tool process for `credential` and complete the handshake.
    ///
    /// On any failure the process is killed before this returns.
    pub async fn open(
        credential: Credential,
        command: &ToolCommand,
        timeouts: ChannelTimeouts,
    ) -> Result<Self, ChannelError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            // Never let an inherited credential leak into this process.
            .env_remove(AUTH_TOKEN_ENV)
            .env_remove(API_BASE_URL_ENV)
            .envs(credential.env_pairs())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Linux: the kernel sends SIGTERM to the child if this process dies
        // without running destructors.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ChannelError::Spawn(format!("{}: {e}", command.program.display())))?;
        drop(credential);

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::Spawn("failed to capture tool process stdout".into()))?;

        let (tx, inbound) = mpsc::channel(16);
        let reader = tokio::spawn(read_frames(stdout, tx, MAX_LINE_BYTES));

        let mut channel = Self {
            child,
            stdin,
            inbound,
            reader,
            timeouts,
            state: State::Ready,
        };
        debug!(pid = ?channel.pid(), program = %command.program.display(), "Spawned tool process");

        match channel.handshake().await {
            Ok(()) => {
                info!(pid = ?channel.pid(), "Tool channel ready");
                Ok(channel)
            }
            Err(e) => {
                warn!(error = %e, "Tool process handshake failed");
                channel.terminate().await;
                Err(e)
            }
        }
    }

    /// OS process id, while the process has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_usable(&self) -> bool {
        self.state == State::Ready
    }

    async fn handshake(&mut self) -> Result<(), ChannelError> {
        self.send(&Frame::init()).await?;

        let inbound = match timeout(self.timeouts.handshake, self.inbound.recv()).await {
            Err(_) => {
                return Err(ChannelError::HandshakeTimeout {
                    timeout_ms: self.timeouts.handshake.as_millis() as u64,
                });
            }
            Ok(None) => return Err(self.exited(None).await),
            Ok(Some(inbound)) => inbound,
        };

        match inbound {
            Inbound::Malformed { raw, error } => Err(ChannelError::protocol(
                format!("undecodable handshake reply: {error}"),
                raw,
            )),
            Inbound::Frame(Frame::Capabilities { protocol_version, tools }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(ChannelError::protocol(
                        format!("unsupported protocol version {protocol_version}"),
                        String::new(),
                    ));
                }
                let missing: Vec<&str> = ToolName::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .filter(|name| !tools.iter().any(|d| d.name == *name))
                    .collect();
                if !missing.is_empty() {
                    return Err(ChannelError::protocol(
                        format!("capabilities missing tools: {}", missing.join(", ")),
                        String::new(),
                    ));
                }
                Ok(())
            }
            // The process refused to start; it is on its way out.
            Inbound::Frame(Frame::Error { id: None, error }) => Err(self.exited(Some(error)).await),
            Inbound::Frame(other) => Err(ChannelError::protocol(
                format!("expected capabilities, got '{}'", other.kind()),
                raw_of(&other),
            )),
        }
    }

    async fn exchange(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, ChannelError> {
        let call_id = request.id.clone();
        debug!(%call_id, tool = %request.name, "Sending tool call");
        let frame = Frame::from(request);

        // The write counts against the call timeout too: a process that
        // stops draining stdin must not stall the run.
        let exchanged = timeout(self.timeouts.call, async {
            self.send(&frame).await?;
            Ok::<_, ChannelError>(self.inbound.recv().await)
        })
        .await;

        let inbound = match exchanged {
            Err(_) => {
                return Err(ChannelError::CallTimeout {
                    call_id,
                    timeout_ms: self.timeouts.call.as_millis() as u64,
                });
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(None)) => return Err(self.exited(None).await),
            Ok(Ok(Some(inbound))) => inbound,
        };

        let frame = match inbound {
            Inbound::Frame(frame) => frame,
            Inbound::Malformed { raw, error } => {
                return Err(ChannelError::protocol(format!("undecodable reply: {error}"), raw));
            }
        };

        match frame.correlation_id() {
            Some(id) if id == call_id => {}
            Some(id) => {
                return Err(ChannelError::protocol(
                    format!("reply to '{id}' while waiting for '{call_id}'"),
                    raw_of(&frame),
                ));
            }
            None => {
                return Err(ChannelError::protocol("reply without correlation id", raw_of(&frame)));
            }
        }

        let raw = raw_of(&frame);
        let kind = frame.kind();
        frame
            .into_call_result()
            .ok_or_else(|| ChannelError::protocol(format!("'{kind}' frame is not a call reply"), raw))
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        let line = frame
            .encode()
            .map_err(|e| ChannelError::protocol(format!("failed to encode frame: {e}"), String::new()))?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ChannelError::Unusable);
        };

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(self.exited(None).await),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }

    /// Describe a process that stopped talking: drain any diagnostic frame
    /// it left behind and collect its exit status.
    async fn exited(&mut self, mut diagnostic: Option<ToolFailure>) -> ChannelError {
        while diagnostic.is_none() {
            match timeout(EXIT_CHECK, self.inbound.recv()).await {
                Ok(Some(Inbound::Frame(Frame::Error { id: None, error }))) => diagnostic = Some(error),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }

        let status = match timeout(EXIT_CHECK, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("exit status unavailable: {e}"),
            Err(_) => "stdout closed".to_string(),
        };

        let detail = match diagnostic {
            Some(failure) => format!("{status}; reported {}: {}", failure.kind, failure.message),
            None => status,
        };
        ChannelError::ProcessExited { detail }
    }

    /// Graceful shutdown: close stdin, wait for the grace period, then kill.
    async fn shutdown(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        drop(self.stdin.take());

        match timeout(self.timeouts.close_grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Tool process exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for tool process"),
            Err(_) => {
                warn!("Tool process ignored stdin close, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "Failed to kill tool process");
                }
            }
        }
        self.reader.abort();
    }

    /// Immediate shutdown: failed handshakes and expired runs.
    async fn terminate(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Tool process already gone");
        }
        self.reader.abort();
    }
}

#[async_trait]
impl ToolChannel for ProcessChannel {
    async fn call(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, ChannelError> {
        if self.state != State::Ready {
            return Err(ChannelError::Unusable);
        }
        let result = self.exchange(request).await;
        if let Err(e) = &result {
            warn!(error = %e, "Tool channel is no longer usable");
            self.state = State::Unusable;
        }
        result
    }

    async fn close(&mut self) {
        self.shutdown().await;
    }

    async fn abort(&mut self) {
        self.terminate().await;
    }

    fn process_id(&self) -> Option<u32> {
        self.pid()
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if self.state != State::Closed {
            debug!("ProcessChannel dropped without close, killing tool process");
            let _ = self.child.start_kill();
        }
        self.reader.abort();
    }
}

/// Background reader, sole owner of the child's stdout. Ends at EOF, on a
/// read error, or after a line longer than `max_line`; the channel observes
/// all of these as a closed receiver.
async fn read_frames<R>(source: R, tx: mpsc::Sender<Inbound>, max_line: usize)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match (&mut reader).take(max_line as u64).read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Tool process stdout read failed");
                break;
            }
        }

        if buf.len() >= max_line && !buf.ends_with(b"\n") {
            warn!(max_line, "Tool process wrote an oversized line");
            let _ = tx
                .send(Inbound::Malformed {
                    raw: truncate(&String::from_utf8_lossy(&buf)),
                    error: format!("line exceeds {max_line} bytes"),
                })
                .await;
            break;
        }

        let inbound = match std::str::from_utf8(&buf) {
            Err(e) => Inbound::Malformed {
                raw: truncate(String::from_utf8_lossy(&buf).trim_end()),
                error: format!("invalid UTF-8: {e}"),
            },
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match Frame::decode(line) {
                Ok(frame) => Inbound::Frame(frame),
                Err(e) => Inbound::Malformed {
                    raw: truncate(line.trim_end()),
                    error: e.to_string(),
                },
            },
        };
        if tx.send(inbound).await.is_err() {
            break;
        }
    }
}

fn raw_of(frame: &Frame) -> String {
    truncate(frame.encode().unwrap_or_default().trim_end())
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_RAW_CAPTURE {
        return s.to_string();
    }
    let mut end = MAX_RAW_CAPTURE;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
