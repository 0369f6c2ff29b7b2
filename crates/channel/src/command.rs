//! How to launch the tool process, and how long to wait for it.

use std::path::PathBuf;
use std::time::Duration;
use todoclaw_config::ToolProcessConfig;

/// Binary name of the tool process.
pub const TOOL_BINARY: &str = "todoclaw-tools";

/// Program, arguments and extra (non-secret) environment for the tool process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Resolve the command from configuration.
    ///
    /// Without an explicit `command`, prefer a `todoclaw-tools` binary next to
    /// the running executable, then fall back to a `PATH` lookup.
    pub fn from_config(config: &ToolProcessConfig) -> Self {
        let program = match &config.command {
            Some(cmd) => PathBuf::from(cmd),
            None => sibling_binary().unwrap_or_else(|| PathBuf::from(TOOL_BINARY)),
        };
        Self {
            program,
            args: config.args.clone(),
            envs: Vec::new(),
        }
    }
}

fn sibling_binary() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(format!("{TOOL_BINARY}{}", std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

/// Time limits applied by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimeouts {
    pub handshake: Duration,
    pub call: Duration,
    /// Wait after closing stdin before the process is killed.
    pub close_grace: Duration,
}

impl Default for ChannelTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(5),
            call: Duration::from_secs(15),
            close_grace: Duration::from_secs(2),
        }
    }
}

impl From<&ToolProcessConfig> for ChannelTimeouts {
    fn from(config: &ToolProcessConfig) -> Self {
        Self {
            handshake: Duration::from_millis(config.handshake_timeout_ms),
            call: Duration::from_millis(config.call_timeout_ms),
            close_grace: Duration::from_millis(config.close_grace_ms),
        }
    }
}
