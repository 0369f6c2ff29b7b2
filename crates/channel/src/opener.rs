use async_trait::async_trait;
use todoclaw_config::ToolProcessConfig;
use todoclaw_core::channel::{ChannelOpener, ToolChannel};
use todoclaw_core::credential::Credential;
use todoclaw_core::error::ChannelError;

use crate::command::{ChannelTimeouts, ToolCommand};
use crate::process::ProcessChannel;

/// Spawns one fresh tool process per `open`.
#[derive(Debug, Clone)]
pub struct ProcessChannelOpener {
    command: ToolCommand,
    timeouts: ChannelTimeouts,
}

impl ProcessChannelOpener {
    pub fn new(command: ToolCommand, timeouts: ChannelTimeouts) -> Self {
        Self { command, timeouts }
    }

    pub fn from_config(config: &ToolProcessConfig) -> Self {
        Self::new(ToolCommand::from_config(config), ChannelTimeouts::from(config))
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

#[async_trait]
impl ChannelOpener for ProcessChannelOpener {
    async fn open(&self, credential: Credential) -> Result<Box<dyn ToolChannel>, ChannelError> {
        let channel = ProcessChannel::open(credential, &self.command, self.timeouts).await?;
        Ok(Box::new(channel))
    }
}
