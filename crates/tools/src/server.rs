//! Stdio frame server.
//!
//! Newline-delimited frames on stdin/stdout; stdout carries nothing else.
//! Calls are answered strictly in order, one at a time.

use serde_json::{Map, Value};
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use todoclaw_client::TodoClient;
use todoclaw_core::credential::{API_BASE_URL_ENV, AUTH_TOKEN_ENV};
use todoclaw_core::protocol::{Frame, PROTOCOL_VERSION};
use todoclaw_core::tool::{ToolFailure, tool_definitions};

use crate::registry::ToolRegistry;

/// Read the credential this process will act under.
///
/// A missing token is `Unauthorized`; a missing or non-http base address
/// is `UpstreamFailure`.
pub fn credentials_from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<(String, String), ToolFailure> {
    let token = lookup(AUTH_TOKEN_ENV)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ToolFailure::unauthorized(format!("{AUTH_TOKEN_ENV} is not set")))?;

    let base_url = lookup(API_BASE_URL_ENV)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ToolFailure::upstream(None, format!("{API_BASE_URL_ENV} is not set")))?;

    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ToolFailure::upstream(
            None,
            format!("{API_BASE_URL_ENV} must be an http(s) URL"),
        ));
    }

    Ok((token, base_url))
}

pub struct ToolServer {
    registry: ToolRegistry,
    client: TodoClient,
}

impl ToolServer {
    pub fn new(registry: ToolRegistry, client: TodoClient) -> Self {
        Self { registry, client }
    }

    /// Serve frames from `reader` until end of input.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle_line(&line).await {
                write_frame(&mut writer, &reply).await?;
            }
        }
        info!("Input closed, exiting");
        Ok(())
    }

    /// Produce the reply to one input line.
    pub async fn handle_line(&self, line: &str) -> Option<Frame> {
        let frame = match Frame::decode(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Malformed frame");
                return Some(Frame::Error {
                    id: None,
                    error: ToolFailure::invalid_argument("frame", format!("malformed frame: {e}")),
                });
            }
        };

        match frame {
            Frame::Init { protocol_version, client } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(protocol_version, expected = PROTOCOL_VERSION, "Protocol version mismatch");
                }
                debug!(%client, "Handshake");
                Some(Frame::Capabilities {
                    protocol_version: PROTOCOL_VERSION,
                    tools: tool_definitions(),
                })
            }
            Frame::Call { id, tool, arguments } => Some(self.handle_call(id, &tool, &arguments).await),
            other => {
                warn!(kind = other.kind(), "Unexpected frame");
                Some(Frame::Error {
                    id: other.correlation_id().map(str::to_string),
                    error: ToolFailure::invalid_argument(
                        "kind",
                        format!("unexpected '{}' frame", other.kind()),
                    ),
                })
            }
        }
    }

    async fn handle_call(&self, id: String, tool: &str, arguments: &Map<String, Value>) -> Frame {
        let started = Instant::now();
        let outcome = self.registry.dispatch(&self.client, tool, arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                info!(%id, %tool, duration_ms, "Tool call succeeded");
                Frame::Result { id, payload }
            }
            Err(error) => {
                info!(%id, %tool, kind = %error.kind, duration_ms, "Tool call failed");
                Frame::Error { id: Some(id), error }
            }
        }
    }
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    let line = frame.encode().map_err(std::io::Error::other)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
