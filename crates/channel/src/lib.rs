//! # TodoClaw Tool Channel
//!
//! Owns exactly one tool process for the lifetime of one orchestration run:
//!
//! 1. **Spawn** with the caller's credential injected into the child's
//!    environment (never argv), piped stdin/stdout, kill-on-drop.
//! 2. **Handshake**: `init` out, `capabilities` back within the handshake
//!    timeout, listing all six tools.
//! 3. **Call**: one frame out, the frame with the same correlation id back
//!    within the per-call timeout. Any timeout, undecodable reply or id
//!    mismatch makes the channel unusable.
//! 4. **Close**: stdin closed, short grace period, then kill.

pub mod command;
pub mod opener;
pub mod process;

pub use command::{ChannelTimeouts, ToolCommand};
pub use opener::ProcessChannelOpener;
pub use process::ProcessChannel;
