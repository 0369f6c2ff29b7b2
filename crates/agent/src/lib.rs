//! The reasoning side of TodoClaw.
//!
//! Each chat request becomes one [`Orchestrator::run`]:
//!
//! 1. **Open** a fresh tool channel bound to the caller's credential
//! 2. **Think**: send the system prompt, the conversation and the six tool
//!    schemas to the model
//! 3. **Act**: forward the model's (first) tool call over the channel
//! 4. **Observe**: append the result and go back to 2
//! 5. **Close** the channel, on every path
//!
//! The loop stops on a final answer, on the tool-call bound, on a channel
//! failure, on an `Unauthorized` observation or when the deadline elapses.

pub mod loop_runner;
pub mod prompt;
pub mod run;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use loop_runner::{AbortReason, Decision, LoopOutcome, LoopSettings, LoopState, ReasoningLoop};
pub use prompt::system_prompt;
pub use run::{Orchestrator, RunError, RunOutcome};
