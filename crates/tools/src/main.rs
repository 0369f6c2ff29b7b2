//! `todoclaw-tools`: the tool process binary.
//!
//! Spawned by the tool channel with `TODOCLAW_AUTH_TOKEN` and
//! `TODOCLAW_API_BASE_URL` in its environment. Exits 0 at end of input and
//! 2 when the credential is missing.

use std::process::ExitCode;

use todoclaw_client::TodoClient;
use todoclaw_core::protocol::Frame;
use todoclaw_core::tool::ToolFailure;
use todoclaw_tools::server::write_frame;
use todoclaw_tools::{ToolServer, credentials_from_env, default_registry};
use tokio::io::BufReader;

const EXIT_MISCONFIGURED: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout is the frame channel; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let (token, base_url) = match credentials_from_env(|key| std::env::var(key).ok()) {
        Ok(pair) => pair,
        Err(failure) => return fail_startup(failure).await,
    };

    let client = match TodoClient::new(base_url, token) {
        Ok(client) => client,
        Err(e) => return fail_startup(ToolFailure::upstream(None, e.to_string())).await,
    };
    tracing::debug!(base_url = client.base_url(), "Tool process ready");

    let server = ToolServer::new(default_registry(), client);
    match server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Frame I/O failed");
            ExitCode::FAILURE
        }
    }
}

/// Emit a diagnostic frame and exit without serving anything.
async fn fail_startup(failure: ToolFailure) -> ExitCode {
    tracing::error!(kind = %failure.kind, message = %failure.message, "Refusing to start");
    let frame = Frame::Error {
        id: None,
        error: failure,
    };
    if let Err(e) = write_frame(&mut tokio::io::stdout(), &frame).await {
        tracing::error!(error = %e, "Could not write diagnostic frame");
    }
    ExitCode::from(EXIT_MISCONFIGURED)
}
