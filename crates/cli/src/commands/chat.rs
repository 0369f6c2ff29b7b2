//! `todoclaw chat`: talk to your todo list from the terminal.

use std::io::{BufRead, Write};
use std::sync::Arc;

use todoclaw_agent::Orchestrator;
use todoclaw_channel::ProcessChannelOpener;
use todoclaw_config::AppConfig;
use todoclaw_core::credential::Credential;
use todoclaw_core::event::DomainEvent;
use todoclaw_core::message::HistoryTurn;

pub async fn run(
    message: Option<String>,
    token: String,
    base_url: Option<String>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if token.trim().is_empty() {
        return Err("A todo service token is required (--token or TODOCLAW_TOKEN)".into());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if !config.has_api_key() {
        return Err("No API key configured. Run `todoclaw doctor` for details.".into());
    }
    let base_url = base_url.unwrap_or_else(|| config.upstream.base_url.clone());

    let provider = todoclaw_providers::default_from_config(&config)?;
    let opener = Arc::new(ProcessChannelOpener::from_config(&config.tool_process));
    let orchestrator = Orchestrator::from_config(&config, provider, opener);

    if verbose {
        spawn_activity_printer(&orchestrator);
    }

    if let Some(message) = message {
        let outcome = orchestrator
            .run(Credential::new(&token, &base_url), &[], &message)
            .await?;
        println!("{}", outcome.response);
        return Ok(());
    }

    println!("TodoClaw chat ({}). Type 'exit' to quit.\n", config.default_model);

    let mut history: Vec<HistoryTurn> = Vec::new();
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        match orchestrator
            .run(Credential::new(&token, &base_url), &history, input)
            .await
        {
            Ok(outcome) => {
                println!("todoclaw> {}\n", outcome.response);
                history.push(HistoryTurn {
                    role: "user".into(),
                    content: input.to_string(),
                });
                history.push(HistoryTurn {
                    role: "assistant".into(),
                    content: outcome.response,
                });
            }
            Err(e) => eprintln!("error: {e}\n"),
        }
    }

    Ok(())
}

/// Print tool activity to stderr as runs progress.
fn spawn_activity_printer(orchestrator: &Orchestrator) {
    let mut events = orchestrator.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Some(line) = describe(&event) {
                eprintln!("{line}");
            }
        }
    });
}

fn describe(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            failure,
            duration_ms,
            ..
        } => Some(match (success, failure) {
            (true, _) => format!("  [tool] {tool_name} ok ({duration_ms}ms)"),
            (false, Some(kind)) => format!("  [tool] {tool_name} failed: {kind} ({duration_ms}ms)"),
            (false, None) => format!("  [tool] {tool_name} failed ({duration_ms}ms)"),
        }),
        DomainEvent::RunFinished {
            outcome, tool_calls, ..
        } => Some(format!("  [run] {outcome} after {tool_calls} tool call(s)")),
        _ => None,
    }
}
