//! Interactive terminal host for an agent session.
//!
//! Configured from `EMBED_AGENT_API_KEY`, `EMBED_AGENT_BASE_URL` and
//! `EMBED_AGENT_MODEL`. Reads one message per line and asks before running
//! any tool.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;

use embed_agent::{
    init_tracing, CallbackSet, SessionBuilder, SessionFailure, ToolApprovalGate, TranscriptSource,
};

enum HostEvent {
    Approval(ToolApprovalGate),
    Idle,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (tx, rx) = mpsc::channel::<HostEvent>();
    let callbacks = CallbackSet::new(tx)
        .with_transcript(|_, text, source| {
            if source == TranscriptSource::Assistant {
                println!("assistant> {text}");
            }
        })
        .with_tool_call_request(|tx, gate| {
            // Prompting happens on the main thread, which owns stdin
            if let Err(mpsc::SendError(HostEvent::Approval(gate))) = tx.send(HostEvent::Approval(gate)) {
                gate.reject();
            }
        })
        .with_error(|_, failure: &SessionFailure| {
            tracing::debug!(kind = ?failure.kind, "Turn failed");
        })
        .with_idle(|tx| {
            let _ = tx.send(HostEvent::Idle);
        });

    let session = SessionBuilder::from_env()?
        .with_system_prompt("You are a helpful assistant running in a terminal.")
        .callbacks(callbacks)
        .build()?;
    eprintln!("model: {} (session {})", session.config().model(), session.id());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Err(e) = session.send_message(line) {
            eprintln!("error: {e}");
            continue;
        }

        while let Ok(event) = rx.recv() {
            match event {
                HostEvent::Idle => break,
                HostEvent::Approval(gate) => {
                    println!("tool> {}", gate.description());
                    if !gate.justification().is_empty() {
                        println!("why>  {}", gate.justification());
                    }
                    print!("run it? [y/N] ");
                    io::stdout().flush()?;
                    let answer = lines.next().transpose()?.unwrap_or_default();
                    if answer.trim().eq_ignore_ascii_case("y") {
                        gate.approve();
                    } else {
                        gate.reject();
                    }
                }
            }
        }
    }

    session.release_and_wait();
    Ok(())
}
