use std::io::{self, BufRead, IsTerminal, Write};

use async_trait::async_trait;
use gatekeep_core::auth::PresenceEvaluator;

/// User-presence check on the controlling terminal: the user must type `y`.
pub struct TerminalPresence;

#[async_trait]
impl PresenceEvaluator for TerminalPresence {
    fn can_evaluate(&self) -> Result<(), String> {
        if io::stdin().is_terminal() {
            Ok(())
        } else {
            Err("stdin is not a terminal; cannot confirm user presence".to_string())
        }
    }

    async fn evaluate(&self, reason: &str) -> Result<(), String> {
        let prompt = format!("{reason} [y/N]: ");
        let answer = tokio::task::spawn_blocking(move || ask(&prompt))
            .await
            .map_err(|e| format!("prompt task failed: {e}"))?
            .map_err(|e| format!("prompt failed: {e}"))?;

        if confirms(&answer) {
            Ok(())
        } else {
            Err("presence not confirmed".to_string())
        }
    }
}

fn ask(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr().lock();
    stderr.write_all(prompt.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn confirms(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
