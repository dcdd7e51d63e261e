use std::io::{IsTerminal, Write};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use colored::Colorize;
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};

use crate::gate::{GateMode, HumanGate, Prompt};

type Lines = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// One reader thread for the whole process. A prompt that times out leaves
/// no reader behind, and a pending read never holds up runtime shutdown.
static STDIN_LINES: LazyLock<Lines> = LazyLock::new(|| {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("could not start the stdin reader: {}", e);
    }
    Arc::new(Mutex::new(rx))
});

/// Answers typed into the terminal.
#[derive(Clone)]
pub struct TerminalGate {
    lines: Lines,
}

impl TerminalGate {
    pub fn stdin() -> Self {
        Self::from_lines(STDIN_LINES.clone())
    }

    pub fn from_lines(lines: Lines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl HumanGate for TerminalGate {
    async fn await_acknowledgement(&self, prompt: &Prompt) -> bool {
        let mut lines = self.lines.lock().await;
        // typed before this prompt was shown
        while let Ok(stale) = lines.try_recv() {
            debug!("discarding stale input {:?}", stale);
        }

        println!("\n{}", format!("=== {} ===", prompt.title).yellow().bold());
        println!("{}", prompt.message);
        print!(
            "{} ",
            "press Enter to continue, or type 'skip' to give up:".bold()
        );
        let _ = std::io::stdout().flush();

        // EOF means nobody is there to answer
        lines.recv().await.is_some_and(|l| is_continue(&l))
    }
}

fn is_continue(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "" | "y" | "yes" | "c" | "continue"
    )
}

/// Native OK/Cancel modal.
#[cfg(feature = "dialog")]
pub struct DialogGate;

#[cfg(feature = "dialog")]
#[async_trait]
impl HumanGate for DialogGate {
    async fn await_acknowledgement(&self, prompt: &Prompt) -> bool {
        use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

        let (title, message) = (prompt.title.clone(), prompt.message.clone());
        let answer = tokio::task::spawn_blocking(move || {
            // rfd can panic when no dialog backend is reachable
            std::panic::catch_unwind(|| {
                MessageDialog::new()
                    .set_level(MessageLevel::Warning)
                    .set_title(&title)
                    .set_description(&message)
                    .set_buttons(MessageButtons::OkCancel)
                    .show()
            })
        })
        .await;

        match answer {
            Ok(Ok(MessageDialogResult::Ok | MessageDialogResult::Yes)) => true,
            Ok(Ok(_)) => false,
            _ => {
                warn!("dialog could not be shown, falling back to the terminal");
                TerminalGate::stdin().await_acknowledgement(prompt).await
            }
        }
    }
}

/// Headless runs: every intervention is declined.
pub struct DenyGate;

#[async_trait]
impl HumanGate for DenyGate {
    async fn await_acknowledgement(&self, prompt: &Prompt) -> bool {
        warn!("no operator available, declining: {}", prompt.title);
        false
    }
}

fn has_display() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|v| std::env::var_os(v).is_some_and(|s| !s.is_empty()))
        || cfg!(any(target_os = "windows", target_os = "macos"))
}

/// Picks the gate implementation for `mode`.
pub fn build(mode: GateMode) -> Box<dyn HumanGate> {
    let resolved = match mode {
        GateMode::Auto if cfg!(feature = "dialog") && has_display() => GateMode::Dialog,
        GateMode::Auto if std::io::stdin().is_terminal() => GateMode::Terminal,
        GateMode::Auto => GateMode::Deny,
        other => other,
    };
    info!("human gate: {:?}", resolved);

    match resolved {
        #[cfg(feature = "dialog")]
        GateMode::Dialog => Box::new(DialogGate),
        #[cfg(not(feature = "dialog"))]
        GateMode::Dialog => {
            warn!("built without the `dialog` feature, using the terminal instead");
            Box::new(TerminalGate::stdin())
        }
        GateMode::Terminal => Box::new(TerminalGate::stdin()),
        GateMode::Deny | GateMode::Auto => Box::new(DenyGate),
    }
}

#[cfg(test)]
pub use scripted::ScriptedGate;


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gate::InterventionGate;

    #[test]
    fn blank_and_yes_continue() {
        for a in ["\n", "y\n", "YES", " continue "] {
            assert!(is_continue(a), "{a:?}");
        }
        for a in ["skip\n", "n", "no thanks"] {
            assert!(!is_continue(a), "{a:?}");
        }
    }

    #[tokio::test]
    async fn deny_gate_always_declines() {
        assert!(!DenyGate.await_acknowledgement(&Prompt::new("captcha", "")).await);
        assert!(!build(GateMode::Deny).await_acknowledgement(&Prompt::new("x", "")).await);
    }

    fn terminal() -> (mpsc::UnboundedSender<String>, TerminalGate) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, TerminalGate::from_lines(Arc::new(Mutex::new(rx))))
    }

    fn type_later(tx: &mpsc::UnboundedSender<String>, after_ms: u64, line: &str) {
        let (tx, line) = (tx.clone(), line.to_string());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            let _ = tx.send(line);
        });
    }

    #[tokio::test]
    async fn answer_after_a_timed_out_prompt_reaches_the_next_one() {
        let (tx, terminal) = terminal();
        let first = InterventionGate::new(
            Vec::new(),
            Box::new(terminal.clone()),
            Some(Duration::from_millis(30)),
        );
        assert!(!first.acknowledge(&Prompt::new("captcha", "")).await);

        let second = InterventionGate::new(
            Vec::new(),
            Box::new(terminal),
            Some(Duration::from_secs(5)),
        );
        type_later(&tx, 50, "");
        type_later(&tx, 200, "skip");
        assert!(second.acknowledge(&Prompt::new("captcha", "")).await);
    }

    #[tokio::test]
    async fn input_typed_before_the_prompt_is_ignored() {
        let (tx, terminal) = terminal();
        tx.send("skip".to_string()).unwrap();
        type_later(&tx, 30, "yes");
        assert!(terminal.await_acknowledgement(&Prompt::new("login", "")).await);
    }

    #[tokio::test]
    async fn closed_input_declines() {
        let (tx, terminal) = terminal();
        drop(tx);
        assert!(!terminal.await_acknowledgement(&Prompt::new("login", "")).await);
    }
}
