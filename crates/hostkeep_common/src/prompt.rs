//! Yes/no confirmation with a bounded wait
//!
//! Every prompt defaults to "no": on timeout, on end of input, and when
//! nobody is at the terminal. Unattended runs therefore never hang.

use owo_colors::OwoColorize;
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

pub trait Confirm {
    /// Ask `question`; false unless the user answers yes within `timeout`
    fn confirm(&self, question: &str, timeout: Duration) -> bool;
}

/// Interpret a typed answer
pub fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// ============================================================================
// Terminal prompt
// ============================================================================

/// Reads answers from stdin through one long-lived reader thread, so a
/// timed-out prompt never leaves a second reader competing for input
#[derive(Default)]
pub struct TerminalPrompt {
    lines: Mutex<Option<Receiver<String>>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_reader() -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str, timeout: Duration) -> bool {
        if !io::stdin().is_terminal() {
            info!("{} -> no (stdin is not a terminal)", question);
            return false;
        }

        let mut guard = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let rx = guard.get_or_insert_with(Self::spawn_reader);
        // discard anything typed before the question was shown
        while rx.try_recv().is_ok() {}

        print!(
            "{} {} ",
            question.bold(),
            format!("[y/N, {}s]", timeout.as_secs()).dimmed()
        );
        let _ = io::stdout().flush();

        let answer = answer_from(rx, timeout);
        info!("{} -> {}", question, if answer { "yes" } else { "no" });
        answer
    }
}

/// Wait up to `timeout` for one answer line; silence and end of input are "no"
fn answer_from(rx: &Receiver<String>, timeout: Duration) -> bool {
    match rx.recv_timeout(timeout) {
        Ok(line) => parse_answer(&line),
        Err(RecvTimeoutError::Timeout) => {
            println!();
            debug!("prompt timed out");
            false
        }
        Err(RecvTimeoutError::Disconnected) => {
            println!();
            debug!("stdin closed");
            false
        }
    }
}

// ============================================================================
// Scripted prompt
// ============================================================================

/// Answers from a script, then a fixed default; records questions asked
#[derive(Debug, Default)]
pub struct AutoConfirm {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    asked: Mutex<Vec<String>>,
}

impl AutoConfirm {
    /// Always yes (the `--yes` flag)
    pub fn yes() -> Self {
        Self {
            default: true,
            ..Self::default()
        }
    }

    /// Always no
    pub fn no() -> Self {
        Self::default()
    }

    pub fn scripted(answers: &[bool], default: bool) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Confirm for AutoConfirm {
    fn confirm(&self, question: &str, _timeout: Duration) -> bool {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(question.to_string());
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.default);
        info!("{} -> {}", question, if answer { "yes" } else { "no" });
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer(" YES "));
        assert!(!parse_answer(""));
        assert!(!parse_answer("n"));
        assert!(!parse_answer("yep"));
    }

    #[test]
    fn test_answer_from_times_out_to_no() {
        let (_tx, rx) = mpsc::channel::<String>();
        let start = Instant::now();
        assert!(!answer_from(&rx, Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_answer_from_closed_input_is_no() {
        let (tx, rx) = mpsc::channel::<String>();
        drop(tx);
        assert!(!answer_from(&rx, Duration::from_secs(5)));
    }

    #[test]
    fn test_answer_from_reads_yes() {
        let (tx, rx) = mpsc::channel();
        tx.send("y\n".to_string()).unwrap();
        assert!(answer_from(&rx, Duration::from_secs(5)));

        tx.send("\n".to_string()).unwrap();
        assert!(!answer_from(&rx, Duration::from_secs(5)));
    }

    #[test]
    fn test_answer_from_late_answer_is_no() {
        let (tx, rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            let _ = tx.send("yes\n".to_string());
        });
        assert!(!answer_from(&rx, Duration::from_millis(20)));
        sender.join().unwrap();
    }

    #[test]
    fn test_scripted_then_default() {
        let prompt = AutoConfirm::scripted(&[true, false], false);
        let t = Duration::from_secs(1);
        assert!(prompt.confirm("a?", t));
        assert!(!prompt.confirm("b?", t));
        assert!(!prompt.confirm("c?", t));
        assert_eq!(prompt.asked(), vec!["a?", "b?", "c?"]);
    }
}
