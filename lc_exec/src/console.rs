//! # Operator console
//!
//! A line editor on a background thread reads operator commands and sends them to the main loop
//! over a channel. A line holding a single character is a key press (`a` forces a left lane
//! change), longer lines are full commands (`drive --throttle --left`). Ctrl-C or Ctrl-D quits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

// Internal
use comms_if::tc::Tc;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "lc $ ";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct Console {
    receiver: Receiver<Tc>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Could not create the line editor: {0}")]
    EditorError(String),

    #[error("Could not start the console thread: {0}")]
    ThreadError(std::io::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Console {
    /// Start the console thread, loading and saving line history at the given path.
    pub fn start(history_path: Option<PathBuf>) -> Result<Self, ConsoleError> {
        let (tx, rx) = channel();
        let (init_tx, init_rx) = channel();

        thread::Builder::new()
            .name("console".into())
            .spawn(move || {
                // The editor owns the terminal so it is created on the thread which uses it
                let editor = match DefaultEditor::new() {
                    Ok(e) => {
                        init_tx.send(Ok(())).ok();
                        e
                    },
                    Err(e) => {
                        init_tx.send(Err(e.to_string())).ok();
                        return
                    }
                };
                console_thread(editor, history_path, tx)
            })
            .map_err(ConsoleError::ThreadError)?;

        init_rx.recv()
            .map_err(|e| ConsoleError::EditorError(e.to_string()))?
            .map_err(ConsoleError::EditorError)?;

        info!("Console started, enter a command key or `help`");

        Ok(Self { receiver: rx })
    }

    /// Get all commands entered since the last call.
    ///
    /// If the console thread has stopped a `Quit` is returned so the main loop winds down.
    pub fn pending(&self) -> Vec<Tc> {
        let mut tcs = Vec::new();

        loop {
            match self.receiver.try_recv() {
                Ok(tc) => tcs.push(tc),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tcs.push(Tc::Quit);
                    break
                }
            }
        }

        tcs
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn console_thread(mut editor: DefaultEditor, history_path: Option<PathBuf>, sender: Sender<Tc>) {
    if let Some(ref p) = history_path {
        if editor.load_history(p).is_err() {
            info!("No console history found at {:?}", p);
        }
    }

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    editor.add_history_entry(line.as_str()).ok();
                }
                if !handle_line(&line, &sender) {
                    break
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                sender.send(Tc::Quit).ok();
                break
            },
            Err(e) => {
                warn!("Console error: {}", e);
                sender.send(Tc::Quit).ok();
                break
            }
        }
    }

    if let Some(p) = history_path {
        if let Err(e) = editor.save_history(&p) {
            warn!("Could not save console history to {:?}: {}", p, e);
        }
    }
}

/// Parse one console line and send the command on. Returns false once the console should stop.
fn handle_line(line: &str, sender: &Sender<Tc>) -> bool {
    if line.trim().is_empty() {
        return true
    }

    match Tc::from_line(line) {
        Ok(tc) => {
            let quit = tc == Tc::Quit;
            sender.send(tc).is_ok() && !quit
        },
        Err(e) => {
            // structopt's help and usage messages come through here too
            println!("{}", e);
            true
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::DriveKeys;

    #[test]
    fn test_handle_line() {
        let (tx, rx) = channel();

        assert!(handle_line("a", &tx));
        assert!(handle_line("   ", &tx));
        assert!(handle_line("not-a-command", &tx));
        assert!(handle_line("drive --brake", &tx));
        assert!(!handle_line("quit", &tx));

        let console = Console { receiver: rx };
        assert_eq!(
            console.pending(),
            vec![
                Tc::ForceLeft,
                Tc::Drive(DriveKeys { brake: true, ..Default::default() }),
                Tc::Quit
            ]
        );

        // The sender is gone once the console thread ends
        drop(tx);
        assert_eq!(console.pending(), vec![Tc::Quit]);
    }
}
