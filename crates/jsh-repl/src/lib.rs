//! jsh REPL — the interactive frontend driving the job-control kernel.
//!
//! Handles:
//! - Line editing and history via rustyline
//! - Tokenizing and pipeline assembly
//! - The built-in dispatcher the launcher consumes
//! - Printing job reports and diagnostics

pub mod builtins;
pub mod lexer;
pub mod parser;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use jsh_kernel::{launch_command, launch_pipeline, report, shutdown, Outcome, StateFilter};

use crate::parser::CommandLine;

const PROMPT: &str = "# ";

/// Result of evaluating one line.
enum Eval {
    Continue,
    Exit,
}

/// The read-eval loop. Returns when the user exits or closes stdin.
pub fn run() -> Result<()> {
    jsh_kernel::startup().context("job control startup failed")?;

    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("failed to create line editor")?;
    let history_path = directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("jsh").join("history.txt"));
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let mut eval_result = Eval::Continue;
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                    eval_result = eval(&line);
                }
                // Lazy reconciliation pass: surface background jobs
                // that finished since the previous prompt.
                for job in report(StateFilter::Finished) {
                    println!("{job}");
                }
                if let Eval::Exit = eval_result {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("reading input failed"),
        }
    }

    save_history(&mut rl, &history_path);
    println!();
    for job in shutdown() {
        println!("{job}");
    }
    Ok(())
}

/// Evaluate one command line: tokenize, assemble, launch, report.
fn eval(line: &str) -> Eval {
    let parsed = lexer::tokenize(line).and_then(parser::parse);
    let CommandLine {
        mut segments,
        background,
    } = match parsed {
        Ok(Some(command)) => command,
        Ok(None) => return Eval::Continue,
        Err(e) => {
            eprintln!("jsh: {e}");
            return Eval::Continue;
        }
    };

    if let [only] = segments.as_slice() {
        if !background && matches!(only.words.first().map(String::as_str), Some("exit" | "quit")) {
            return Eval::Exit;
        }
    }

    let result = if segments.len() == 1 {
        launch_command(segments.remove(0), background, builtins::dispatch)
    } else {
        launch_pipeline(segments, background, builtins::dispatch)
    };

    match result {
        Ok(Outcome::Exited(code)) => {
            if code != 0 {
                tracing::debug!(code, "command exited nonzero");
            }
        }
        Ok(Outcome::Stopped(job)) | Ok(Outcome::Background(job)) => println!("{job}"),
        Err(e) => eprintln!("jsh: {e}"),
    }
    Eval::Continue
}

fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    let Some(path) = history_path else { return };
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("failed to create history directory: {e}");
            return;
        }
    }
    if let Err(e) = rl.save_history(path) {
        tracing::warn!("failed to save history: {e}");
    }
}
