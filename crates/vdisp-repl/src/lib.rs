//! Interactive REPL over a loaded class hierarchy.
//!
//! Objects can be constructed and called at the prompt, and every class's
//! dispatch table inspected, so the effect of an override on a slot is
//! visible directly.
//!
//! ## Usage
//!
//! ```no_run
//! use vdisp_repl::{run_repl, ReplConfig, ReplSession};
//!
//! let config = ReplConfig::default();
//! run_repl(&config, ReplSession::empty()).unwrap();
//! ```

pub mod session;

pub use session::{Output, ReplSession, HELP};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Configuration for the REPL.
pub struct ReplConfig {
    /// The primary prompt string (default: "vdisp> ").
    pub prompt: String,
    /// The continuation prompt for multi-line input (default: "  ... ").
    pub continuation: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "vdisp> ".to_string(),
            continuation: "  ... ".to_string(),
        }
    }
}

/// Run the interactive loop until `quit`, `exit` or end of input.
///
/// Command errors are printed and the loop carries on. Only a failure of
/// the line editor itself ends the session with an error.
pub fn run_repl(config: &ReplConfig, mut session: ReplSession) -> Result<(), String> {
    let mut editor = DefaultEditor::new().map_err(|e| e.to_string())?;
    println!("vdisp repl, `help` for commands");

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            &config.prompt
        } else {
            &config.continuation
        };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.to_string()),
        };

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        if is_incomplete(&buffer) {
            continue;
        }
        let input = std::mem::take(&mut buffer);
        if input.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input.as_str());

        match session.execute(&input) {
            Ok(Output::Print(text)) => println!("{text}"),
            Ok(Output::Silent) => {}
            Ok(Output::Quit) => break,
            Err(message) => eprintln!("error: {message}"),
        }
    }
    println!("Goodbye!");
    Ok(())
}

/// Input with an open parenthesis or string literal continues on the next line.
pub fn is_incomplete(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    in_string || depth > 0
}
