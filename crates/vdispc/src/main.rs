//! The vdisp command-line driver.
//!
//! - `vdispc tables <file>` - Build every class and print its dispatch table
//! - `vdispc run <file>` - Build and run the file's `[[call]]` entries
//! - `vdispc slot <file> <class> <signature>` - Print the slot of one method
//! - `vdispc repl [file]` - Start an interactive session
//!
//! Options:
//! - `--json` - Machine-readable output and diagnostics (one object per line)
//! - `--no-color` - Disable colorized output
//! - `--log-level`, `--log-format` - Logging to stderr

mod logging;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use vdisp_front::{read_source, render, CallOutcome, DiagnosticOptions, LoadError, Program};
use vdisp_repl::{run_repl, ReplConfig, ReplSession};
use vdisp_rt::MethodId;

use crate::logging::{init_logging, LogOptions};

#[derive(Parser)]
#[command(name = "vdispc", version, about = "Virtual dispatch tables for class hierarchies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable colorized output
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Log level: error, warn, info, debug or trace (default: warn)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    /// Log format: text or json (default: text)
    #[arg(long = "log-format", global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every class and print its dispatch table
    Tables {
        /// Path to the hierarchy file
        file: PathBuf,

        /// Print the tables as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build the hierarchy and run its calls; fails if any call fails
    Run {
        /// Path to the hierarchy file
        file: PathBuf,

        /// Print one JSON object per call
        #[arg(long)]
        json: bool,
    },
    /// Print the slot a method occupies in a class's table
    Slot {
        /// Path to the hierarchy file
        file: PathBuf,

        /// Class name
        class: String,

        /// Method signature, e.g. `greet(Str)`
        signature: String,
    },
    /// Start an interactive session, optionally with a hierarchy loaded
    Repl {
        /// Path to the hierarchy file
        file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_options = match LogOptions::resolve(cli.log_format.as_deref(), cli.log_level.as_deref())
    {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    init_logging(&log_options, !cli.no_color);

    let json = matches!(
        cli.command,
        Commands::Tables { json: true, .. } | Commands::Run { json: true, .. }
    );
    let diag_opts = DiagnosticOptions {
        color: !cli.no_color && !json,
        json,
    };

    let result = match cli.command {
        Commands::Tables { file, json } => tables(&file, json, &diag_opts),
        Commands::Run { file, json } => run(&file, json, &diag_opts),
        Commands::Slot {
            file,
            class,
            signature,
        } => slot(&file, &class, &signature, &diag_opts),
        Commands::Repl { file } => repl(file.as_deref(), &diag_opts),
    };

    if let Err(failure) = result {
        match failure {
            Failure::Reported => {}
            Failure::Message(e) if json => {
                let msg = serde_json::json!({
                    "code": "V0001",
                    "severity": "error",
                    "message": e,
                    "file": "",
                    "spans": [],
                    "fix": null
                });
                eprintln!("{msg}");
            }
            Failure::Message(e) => eprintln!("error: {e}"),
        }
        process::exit(1);
    }
}

enum Failure {
    /// Already written to stderr.
    Reported,
    Message(String),
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::Message(message)
    }
}

/// Read and load a hierarchy file, rendering any error against it.
fn load(path: &Path, diag_opts: &DiagnosticOptions) -> Result<Program, Failure> {
    let file = path.display().to_string();
    let source = read_source(path).map_err(|e| report(&e, "", &file, diag_opts))?;
    Program::load(&source).map_err(|e| report(&e, &source, &file, diag_opts))
}

fn report(error: &LoadError, source: &str, file: &str, diag_opts: &DiagnosticOptions) -> Failure {
    eprint!("{}", render(error, source, file, diag_opts));
    Failure::Reported
}

fn tables(path: &Path, json: bool, diag_opts: &DiagnosticOptions) -> Result<(), Failure> {
    let program = load(path, diag_opts)?;
    let dumps = program.dumps();
    if json {
        let text = serde_json::to_string_pretty(&dumps).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        for dump in &dumps {
            print!("{dump}");
        }
    }
    Ok(())
}

fn run(path: &Path, json: bool, diag_opts: &DiagnosticOptions) -> Result<(), Failure> {
    let program = load(path, diag_opts)?;
    let outcomes = program.run();
    let failed = outcomes.iter().filter(|o| !o.passed()).count();

    for outcome in &outcomes {
        if json {
            println!("{}", outcome_json(outcome));
        } else {
            println!("{}", outcome_line(outcome));
        }
    }
    if !json {
        println!("{} passed, {failed} failed", outcomes.len() - failed);
    }
    tracing::info!(calls = outcomes.len(), failed, "run finished");

    if failed > 0 {
        Err(Failure::Reported)
    } else {
        Ok(())
    }
}

fn slot(
    path: &Path,
    class: &str,
    signature: &str,
    diag_opts: &DiagnosticOptions,
) -> Result<(), Failure> {
    let program = load(path, diag_opts)?;
    let hierarchy = program.hierarchy();
    let id = hierarchy
        .resolve(class)
        .ok_or_else(|| format!("unknown class `{class}`"))?;
    let method = MethodId::parse(signature)?;
    let slot = program
        .registry()
        .resolve(hierarchy, id, &method)
        .ok_or_else(|| format!("`{class}` has no method `{method}`"))?;
    println!("{}", slot.0);
    Ok(())
}

fn repl(path: Option<&Path>, diag_opts: &DiagnosticOptions) -> Result<(), Failure> {
    let session = match path {
        Some(path) => ReplSession::new(load(path, diag_opts)?),
        None => ReplSession::empty(),
    };
    run_repl(&ReplConfig::default(), session).map_err(Failure::Message)
}

fn outcome_line(outcome: &CallOutcome) -> String {
    match (&outcome.result, &outcome.expected) {
        (Ok(value), Some(expected)) if value != expected => format!(
            "FAIL {} = {}, expected {}",
            outcome.call,
            value.quoted(),
            expected.quoted()
        ),
        (Ok(value), _) => format!("ok   {} = {}", outcome.call, value.quoted()),
        (Err(e), _) => format!("FAIL {}: error[{}]: {e}", outcome.call, e.code()),
    }
}

fn outcome_json(outcome: &CallOutcome) -> serde_json::Value {
    let (value, error) = match &outcome.result {
        Ok(value) => (serde_json::json!(value), serde_json::Value::Null),
        Err(e) => (
            serde_json::Value::Null,
            serde_json::json!({ "code": e.code(), "message": e.to_string() }),
        ),
    };
    serde_json::json!({
        "call": outcome.call,
        "passed": outcome.passed(),
        "value": value,
        "expected": outcome.expected,
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdisp_rt::Value;

    fn outcome(result: Result<Value, LoadError>, expected: Option<Value>) -> CallOutcome {
        CallOutcome {
            call: "d.speak()".to_string(),
            result,
            expected,
        }
    }

    #[test]
    fn outcome_lines() {
        assert_eq!(
            outcome_line(&outcome(Ok(Value::from("woof")), None)),
            "ok   d.speak() = \"woof\""
        );
        assert_eq!(
            outcome_line(&outcome(Ok(Value::Int(1)), Some(Value::Int(2)))),
            "FAIL d.speak() = 1, expected 2"
        );
        let err = LoadError::UnknownObject {
            name: "d".into(),
            span: None,
        };
        assert!(outcome_line(&outcome(Err(err), None)).starts_with("FAIL d.speak(): error[F0007]: "));
    }

    #[test]
    fn outcome_json_fields() {
        let json = outcome_json(&outcome(Ok(Value::Int(3)), Some(Value::Int(3))));
        assert_eq!(json["call"], "d.speak()");
        assert_eq!(json["passed"], true);
        assert_eq!(json["value"], 3);
        assert_eq!(json["expected"], 3);
        assert!(json["error"].is_null());
    }

    #[test]
    fn cli_parses_global_options_after_the_subcommand() {
        let cli = Cli::try_parse_from(["vdispc", "run", "h.toml", "--json", "--no-color"]).unwrap();
        assert!(cli.no_color);
        assert!(matches!(cli.command, Commands::Run { json: true, .. }));

        let cli = Cli::try_parse_from(["vdispc", "--log-level", "debug", "repl"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Repl { file: None }));
    }
}
