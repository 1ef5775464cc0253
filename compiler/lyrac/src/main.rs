//! Lyra command-line shell.
//!
//! With file arguments, evaluates each file in order and exits. Without
//! arguments, runs a line-oriented REPL: input is accumulated until it
//! forms a complete expression (by parenthesis balance), then evaluated
//! against the shared top level.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use lyra_compile::{Interp, LyraError};
use lyra_ir::Datum;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("Usage: lyrac [file.scm ...]");
        println!();
        println!("Without arguments, starts an interactive session.");
        return ExitCode::SUCCESS;
    }

    if args.is_empty() {
        repl();
        return ExitCode::SUCCESS;
    }

    let mut interp = Interp::new();
    for path in &args {
        let src = match std::fs::read_to_string(path) {
            Ok(src) => src,
            Err(e) => {
                eprintln!("lyrac: cannot read {path}: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = interp.eval_source(&src, Some(path)) {
            report(&e);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn repl() {
    let mut interp = Interp::new();
    let stdin = io::stdin();
    let mut pending = String::new();

    prompt(pending.is_empty());
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        if pending.is_empty() && line.trim() == ",exit" {
            break;
        }

        pending.push_str(&line);
        pending.push('\n');

        if !interp.is_complete_expr(&pending) {
            prompt(false);
            continue;
        }

        let src = std::mem::take(&mut pending);
        if !src.trim().is_empty() {
            match interp.eval_str(&src) {
                Ok(Datum::Unspec) => {}
                Ok(d) => println!("{d}"),
                Err(e) => report(&e),
            }
        }
        prompt(true);
    }
}

fn prompt(fresh: bool) {
    print!("{}", if fresh { "lyra> " } else { "....> " });
    let _ = io::stdout().flush();
}

fn report(e: &LyraError) {
    match e {
        LyraError::Parse(p) => eprintln!("{p}"),
        LyraError::Eval(e) => eprintln!("*** {e}"),
    }
}
