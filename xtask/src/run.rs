//! Timed cargo invocations with coloured pass/fail lines.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// Whether a failing step aborts the task or only warns.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Abort,
    Warn,
}

/// One cargo invocation.
pub struct Step<'a> {
    pub label: &'a str,
    pub args: &'a [&'a str],
    pub on_failure: OnFailure,
}

/// Run `step`, print its outcome and return the output on success.
pub fn cargo(step: &Step<'_>) -> Result<Option<Output>> {
    println!("{}", format!("  {}...", step.label).cyan());
    let start = Instant::now();
    let output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to run cargo {}", step.args.join(" ")))?;

    if output.status.success() {
        println!(
            "{}",
            format!("  ✓ {} passed in {:.2}s", step.label, start.elapsed().as_secs_f64()).green()
        );
        println!();
        return Ok(Some(output));
    }

    match step.on_failure {
        OnFailure::Abort => {
            eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                eprintln!("  {line}");
            }
            anyhow::bail!("{} failed", step.label);
        }
        OnFailure::Warn => {
            eprintln!("{}", format!("  ⚠ {} reported problems", step.label).yellow().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            println!();
            Ok(None)
        }
    }
}

/// Print the closing line of a task.
pub fn finished(what: &str, start: Instant) {
    println!(
        "{}",
        format!("✓ {what} completed in {:.2}s", start.elapsed().as_secs_f64())
            .green()
            .bold()
    );
    println!();
}
