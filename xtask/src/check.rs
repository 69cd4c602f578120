use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::run::{cargo, finished, OnFailure, Step};

const STEPS: &[Step<'static>] = &[
    Step {
        label: "Platform crate (no_std)",
        args: &["check", "-p", "gddr-platform", "--no-default-features"],
        on_failure: OnFailure::Abort,
    },
    Step {
        label: "Firmware core (no_std)",
        args: &["check", "-p", "gddr-firmware", "--lib", "--no-default-features"],
        on_failure: OnFailure::Abort,
    },
    Step {
        label: "Firmware hardware build (defmt, static workspace)",
        args: &["check", "-p", "gddr-firmware", "--lib", "--features", "hardware"],
        on_failure: OnFailure::Abort,
    },
    Step {
        label: "Emulator build (host)",
        args: &["check", "-p", "gddr-firmware", "--features", "emulator"],
        on_failure: OnFailure::Abort,
    },
    Step {
        label: "Clippy lints",
        args: &["clippy", "--workspace", "--all-targets", "--features", "gddr-firmware/tracing", "--", "-D", "warnings"],
        on_failure: OnFailure::Warn,
    },
    Step {
        label: "Formatting",
        args: &["fmt", "--all", "--check"],
        on_failure: OnFailure::Warn,
    },
];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking firmware builds...".cyan().bold());
    println!();

    let start = Instant::now();
    for step in STEPS {
        cargo(step)?;
    }
    finished("All checks", start);
    Ok(())
}
