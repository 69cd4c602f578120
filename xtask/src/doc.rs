use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::run::{cargo, finished, OnFailure, Step};

pub fn run(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Building documentation...".cyan().bold());
    println!();

    let start = Instant::now();
    let args: &[&str] = if open {
        &["doc", "--workspace", "--no-deps", "--document-private-items", "--open"]
    } else {
        &["doc", "--workspace", "--no-deps", "--document-private-items"]
    };
    cargo(&Step {
        label: "Documentation",
        args,
        on_failure: OnFailure::Abort,
    })?;

    if !open {
        println!(
            "   {}",
            "Open target/doc/gddr_firmware/index.html in your browser".dimmed()
        );
        println!("   {}", "Or run 'cargo run -p xtask -- doc --open'".dimmed());
        println!();
    }
    finished("Documentation", start);
    Ok(())
}
