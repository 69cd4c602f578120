use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;

pub fn run(gddr6x: bool, switch_mhz: Option<u32>) -> Result<()> {
    println!();
    println!("{}", "🖥  Running FB emulator...".cyan().bold());
    println!();

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "gddr-firmware", "--bin", "fb-emulator", "--features", "emulator", "--"]);
    if gddr6x {
        cmd.arg("--gddr6x");
    }
    if let Some(mhz) = switch_mhz {
        cmd.arg(mhz.to_string());
    }

    let status = cmd.status().context("Failed to start the emulator")?;
    if !status.success() {
        anyhow::bail!("Emulator exited with {status}");
    }
    Ok(())
}
