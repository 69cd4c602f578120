//! Architecture boundary tests - run with `cargo test -p gddr-firmware --test arch_boundaries`
// Architecture test file: unwrap/panic/indexing are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
//!
//! Layering rules:
//!   Rule 1: platform (registers, board tables, mailbox) must not depend on firmware
//!   Rule 2: the firmware core is integer-only: no `f32`/`f64` in any source file
//!   Rule 3: the core is generic over `RegisterBus`; nothing outside the
//!           simulator names a concrete bus

use std::fs;
use std::path::{Path, PathBuf};

fn firmware_sources() -> Vec<PathBuf> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, out);
            } else if path.extension().is_some_and(|e| e == "rs") {
                out.push(path);
            }
        }
    }
    let mut out = Vec::new();
    walk(&Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), &mut out);
    out
}

/// If `gddr-platform` named `gddr-firmware` in its manifest, this binary
/// would not link (firmware -> platform -> firmware).
#[test]
fn platform_does_not_depend_on_firmware() {
    let manifest = include_str!("../../platform/Cargo.toml");
    assert!(
        !manifest.contains("gddr-firmware"),
        "platform must not depend on the firmware crate"
    );
}

/// Enabling `defmt` on the firmware alone must also derive `defmt::Format`
/// on the platform types the firmware logs.
#[test]
fn defmt_feature_reaches_platform() {
    let manifest = include_str!("../Cargo.toml");
    let line = manifest
        .lines()
        .find(|l| l.trim_start().starts_with("defmt = ["))
        .expect("firmware manifest declares a defmt feature");
    assert!(line.contains("\"dep:defmt\""), "{line}");
    assert!(line.contains("\"gddr-platform/defmt\""), "{line}");
}

/// The register bus trait is reachable without any firmware type.
#[test]
fn platform_bus_is_independent() {
    fn _assert_bus_trait_exists<T: gddr_platform::RegisterBus>() {}
    fn _assert_halt_trait_exists<T: gddr_platform::Halt>() {}
}

#[test]
fn firmware_core_has_no_floating_point() {
    let sources = firmware_sources();
    assert!(!sources.is_empty());
    for path in sources {
        let text = fs::read_to_string(&path).unwrap();
        for (line_no, line) in text.lines().enumerate() {
            let code = line.split("//").next().unwrap_or("");
            for ty in ["f32", "f64"] {
                let hit = code
                    .match_indices(ty)
                    .any(|(i, _)| !code[..i].ends_with(|c: char| c.is_ascii_alphanumeric() || c == '_'));
                assert!(!hit, "{}:{}: floating point type `{ty}`", path.display(), line_no + 1);
            }
        }
    }
}

#[test]
fn core_never_names_the_simulator() {
    for path in firmware_sources() {
        if path.components().any(|c| c.as_os_str() == "bin") {
            continue;
        }
        let text = fs::read_to_string(&path).unwrap();
        let body = text.split("#[cfg(test)]").next().unwrap_or("");
        assert!(
            !body.contains("SimulatedFb"),
            "{} uses the simulator outside its tests",
            path.display()
        );
    }
}
