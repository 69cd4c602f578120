//! GDDR link-training and clock-switch firmware
//!
//! Boot-time training and runtime frequency switching for a GDDR6/GDDR6X
//! memory controller, written against the register bus and board tables of
//! `gddr-platform`.
//!
//! # Architecture
//!
//! ```text
//! Boot / switch entry (boot)
//!         ↓
//! Clock-switch state machine (clock) ──► link training (training)
//!         ↓                                      ↓
//! Register snapshots, PLL solver, MRS (snapshot, pll, mrs)
//!         ↓
//! Platform (gddr-platform: RegisterBus, fence, poll, mailbox)
//! ```
//!
//! # Features
//!
//! - `hardware` - target build: `defmt` logging, static training workspace
//! - `tracing` - host logging through `tracing`
//! - `emulator` - desktop emulator binary against the simulated controller
//! - `std` - standard library (host mocks)
//!
//! # Emulator
//!
//! ```bash
//! cargo run -p gddr-firmware --bin fb-emulator --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
#![deny(clippy::float_arithmetic)] // integer-only firmware core
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // every error is a FatalFault
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]

#[macro_use]
mod log;

pub mod boot;
pub mod clock;
pub mod mrs;
pub mod pins;
pub mod pll;
pub mod snapshot;
pub mod training;

// Re-export key types
pub use boot::{boot_entry, run_boot_time_training, switch_entry};
pub use clock::{ClockSwitch, StageFlags, SwitchOutcome, SwitchReport, SwitchState};
pub use snapshot::{CommitSet, RegisterSnapshot, SnapshotPair};
pub use training::{LinkTrainer, TrainingConfig, TrainingWorkspace};
