//! Platform layer for the GDDR memory-controller firmware
//!
//! Everything the training and clock-switch firmware needs from the outside
//! world, expressed as types and traits so the firmware itself stays pure
//! control logic.
//!
//! # Architecture Layers
//!
//! ```text
//! Boot / runtime entry (gddr-firmware::boot)
//!         ↓
//! Link training + clock switching (gddr-firmware)
//!         ↓
//! Platform (this crate - register bus, register map, board tables, faults)
//!         ↓
//! Memory-mapped FBPA registers
//! ```
//!
//! # Contents
//!
//! - [`regs`] - [`RegisterBus`], bit [`Field`]s and the write [`fence`]
//! - [`fbpa`] - register map and per-generation opcode tables
//! - [`poll`] - bounded polling over the `DelayNs` timer
//! - [`fault`] - [`FatalFault`] taxonomy and the [`Halt`] trait
//! - [`mailbox`] - host-visible progress and fault reporting
//! - [`board`] - frequency records, PLL limits, training table
//! - [`mocks`] - host-only register file and controller model (`std`)
//!
//! # Features
//!
//! - `std`: host mocks and the simulated controller
//! - `hardware`: physical target build
//! - `defmt`: `defmt::Format` derives on all public types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this register-level crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // register accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)] // field widths bound every narrowing cast

pub mod board;
pub mod fault;
pub mod fbpa;
pub mod mailbox;
pub mod mocks;
pub mod poll;
pub mod regs;
pub mod types;

pub use board::{BoardTable, FrequencyRecord, TrainingSelect};
pub use fault::{FatalFault, Halt};
pub use fbpa::ChipGeneration;
pub use poll::{poll_until, PollBudget, PollTimeout};
pub use regs::{fence, Field, RegAddr, RegisterBus};
pub use types::{ClockPath, Eye, OutOfRangeError, PinClassId, PllId, SignalingMode, TrainingDirection};
