//! FB Emulator
//!
//! Boot-time training against the simulated memory controller, optionally
//! followed by a runtime switch.
//! Run with: cargo run -p gddr-firmware --bin fb-emulator --features emulator -- [--gddr6x] [MHZ]

use gddr_firmware::{run_boot_time_training, ClockSwitch, StageFlags, SwitchOutcome, TrainingConfig, TrainingWorkspace};
use gddr_platform::mailbox;
use gddr_platform::mocks::fixtures::reference_board;
use gddr_platform::mocks::{RecordingDelay, SimulatedFb};
use gddr_platform::{fbpa, ChipGeneration, RegisterBus};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut generation = ChipGeneration::Gddr6;
    let mut runtime_mhz = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--gddr6x" => generation = ChipGeneration::Gddr6x,
            other => runtime_mhz = Some(other.parse::<u32>()?),
        }
    }

    let board = reference_board(generation);
    let mut sim = SimulatedFb::new(generation);
    let mut delay = RecordingDelay::new();
    let mut ws = Box::new(TrainingWorkspace::new());

    let label = match generation {
        ChipGeneration::Gddr6 => "GDDR6 (NRZ)",
        ChipGeneration::Gddr6x => "GDDR6X (PAM4)",
    };
    println!("FB Emulator - {label}");
    let report = run_boot_time_training(&mut sim, &mut delay, &board, &mut ws).map_err(|f| f.to_string())?;
    println!(
        "✓ Boot trained at {} MHz ({} polls, {} training passes)",
        report.freq_mhz,
        report.polls,
        sim.passes().len()
    );

    if let Some(mhz) = runtime_mhz {
        let mask = u8::try_from(sim.read_field(fbpa::PARTITION_MASK, fbpa::PARTITION_MASK_BITS))?;
        let config = TrainingConfig::from_board(&board, mask).map_err(|f| f.to_string())?;
        let mut switch = ClockSwitch::new(&board, config);
        match switch
            .switch_to_frequency(&mut sim, &mut delay, &mut ws, mhz, StageFlags::FULL)
            .map_err(|f| f.to_string())?
        {
            SwitchOutcome::Complete(r) => println!("✓ Switched to {} MHz ({} polls)", r.freq_mhz, r.polls),
            SwitchOutcome::Suspended { resume } => println!("Switch suspended at {resume}"),
        }
    }

    println!("Simulated time: {} us", delay.total_ns / 1_000);
    println!(
        "Mailbox: progress {:#06x}, fault {:#06x}, frequency {} MHz",
        sim.peek(mailbox::slot(mailbox::SLOT_PROGRESS)),
        sim.peek(mailbox::slot(mailbox::SLOT_FAULT_CODE)),
        sim.peek(mailbox::slot(mailbox::SLOT_FREQUENCY_MHZ)),
    );
    Ok(())
}
