//! Link training.
//!
//! ```text
//!  LinkTrainer ──► train_address / train_wck      single fatal passes
//!              ──► train_read / train_write       per pin class:
//!                     search  (area tables, min-max)   ─┐
//!                     hybrid  (tag register)           ─┴─► commit
//! ```
//!
//! Everything the algorithms need from the board table is resolved once into
//! a [`TrainingConfig`]; the large per-pin tables live in a caller-owned
//! [`TrainingWorkspace`] so nothing here allocates or uses globals.

pub mod area;
pub mod average;
mod commit;
pub mod engine;
mod hybrid;
mod search;
pub mod sweep;

use embedded_hal::delay::DelayNs;
use gddr_platform::board::{BoardTable, PiSweep, SweepRange};
use gddr_platform::fault::{ConfigItem, TrainingStage};
use gddr_platform::mailbox::{self, Progress};
use gddr_platform::{
    fbpa, ChipGeneration, Eye, FatalFault, PinClassId, RegisterBus, SignalingMode, TrainingDirection,
};

use crate::pins::{AnyPinTable, Dbi, Dq, PinClass, PinTable};

use self::area::{AreaTables, MAX_DFE_SLOTS};
use self::average::Accumulator;
use self::engine::{Engine, PassCommand};

/// Highest averaging loop count accepted from the board table.
pub const MAX_AVERAGING_LOOPS: u32 = 16;

/// One bit per partition.
const ALL_PARTITIONS: u8 = 0b0011_1111;

// ── Configuration ────────────────────────────────────────────────────────────

/// Resolved parameters of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionParams {
    /// Direction.
    pub direction: TrainingDirection,
    /// DFE window.
    pub dfe: SweepRange,
    /// First DFE code swept.
    pub dfe_start: u8,
    /// VREF window.
    pub vref: SweepRange,
    /// PI-offset pass parameters.
    pub pi: PiSweep,
    /// Fallback initial VREF per eye.
    pub back_key_vref: [u8; 3],
    /// Also train the DBI class.
    pub dbi: bool,
    /// Board DFE offset added after averaging.
    pub dfe_offset: i8,
    /// Board VREF offset added after averaging.
    pub vref_offset: i8,
}

/// Training parameters for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrainingConfig {
    /// Chip generation.
    pub generation: ChipGeneration,
    /// Signaling of the generation.
    pub signaling: SignalingMode,
    /// Enabled partitions.
    pub partition_mask: u8,
    /// Read direction.
    pub read: DirectionParams,
    /// Write direction.
    pub write: DirectionParams,
    /// Averaging loops, at least one.
    pub averaging_loops: u8,
    /// Smooth areas along the DFE axis before selection.
    pub moving_average: bool,
    /// Capture the initial VREF with the hardware area pass.
    pub area_based_initial_vref: bool,
    /// Use the tag-register strategy (NRZ only).
    pub hybrid: bool,
}

impl TrainingConfig {
    /// Resolve and validate the board's training table for `partition_mask`.
    ///
    /// # Errors
    ///
    /// [`FatalFault::ConfigOutOfRange`] for a mask enabling no partition, a
    /// zero or excessive loop count, a DFE window that does not fit the area
    /// tables or the DFE field, or an empty VREF or PI window.
    pub fn from_board(board: &BoardTable<'_>, partition_mask: u8) -> Result<Self, FatalFault> {
        if partition_mask & ALL_PARTITIONS == 0 {
            fb_error!("partition mask {} enables nothing", partition_mask);
            return Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::PartitionMask,
                value: u32::from(partition_mask),
                min: 1,
                max: u32::from(ALL_PARTITIONS),
            });
        }
        let table = &board.training;
        let offsets = board.strap_offsets();
        let loops = u32::from(table.averaging_loops);
        if !(1..=MAX_AVERAGING_LOOPS).contains(&loops) {
            return Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::AveragingLoops,
                value: loops,
                min: 1,
                max: MAX_AVERAGING_LOOPS,
            });
        }
        let read = DirectionParams {
            direction: TrainingDirection::Read,
            dfe: table.read.dfe,
            dfe_start: table.read.dfe_start,
            vref: table.read.vref,
            pi: table.read.pi,
            back_key_vref: table.read.back_key_vref,
            dbi: table.read.dbi,
            dfe_offset: offsets.read_dfe,
            vref_offset: offsets.read_vref,
        };
        let write = DirectionParams {
            direction: TrainingDirection::Write,
            dfe: table.write.dfe,
            dfe_start: table.write.dfe_start,
            vref: table.write.vref,
            pi: table.write.pi,
            back_key_vref: table.write.back_key_vref,
            dbi: table.write.dbi,
            dfe_offset: offsets.write_dfe,
            vref_offset: offsets.write_vref,
        };
        validate_direction(&read)?;
        validate_direction(&write)?;
        Ok(Self {
            generation: board.generation,
            signaling: board.generation.signaling(),
            partition_mask,
            read,
            write,
            averaging_loops: table.averaging_loops,
            moving_average: table.moving_average,
            area_based_initial_vref: table.area_based_initial_vref,
            hybrid: table.hybrid,
        })
    }

    /// Parameters of `direction`.
    pub fn direction(&self, direction: TrainingDirection) -> &DirectionParams {
        match direction {
            TrainingDirection::Read => &self.read,
            TrainingDirection::Write => &self.write,
        }
    }

    /// Eyes measured under this signaling.
    pub fn eyes(&self) -> &'static [Eye] {
        self.signaling.eyes()
    }
}

fn validate_direction(params: &DirectionParams) -> Result<(), FatalFault> {
    let dfe_points = u32::try_from(params.dfe.points()).unwrap_or(u32::MAX);
    let dfe_limit = u32::try_from(MAX_DFE_SLOTS).unwrap_or(u32::MAX);
    if !(1..=dfe_limit).contains(&dfe_points) {
        return Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::DfeSweep,
            value: dfe_points,
            min: 1,
            max: dfe_limit,
        });
    }
    let dfe_field_max = fbpa::TRNG_DFE_CODE.max_value();
    if u32::from(params.dfe.max) > dfe_field_max {
        return Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::DfeSweep,
            value: u32::from(params.dfe.max),
            min: 0,
            max: dfe_field_max,
        });
    }
    if params.vref.points() == 0 {
        return Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::VrefSweep,
            value: u32::from(params.vref.step),
            min: 1,
            max: u32::from(u8::MAX),
        });
    }
    if params.pi.offset.points() == 0 {
        return Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::PiSweep,
            value: u32::from(params.pi.offset.step),
            min: 1,
            max: u32::from(u8::MAX),
        });
    }
    Ok(())
}

// ── Workspace ────────────────────────────────────────────────────────────────

/// Per-pin scratch state of a training run.
///
/// Large enough that target builds place it in a `static`; host builds box
/// it.
pub struct TrainingWorkspace {
    pub(crate) tables: AreaTables,
    pub(crate) accum: Accumulator,
    pub(crate) initial_vref: [AnyPinTable<u8>; 3],
}

impl TrainingWorkspace {
    /// Empty workspace.
    pub const fn new() -> Self {
        Self {
            tables: AreaTables::new(),
            accum: Accumulator::new(),
            initial_vref: [PinTable::filled(0); 3],
        }
    }

    /// Area tables of the last loop run.
    pub fn tables(&self) -> &AreaTables {
        &self.tables
    }

    /// Accumulated selections of the last class trained.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accum
    }
}

impl Default for TrainingWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

// ── Trainer ──────────────────────────────────────────────────────────────────

/// Runs the training stages of one switch against the hardware.
pub struct LinkTrainer<'a, B: ?Sized, D: ?Sized> {
    engine: Engine<'a, B, D>,
    config: &'a TrainingConfig,
    ws: &'a mut TrainingWorkspace,
}

impl<'a, B, D> LinkTrainer<'a, B, D>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    /// Trainer for `config` using `ws` as scratch space.
    pub fn new(bus: &'a mut B, delay: &'a mut D, config: &'a TrainingConfig, ws: &'a mut TrainingWorkspace) -> Self {
        Self {
            engine: Engine::new(bus, delay, config.generation),
            config,
            ws,
        }
    }

    fn single_pass(&mut self, opcode: u32, stage: TrainingStage, direction: TrainingDirection) -> Result<(), FatalFault> {
        let cmd = PassCommand {
            opcode,
            stage,
            direction,
            class: PinClassId::Dq,
            eye: Eye::Low,
            pass: fbpa::PASS_SINGLE,
        };
        self.engine.require(&cmd).inspect_err(|fault| {
            fb_error!("{} training failed: {}", stage, fault);
        })
    }

    /// Command/address training.
    ///
    /// # Errors
    ///
    /// Timeout or error of the address pass.
    pub fn train_address(&mut self) -> Result<(), FatalFault> {
        fb_info!("address training");
        let opcode = self.engine.opcodes().address;
        self.single_pass(opcode, TrainingStage::Address, TrainingDirection::Read)?;
        mailbox::progress(self.engine.bus(), Progress::AddressTrained);
        Ok(())
    }

    /// WCK-to-CK alignment.
    ///
    /// # Errors
    ///
    /// Timeout or error of the WCK pass.
    pub fn train_wck(&mut self) -> Result<(), FatalFault> {
        fb_info!("wck training");
        let opcode = self.engine.opcodes().wck;
        self.single_pass(opcode, TrainingStage::Wck, TrainingDirection::Read)?;
        mailbox::progress(self.engine.bus(), Progress::WckTrained);
        Ok(())
    }

    /// Read-direction DFE/VREF training, DQ then (if enabled) DBI.
    ///
    /// # Errors
    ///
    /// Zero eye area on any pin, or a failed mode-register write.
    pub fn train_read(&mut self) -> Result<(), FatalFault> {
        fb_info!("read training, {} signaling", self.config.signaling);
        self.train_class::<Dq>(TrainingDirection::Read)?;
        if self.config.read.dbi {
            self.train_class::<Dbi>(TrainingDirection::Read)?;
        }
        mailbox::progress(self.engine.bus(), Progress::ReadTrained);
        fb_info!("read training done");
        Ok(())
    }

    /// Write-direction DFE/VREF training followed by the verification pass.
    ///
    /// # Errors
    ///
    /// Zero eye area on any pin, a failed mode-register write, or a failed
    /// verification pass.
    pub fn train_write(&mut self) -> Result<(), FatalFault> {
        fb_info!("write training, {} signaling", self.config.signaling);
        self.train_class::<Dq>(TrainingDirection::Write)?;
        if self.config.write.dbi {
            let saved = commit::enter_dbi_training(&mut self.engine)?;
            let trained = self.train_class::<Dbi>(TrainingDirection::Write);
            commit::leave_dbi_training(&mut self.engine, saved)?;
            trained?;
        }
        let opcode = self.engine.opcodes().verify;
        self.single_pass(opcode, TrainingStage::WriteVerify, TrainingDirection::Write)?;
        mailbox::progress(self.engine.bus(), Progress::WriteTrained);
        fb_info!("write training done");
        Ok(())
    }

    fn train_class<C: PinClass>(&mut self, direction: TrainingDirection) -> Result<(), FatalFault> {
        let hybrid = self.config.hybrid && self.config.signaling == SignalingMode::Nrz;
        if self.config.hybrid && !hybrid {
            fb_warn!("hybrid training needs NRZ signaling, using area search");
        }
        fb_info!("{} {} training, {} loops", direction, C::ID, self.config.averaging_loops);
        if hybrid {
            hybrid::run::<B, D, C>(&mut self.engine, self.config, self.ws, direction)?;
        } else {
            search::run::<B, D, C>(&mut self.engine, self.config, self.ws, direction)?;
        }
        commit::apply::<B, D, C>(&mut self.engine, self.config, self.ws, direction)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gddr_platform::mocks::fixtures::reference_board;

    #[test]
    fn from_board_applies_strap_offsets() {
        let mut board = reference_board(ChipGeneration::Gddr6x);
        board.strap = 1;
        let config = TrainingConfig::from_board(&board, 0x3F).unwrap();
        assert_eq!(config.read.vref_offset, 2);
        assert_eq!(config.write.vref_offset, 0);
        assert_eq!(config.signaling, SignalingMode::Pam4);
        assert_eq!(config.eyes().len(), 3);
    }

    #[test]
    fn mask_without_partitions_rejected() {
        let board = reference_board(ChipGeneration::Gddr6);
        for mask in [0x00, 0xC0] {
            assert_eq!(
                TrainingConfig::from_board(&board, mask),
                Err(FatalFault::ConfigOutOfRange {
                    item: ConfigItem::PartitionMask,
                    value: u32::from(mask),
                    min: 1,
                    max: 0x3F,
                })
            );
        }
        assert!(TrainingConfig::from_board(&board, 0x20).is_ok());
    }

    #[test]
    fn inverted_dfe_window_rejected() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.training.read.dfe = SweepRange::new(7, 0, 1);
        assert!(matches!(
            TrainingConfig::from_board(&board, 0x3F),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::DfeSweep,
                value: 0,
                ..
            })
        ));
    }

    #[test]
    fn zero_loops_rejected() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.training.averaging_loops = 0;
        assert!(matches!(
            TrainingConfig::from_board(&board, 0x3F),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::AveragingLoops,
                ..
            })
        ));
    }

    #[test]
    fn oversized_dfe_window_rejected() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.training.write.dfe = SweepRange::new(0, 31, 1);
        assert_eq!(
            TrainingConfig::from_board(&board, 0x3F),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::DfeSweep,
                value: 32,
                min: 1,
                max: 16,
            })
        );
    }

    #[test]
    fn empty_vref_window_rejected() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.training.read.vref = SweepRange::new(0x20, 0x10, 1);
        assert!(matches!(
            TrainingConfig::from_board(&board, 0x3F),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::VrefSweep,
                ..
            })
        ));
    }
}
