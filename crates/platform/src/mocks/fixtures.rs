//! Reference board used by host tests.
//!
//! Matches the power-on state of [`super::SimulatedFb`]: 27 MHz crystal,
//! 1.62 GHz one-source input, reference PLL cascaded at 100 MHz.

use crate::board::{
    BoardOffsets, BoardTable, DirectionTable, FrequencyRecord, Limit, PiSweep, PllLimits, PllLimitsEntry,
    SweepRange, TrainingSelect, TrainingTable, MODE_REGISTERS, TIMING_WORDS,
};
use crate::fbpa::ChipGeneration;
use crate::types::{ClockPath, PllId};

const fn timing_for(mhz: u32) -> [u32; TIMING_WORDS] {
    let mut words = [0u32; TIMING_WORDS];
    let mut i = 0;
    while i < TIMING_WORDS {
        words[i] = (mhz << 16) | i as u32;
        i += 1;
    }
    words
}

const fn mode_registers_for(mhz: u32) -> [u16; MODE_REGISTERS] {
    let mut mrs = [0u16; MODE_REGISTERS];
    let mut i = 0;
    while i < MODE_REGISTERS {
        mrs[i] = (((mhz / 50) as u16) << 4 | i as u16) & 0x0FFF;
        i += 1;
    }
    mrs
}

const fn record(
    freq_mhz: u32,
    path: ClockPath,
    voltage_mv: u16,
    intermediate_mhz: Option<u32>,
    training: TrainingSelect,
) -> FrequencyRecord {
    FrequencyRecord {
        freq_mhz,
        path,
        voltage_mv,
        aux_vref_mv: voltage_mv / 2,
        intermediate_mhz,
        spread_ppm: 0,
        sdm: false,
        timing: timing_for(freq_mhz),
        mode_registers: mode_registers_for(freq_mhz),
        refresh_interval: 0x0C30,
        training,
    }
}

const ADDRESS_WCK: TrainingSelect = TrainingSelect {
    address: true,
    wck: true,
    read: false,
    write: false,
};

/// Supported frequencies of the reference board.
pub static RECORDS: [FrequencyRecord; 6] = [
    record(405, ClockPath::OneSource, 1350, None, TrainingSelect::NONE),
    record(810, ClockPath::RefPll, 1350, None, ADDRESS_WCK),
    record(1250, ClockPath::DramPll, 1350, None, TrainingSelect::ALL),
    record(1500, ClockPath::DramPll, 1400, None, TrainingSelect::ALL),
    record(1750, ClockPath::DramPll, 1350, None, TrainingSelect::ALL),
    FrequencyRecord {
        spread_ppm: 5_000,
        sdm: true,
        ..record(2000, ClockPath::DramPll, 1400, Some(1500), TrainingSelect::ALL)
    },
];

/// Per-strap trims: strap 1 raises read VREF by two codes.
pub static OFFSETS: [BoardOffsets; 2] = [
    BoardOffsets {
        strap: 0,
        read_vref: 0,
        read_dfe: 0,
        write_vref: 0,
        write_dfe: 0,
    },
    BoardOffsets {
        strap: 1,
        read_vref: 2,
        read_dfe: 0,
        write_vref: 0,
        write_dfe: 0,
    },
];

const DIRECTION: DirectionTable = DirectionTable {
    dfe: SweepRange::new(0, 7, 1),
    dfe_start: 3,
    vref: SweepRange::new(0x10, 0x70, 1),
    pi: PiSweep {
        offset: SweepRange::new(0, 31, 1),
        coarse_step: 4,
        fine_step: 1,
    },
    back_key_vref: [0x40, 0x48, 0x50],
    dbi: true,
};

/// Training table: DFE 0..=7 starting at 3, four averaging loops.
pub const TRAINING: TrainingTable = TrainingTable {
    read: DIRECTION,
    write: DIRECTION,
    averaging_loops: 4,
    moving_average: false,
    area_based_initial_vref: true,
    hybrid: false,
};

/// Reference-PLL limits.
pub const REFPLL_LIMITS: PllLimits = PllLimits {
    m: Limit::new(1, 31),
    n: Limit::new(5, 255),
    p: Limit::new(1, 31),
    update_rate_khz: Limit::new(1_000, 30_000),
    vco_khz: Limit::new(500_000, 1_600_000),
    sdm: Limit::new(0, 8191),
    ssd: Limit::new(0, 4096),
};

/// DRAM-PLL limits.
pub const DRAMPLL_LIMITS: PllLimits = PllLimits {
    m: Limit::new(1, 4),
    n: Limit::new(8, 127),
    p: Limit::new(1, 4),
    update_rate_khz: Limit::new(25_000, 100_000),
    vco_khz: Limit::new(1_000_000, 4_000_000),
    sdm: Limit::new(0, 8191),
    ssd: Limit::new(0, 4096),
};

/// Both PLLs for straps 0 and 1.
pub static PLL_LIMITS: [PllLimitsEntry; 4] = [
    PllLimitsEntry { strap: 0, pll: PllId::Ref, limits: REFPLL_LIMITS },
    PllLimitsEntry { strap: 0, pll: PllId::Dram, limits: DRAMPLL_LIMITS },
    PllLimitsEntry { strap: 1, pll: PllId::Ref, limits: REFPLL_LIMITS },
    PllLimitsEntry { strap: 1, pll: PllId::Dram, limits: DRAMPLL_LIMITS },
];

/// Reference board for `generation`, strap 0, booting to 1750 MHz.
#[must_use]
pub fn reference_board(generation: ChipGeneration) -> BoardTable<'static> {
    BoardTable {
        generation,
        strap: 0,
        crystal_khz: 27_000,
        onesource_src_khz: 1_620_000,
        cascade_ref_khz: 100_000,
        onesource_div: Limit::new(1, 63),
        pll_limits: &PLL_LIMITS,
        records: &RECORDS,
        training: TRAINING,
        offsets: &OFFSETS,
        boot_mhz: 1750,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{ConfigItem, FatalFault};

    #[test]
    fn exact_record_is_preferred() {
        let board = reference_board(ChipGeneration::Gddr6);
        assert_eq!(board.record_for(1250).map(|r| r.freq_mhz), Ok(1250));
    }

    #[test]
    fn request_between_records_rounds_up() {
        let board = reference_board(ChipGeneration::Gddr6);
        assert_eq!(board.record_for(1251).map(|r| r.freq_mhz), Ok(1500));
        assert_eq!(board.record_for(1).map(|r| r.freq_mhz), Ok(405));
    }

    #[test]
    fn request_above_every_record_is_fatal() {
        let board = reference_board(ChipGeneration::Gddr6);
        assert_eq!(
            board.record_for(2001).map(|r| r.freq_mhz),
            Err(FatalFault::FrequencyUnsupported {
                requested_mhz: 2001,
                max_mhz: 2000
            })
        );
    }

    #[test]
    fn pll_limits_follow_the_strap() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.strap = 1;
        assert_eq!(board.limits_for(PllId::Dram), Ok(&DRAMPLL_LIMITS));
        assert_eq!(board.limits_for(PllId::Ref), Ok(&REFPLL_LIMITS));
    }

    #[test]
    fn strap_without_pll_limits_is_a_config_fault() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.strap = 9;
        assert_eq!(
            board.limits_for(PllId::Dram),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::PllLimits,
                value: 9,
                min: 0,
                max: 1,
            })
        );
        let only_ref = [PLL_LIMITS[0]];
        let board = BoardTable {
            pll_limits: &only_ref,
            ..reference_board(ChipGeneration::Gddr6)
        };
        assert!(board.limits_for(PllId::Ref).is_ok());
        assert!(board.limits_for(PllId::Dram).is_err());
    }

    #[test]
    fn inverted_window_clamps_without_panicking() {
        let inverted = SweepRange::new(9, 3, 1);
        assert_eq!(inverted.clamp(0), 3);
        assert_eq!(inverted.clamp(20), 3);
        assert_eq!(SweepRange::new(3, 9, 1).clamp(-4), 3);
        assert_eq!(SweepRange::new(3, 9, 1).clamp(400), 9);
    }

    #[test]
    fn unknown_strap_gets_zero_offsets() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.strap = 9;
        assert_eq!(board.strap_offsets().read_vref, 0);
        board.strap = 1;
        assert_eq!(board.strap_offsets().read_vref, 2);
    }

    #[test]
    fn sweep_range_points_and_grid() {
        let r = SweepRange::new(2, 10, 4);
        assert_eq!(r.points(), 3);
        assert!(r.contains(6));
        assert!(!r.contains(7));
        assert_eq!(SweepRange::new(5, 4, 1).points(), 0);
        assert_eq!(r.clamp(-3), 2);
        assert_eq!(r.clamp(99), 10);
    }
}
