//! Supply sequencing for frequency switches.
//!
//! Supply changes are only qualified at known-good operating points. A
//! record that needs a different supply and names an intermediate frequency
//! is reached in two switches: first to the intermediate frequency at the
//! new supply, then to the target. Without an intermediate the supply is
//! changed inside the target switch while the DRAM is in self-refresh.

use gddr_platform::board::{BoardTable, FrequencyRecord};
use gddr_platform::FatalFault;

use crate::snapshot::RegisterSnapshot;

/// How a switch changes the supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltagePlan {
    /// Supplies already at the target.
    Unchanged,
    /// Commit the new supplies during the clock transition.
    InTransition,
    /// Switch to the given intermediate frequency at the new supplies first.
    ViaIntermediate(u32),
}

/// Whether `target` changes either supply relative to `current`.
pub fn supplies_differ(current: &RegisterSnapshot, target: &RegisterSnapshot) -> bool {
    current.vdd != target.vdd || current.vref_aux != target.vref_aux
}

/// Supply plan for a switch from `current` to `target` for `record`.
pub fn plan(current: &RegisterSnapshot, target: &RegisterSnapshot, record: &FrequencyRecord) -> VoltagePlan {
    if !supplies_differ(current, target) {
        return VoltagePlan::Unchanged;
    }
    match record.intermediate_mhz {
        Some(mhz) if mhz != record.freq_mhz => VoltagePlan::ViaIntermediate(mhz),
        _ => VoltagePlan::InTransition,
    }
}

/// Record for the intermediate hop: the intermediate frequency's clocks and
/// timings at `target`'s supplies.
///
/// # Errors
///
/// [`FatalFault::FrequencyUnsupported`] when the board has no record for
/// `intermediate_mhz`.
pub fn intermediate_record(
    board: &BoardTable<'_>,
    target: &FrequencyRecord,
    intermediate_mhz: u32,
) -> Result<FrequencyRecord, FatalFault> {
    let mut hop = *board.record_for(intermediate_mhz)?;
    hop.voltage_mv = target.voltage_mv;
    hop.aux_vref_mv = target.aux_vref_mv;
    hop.intermediate_mhz = None;
    Ok(hop)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pll;
    use gddr_platform::mocks::fixtures::reference_board;
    use gddr_platform::mocks::SimulatedFb;
    use gddr_platform::ChipGeneration;

    fn snapshots(mhz: u32) -> (RegisterSnapshot, RegisterSnapshot) {
        let board = reference_board(ChipGeneration::Gddr6);
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let record = board.record_for(mhz).unwrap();
        let plan = pll::plan(&board, record).unwrap();
        let current = RegisterSnapshot::save_current(&mut sim);
        let target = RegisterSnapshot::compute_target(&current, record, &plan, &board.training);
        (current, target)
    }

    #[test]
    fn same_supply_is_unchanged() {
        let board = reference_board(ChipGeneration::Gddr6);
        let (current, target) = snapshots(1750);
        assert_eq!(
            plan(&current, &target, board.record_for(1750).unwrap()),
            VoltagePlan::Unchanged
        );
    }

    #[test]
    fn supply_change_without_hop_happens_in_transition() {
        let board = reference_board(ChipGeneration::Gddr6);
        let (current, target) = snapshots(1500);
        assert_eq!(
            plan(&current, &target, board.record_for(1500).unwrap()),
            VoltagePlan::InTransition
        );
    }

    #[test]
    fn supply_change_with_hop_goes_via_intermediate() {
        let board = reference_board(ChipGeneration::Gddr6);
        let (current, target) = snapshots(2000);
        let record = board.record_for(2000).unwrap();
        assert_eq!(plan(&current, &target, record), VoltagePlan::ViaIntermediate(1500));
        let hop = intermediate_record(&board, record, 1500).unwrap();
        assert_eq!(hop.freq_mhz, 1500);
        assert_eq!(hop.voltage_mv, record.voltage_mv);
        assert_eq!(hop.intermediate_mhz, None);
    }
}
