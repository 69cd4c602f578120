//! PLL coefficient solver for the DRAM clock.
//!
//! # Clock Tree
//!
//! ```text
//!   crystal (27 MHz) ─┬─> REFPLL ──────────────────────────> DRAM clock  [RefPll path]
//!                     │      └─> cascade ref ─> DRAMPLL ───> DRAM clock  [DramPll path]
//!   one-source (1.62 GHz) ─> ÷ div ────────────────────────> DRAM clock  [OneSource path]
//! ```
//!
//! # PLL Formula
//!
//! ```text
//!   UPDATE_RATE = FIN / M
//!   VCO         = UPDATE_RATE * (N + SDM / 8192)
//!   FOUT        = VCO / P
//! ```
//!
//! All arithmetic is integer kHz with `u64` intermediates. The solver walks
//! every (P, M) pair inside the board limits, rounds N (and the SDM fraction
//! when enabled) to the nearest value, and keeps the candidate with the
//! smallest output error. The first candidate wins ties.
//!
//! # Spread Spectrum
//!
//! The SSD step is the spread depth applied to the full feedback value:
//!
//! ```text
//!   SSD = (N * 8192 + SDM) * depth_ppm / 1_000_000
//! ```

use gddr_platform::board::{BoardTable, FrequencyRecord, Limit, PllLimits};
use gddr_platform::fault::ConfigItem;
use gddr_platform::fbpa;
use gddr_platform::{ClockPath, FatalFault, PllId};
use gddr_platform::types::PllCoefficient;

/// Fractional feedback resolution.
pub const SDM_SCALE: u64 = 8192;

/// Deepest spread spectrum accepted, in ppm (5 %).
pub const MAX_SPREAD_PPM: u32 = 50_000;

/// Integer dividers of one PLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllCoefficients {
    /// Input divider.
    pub m: u32,
    /// Feedback multiplier.
    pub n: u32,
    /// Post divider.
    pub p: u32,
}

/// Complete programming of one PLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllSettings {
    /// Which PLL.
    pub pll: PllId,
    /// Dividers.
    pub coeff: PllCoefficients,
    /// Sigma-delta fraction in 1/8192 units, `None` when the SDM is off.
    pub sdm: Option<u32>,
    /// Spread-spectrum step, `None` when spread is off.
    pub ssd: Option<u32>,
    /// Input frequency in kHz.
    pub input_khz: u32,
}

impl PllSettings {
    /// Feedback value scaled by [`SDM_SCALE`].
    pub fn feedback_scaled(&self) -> u64 {
        u64::from(self.coeff.n)
            .saturating_mul(SDM_SCALE)
            .saturating_add(u64::from(self.sdm.unwrap_or(0)))
    }

    /// VCO frequency in kHz.
    pub fn vco_khz(&self) -> u32 {
        let denom = u64::from(self.coeff.m).saturating_mul(SDM_SCALE);
        let vco = u64::from(self.input_khz)
            .saturating_mul(self.feedback_scaled())
            .checked_div(denom)
            .unwrap_or(0);
        u32::try_from(vco).unwrap_or(u32::MAX)
    }

    /// Output frequency in kHz.
    pub fn output_khz(&self) -> u32 {
        self.vco_khz().checked_div(self.coeff.p).unwrap_or(0)
    }

    /// Coefficient register word.
    pub fn coeff_word(&self) -> u32 {
        fbpa::PLL_COEFF_M.encode(self.coeff.m)
            | fbpa::PLL_COEFF_N.encode(self.coeff.n)
            | fbpa::PLL_COEFF_P.encode(self.coeff.p)
    }

    /// SDM register word.
    pub fn sdm_word(&self) -> u32 {
        fbpa::PLL_SDM_DIN.encode(self.sdm.unwrap_or(0))
    }

    /// SSD register word (down-spread).
    pub fn ssd_word(&self) -> u32 {
        match self.ssd {
            Some(step) => fbpa::PLL_SSD_STEP.encode(step) | fbpa::PLL_SSD_DOWN.encode(1),
            None => 0,
        }
    }

    /// Modulator enable bits of the configuration register.
    pub fn cfg_mode_bits(&self) -> u32 {
        fbpa::PLL_CFG_SDM_EN.encode(u32::from(self.sdm.is_some()))
            | fbpa::PLL_CFG_SSC_EN.encode(u32::from(self.ssd.is_some()))
    }

    /// Rebuild settings from live register words.
    pub fn from_registers(pll: PllId, input_khz: u32, coeff: u32, cfg: u32, sdm: u32, ssd: u32) -> Self {
        Self {
            pll,
            coeff: PllCoefficients {
                m: fbpa::PLL_COEFF_M.extract(coeff),
                n: fbpa::PLL_COEFF_N.extract(coeff),
                p: fbpa::PLL_COEFF_P.extract(coeff),
            },
            sdm: (fbpa::PLL_CFG_SDM_EN.extract(cfg) == 1).then(|| fbpa::PLL_SDM_DIN.extract(sdm)),
            ssd: (fbpa::PLL_CFG_SSC_EN.extract(cfg) == 1).then(|| fbpa::PLL_SSD_STEP.extract(ssd)),
            input_khz,
        }
    }
}

/// Everything needed to produce one DRAM frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockPlan {
    /// Path selected.
    pub path: ClockPath,
    /// One-source divider (OneSource path only).
    pub onesource_div: Option<u32>,
    /// Reference PLL (RefPll and DramPll paths).
    pub refpll: Option<PllSettings>,
    /// DRAM PLL (DramPll path only).
    pub drampll: Option<PllSettings>,
}

impl ClockPlan {
    /// Resulting DRAM clock in kHz.
    pub fn output_khz(&self, onesource_src_khz: u32) -> u32 {
        match self.path {
            ClockPath::OneSource => onesource_src_khz
                .checked_div(self.onesource_div.unwrap_or(1))
                .unwrap_or(0),
            ClockPath::RefPll => self.refpll.map_or(0, |s| s.output_khz()),
            ClockPath::DramPll => self.drampll.map_or(0, |s| s.output_khz()),
        }
    }
}

fn out_of_range(pll: PllId, coefficient: PllCoefficient, value: u32, limit: Limit) -> FatalFault {
    FatalFault::PllOutOfRange {
        pll,
        coefficient,
        value,
        min: limit.min,
        max: limit.max,
    }
}

fn check(pll: PllId, coefficient: PllCoefficient, value: u32, limit: Limit) -> Result<(), FatalFault> {
    limit
        .check(value)
        .map(|_| ())
        .map_err(|_| out_of_range(pll, coefficient, value, limit))
}

/// Check every coefficient and derived frequency of `settings` against `limits`.
///
/// Run on every solution before it reaches the registers.
pub fn validate(settings: &PllSettings, limits: &PllLimits) -> Result<(), FatalFault> {
    let pll = settings.pll;
    check(pll, PllCoefficient::M, settings.coeff.m, limits.m)?;
    check(pll, PllCoefficient::N, settings.coeff.n, limits.n)?;
    check(pll, PllCoefficient::P, settings.coeff.p, limits.p)?;
    let update = settings.input_khz.checked_div(settings.coeff.m).unwrap_or(0);
    check(pll, PllCoefficient::UpdateRate, update, limits.update_rate_khz)?;
    if let Some(sdm) = settings.sdm {
        check(pll, PllCoefficient::Sdm, sdm, limits.sdm)?;
    }
    if let Some(ssd) = settings.ssd {
        check(pll, PllCoefficient::Ssd, ssd, limits.ssd)?;
    }
    check(pll, PllCoefficient::Vco, settings.vco_khz(), limits.vco_khz)
}

fn spread_step(feedback_scaled: u64, spread_ppm: u32) -> u32 {
    let step = feedback_scaled.saturating_mul(u64::from(spread_ppm)) / 1_000_000;
    u32::try_from(step).unwrap_or(u32::MAX)
}

/// Solve `pll` for `target_khz` from `input_khz`.
///
/// # Errors
///
/// [`FatalFault::PllOutOfRange`] describing the first limit violation
/// encountered when no (P, M) pair yields an in-range solution, and
/// [`FatalFault::ConfigOutOfRange`] for a spread deeper than
/// [`MAX_SPREAD_PPM`].
pub fn solve(
    pll: PllId,
    limits: &PllLimits,
    input_khz: u32,
    target_khz: u32,
    sdm: bool,
    spread_ppm: u32,
) -> Result<PllSettings, FatalFault> {
    if spread_ppm > MAX_SPREAD_PPM {
        return Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::SpreadDepth,
            value: spread_ppm,
            min: 0,
            max: MAX_SPREAD_PPM,
        });
    }

    let mut best: Option<(u32, PllSettings)> = None;
    let mut first_violation: Option<FatalFault> = None;
    let input = u64::from(input_khz).max(1);

    for p in limits.p.min.max(1)..=limits.p.max {
        for m in limits.m.min.max(1)..=limits.m.max {
            // feedback * 8192, rounded to nearest
            let numerator = u64::from(target_khz)
                .saturating_mul(u64::from(m))
                .saturating_mul(u64::from(p))
                .saturating_mul(SDM_SCALE);
            let scaled = numerator.saturating_add(input / 2).checked_div(input).unwrap_or(0);
            let (n, frac) = if sdm {
                (scaled / SDM_SCALE, Some(scaled % SDM_SCALE))
            } else {
                let rounded = scaled.saturating_add(SDM_SCALE / 2) / SDM_SCALE;
                (rounded, None)
            };
            let mut candidate = PllSettings {
                pll,
                coeff: PllCoefficients {
                    m,
                    n: u32::try_from(n).unwrap_or(u32::MAX),
                    p,
                },
                sdm: frac.map(|f| u32::try_from(f).unwrap_or(u32::MAX)),
                ssd: None,
                input_khz,
            };
            if spread_ppm > 0 {
                candidate.ssd = Some(spread_step(candidate.feedback_scaled(), spread_ppm));
            }
            match validate(&candidate, limits) {
                Ok(()) => {
                    let err = candidate.output_khz().abs_diff(target_khz);
                    if best.map_or(true, |(best_err, _)| err < best_err) {
                        best = Some((err, candidate));
                    }
                }
                Err(fault) => {
                    first_violation.get_or_insert(fault);
                }
            }
        }
    }

    match (best, first_violation) {
        (Some((_, settings)), _) => Ok(settings),
        (None, Some(fault)) => Err(fault),
        (None, None) => Err(out_of_range(pll, PllCoefficient::P, limits.p.min, limits.p)),
    }
}

/// One-source divider nearest to `target_khz`.
///
/// # Errors
///
/// [`FatalFault::PllOutOfRange`] (coefficient `OneSourceDiv`) when the
/// divider falls outside the board limit.
pub fn onesource_divider(board: &BoardTable<'_>, target_khz: u32) -> Result<u32, FatalFault> {
    let target = target_khz.max(1);
    let div = board
        .onesource_src_khz
        .saturating_add(target / 2)
        .checked_div(target)
        .unwrap_or(0);
    check(PllId::Ref, PllCoefficient::OneSourceDiv, div, board.onesource_div)?;
    Ok(div)
}

/// Compute the clock programming for `record` on `board`.
///
/// Cascaded records first solve the reference PLL for the board's cascade
/// reference, then solve the DRAM PLL from the reference PLL's actual output.
pub fn plan(board: &BoardTable<'_>, record: &FrequencyRecord) -> Result<ClockPlan, FatalFault> {
    let target_khz = record.freq_mhz.saturating_mul(1000);
    let plan = match record.path {
        ClockPath::OneSource => ClockPlan {
            path: ClockPath::OneSource,
            onesource_div: Some(onesource_divider(board, target_khz)?),
            refpll: None,
            drampll: None,
        },
        ClockPath::RefPll => ClockPlan {
            path: ClockPath::RefPll,
            onesource_div: None,
            refpll: Some(solve(
                PllId::Ref,
                board.limits_for(PllId::Ref)?,
                board.crystal_khz,
                target_khz,
                record.sdm,
                record.spread_ppm,
            )?),
            drampll: None,
        },
        ClockPath::DramPll => {
            let refpll = solve(
                PllId::Ref,
                board.limits_for(PllId::Ref)?,
                board.crystal_khz,
                board.cascade_ref_khz,
                false,
                0,
            )?;
            let drampll = solve(
                PllId::Dram,
                board.limits_for(PllId::Dram)?,
                refpll.output_khz(),
                target_khz,
                record.sdm,
                record.spread_ppm,
            )?;
            ClockPlan {
                path: ClockPath::DramPll,
                onesource_div: None,
                refpll: Some(refpll),
                drampll: Some(drampll),
            }
        }
    };
    fb_debug!(
        "clock plan {} MHz via {}",
        record.freq_mhz,
        plan.path
    );
    Ok(plan)
}

/// Re-validate a plan against the board limits before it is committed.
pub fn validate_plan(board: &BoardTable<'_>, plan: &ClockPlan) -> Result<(), FatalFault> {
    if let Some(div) = plan.onesource_div {
        check(PllId::Ref, PllCoefficient::OneSourceDiv, div, board.onesource_div)?;
    }
    if let Some(settings) = &plan.refpll {
        validate(settings, board.limits_for(PllId::Ref)?)?;
    }
    if let Some(settings) = &plan.drampll {
        validate(settings, board.limits_for(PllId::Dram)?)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use gddr_platform::fbpa::ChipGeneration;
    use gddr_platform::mocks::fixtures::{reference_board, DRAMPLL_LIMITS, REFPLL_LIMITS};

    #[test]
    fn cascade_reference_is_exact() {
        let s = solve(PllId::Ref, &REFPLL_LIMITS, 27_000, 100_000, false, 0).unwrap();
        assert_eq!(s.output_khz(), 100_000);
        assert_eq!(s.coeff, PllCoefficients { m: 9, n: 200, p: 6 });
        assert_eq!(s.vco_khz(), 600_000);
    }

    #[test]
    fn dram_pll_1750_from_cascade_reference() {
        let s = solve(PllId::Dram, &DRAMPLL_LIMITS, 100_000, 1_750_000, false, 0).unwrap();
        assert_eq!(s.coeff, PllCoefficients { m: 2, n: 35, p: 1 });
        assert_eq!(s.output_khz(), 1_750_000);
    }

    #[test]
    fn sdm_fraction_in_8192ths() {
        // 1750 MHz with M fixed at 1: N = 17.5 → 17 + 4096/8192
        let limits = PllLimits {
            m: Limit::new(1, 1),
            p: Limit::new(1, 1),
            ..DRAMPLL_LIMITS
        };
        let s = solve(PllId::Dram, &limits, 100_000, 1_750_000, true, 0).unwrap();
        assert_eq!(s.coeff.n, 17);
        assert_eq!(s.sdm, Some(4096));
        assert_eq!(s.output_khz(), 1_750_000);
    }

    #[test]
    fn integer_only_rounds_to_nearest_n() {
        let limits = PllLimits {
            m: Limit::new(1, 1),
            p: Limit::new(1, 1),
            ..DRAMPLL_LIMITS
        };
        let s = solve(PllId::Dram, &limits, 100_000, 1_760_000, false, 0).unwrap();
        assert_eq!(s.coeff.n, 18);
        assert_eq!(s.sdm, None);
    }

    #[test]
    fn spread_step_scales_feedback() {
        let s = solve(PllId::Dram, &DRAMPLL_LIMITS, 100_000, 2_000_000, true, 5_000).unwrap();
        assert_eq!(s.coeff.n, 20);
        assert_eq!(s.sdm, Some(0));
        // 20 * 8192 * 5000 / 1e6 = 819.2
        assert_eq!(s.ssd, Some(819));
        assert_ne!(s.ssd_word() & fbpa::PLL_SSD_DOWN.mask(), 0);
    }

    #[test]
    fn vco_above_limit_is_rejected_with_value() {
        let err = solve(PllId::Dram, &DRAMPLL_LIMITS, 100_000, 5_000_000, false, 0).unwrap_err();
        assert_eq!(
            err,
            FatalFault::PllOutOfRange {
                pll: PllId::Dram,
                coefficient: PllCoefficient::Vco,
                value: 5_000_000,
                min: 1_000_000,
                max: 4_000_000,
            }
        );
    }

    #[test]
    fn validate_rejects_each_coefficient() {
        let good = PllSettings {
            pll: PllId::Dram,
            coeff: PllCoefficients { m: 2, n: 35, p: 1 },
            sdm: None,
            ssd: None,
            input_khz: 100_000,
        };
        assert_eq!(validate(&good, &DRAMPLL_LIMITS), Ok(()));

        let cases = [
            (PllCoefficients { m: 5, n: 35, p: 1 }, PllCoefficient::M),
            (PllCoefficients { m: 2, n: 200, p: 1 }, PllCoefficient::N),
            (PllCoefficients { m: 2, n: 35, p: 9 }, PllCoefficient::P),
            (PllCoefficients { m: 1, n: 8, p: 1 }, PllCoefficient::Vco),
        ];
        for (coeff, expected) in cases {
            let err = validate(&PllSettings { coeff, ..good }, &DRAMPLL_LIMITS).unwrap_err();
            match err {
                FatalFault::PllOutOfRange { coefficient, .. } => assert_eq!(coefficient, expected),
                other => panic!("unexpected fault {other:?}"),
            }
        }
    }

    #[test]
    fn validate_rejects_each_reference_coefficient() {
        let good = PllSettings {
            pll: PllId::Ref,
            coeff: PllCoefficients { m: 1, n: 30, p: 1 },
            sdm: None,
            ssd: None,
            input_khz: 27_000,
        };
        assert_eq!(validate(&good, &REFPLL_LIMITS), Ok(()));

        let cases = [
            (PllCoefficients { m: 32, n: 30, p: 1 }, PllCoefficient::M),
            (PllCoefficients { m: 1, n: 4, p: 1 }, PllCoefficient::N),
            (PllCoefficients { m: 1, n: 30, p: 32 }, PllCoefficient::P),
            (PllCoefficients { m: 1, n: 10, p: 1 }, PllCoefficient::Vco),
            (PllCoefficients { m: 1, n: 80, p: 1 }, PllCoefficient::Vco),
        ];
        for (coeff, expected) in cases {
            match validate(&PllSettings { coeff, ..good }, &REFPLL_LIMITS).unwrap_err() {
                FatalFault::PllOutOfRange { pll, coefficient, .. } => {
                    assert_eq!(pll, PllId::Ref);
                    assert_eq!(coefficient, expected);
                }
                other => panic!("unexpected fault {other:?}"),
            }
        }
    }

    #[test]
    fn reference_update_rate_is_checked() {
        // 27 MHz / 27 = 1 MHz is the floor; /31 falls below it
        let s = PllSettings {
            pll: PllId::Ref,
            coeff: PllCoefficients { m: 31, n: 255, p: 1 },
            sdm: None,
            ssd: None,
            input_khz: 27_000,
        };
        assert!(matches!(
            validate(&s, &REFPLL_LIMITS),
            Err(FatalFault::PllOutOfRange {
                pll: PllId::Ref,
                coefficient: PllCoefficient::UpdateRate,
                ..
            })
        ));
    }

    #[test]
    fn reference_target_beyond_vco_is_rejected() {
        let err = solve(PllId::Ref, &REFPLL_LIMITS, 27_000, 2_000_000, false, 0).unwrap_err();
        assert!(matches!(err, FatalFault::PllOutOfRange { pll: PllId::Ref, .. }));
    }

    #[test]
    fn plan_uses_the_strap_limits() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.strap = 7;
        assert!(matches!(
            plan(&board, board.record_for(810).unwrap()),
            Err(FatalFault::ConfigOutOfRange {
                item: ConfigItem::PllLimits,
                value: 7,
                ..
            })
        ));
        let one = plan(&board, board.record_for(405).unwrap()).unwrap();
        assert_eq!(one.onesource_div, Some(4));
    }

    #[test]
    fn validate_plan_checks_both_plls() {
        let board = reference_board(ChipGeneration::Gddr6);
        let mut cascaded = plan(&board, board.record_for(1750).unwrap()).unwrap();
        if let Some(r) = cascaded.refpll.as_mut() {
            r.coeff.n = 4;
        }
        assert!(matches!(
            validate_plan(&board, &cascaded),
            Err(FatalFault::PllOutOfRange {
                pll: PllId::Ref,
                coefficient: PllCoefficient::N,
                ..
            })
        ));
    }

    #[test]
    fn sdm_outside_limits_is_rejected() {
        let s = PllSettings {
            pll: PllId::Ref,
            coeff: PllCoefficients { m: 1, n: 30, p: 1 },
            sdm: Some(9000),
            ssd: None,
            input_khz: 27_000,
        };
        assert!(matches!(
            validate(&s, &REFPLL_LIMITS),
            Err(FatalFault::PllOutOfRange {
                coefficient: PllCoefficient::Sdm,
                ..
            })
        ));
    }

    #[test]
    fn excessive_spread_is_a_config_fault() {
        let err = solve(PllId::Dram, &DRAMPLL_LIMITS, 100_000, 1_750_000, false, 60_000).unwrap_err();
        assert!(matches!(
            err,
            FatalFault::ConfigOutOfRange {
                item: ConfigItem::SpreadDepth,
                ..
            }
        ));
    }

    #[test]
    fn plans_for_each_path() {
        let board = reference_board(ChipGeneration::Gddr6);
        let one = plan(&board, board.record_for(405).unwrap()).unwrap();
        assert_eq!(one.onesource_div, Some(4));
        assert_eq!(one.output_khz(board.onesource_src_khz), 405_000);

        let refp = plan(&board, board.record_for(810).unwrap()).unwrap();
        assert_eq!(refp.refpll.map(|s| s.coeff), Some(PllCoefficients { m: 1, n: 30, p: 1 }));
        assert_eq!(refp.output_khz(board.onesource_src_khz), 810_000);

        let cascaded = plan(&board, board.record_for(1750).unwrap()).unwrap();
        assert_eq!(cascaded.refpll.map(|s| s.output_khz()), Some(100_000));
        assert_eq!(cascaded.output_khz(board.onesource_src_khz), 1_750_000);
        assert_eq!(validate_plan(&board, &cascaded), Ok(()));
    }

    #[test]
    fn settings_round_trip_through_registers() {
        let s = solve(PllId::Dram, &DRAMPLL_LIMITS, 100_000, 2_000_000, true, 5_000).unwrap();
        let cfg = fbpa::PLL_CFG_ENABLE.encode(1) | s.cfg_mode_bits();
        let back = PllSettings::from_registers(PllId::Dram, 100_000, s.coeff_word(), cfg, s.sdm_word(), s.ssd_word());
        assert_eq!(back, s);
    }
}
