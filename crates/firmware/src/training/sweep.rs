//! Two-directional DFE sweep order.
//!
//! The sweep starts at the configured code, walks up to the window maximum,
//! then returns to the start and walks down to the minimum:
//!
//! ```text
//!   start, start+step, ..., max, start, start-step, ..., min
//! ```
//!
//! The start code is therefore visited twice. Its second visit is flagged
//! `revisit` so the caller can reuse the VREF trained on the first visit and
//! average the two area measurements.

use gddr_platform::board::SweepRange;

/// One DFE code to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPoint {
    /// DFE code.
    pub code: u8,
    /// Table slot of the code: `(code - min) / step`.
    pub slot: usize,
    /// Second visit of the start code.
    pub revisit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Up,
    Down,
    Done,
}

/// Iterator over the sweep points of a window.
#[derive(Debug, Clone)]
pub struct SweepOrder {
    range: SweepRange,
    start_slot: usize,
    last_slot: usize,
    next_slot: usize,
    leg: Leg,
}

impl SweepOrder {
    /// Order for `range` starting at `start`.
    ///
    /// A start off the stepped grid snaps down to the nearest grid code; a
    /// start outside the window is clamped into it. An empty window yields
    /// nothing.
    pub fn new(range: SweepRange, start: u8) -> Self {
        let points = range.points();
        let last_slot = points.saturating_sub(1);
        let offset = start.saturating_sub(range.min);
        let start_slot = usize::from(offset.checked_div(range.step).unwrap_or(0)).min(last_slot);
        Self {
            range,
            start_slot,
            last_slot,
            next_slot: start_slot,
            leg: if points == 0 { Leg::Done } else { Leg::Up },
        }
    }

    /// Code stored in `slot`.
    pub fn code_of(range: &SweepRange, slot: usize) -> u8 {
        let step = usize::from(range.step);
        let code = usize::from(range.min).saturating_add(slot.saturating_mul(step));
        u8::try_from(code).unwrap_or(range.max)
    }

    /// Total number of points, including the revisit.
    pub fn len(range: &SweepRange) -> usize {
        let points = range.points();
        if points == 0 {
            0
        } else {
            points.saturating_add(1)
        }
    }
}

impl Iterator for SweepOrder {
    type Item = SweepPoint;

    fn next(&mut self) -> Option<SweepPoint> {
        let slot = self.next_slot;
        let point = match self.leg {
            Leg::Done => return None,
            Leg::Up => {
                if slot >= self.last_slot {
                    self.leg = Leg::Down;
                    self.next_slot = self.start_slot;
                } else {
                    self.next_slot = slot.saturating_add(1);
                }
                SweepPoint {
                    code: Self::code_of(&self.range, slot),
                    slot,
                    revisit: false,
                }
            }
            Leg::Down => {
                if slot == 0 {
                    self.leg = Leg::Done;
                } else {
                    self.next_slot = slot.saturating_sub(1);
                }
                SweepPoint {
                    code: Self::code_of(&self.range, slot),
                    slot,
                    revisit: slot == self.start_slot,
                }
            }
        };
        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(range: SweepRange, start: u8) -> std::vec::Vec<(u8, bool)> {
        SweepOrder::new(range, start)
            .map(|p| (p.code, p.revisit))
            .collect()
    }

    #[test]
    fn walks_up_then_down_revisiting_start() {
        assert_eq!(
            codes(SweepRange::new(0, 7, 1), 3),
            [
                (3, false),
                (4, false),
                (5, false),
                (6, false),
                (7, false),
                (3, true),
                (2, false),
                (1, false),
                (0, false),
            ]
        );
    }

    #[test]
    fn stepped_window_uses_slots() {
        let order: std::vec::Vec<_> = SweepOrder::new(SweepRange::new(2, 10, 4), 6).collect();
        let slots: std::vec::Vec<_> = order.iter().map(|p| p.slot).collect();
        assert_eq!(slots, [1, 2, 1, 0]);
        assert_eq!(order[2].code, 6);
        assert!(order[2].revisit);
    }

    #[test]
    fn start_at_max_visits_max_twice() {
        assert_eq!(
            codes(SweepRange::new(0, 2, 1), 2),
            [(2, false), (2, true), (1, false), (0, false)]
        );
    }

    #[test]
    fn start_at_min_revisits_then_stops() {
        assert_eq!(
            codes(SweepRange::new(0, 2, 1), 0),
            [(0, false), (1, false), (2, false), (0, true)]
        );
    }

    #[test]
    fn start_outside_window_is_clamped() {
        assert_eq!(codes(SweepRange::new(4, 5, 1), 9), [(5, false), (5, true), (4, false)]);
        assert_eq!(codes(SweepRange::new(4, 5, 1), 0)[0], (4, false));
    }

    #[test]
    fn single_point_window() {
        assert_eq!(codes(SweepRange::new(3, 3, 1), 3), [(3, false), (3, true)]);
        assert_eq!(SweepOrder::len(&SweepRange::new(3, 3, 1)), 2);
    }

    #[test]
    fn empty_window_yields_nothing() {
        assert!(codes(SweepRange::new(5, 4, 1), 4).is_empty());
        assert!(codes(SweepRange::new(0, 4, 0), 0).is_empty());
    }
}
