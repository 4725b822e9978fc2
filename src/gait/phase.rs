// Gait phase state machine
//
// Each gait is a simple cycle of phases with a static next-phase table.
// A phase fixes which legs swing and which stand.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::GaitError;
use crate::robot::controller::LEG_COUNT;

/// Set of leg indices stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegSet(u8);

impl LegSet {
    pub const ALL: LegSet = LegSet((1 << LEG_COUNT) - 1);
    pub const EMPTY: LegSet = LegSet(0);

    pub const fn of(legs: &[usize]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < legs.len() {
            bits |= 1 << legs[i];
            i += 1;
        }
        LegSet(bits)
    }

    pub fn contains(&self, leg: usize) -> bool {
        leg < LEG_COUNT && self.0 & (1 << leg) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Every leg not in this set
    pub fn complement(&self) -> Self {
        LegSet(!self.0 & Self::ALL.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..LEG_COUNT).filter(move |&leg| self.contains(leg))
    }
}

/// Available gait patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaitKind {
    /// Two alternating groups of three legs
    Tripod,
    /// One leg swinging at a time
    Wave,
}

impl GaitKind {
    pub fn initial_phase(self) -> GaitPhase {
        match self {
            GaitKind::Tripod => GaitPhase::TripodA,
            GaitKind::Wave => GaitPhase::Wave1,
        }
    }

    /// Phases of one full cycle, in execution order
    pub fn phases(self) -> &'static [GaitPhase] {
        match self {
            GaitKind::Tripod => &[GaitPhase::TripodA, GaitPhase::TripodB],
            GaitKind::Wave => &[
                GaitPhase::Wave1,
                GaitPhase::Wave2,
                GaitPhase::Wave3,
                GaitPhase::Wave4,
                GaitPhase::Wave5,
                GaitPhase::Wave6,
            ],
        }
    }

    pub fn phases_per_cycle(self) -> usize {
        self.phases().len()
    }

    /// Worker thread name for this gait
    pub fn thread_name(self) -> String {
        format!("gait-{}", self)
    }
}

impl fmt::Display for GaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaitKind::Tripod => f.write_str("tripod"),
            GaitKind::Wave => f.write_str("wave"),
        }
    }
}

impl FromStr for GaitKind {
    type Err = GaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tripod" => Ok(GaitKind::Tripod),
            "wave" => Ok(GaitKind::Wave),
            _ => Err(GaitError::UnknownGait(s.to_string())),
        }
    }
}

/// One discrete state of a gait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaitPhase {
    TripodA,
    TripodB,
    Wave1,
    Wave2,
    Wave3,
    Wave4,
    Wave5,
    Wave6,
}

impl GaitPhase {
    /// Legal successors. Every gait graph is a simple cycle, so there is exactly one.
    pub fn successors(self) -> &'static [GaitPhase] {
        use GaitPhase::*;
        match self {
            TripodA => &[TripodB],
            TripodB => &[TripodA],
            Wave1 => &[Wave2],
            Wave2 => &[Wave3],
            Wave3 => &[Wave4],
            Wave4 => &[Wave5],
            Wave5 => &[Wave6],
            Wave6 => &[Wave1],
        }
    }

    pub fn next(self) -> GaitPhase {
        self.successors()[0]
    }

    pub fn kind(self) -> GaitKind {
        match self {
            GaitPhase::TripodA | GaitPhase::TripodB => GaitKind::Tripod,
            _ => GaitKind::Wave,
        }
    }

    pub fn swing_legs(self) -> LegSet {
        use GaitPhase::*;
        match self {
            TripodA => LegSet::of(&[0, 2, 4]),
            TripodB => LegSet::of(&[1, 3, 5]),
            Wave1 => LegSet::of(&[0]),
            Wave2 => LegSet::of(&[1]),
            Wave3 => LegSet::of(&[2]),
            Wave4 => LegSet::of(&[3]),
            Wave5 => LegSet::of(&[4]),
            Wave6 => LegSet::of(&[5]),
        }
    }

    pub fn stance_legs(self) -> LegSet {
        self.swing_legs().complement()
    }
}

/// Resolved leg groups of the current phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitState {
    pub phase: GaitPhase,
    pub swing_legs: LegSet,
    pub stance_legs: LegSet,
    pub dwell_time: Duration,
}

/// Walks a gait's phase cycle
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    kind: GaitKind,
    current: GaitPhase,
    dwell_time: Duration,
}

impl PhaseMachine {
    pub fn new(kind: GaitKind, dwell_time: Duration) -> Self {
        Self {
            kind,
            current: kind.initial_phase(),
            dwell_time,
        }
    }

    pub fn kind(&self) -> GaitKind {
        self.kind
    }

    pub fn current(&self) -> GaitPhase {
        self.current
    }

    pub fn state(&self) -> GaitState {
        GaitState {
            phase: self.current,
            swing_legs: self.current.swing_legs(),
            stance_legs: self.current.stance_legs(),
            dwell_time: self.dwell_time,
        }
    }

    /// Move to the next phase. Returns true when the cycle wrapped back to the start.
    pub fn advance(&mut self) -> bool {
        self.current = self.current.next();
        self.current == self.kind.initial_phase()
    }

    pub fn reset(&mut self) {
        self.current = self.kind.initial_phase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_phase_assigns_each_leg_once() {
        for kind in [GaitKind::Tripod, GaitKind::Wave] {
            for &phase in kind.phases() {
                let swing = phase.swing_legs();
                let stance = phase.stance_legs();
                assert_eq!(swing.len() + stance.len(), LEG_COUNT, "{:?}", phase);
                for leg in 0..LEG_COUNT {
                    assert!(swing.contains(leg) ^ stance.contains(leg), "{:?} leg {}", phase, leg);
                }
            }
        }
    }

    #[test]
    fn test_graph_is_a_simple_cycle() {
        for kind in [GaitKind::Tripod, GaitKind::Wave] {
            let phases = kind.phases();
            for (i, &phase) in phases.iter().enumerate() {
                assert_eq!(phase.successors().len(), 1);
                assert_eq!(phase.next(), phases[(i + 1) % phases.len()]);
                assert_eq!(phase.kind(), kind);
            }
        }
    }

    #[test]
    fn test_wave_swings_every_leg_once_per_cycle() {
        let mut swung = LegSet::EMPTY;
        for &phase in GaitKind::Wave.phases() {
            assert_eq!(phase.swing_legs().len(), 1);
            swung = LegSet(swung.0 | phase.swing_legs().0);
        }
        assert_eq!(swung, LegSet::ALL);
    }

    #[test]
    fn test_advance_reports_cycle_wrap() {
        let mut machine = PhaseMachine::new(GaitKind::Tripod, Duration::from_millis(100));
        assert_eq!(machine.current(), GaitPhase::TripodA);
        assert!(!machine.advance());
        assert_eq!(machine.state().swing_legs, LegSet::of(&[1, 3, 5]));
        assert!(machine.advance());
        assert_eq!(machine.current(), GaitPhase::TripodA);
    }

    #[test]
    fn test_gait_kind_parse() {
        assert_eq!("Tripod".parse::<GaitKind>().unwrap(), GaitKind::Tripod);
        assert_eq!("wave".parse::<GaitKind>().unwrap(), GaitKind::Wave);
        assert!(matches!("ripple".parse::<GaitKind>(), Err(GaitError::UnknownGait(_))));
        assert_eq!(GaitKind::Wave.thread_name(), "gait-wave");
    }
}
