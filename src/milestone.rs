//! Progress milestone table
//!
//! A job advances through a fixed list of checkpoints, each reached only
//! after its minimum delay has elapsed since the previous one.

use std::time::Duration;

use crate::error::MilestoneError;

/// A named progress checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub percent: u8,
    pub phase: &'static str,
    pub min_delay: Duration,
}

/// Validated, ordered milestones ending at 100
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneTable {
    milestones: Vec<Milestone>,
}

impl MilestoneTable {
    /// Phases of the portrait pipeline and the percentage each completes
    pub const CANONICAL_PHASES: [(u8, &'static str); 5] = [
        (20, "face analysis"),
        (40, "style application"),
        (60, "ornamentation"),
        (80, "quality enhancement"),
        (100, "completion"),
    ];

    pub fn new(milestones: Vec<Milestone>) -> Result<Self, MilestoneError> {
        let last = milestones.last().ok_or(MilestoneError::Empty)?;
        if last.percent != 100 {
            return Err(MilestoneError::DoesNotComplete(last.percent));
        }
        for pair in milestones.windows(2) {
            if pair[1].percent <= pair[0].percent {
                return Err(MilestoneError::NotIncreasing(pair[1].percent, pair[0].percent));
            }
        }
        Ok(Self { milestones })
    }

    /// The canonical five phases, all sharing one delay
    pub fn uniform(delay: Duration) -> Self {
        Self {
            milestones: Self::CANONICAL_PHASES
                .iter()
                .map(|&(percent, phase)| Milestone {
                    percent,
                    phase,
                    min_delay: delay,
                })
                .collect(),
        }
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    /// Sum of all minimum delays
    pub fn minimum_duration(&self) -> Duration {
        self.milestones.iter().map(|m| m.min_delay).sum()
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self::uniform(Duration::from_millis(1000))
    }
}
