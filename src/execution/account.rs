use crate::models::{Direction, Position};

/// Exposure the venue reports for the controller's instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    Flat,
    Holding { long_units: i64, short_units: i64 },
}

impl Exposure {
    pub fn is_open(&self) -> bool {
        matches!(self, Exposure::Holding { .. })
    }

    /// Side of the net exposure, None when flat or fully hedged
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Exposure::Flat => None,
            Exposure::Holding {
                long_units,
                short_units,
            } => Direction::from_units(long_units + short_units),
        }
    }
}

/// Pure classification of a position snapshot
///
/// Positions for other instruments are ignored; that filter is what keeps
/// several controllers on one account from interfering with each other.
pub fn classify_exposure(positions: &[Position], instrument: &str) -> Exposure {
    positions
        .iter()
        .filter(|p| p.instrument == instrument && p.is_open())
        .fold(Exposure::Flat, |acc, p| match acc {
            Exposure::Flat => Exposure::Holding {
                long_units: p.long_units,
                short_units: p.short_units,
            },
            Exposure::Holding {
                long_units,
                short_units,
            } => Exposure::Holding {
                long_units: long_units + p.long_units,
                short_units: short_units + p.short_units,
            },
        })
}
