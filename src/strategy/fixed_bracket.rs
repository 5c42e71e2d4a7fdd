use super::{bracket_series, signal_columns, SignalFunction};
use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::indicators::BarFrame;

/// Emits the operator-supplied `fixed_signal` (-1, 0, 1) on the latest bar
///
/// Useful for manual entries and for exercising the execution path without
/// any market logic. Earlier rows always carry 0.
#[derive(Debug, Clone, Default)]
pub struct FixedBracketSignal;

impl SignalFunction for FixedBracketSignal {
    fn name(&self) -> &str {
        "fixed_bracket"
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let fixed = config.param_f64("fixed_signal").unwrap_or(0.0);
        let direction: i8 = match fixed {
            v if v == 0.0 => 0,
            v if v == 1.0 => 1,
            v if v == -1.0 => -1,
            v => {
                return Err(TraderError::computation(
                    self.name(),
                    format!("fixed_signal must be -1, 0 or 1, got {}", v),
                ))
            }
        };

        let mut directions = vec![0i8; frame.len()];
        if let Some(last) = directions.last_mut() {
            *last = direction;
        }

        let brackets = bracket_series(frame, config)?;
        frame.with_columns(signal_columns(&directions, &brackets))
    }
}
