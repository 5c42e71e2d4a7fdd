// Signal functions and the indicator -> signal pipeline
pub mod derivative;
pub mod fixed_bracket;
pub mod pipeline;

pub use derivative::DerivativeSignal;
pub use fixed_bracket::FixedBracketSignal;
pub use pipeline::Pipeline;

use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::indicators::BarFrame;
use crate::models::{BracketDistances, Signal};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SIGNAL_COLUMN: &str = "signal";
pub const STOP_LOSS_COLUMN: &str = "stop_loss_pips";
pub const TAKE_PROFIT_COLUMN: &str = "take_profit_pips";

const DEFAULT_STOP_LOSS_PIPS: f64 = 50.0;
const DEFAULT_FIXED_RR: f64 = 2.0;
const DEFAULT_ATR_MULTIPLIER_RR: f64 = 1.0;
const ATR_COLUMN: &str = "atr";

/// A pluggable signal function
///
/// Writes `signal` (-1, 0 or 1) and, where the signal is non-zero,
/// `stop_loss_pips` / `take_profit_pips`. Only the last row is consumed.
pub trait SignalFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Bars needed before the function can emit a non-zero signal
    fn window(&self, _config: &StrategyConfig) -> usize {
        1
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame>;
}

/// Signal functions addressable by name from configuration
#[derive(Clone, Default)]
pub struct SignalRegistry {
    functions: BTreeMap<String, Arc<dyn SignalFunction>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FixedBracketSignal));
        registry.register(Arc::new(DerivativeSignal));
        registry
    }

    pub fn register(&mut self, function: Arc<dyn SignalFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SignalFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(|k| k.as_str()).collect()
    }
}

/// Bracket distances from `stop_loss_pips`, `take_profit_pips` and `fixed_rr`
///
/// Without an explicit take-profit the target is `stop_loss_pips * fixed_rr`.
pub fn bracket_from_params(config: &StrategyConfig) -> BracketDistances {
    let stop_loss_pips = config
        .param_f64("stop_loss_pips")
        .unwrap_or(DEFAULT_STOP_LOSS_PIPS);
    let take_profit_pips = config.param_f64("take_profit_pips").unwrap_or_else(|| {
        stop_loss_pips * config.param_f64("fixed_rr").unwrap_or(DEFAULT_FIXED_RR)
    });

    BracketDistances {
        stop_loss_pips,
        take_profit_pips,
    }
}

/// Per-row bracket distances
///
/// With `use_adaptive_rr` the target widens with volatility:
/// `take_profit_pips = stop_loss_pips * base_rr + atr_multiplier_rr * atr / pip_size`.
/// `base_rr` falls back to `fixed_rr`, and rows without an ATR value get no bracket.
/// Otherwise every row carries [`bracket_from_params`].
pub fn bracket_series(
    frame: &BarFrame,
    config: &StrategyConfig,
) -> Result<Vec<Option<BracketDistances>>> {
    let fixed = bracket_from_params(config);
    if !config.param_bool("use_adaptive_rr").unwrap_or(false) {
        return Ok(vec![Some(fixed); frame.len()]);
    }

    let atr = frame.column(ATR_COLUMN).ok_or_else(|| {
        TraderError::computation(
            "adaptive_rr",
            "use_adaptive_rr is set but the 'atr' stage is not in the pipeline",
        )
    })?;
    let base_rr = config
        .param_f64("base_rr")
        .or_else(|| config.param_f64("fixed_rr"))
        .unwrap_or(DEFAULT_FIXED_RR);
    let multiplier = config
        .param_f64("atr_multiplier_rr")
        .unwrap_or(DEFAULT_ATR_MULTIPLIER_RR);
    let stop_loss_pips = fixed.stop_loss_pips;

    Ok(atr
        .iter()
        .copied()
        .map(|value| {
            value.map(|atr| BracketDistances {
                stop_loss_pips,
                take_profit_pips: stop_loss_pips * base_rr + multiplier * atr / config.pip_size,
            })
        })
        .collect())
}

/// Build the three signal columns from per-row directions (-1, 0, 1) and brackets
pub(crate) fn signal_columns(
    directions: &[i8],
    brackets: &[Option<BracketDistances>],
) -> Vec<(String, Vec<Option<f64>>)> {
    let signal = directions.iter().map(|&d| Some(d as f64)).collect();
    let leg = |pick: fn(&BracketDistances) -> f64| -> Vec<Option<f64>> {
        directions
            .iter()
            .zip(brackets)
            .map(|(&d, bracket)| if d != 0 { bracket.as_ref().map(pick) } else { None })
            .collect()
    };

    vec![
        (SIGNAL_COLUMN.to_string(), signal),
        (STOP_LOSS_COLUMN.to_string(), leg(|b| b.stop_loss_pips)),
        (TAKE_PROFIT_COLUMN.to_string(), leg(|b| b.take_profit_pips)),
    ]
}

fn valid_distance(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Interpret the derived values of the most recent complete bar
///
/// A directional signal whose distances are undefined or negative is
/// downgraded to `Hold` so no order goes out without both legs.
pub fn latest_signal(frame: &BarFrame) -> Result<Signal> {
    if frame.is_empty() {
        return Err(TraderError::computation(SIGNAL_COLUMN, "frame has no bars"));
    }
    if frame.column(SIGNAL_COLUMN).is_none() {
        return Err(TraderError::computation(
            SIGNAL_COLUMN,
            "signal function did not produce a 'signal' column",
        ));
    }

    let raw = match frame.last_value(SIGNAL_COLUMN) {
        Some(v) => v,
        None => return Ok(Signal::Hold),
    };

    let direction = if raw == 0.0 {
        return Ok(Signal::Hold);
    } else if raw == 1.0 {
        1
    } else if raw == -1.0 {
        -1
    } else {
        return Err(TraderError::computation(
            SIGNAL_COLUMN,
            format!("signal value {} is not one of -1, 0, 1", raw),
        ));
    };

    let stop_loss = valid_distance(frame.last_value(STOP_LOSS_COLUMN));
    let take_profit = valid_distance(frame.last_value(TAKE_PROFIT_COLUMN));
    let (stop_loss_pips, take_profit_pips) = match (stop_loss, take_profit) {
        (Some(sl), Some(tp)) => (sl, tp),
        _ => {
            tracing::warn!(
                signal = raw,
                stop_loss = ?frame.last_value(STOP_LOSS_COLUMN),
                take_profit = ?frame.last_value(TAKE_PROFIT_COLUMN),
                "Directional signal without valid bracket distances, treating as no signal"
            );
            return Ok(Signal::Hold);
        }
    };

    let bracket = BracketDistances {
        stop_loss_pips,
        take_profit_pips,
    };
    Ok(if direction > 0 {
        Signal::Long(bracket)
    } else {
        Signal::Short(bracket)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    fn frame_with(signal: Option<f64>, sl: Option<f64>, tp: Option<f64>) -> BarFrame {
        BarFrame::new(bars_from_closes(&[1.1, 1.2]))
            .with_columns(vec![
                (SIGNAL_COLUMN.to_string(), vec![Some(0.0), signal]),
                (STOP_LOSS_COLUMN.to_string(), vec![None, sl]),
                (TAKE_PROFIT_COLUMN.to_string(), vec![None, tp]),
            ])
            .unwrap()
    }

    #[test]
    fn test_latest_signal_long() {
        let frame = frame_with(Some(1.0), Some(50.0), Some(100.0));
        assert_eq!(
            latest_signal(&frame).unwrap(),
            Signal::Long(BracketDistances {
                stop_loss_pips: 50.0,
                take_profit_pips: 100.0
            })
        );
    }

    #[test]
    fn test_latest_signal_short() {
        let frame = frame_with(Some(-1.0), Some(20.0), Some(40.0));
        assert!(matches!(latest_signal(&frame).unwrap(), Signal::Short(_)));
    }

    #[test]
    fn test_zero_and_undefined_signal_hold() {
        assert_eq!(
            latest_signal(&frame_with(Some(0.0), None, None)).unwrap(),
            Signal::Hold
        );
        assert_eq!(
            latest_signal(&frame_with(None, None, None)).unwrap(),
            Signal::Hold
        );
    }

    #[test]
    fn test_directional_signal_without_distances_is_hold() {
        assert_eq!(
            latest_signal(&frame_with(Some(1.0), None, Some(100.0))).unwrap(),
            Signal::Hold
        );
        assert_eq!(
            latest_signal(&frame_with(Some(-1.0), Some(-5.0), Some(10.0))).unwrap(),
            Signal::Hold
        );
        assert_eq!(
            latest_signal(&frame_with(Some(1.0), Some(f64::NAN), Some(10.0))).unwrap(),
            Signal::Hold
        );
    }

    #[test]
    fn test_missing_column_and_bad_values_fail() {
        let bare = BarFrame::new(bars_from_closes(&[1.1]));
        assert!(latest_signal(&bare).is_err());
        assert!(latest_signal(&BarFrame::default()).is_err());
        assert!(latest_signal(&frame_with(Some(2.0), Some(1.0), Some(1.0))).is_err());
    }

    #[test]
    fn test_only_last_row_is_read() {
        let frame = BarFrame::new(bars_from_closes(&[1.1, 1.2]))
            .with_columns(signal_columns(
                &[1, 0],
                &[Some(BracketDistances {
                    stop_loss_pips: 10.0,
                    take_profit_pips: 20.0,
                }); 2],
            ))
            .unwrap();
        assert_eq!(latest_signal(&frame).unwrap(), Signal::Hold);
    }

    #[test]
    fn test_bracket_from_params() {
        let defaults = bracket_from_params(&StrategyConfig::default());
        assert_eq!(defaults.stop_loss_pips, 50.0);
        assert_eq!(defaults.take_profit_pips, 100.0);

        let rr = StrategyConfig::default()
            .with_param("stop_loss_pips", 30)
            .with_param("fixed_rr", 1.5);
        assert_eq!(bracket_from_params(&rr).take_profit_pips, 45.0);

        let explicit = StrategyConfig::default()
            .with_param("stop_loss_pips", 30)
            .with_param("take_profit_pips", 90);
        assert_eq!(bracket_from_params(&explicit).take_profit_pips, 90.0);
    }

    #[test]
    fn test_adaptive_rr_scales_target_with_atr() {
        let frame = BarFrame::new(bars_from_closes(&[1.1, 1.2, 1.3]))
            .with_column("atr", vec![None, Some(0.0010), Some(0.0020)])
            .unwrap();
        let config = StrategyConfig::default()
            .with_param("use_adaptive_rr", true)
            .with_param("stop_loss_pips", 20)
            .with_param("base_rr", 1.5)
            .with_param("atr_multiplier_rr", 0.5);

        let brackets = bracket_series(&frame, &config).unwrap();
        assert_eq!(brackets[0], None);
        let last = brackets[2].unwrap();
        assert_eq!(last.stop_loss_pips, 20.0);
        // 20 * 1.5 + 0.5 * 20 pips of ATR
        assert!((last.take_profit_pips - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_rr_without_atr_stage_fails() {
        let frame = BarFrame::new(bars_from_closes(&[1.1, 1.2]));
        let config = StrategyConfig::default().with_param("use_adaptive_rr", true);
        assert!(matches!(
            bracket_series(&frame, &config),
            Err(TraderError::ComputationFailure { .. })
        ));
    }

    #[test]
    fn test_undefined_bracket_leaves_signal_without_legs() {
        let frame = BarFrame::new(bars_from_closes(&[1.1, 1.2]))
            .with_columns(signal_columns(&[0, 1], &[None, None]))
            .unwrap();
        assert_eq!(frame.last_value(SIGNAL_COLUMN), Some(1.0));
        assert_eq!(latest_signal(&frame).unwrap(), Signal::Hold);
    }
}
