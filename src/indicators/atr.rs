//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing for the moving average.

use super::{period_param, BarFrame, Indicator};
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::models::Bar;

pub(crate) const DEFAULT_ATR_PERIOD: usize = 14;

/// True range of each bar against its predecessor; index 0 has none
pub(crate) fn true_ranges(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        out[i] = Some(tr);
    }
    out
}

/// ATR per bar, defined from index `period` onwards
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return out;
    }

    let tr: Vec<f64> = true_ranges(bars)
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    // First ATR is simple average of first 'period' true ranges
    let mut atr = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = Some(atr);

    for i in period + 1..bars.len() {
        atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = Some(atr);
    }
    out
}

/// Adds `atr`
pub struct AtrStage;

impl Indicator for AtrStage {
    fn name(&self) -> &str {
        "atr"
    }

    fn window(&self, config: &StrategyConfig) -> usize {
        config.param_usize("atr_period").unwrap_or(DEFAULT_ATR_PERIOD) + 1
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let period = period_param(config, self.name(), "atr_period", DEFAULT_ATR_PERIOD)?;
        frame.with_column("atr", atr_series(frame.bars(), period))
    }
}
