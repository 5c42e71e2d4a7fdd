//! Average Directional Index (ADX) - Measures trend strength
//!
//! ADX ranges from 0 to 100:
//! - ADX > 25: Strong trend (bull or bear)
//! - ADX 20-25: Moderate trend
//! - ADX < 20: Weak trend / choppy / ranging market
//!
//! Also produces +DI and -DI to determine trend direction:
//! - +DI > -DI: Uptrend
//! - -DI > +DI: Downtrend

use super::atr::true_ranges;
use super::{period_param, BarFrame, Indicator};
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::models::Bar;

const DEFAULT_ADX_PERIOD: usize = 14;

/// ADX, +DI and -DI aligned with the input bars
#[derive(Debug, Clone, PartialEq)]
pub struct AdxSeries {
    pub adx: Vec<Option<f64>>,
    pub plus_di: Vec<Option<f64>>,
    pub minus_di: Vec<Option<f64>>,
}

impl AdxSeries {
    fn undefined(len: usize) -> Self {
        Self {
            adx: vec![None; len],
            plus_di: vec![None; len],
            minus_di: vec![None; len],
        }
    }
}

/// Compute the directional movement system with Wilder's smoothing
///
/// +DI/-DI are defined from index `period`, ADX from index `2 * period - 1`.
pub fn adx_series(bars: &[Bar], period: usize) -> AdxSeries {
    let n = bars.len();
    let mut out = AdxSeries::undefined(n);
    if period == 0 || n < period + 1 {
        return out;
    }
    let p = period as f64;

    // Step 1: True Range and Directional Movement (+DM, -DM)
    let tr: Vec<f64> = true_ranges(bars)
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    // Step 2: Wilder-smooth TR/DM, derive +DI, -DI and DX per bar
    let mut smoothed_tr = tr[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_plus = plus_dm[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_minus = minus_dm[1..=period].iter().sum::<f64>() / p;
    let mut dx = vec![0.0; n];

    for i in period..n {
        if i > period {
            smoothed_tr = (smoothed_tr * (p - 1.0) + tr[i]) / p;
            smoothed_plus = (smoothed_plus * (p - 1.0) + plus_dm[i]) / p;
            smoothed_minus = (smoothed_minus * (p - 1.0) + minus_dm[i]) / p;
        }

        let (plus_di, minus_di) = if smoothed_tr > 0.0 {
            (
                smoothed_plus / smoothed_tr * 100.0,
                smoothed_minus / smoothed_tr * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        out.plus_di[i] = Some(plus_di);
        out.minus_di[i] = Some(minus_di);

        let di_sum = plus_di + minus_di;
        dx[i] = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };
    }

    // Step 3: ADX is the Wilder-smoothed DX
    let first = 2 * period - 1;
    if n > first {
        let mut adx = dx[period..=first].iter().sum::<f64>() / p;
        out.adx[first] = Some(adx);
        for i in first + 1..n {
            adx = (adx * (p - 1.0) + dx[i]) / p;
            out.adx[i] = Some(adx);
        }
    }

    out
}

/// Adds `adx`, `plus_di` and `minus_di`
pub struct AdxStage;

impl Indicator for AdxStage {
    fn name(&self) -> &str {
        "adx"
    }

    fn window(&self, config: &StrategyConfig) -> usize {
        2 * config.param_usize("adx_period").unwrap_or(DEFAULT_ADX_PERIOD)
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let period = period_param(config, self.name(), "adx_period", DEFAULT_ADX_PERIOD)?;
        let series = adx_series(frame.bars(), period);
        frame.with_columns(vec![
            ("adx".to_string(), series.adx),
            ("plus_di".to_string(), series.plus_di),
            ("minus_di".to_string(), series.minus_di),
        ])
    }
}
