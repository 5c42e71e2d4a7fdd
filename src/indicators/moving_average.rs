use super::{period_param, BarFrame, Indicator};
use crate::config::StrategyConfig;
use crate::error::Result;

const DEFAULT_MA_PERIOD: usize = 20;

/// Simple Moving Average (SMA) aligned with the input
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let mut sum: f64 = prices[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// SMA over a derived column; a window containing an undefined value stays undefined
pub fn sma_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in period.saturating_sub(1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_some()) {
            out[i] = Some(window.iter().flatten().sum::<f64>() / period as f64);
        }
    }
    out
}

/// Exponential Moving Average (EMA) aligned with the input, seeded with the SMA
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);
    for i in period..prices.len() {
        ema = (prices[i] - ema) * multiplier + ema;
        out[i] = Some(ema);
    }
    out
}

/// Adds `sma_<ma_period>`
pub struct SmaStage;

impl Indicator for SmaStage {
    fn name(&self) -> &str {
        "sma"
    }

    fn window(&self, config: &StrategyConfig) -> usize {
        config.param_usize("ma_period").unwrap_or(DEFAULT_MA_PERIOD)
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let period = period_param(config, self.name(), "ma_period", DEFAULT_MA_PERIOD)?;
        let values = sma_series(&frame.closes(), period);
        frame.with_column(&format!("sma_{}", period), values)
    }
}

/// Adds `ema_<ma_period>`
pub struct EmaStage;

impl Indicator for EmaStage {
    fn name(&self) -> &str {
        "ema"
    }

    fn window(&self, config: &StrategyConfig) -> usize {
        config.param_usize("ma_period").unwrap_or(DEFAULT_MA_PERIOD)
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let period = period_param(config, self.name(), "ma_period", DEFAULT_MA_PERIOD)?;
        let values = ema_series(&frame.closes(), period);
        frame.with_column(&format!("ema_{}", period), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = sma_series(&prices, 5);
        assert_eq!(sma[4], Some(104.0));
        assert!(sma[..4].iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = sma_series(&prices, 5);
        assert_eq!(sma.len(), 2);
        assert!(sma.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_ema() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = ema_series(&prices, 5);
        assert_eq!(ema[4], Some(104.0));
        assert!(ema[5].unwrap() > 104.0); // EMA should move above the seed SMA
    }

    #[test]
    fn test_sma_stage_adds_named_column() {
        let frame = BarFrame::new(bars_from_closes(&[1.0, 2.0, 3.0, 4.0]));
        let config = StrategyConfig::default().with_param("ma_period", 2);

        let out = SmaStage.apply(&frame, &config).unwrap();
        assert_eq!(out.last_value("sma_2"), Some(3.5));
        assert!(frame.column("sma_2").is_none());
    }

    #[test]
    fn test_zero_period_is_a_computation_failure() {
        let frame = BarFrame::new(bars_from_closes(&[1.0, 2.0]));
        let config = StrategyConfig::default().with_param("ma_period", 0);
        assert!(EmaStage.apply(&frame, &config).is_err());
    }

    #[test]
    fn test_sma_defined_skips_undefined_windows() {
        let values = vec![None, Some(1.0), Some(2.0), Some(3.0), Some(6.0)];
        let out = sma_defined(&values, 2);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(1.5));
        assert_eq!(out[4], Some(4.5));
    }
}
