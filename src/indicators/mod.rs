// Technical indicators module
// Each indicator is a pure pipeline stage: it reads a BarFrame and returns a
// new frame with its derived columns added.

pub mod adx;
pub mod atr;
pub mod moving_average;

pub use adx::{adx_series, AdxSeries, AdxStage};
pub use atr::{atr_series, AtrStage};
pub use moving_average::{ema_series, sma_defined, sma_series, EmaStage, SmaStage};

use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::models::Bar;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bar series plus named derived columns, one value per bar
///
/// `None` marks a value an indicator could not compute yet (window not full).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarFrame {
    bars: Vec<Bar>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl BarFrame {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            columns: BTreeMap::new(),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Value of `name` at row `index`, None when missing or undefined
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name)?.get(index).copied().flatten()
    }

    pub fn last_value(&self, name: &str) -> Option<f64> {
        let last = self.len().checked_sub(1)?;
        self.value(name, last)
    }

    /// Copy of this frame with `name` set to `values`
    ///
    /// The receiver is left untouched so callers holding it never observe the change.
    pub fn with_column(&self, name: &str, values: Vec<Option<f64>>) -> Result<BarFrame> {
        self.with_columns(vec![(name.to_string(), values)])
    }

    pub fn with_columns(&self, columns: Vec<(String, Vec<Option<f64>>)>) -> Result<BarFrame> {
        let mut next = self.clone();
        for (name, values) in columns {
            if values.len() != self.bars.len() {
                return Err(TraderError::computation(
                    &name,
                    format!(
                        "column has {} values for {} bars",
                        values.len(),
                        self.bars.len()
                    ),
                ));
            }
            next.columns.insert(name, values);
        }
        Ok(next)
    }
}

/// A pluggable indicator stage
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Bars needed before the stage produces its first defined value
    fn window(&self, config: &StrategyConfig) -> usize;

    /// Must tolerate series shorter than `window`, leaving values undefined
    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame>;
}

/// Indicator stages addressable by name from configuration
#[derive(Clone, Default)]
pub struct IndicatorRegistry {
    stages: BTreeMap<String, Arc<dyn Indicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with sma, ema, atr and adx
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SmaStage));
        registry.register(Arc::new(EmaStage));
        registry.register(Arc::new(AtrStage));
        registry.register(Arc::new(AdxStage));
        registry
    }

    pub fn register(&mut self, stage: Arc<dyn Indicator>) {
        self.stages.insert(stage.name().to_string(), stage);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Indicator>> {
        self.stages.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.keys().map(|k| k.as_str()).collect()
    }
}

/// Read a period parameter, rejecting zero
pub(crate) fn period_param(
    config: &StrategyConfig,
    stage: &str,
    name: &str,
    default: usize,
) -> Result<usize> {
    let period = config.param_usize(name).unwrap_or(default);
    if period == 0 {
        return Err(TraderError::computation(
            stage,
            format!("parameter '{}' must be positive", name),
        ));
    }
    Ok(period)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly complete bars from (open, high, low, close) tuples
    pub fn bars_from_ohlc(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                timestamp: start + Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000,
                complete: true,
            })
            .collect()
    }

    pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let ohlc: Vec<_> = closes
            .iter()
            .map(|&c| (c, c * 1.001, c * 0.999, c))
            .collect();
        bars_from_ohlc(&ohlc)
    }
}
