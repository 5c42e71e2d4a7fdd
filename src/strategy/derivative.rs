use super::{bracket_series, signal_columns, SignalFunction};
use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::indicators::atr::DEFAULT_ATR_PERIOD;
use crate::indicators::{sma_defined, BarFrame};

const DEFAULT_WHIPSAW_THRESHOLD: f64 = 12.0;
const DEFAULT_ATR_MA_PERIOD: usize = 20;

/// Trend-following signal on the close-price slope
///
/// The slope over `lookback` bars decides the direction:
/// - Long when the slope exceeds `min_slope_pips`
/// - Short when it is below `-min_slope_pips`
///
/// Filters (the ADX ones need the `adx` stage earlier in the pipeline):
/// - `use_adx_whipsaw_filter`: suppress entries while ADX < `adx_whipsaw_threshold`
/// - `use_adx_filter`: require ADX >= `adx_trend_threshold`
/// - `use_atr_filter`: require ATR >= its `atr_ma_period` SMA (needs the `atr` stage)
#[derive(Debug, Clone, Default)]
pub struct DerivativeSignal;

struct Filters {
    whipsaw_threshold: Option<f64>,
    trend_threshold: Option<f64>,
    atr_ma_period: Option<usize>,
}

impl Filters {
    fn from_config(config: &StrategyConfig) -> Self {
        let whipsaw_threshold = config
            .param_bool("use_adx_whipsaw_filter")
            .unwrap_or(false)
            .then(|| {
                config
                    .param_f64("adx_whipsaw_threshold")
                    .unwrap_or(DEFAULT_WHIPSAW_THRESHOLD)
            });
        let trend_threshold = if config.param_bool("use_adx_filter").unwrap_or(false) {
            config.param_f64("adx_trend_threshold")
        } else {
            None
        };

        let atr_ma_period = config
            .param_bool("use_atr_filter")
            .unwrap_or(false)
            .then(|| {
                config
                    .param_usize("atr_ma_period")
                    .unwrap_or(DEFAULT_ATR_MA_PERIOD)
            });

        Self {
            whipsaw_threshold,
            trend_threshold,
            atr_ma_period,
        }
    }

    fn needs_adx(&self) -> bool {
        self.whipsaw_threshold.is_some() || self.trend_threshold.is_some()
    }

    /// Undefined ADX blocks the entry
    fn allows_adx(&self, adx: Option<f64>) -> bool {
        if !self.needs_adx() {
            return true;
        }
        let Some(adx) = adx else {
            return false;
        };
        if matches!(self.whipsaw_threshold, Some(t) if adx < t) {
            return false;
        }
        !matches!(self.trend_threshold, Some(t) if adx < t)
    }

    /// Undefined ATR or ATR average blocks the entry
    fn allows_atr(&self, atr: Option<f64>, atr_ma: Option<f64>) -> bool {
        if self.atr_ma_period.is_none() {
            return true;
        }
        matches!((atr, atr_ma), (Some(atr), Some(ma)) if atr >= ma)
    }
}

impl SignalFunction for DerivativeSignal {
    fn name(&self) -> &str {
        "derivative"
    }

    fn window(&self, config: &StrategyConfig) -> usize {
        let slope = config.lookback + 1;
        match Filters::from_config(config).atr_ma_period {
            Some(ma_period) => {
                let atr_period = config.param_usize("atr_period").unwrap_or(DEFAULT_ATR_PERIOD);
                slope.max(atr_period + ma_period)
            }
            None => slope,
        }
    }

    fn apply(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let lookback = config.lookback;
        if lookback == 0 {
            return Err(TraderError::computation(
                self.name(),
                "lookback must be positive",
            ));
        }

        let filters = Filters::from_config(config);
        if filters.needs_adx() && frame.column("adx").is_none() {
            return Err(TraderError::computation(
                self.name(),
                "ADX filter enabled but the 'adx' stage is not in the pipeline",
            ));
        }

        let atr_ma = match filters.atr_ma_period {
            Some(0) => {
                return Err(TraderError::computation(
                    self.name(),
                    "atr_ma_period must be positive",
                ))
            }
            Some(period) => {
                let atr = frame.column("atr").ok_or_else(|| {
                    TraderError::computation(
                        self.name(),
                        "ATR filter enabled but the 'atr' stage is not in the pipeline",
                    )
                })?;
                sma_defined(atr, period)
            }
            None => vec![None; frame.len()],
        };

        let min_slope = config.param_f64("min_slope_pips").unwrap_or(0.0) * config.pip_size;
        let closes = frame.closes();
        let mut directions = vec![0i8; closes.len()];

        for i in lookback..closes.len() {
            let slope = (closes[i] - closes[i - lookback]) / lookback as f64;
            let raw = if slope > min_slope {
                1
            } else if slope < -min_slope {
                -1
            } else {
                0
            };

            if raw != 0
                && filters.allows_adx(frame.value("adx", i))
                && filters.allows_atr(frame.value("atr", i), atr_ma[i])
            {
                directions[i] = raw;
            }
        }

        let brackets = bracket_series(frame, config)?;
        frame.with_columns(signal_columns(&directions, &brackets))
    }
}
