use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::indicators::BarFrame;
use crate::models::Bar;

/// Sort ascending by timestamp and drop duplicates, keeping the latest occurrence
pub fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);

    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// Turn a raw venue fetch into the frame indicators run on
///
/// Incomplete bars are dropped. Fewer than `min_bars` complete bars, or a
/// lookback + buffer below `max_window`, is reported as `DataUnavailable`.
pub fn prepare_series(
    bars: Vec<Bar>,
    config: &StrategyConfig,
    max_window: usize,
) -> Result<BarFrame> {
    if config.candles_needed() < max_window {
        return Err(TraderError::data_unavailable(
            &config.instrument,
            format!(
                "lookback + buffer ({}) is below the largest indicator window ({})",
                config.candles_needed(),
                max_window
            ),
        ));
    }

    let received = bars.len();
    let complete: Vec<Bar> = normalize_bars(bars)
        .into_iter()
        .filter(|b| b.complete)
        .collect();

    if complete.is_empty() || complete.len() < config.min_bars() {
        return Err(TraderError::data_unavailable(
            &config.instrument,
            format!(
                "received {} bars ({} complete), need at least {} of {}",
                received,
                complete.len(),
                config.min_bars(),
                config.candles_needed()
            ),
        ));
    }

    Ok(BarFrame::new(complete))
}
