use super::{latest_signal, SignalFunction, SignalRegistry};
use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::indicators::{BarFrame, Indicator, IndicatorRegistry};
use crate::models::Signal;
use std::sync::Arc;

/// Ordered indicator stages followed by one signal function
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Indicator>>,
    signal: Arc<dyn SignalFunction>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Indicator>>, signal: Arc<dyn SignalFunction>) -> Self {
        Self { stages, signal }
    }

    /// Resolve the configured stage and signal names
    pub fn from_config(
        config: &StrategyConfig,
        indicators: &IndicatorRegistry,
        signals: &SignalRegistry,
    ) -> Result<Self> {
        let stages = config
            .indicators
            .iter()
            .map(|name| {
                indicators.get(name).ok_or_else(|| {
                    TraderError::InvalidConfig(format!(
                        "unknown indicator '{}' (available: {})",
                        name,
                        indicators.names().join(", ")
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let signal = signals.get(&config.signal).ok_or_else(|| {
            TraderError::InvalidConfig(format!(
                "unknown signal function '{}' (available: {})",
                config.signal,
                signals.names().join(", ")
            ))
        })?;

        Ok(Self::new(stages, signal))
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn signal_name(&self) -> &str {
        self.signal.name()
    }

    /// Largest window any stage needs
    pub fn max_window(&self, config: &StrategyConfig) -> usize {
        self.stages
            .iter()
            .map(|s| s.window(config))
            .chain(std::iter::once(self.signal.window(config)))
            .max()
            .unwrap_or(0)
    }

    /// Run every stage then the signal function; the input frame is not modified
    pub fn run(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<BarFrame> {
        let mut current = frame.clone();
        for stage in &self.stages {
            current = stage
                .apply(&current, config)
                .map_err(|e| wrap_stage_error(stage.name(), e))?;
            tracing::debug!(stage = stage.name(), "Applied indicator");
        }

        self.signal
            .apply(&current, config)
            .map_err(|e| wrap_stage_error(self.signal.name(), e))
    }

    /// Run the pipeline and read the latest bar's signal
    pub fn evaluate(&self, frame: &BarFrame, config: &StrategyConfig) -> Result<Signal> {
        let enriched = self.run(frame, config)?;
        latest_signal(&enriched)
    }
}

fn wrap_stage_error(stage: &str, err: TraderError) -> TraderError {
    match err {
        e @ TraderError::ComputationFailure { .. } => e,
        other => TraderError::computation(stage, other.to_string()),
    }
}
