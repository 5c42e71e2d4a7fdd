use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use super::account::{classify_exposure, Exposure};
use super::bounded;
use super::market_data::prepare_series;
use super::order_service::OrderExecutionService;
use super::state::{ControllerState, Phase};
use crate::api::{AccountStateReader, MarketDataSource, OrderGateway};
use crate::config::{ControllerSettings, StrategyConfig};
use crate::error::{Result, TraderError};
use crate::models::Fill;
use crate::strategy::Pipeline;

/// What one tick observed or did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    CoolingDown { until: DateTime<Utc> },
    Holding { long_units: i64, short_units: i64 },
    PositionClosed,
    NoSignal,
    OrderFilled(Fill),
}

/// Poll-driven execution loop for a single instrument
pub struct Controller<V> {
    venue: V,
    config: StrategyConfig,
    settings: ControllerSettings,
    pipeline: Pipeline,
    orders: OrderExecutionService,
    state: ControllerState,
    consecutive_failures: u32,
}

impl<V> Controller<V>
where
    V: MarketDataSource + AccountStateReader + OrderGateway,
{
    pub fn new(
        venue: V,
        config: StrategyConfig,
        settings: ControllerSettings,
        pipeline: Pipeline,
    ) -> Self {
        let max_window = pipeline.max_window(&config);
        if config.candles_needed() < max_window {
            tracing::warn!(
                instrument = %config.instrument,
                candles = config.candles_needed(),
                max_window,
                "lookback + buffer is below the largest indicator window, every check will be data-starved"
            );
        }

        Self {
            orders: OrderExecutionService::new(&config, settings.request_timeout()),
            state: ControllerState::new(config.instrument.clone()),
            venue,
            config,
            settings,
            pipeline,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn transition(&mut self, next: Phase, deadline: Option<DateTime<Utc>>, reason: &str) {
        let previous = self.state.phase();
        match next {
            Phase::Flat => self.state.enter_flat(),
            Phase::InPosition => self.state.enter_in_position(),
            Phase::Cooldown => {
                if let Some(deadline) = deadline {
                    self.state.enter_cooldown(deadline);
                }
            }
        }
        tracing::info!(
            instrument = %self.config.instrument,
            from = %previous,
            to = %self.state.phase(),
            deadline = ?self.state.cooldown_deadline(),
            "{}",
            reason
        );
    }

    /// One pass of the state machine at wall-clock `now`
    ///
    /// Faults propagate to the caller with the state left as it was when
    /// the fault happened.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let timeout = self.settings.request_timeout();

        if self.state.phase() == Phase::Cooldown {
            match self.state.cooldown_deadline() {
                Some(until) if now < until => {
                    tracing::info!(
                        instrument = %self.config.instrument,
                        until = %until,
                        "In cooldown, skipping signal check"
                    );
                    return Ok(TickOutcome::CoolingDown { until });
                }
                _ => self.transition(Phase::Flat, None, "Cooldown finished"),
            }
        }

        let positions = bounded(
            timeout,
            "open positions query",
            self.venue.list_open_positions(),
        )
        .await?;

        match classify_exposure(&positions, &self.config.instrument) {
            Exposure::Holding {
                long_units,
                short_units,
            } => {
                if self.state.phase() != Phase::InPosition {
                    self.transition(Phase::InPosition, None, "Open position detected");
                }
                self.log_open_trades().await;
                return Ok(TickOutcome::Holding {
                    long_units,
                    short_units,
                });
            }
            Exposure::Flat if self.state.phase() == Phase::InPosition => {
                if self.settings.cooldown_after_close {
                    let deadline = now + self.config.cooldown_duration();
                    self.transition(Phase::Cooldown, Some(deadline), "Position closed");
                } else {
                    self.transition(Phase::Flat, None, "Position closed");
                }
                return Ok(TickOutcome::PositionClosed);
            }
            Exposure::Flat => {}
        }

        tracing::info!(instrument = %self.config.instrument, "No open position, checking signals");

        let bars = bounded(
            timeout,
            "bar fetch",
            self.venue.fetch_bars(
                &self.config.instrument,
                self.config.candles_needed(),
                self.config.granularity,
            ),
        )
        .await?;
        let frame = prepare_series(bars, &self.config, self.pipeline.max_window(&self.config))?;
        let signal = self.pipeline.evaluate(&frame, &self.config)?;

        let (Some(direction), Some(distances)) = (signal.direction(), signal.distances()) else {
            tracing::info!(instrument = %self.config.instrument, "No entry signal");
            return Ok(TickOutcome::NoSignal);
        };

        tracing::info!(
            instrument = %self.config.instrument,
            direction = %direction,
            stop_loss_pips = distances.stop_loss_pips,
            take_profit_pips = distances.take_profit_pips,
            "Entry signal"
        );

        let units = direction.signed_units(self.config.trade_units);
        let fill = self
            .orders
            .submit_bracket(&self.venue, &self.config.instrument, units, distances)
            .await?;

        let deadline = now + self.config.cooldown_duration();
        self.transition(Phase::Cooldown, Some(deadline), "Order filled");
        Ok(TickOutcome::OrderFilled(fill))
    }

    async fn log_open_trades(&self) {
        let instrument = &self.config.instrument;
        match bounded(
            self.settings.request_timeout(),
            "open trades query",
            self.venue.list_open_trades(),
        )
        .await
        {
            Ok(trades) => {
                for trade in trades.iter().filter(|t| &t.instrument == instrument) {
                    tracing::info!(
                        instrument = %instrument,
                        trade_id = %trade.id,
                        units = trade.current_units,
                        price = trade.price,
                        unrealized_pl = trade.unrealized_pl,
                        "Holding open trade"
                    );
                }
            }
            Err(e) => tracing::debug!(instrument = %instrument, "Open trades unavailable: {}", e),
        }
    }

    /// Run a tick and decide how long to sleep before the next one
    ///
    /// Transient faults are logged and turned into a backoff. Only the
    /// consecutive-failure limit (or a non-transient fault) ends the loop.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<Duration> {
        match self.tick(now).await {
            Ok(_) => {
                self.consecutive_failures = 0;
                Ok(self.settings.poll_interval())
            }
            Err(err) => {
                self.consecutive_failures += 1;
                tracing::error!(
                    instrument = %self.config.instrument,
                    phase = %self.state.phase(),
                    kind = %err.kind(),
                    at = %now,
                    failures = self.consecutive_failures,
                    "Tick failed: {}",
                    err
                );

                if !err.is_transient() {
                    return Err(err);
                }
                if let Some(limit) = self.settings.max_consecutive_failures {
                    if self.consecutive_failures >= limit {
                        return Err(TraderError::FaultLimit {
                            count: self.consecutive_failures,
                            last: err.to_string(),
                        });
                    }
                }

                Ok(match err {
                    TraderError::DataUnavailable { .. } => {
                        self.settings.insufficient_data_backoff()
                    }
                    _ => self.settings.fault_backoff(),
                })
            }
        }
    }

    /// Poll until `shutdown` resolves or the loop gives up
    ///
    /// Shutdown is only observed between ticks, so an in-flight order
    /// submission always completes before the loop exits.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            instrument = %self.config.instrument,
            granularity = %self.config.granularity,
            indicators = ?self.pipeline.stage_names(),
            signal = self.pipeline.signal_name(),
            "Starting trading loop"
        );

        loop {
            let delay = match self.step(Utc::now()).await {
                Ok(delay) => delay,
                Err(err) => {
                    tracing::error!(
                        instrument = %self.config.instrument,
                        phase = %self.state.phase(),
                        "Trading loop stopped: {}",
                        err
                    );
                    return Err(err);
                }
            };

            tracing::debug!("Sleeping {:?} until next tick", delay);
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(
                        instrument = %self.config.instrument,
                        phase = %self.state.phase(),
                        "Trader stopped"
                    );
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
