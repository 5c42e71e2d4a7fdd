// Scripted in-memory venue shared by the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fxtrader::api::{AccountStateReader, MarketDataSource, OrderGateway};
use fxtrader::models::{Bar, BracketOrder, Granularity, OpenTrade, Position};
use fxtrader::{Result, TraderError};
use serde_json::json;
use std::sync::Mutex;

#[derive(Default)]
struct Script {
    bars: Vec<Bar>,
    price_bars: Vec<Bar>,
    positions: Vec<Position>,
    trades: Vec<OpenTrade>,
    positions_error: Option<String>,
    hang_positions: bool,
    hang_orders: bool,
    order_response: Option<serde_json::Value>,
    submitted: Vec<BracketOrder>,
    bar_requests: Vec<(usize, Granularity)>,
}

/// Venue whose answers are set by the test and whose orders are recorded
#[derive(Default)]
pub struct ScriptedVenue {
    script: Mutex<Script>,
}

impl ScriptedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, bars: Vec<Bar>) -> Self {
        self.script.lock().unwrap().bars = bars;
        self
    }

    pub fn with_price(self, price: f64) -> Self {
        self.set_price(price);
        self
    }

    pub fn set_price(&self, price: f64) {
        let at = start() + Duration::days(30);
        self.script.lock().unwrap().price_bars = vec![Bar {
            timestamp: at,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1,
            complete: false,
        }];
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        self.script.lock().unwrap().positions = positions;
    }

    pub fn set_trades(&self, trades: Vec<OpenTrade>) {
        self.script.lock().unwrap().trades = trades;
    }

    pub fn fail_positions(&self, reason: Option<&str>) {
        self.script.lock().unwrap().positions_error = reason.map(str::to_string);
    }

    /// Never answer the positions query
    pub fn hang_positions(&self) {
        self.script.lock().unwrap().hang_positions = true;
    }

    /// Record the order, then never answer
    pub fn hang_orders(&self) {
        self.script.lock().unwrap().hang_orders = true;
    }

    pub fn set_order_response(&self, body: serde_json::Value) {
        self.script.lock().unwrap().order_response = Some(body);
    }

    pub fn submitted(&self) -> Vec<BracketOrder> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn bar_requests(&self) -> Vec<(usize, Granularity)> {
        self.script.lock().unwrap().bar_requests.clone()
    }
}

impl MarketDataSource for ScriptedVenue {
    async fn fetch_bars(
        &self,
        _instrument: &str,
        count: usize,
        granularity: Granularity,
    ) -> Result<Vec<Bar>> {
        let mut script = self.script.lock().unwrap();
        script.bar_requests.push((count, granularity));
        if granularity == Granularity::FINEST {
            Ok(script.price_bars.clone())
        } else {
            Ok(script.bars.clone())
        }
    }
}

impl AccountStateReader for ScriptedVenue {
    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        if self.script.lock().unwrap().hang_positions {
            std::future::pending::<()>().await;
        }
        let script = self.script.lock().unwrap();
        match &script.positions_error {
            Some(reason) => Err(TraderError::QueryFailure(reason.clone())),
            None => Ok(script.positions.clone()),
        }
    }

    async fn list_open_trades(&self) -> Result<Vec<OpenTrade>> {
        Ok(self.script.lock().unwrap().trades.clone())
    }
}

impl OrderGateway for ScriptedVenue {
    async fn submit_market_order(&self, order: &BracketOrder) -> Result<serde_json::Value> {
        let hang = {
            let mut script = self.script.lock().unwrap();
            script.submitted.push(order.clone());
            script.hang_orders
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let script = self.script.lock().unwrap();
        Ok(script.order_response.clone().unwrap_or_else(|| {
            json!({
                "orderCreateTransaction": {"id": "100"},
                "orderFillTransaction": {
                    "id": "101",
                    "instrument": order.instrument,
                    "units": order.units.to_string(),
                    "price": order.format_price(order.reference_price),
                    "time": "2024-02-01T12:00:00.000000000Z"
                }
            })
        }))
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `count` complete hourly bars with a gentle uptrend
pub fn hourly_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let close = 1.1 + i as f64 * 0.0001;
            Bar {
                timestamp: start() + Duration::hours(i as i64),
                open: close - 0.00005,
                high: close + 0.0002,
                low: close - 0.0002,
                close,
                volume: 100,
                complete: true,
            }
        })
        .collect()
}

pub fn position(instrument: &str, long_units: i64, short_units: i64) -> Position {
    Position {
        instrument: instrument.to_string(),
        long_units,
        short_units,
    }
}
