use super::{AccountStateReader, MarketDataSource, OrderGateway};
use crate::config::VenueSettings;
use crate::error::{Result, TraderError};
use crate::models::{Bar, BracketOrder, Granularity, OpenTrade, Position};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

// OANDA v20 REST API
// Docs: https://developer.oanda.com/rest-live-v20/introduction/

type OandaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the OANDA v20 REST API, bound to one account
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct OandaClient {
    client: Client,
    base_url: String,
    api_key: String,
    account_id: String,
    rate_limiter: Arc<OandaRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<CandleRaw>,
}

#[derive(Debug, Deserialize)]
struct CandleRaw {
    time: DateTime<Utc>,
    #[serde(default)]
    volume: u64,
    #[serde(default)]
    complete: bool,
    mid: Option<OhlcRaw>,
}

#[derive(Debug, Deserialize)]
struct OhlcRaw {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<PositionRaw>,
}

#[derive(Debug, Deserialize)]
struct PositionRaw {
    instrument: String,
    long: Option<PositionSideRaw>,
    short: Option<PositionSideRaw>,
}

#[derive(Debug, Deserialize)]
struct PositionSideRaw {
    #[serde(default)]
    units: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Vec<TradeRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeRaw {
    id: String,
    instrument: String,
    current_units: String,
    price: String,
    #[serde(default, rename = "unrealizedPL")]
    unrealized_pl: Option<String>,
}

// ============== Parsing helpers ==============

fn parse_price(field: &str, raw: &str) -> std::result::Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid {} '{}': {}", field, raw, e))
}

/// Venue unit counts are decimal strings ("1000", "-250", "0.0")
pub(crate) fn parse_units(raw: &str) -> std::result::Result<i64, String> {
    let trimmed = raw.trim();
    if let Ok(units) = trimmed.parse::<i64>() {
        return Ok(units);
    }
    trimmed
        .parse::<f64>()
        .map(|v| v.round() as i64)
        .map_err(|e| format!("invalid units '{}': {}", raw, e))
}

fn side_units(side: &Option<PositionSideRaw>) -> std::result::Result<i64, String> {
    match side.as_ref().and_then(|s| s.units.as_deref()) {
        Some(raw) => parse_units(raw),
        None => Ok(0),
    }
}

/// Pull `errorMessage` out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("errorMessage").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

impl TryFrom<CandleRaw> for Bar {
    type Error = String;

    fn try_from(raw: CandleRaw) -> std::result::Result<Self, Self::Error> {
        let mid = raw
            .mid
            .ok_or_else(|| format!("candle at {} has no mid prices", raw.time))?;
        Ok(Bar {
            timestamp: raw.time,
            open: parse_price("open", &mid.o)?,
            high: parse_price("high", &mid.h)?,
            low: parse_price("low", &mid.l)?,
            close: parse_price("close", &mid.c)?,
            volume: raw.volume,
            complete: raw.complete,
        })
    }
}

impl TryFrom<PositionRaw> for Position {
    type Error = String;

    fn try_from(raw: PositionRaw) -> std::result::Result<Self, Self::Error> {
        Ok(Position {
            long_units: side_units(&raw.long)?,
            short_units: side_units(&raw.short)?,
            instrument: raw.instrument,
        })
    }
}

impl TryFrom<TradeRaw> for OpenTrade {
    type Error = String;

    fn try_from(raw: TradeRaw) -> std::result::Result<Self, Self::Error> {
        Ok(OpenTrade {
            current_units: parse_units(&raw.current_units)?,
            price: parse_price("price", &raw.price)?,
            unrealized_pl: raw
                .unrealized_pl
                .as_deref()
                .map(|v| parse_price("unrealizedPL", v))
                .transpose()?
                .unwrap_or(0.0),
            id: raw.id,
            instrument: raw.instrument,
        })
    }
}

// ============== Implementation ==============

impl OandaClient {
    /// Build a client for the account in `settings`
    ///
    /// `timeout` bounds every request; a timed-out call surfaces as a transport failure.
    pub fn new(settings: &VenueSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(settings.requests_per_second).ok_or_else(|| {
            TraderError::InvalidConfig("venue.requests_per_second must be positive".to_string())
        })?;

        Ok(Self {
            client,
            base_url: settings.base_url().trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            account_id: settings.account_id.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<(StatusCode, String)> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header("Accept-Datetime-Format", "RFC3339")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

impl MarketDataSource for OandaClient {
    async fn fetch_bars(
        &self,
        instrument: &str,
        count: usize,
        granularity: Granularity,
    ) -> Result<Vec<Bar>> {
        let path = format!("/v3/instruments/{}/candles", instrument);
        let query = [
            ("count", count.to_string()),
            ("granularity", granularity.as_code().to_string()),
            ("price", "M".to_string()),
        ];

        let (status, body) = self.get(&path, &query).await?;
        if !status.is_success() {
            return Err(TraderError::data_unavailable(
                instrument,
                format!("candles request failed ({}): {}", status, error_message(&body)),
            ));
        }

        let response: CandlesResponse = serde_json::from_str(&body).map_err(|e| {
            TraderError::data_unavailable(instrument, format!("malformed candles response: {}", e))
        })?;

        if response.candles.is_empty() {
            tracing::warn!(instrument, "No candle data received");
        }

        let mut bars = Vec::with_capacity(response.candles.len());
        for raw in response.candles {
            match Bar::try_from(raw) {
                Ok(bar) => bars.push(bar),
                Err(reason) => {
                    tracing::warn!(instrument, %reason, "Skipping unusable candle");
                }
            }
        }

        tracing::debug!(instrument, granularity = %granularity, count = bars.len(), "Fetched candles");
        Ok(bars)
    }
}

impl AccountStateReader for OandaClient {
    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        let path = format!("/v3/accounts/{}/openPositions", self.account_id);
        let (status, body) = self.get(&path, &[]).await?;
        if !status.is_success() {
            return Err(TraderError::QueryFailure(format!(
                "open positions request failed ({}): {}",
                status,
                error_message(&body)
            )));
        }

        let response: PositionsResponse = serde_json::from_str(&body)
            .map_err(|e| TraderError::QueryFailure(format!("malformed positions response: {}", e)))?;

        response
            .positions
            .into_iter()
            .map(|raw| Position::try_from(raw).map_err(TraderError::QueryFailure))
            .collect()
    }

    async fn list_open_trades(&self) -> Result<Vec<OpenTrade>> {
        let path = format!("/v3/accounts/{}/openTrades", self.account_id);
        let (status, body) = self.get(&path, &[]).await?;
        if !status.is_success() {
            return Err(TraderError::QueryFailure(format!(
                "open trades request failed ({}): {}",
                status,
                error_message(&body)
            )));
        }

        let response: TradesResponse = serde_json::from_str(&body)
            .map_err(|e| TraderError::QueryFailure(format!("malformed trades response: {}", e)))?;

        response
            .trades
            .into_iter()
            .map(|raw| OpenTrade::try_from(raw).map_err(TraderError::QueryFailure))
            .collect()
    }
}

/// Only a failure to connect proves the order never left; anything later may have reached the venue
fn submission_error(err: reqwest::Error) -> TraderError {
    if err.is_connect() {
        TraderError::from(err)
    } else {
        TraderError::OrderAmbiguous(format!("order submission interrupted: {}", err))
    }
}

/// Request body for a market order with both bracket legs attached
pub(crate) fn order_body(order: &BracketOrder) -> serde_json::Value {
    json!({
        "order": {
            "type": "MARKET",
            "instrument": order.instrument,
            "units": order.units.to_string(),
            "timeInForce": "FOK",
            "positionFill": "DEFAULT",
            "stopLossOnFill": {
                "price": order.format_price(order.stop_loss),
                "timeInForce": "GTC"
            },
            "takeProfitOnFill": {
                "price": order.format_price(order.take_profit),
                "timeInForce": "GTC"
            },
            "clientExtensions": {
                "id": order.client_id,
                "tag": "fxtrader"
            }
        }
    })
}

impl OrderGateway for OandaClient {
    async fn submit_market_order(&self, order: &BracketOrder) -> Result<serde_json::Value> {
        self.rate_limiter.until_ready().await;

        let path = format!("/v3/accounts/{}/orders", self.account_id);
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.api_key)
            .header("Accept-Datetime-Format", "RFC3339")
            .json(&order_body(order))
            .send()
            .await
            .map_err(submission_error)?;

        let status = response.status();
        let body = response.text().await.map_err(submission_error)?;
        let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();

        if status.is_success() {
            return parsed.ok_or_else(|| {
                TraderError::OrderAmbiguous(format!("non-JSON response ({}): {}", status, body))
            });
        }

        // A rejection still carries the transaction describing why
        if let Some(value) = parsed {
            if value.get("orderRejectTransaction").is_some()
                || value.get("orderCancelTransaction").is_some()
            {
                return Ok(value);
            }
        }

        if status.is_client_error() {
            Err(TraderError::OrderRejected(format!(
                "{}: {}",
                status,
                error_message(&body)
            )))
        } else {
            // The order may or may not have reached the book
            Err(TraderError::OrderAmbiguous(format!(
                "{}: {}",
                status,
                error_message(&body)
            )))
        }
    }
}
