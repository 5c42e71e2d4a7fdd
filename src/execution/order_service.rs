use serde::Deserialize;
use std::time::Duration;

use super::bounded;
use super::market_data::normalize_bars;
use crate::api::{MarketDataSource, OrderGateway};
use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::models::{BracketDistances, BracketOrder, Direction, Fill, Granularity};

/// Absolute stop and target prices for a bracket around `reference`
///
/// Long: stop below, target above. Short mirrors that.
pub fn bracket_levels(
    reference: f64,
    direction: Direction,
    distances: BracketDistances,
    pip_size: f64,
) -> (f64, f64) {
    let stop = distances.stop_loss_pips * pip_size;
    let target = distances.take_profit_pips * pip_size;
    match direction {
        Direction::Long => (reference - stop, reference + target),
        Direction::Short => (reference + stop, reference - target),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillTransaction {
    id: String,
    #[serde(default)]
    instrument: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    full_vwap: Option<String>,
    #[serde(default)]
    time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Map a raw order response onto a fill or a classified fault
///
/// A fill transaction wins. A cancel or reject transaction is a rejection.
/// Anything else means the order may or may not exist at the venue.
pub fn classify_order_response(body: &serde_json::Value, order: &BracketOrder) -> Result<Fill> {
    if let Some(fill) = body.get("orderFillTransaction") {
        let raw: FillTransaction = serde_json::from_value(fill.clone()).map_err(|e| {
            TraderError::OrderAmbiguous(format!("unreadable fill transaction ({}): {}", e, body))
        })?;
        let units = raw
            .units
            .as_deref()
            .and_then(|u| u.parse::<f64>().ok())
            .map(|u| u as i64)
            .unwrap_or(order.units);
        let price = raw
            .price
            .or(raw.full_vwap)
            .and_then(|p| p.parse::<f64>().ok());

        return Ok(Fill {
            transaction_id: raw.id,
            instrument: raw.instrument.unwrap_or_else(|| order.instrument.clone()),
            units,
            price,
            time: raw.time,
        });
    }

    if let Some(cancel) = body.get("orderCancelTransaction") {
        let reason = cancel
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("unspecified");
        return Err(TraderError::OrderRejected(format!("order cancelled: {}", reason)));
    }

    if let Some(reject) = body.get("orderRejectTransaction") {
        let reason = reject
            .get("rejectReason")
            .or_else(|| body.get("errorMessage"))
            .and_then(|r| r.as_str())
            .unwrap_or("unspecified");
        return Err(TraderError::OrderRejected(format!("order rejected: {}", reason)));
    }

    Err(TraderError::OrderAmbiguous(body.to_string()))
}

/// Builds and submits bracket market orders
#[derive(Debug, Clone)]
pub struct OrderExecutionService {
    pip_size: f64,
    price_precision: u32,
    request_timeout: Duration,
}

impl OrderExecutionService {
    pub fn new(config: &StrategyConfig, request_timeout: Duration) -> Self {
        Self {
            pip_size: config.pip_size,
            price_precision: config.price_precision,
            request_timeout,
        }
    }

    /// Most recent traded price, taken from the finest bars the venue offers
    ///
    /// The still-forming bar is accepted here; it is the freshest price there is.
    pub async fn reference_price<V: MarketDataSource>(
        &self,
        venue: &V,
        instrument: &str,
    ) -> Result<f64> {
        let bars = bounded(
            self.request_timeout,
            "reference price fetch",
            venue.fetch_bars(instrument, 2, Granularity::FINEST),
        )
        .await?;

        let price = normalize_bars(bars)
            .last()
            .map(|b| b.close)
            .ok_or_else(|| TraderError::data_unavailable(instrument, "no recent price"))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(TraderError::data_unavailable(
                instrument,
                format!("unusable reference price {}", price),
            ));
        }
        Ok(price)
    }

    /// Build the bracket order for a signed size around the current price
    pub async fn build_order<V: MarketDataSource>(
        &self,
        venue: &V,
        instrument: &str,
        signed_units: i64,
        distances: BracketDistances,
    ) -> Result<BracketOrder> {
        let direction = Direction::from_units(signed_units)
            .ok_or_else(|| TraderError::computation("order", "order size must be nonzero"))?;

        if !(distances.stop_loss_pips >= 0.0 && distances.take_profit_pips >= 0.0) {
            return Err(TraderError::computation(
                "order",
                format!(
                    "bracket distances must be non-negative (sl={}, tp={})",
                    distances.stop_loss_pips, distances.take_profit_pips
                ),
            ));
        }

        let reference = self.reference_price(venue, instrument).await?;
        let (stop_loss, take_profit) =
            bracket_levels(reference, direction, distances, self.pip_size);

        if stop_loss <= 0.0 || take_profit <= 0.0 {
            return Err(TraderError::computation(
                "order",
                format!(
                    "bracket around {} gives a non-positive level (sl={}, tp={})",
                    reference, stop_loss, take_profit
                ),
            ));
        }

        Ok(BracketOrder {
            instrument: instrument.to_string(),
            units: signed_units,
            reference_price: reference,
            stop_loss,
            take_profit,
            price_precision: self.price_precision,
            client_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Submit a market order with stop-loss and take-profit attached
    ///
    /// The order is sent exactly once. A timeout on the submission itself is
    /// reported as `OrderAmbiguous` since the venue may have accepted it.
    pub async fn submit_bracket<V: MarketDataSource + OrderGateway>(
        &self,
        venue: &V,
        instrument: &str,
        signed_units: i64,
        distances: BracketDistances,
    ) -> Result<Fill> {
        let order = self
            .build_order(venue, instrument, signed_units, distances)
            .await?;

        tracing::info!(
            instrument,
            units = order.units,
            reference = %order.format_price(order.reference_price),
            stop_loss = %order.format_price(order.stop_loss),
            take_profit = %order.format_price(order.take_profit),
            client_id = %order.client_id,
            "Submitting bracket market order"
        );

        let body = match tokio::time::timeout(
            self.request_timeout,
            venue.submit_market_order(&order),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(TraderError::OrderAmbiguous(format!(
                    "no response within {:?} (client id {})",
                    self.request_timeout, order.client_id
                )))
            }
        };

        match classify_order_response(&body, &order) {
            Ok(fill) => {
                tracing::info!(
                    instrument,
                    transaction_id = %fill.transaction_id,
                    units = fill.units,
                    price = ?fill.price,
                    "Order filled"
                );
                Ok(fill)
            }
            Err(err @ TraderError::OrderAmbiguous(_)) => {
                tracing::warn!(
                    instrument,
                    client_id = %order.client_id,
                    response = %body,
                    "Unrecognised order response"
                );
                Err(err)
            }
            Err(err) => {
                tracing::warn!(instrument, client_id = %order.client_id, "{}", err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn distances(sl: f64, tp: f64) -> BracketDistances {
        BracketDistances {
            stop_loss_pips: sl,
            take_profit_pips: tp,
        }
    }

    fn order() -> BracketOrder {
        BracketOrder {
            instrument: "EUR_USD".to_string(),
            units: 1000,
            reference_price: 1.1,
            stop_loss: 1.095,
            take_profit: 1.11,
            price_precision: 5,
            client_id: "abc".to_string(),
        }
    }

    #[test]
    fn test_long_levels() {
        let (sl, tp) = bracket_levels(1.10000, Direction::Long, distances(50.0, 100.0), 0.0001);
        assert!((sl - 1.09500).abs() < 1e-9);
        assert!((tp - 1.11000).abs() < 1e-9);
    }

    #[test]
    fn test_short_levels_mirror_long() {
        let (sl, tp) = bracket_levels(1.10000, Direction::Short, distances(50.0, 100.0), 0.0001);
        assert!((sl - 1.10500).abs() < 1e-9);
        assert!((tp - 1.09000).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_distances_are_equidistant() {
        let reference = 1.25;
        let (sl, tp) = bracket_levels(reference, Direction::Long, distances(30.0, 30.0), 0.0001);
        assert!(((reference - sl) - (tp - reference)).abs() < 1e-12);
    }

    #[test]
    fn test_fill_is_extracted() {
        let body = json!({
            "orderCreateTransaction": {"id": "100"},
            "orderFillTransaction": {
                "id": "101",
                "instrument": "EUR_USD",
                "units": "1000",
                "price": "1.10002",
                "time": "2024-03-01T12:00:00.000000000Z"
            }
        });
        let fill = classify_order_response(&body, &order()).unwrap();
        assert_eq!(fill.transaction_id, "101");
        assert_eq!(fill.units, 1000);
        assert_eq!(fill.price, Some(1.10002));
        assert!(fill.time.is_some());
    }

    #[test]
    fn test_cancel_is_rejection() {
        let body = json!({
            "orderCreateTransaction": {"id": "100"},
            "orderCancelTransaction": {"id": "101", "reason": "MARKET_HALTED"}
        });
        let err = classify_order_response(&body, &order()).unwrap_err();
        assert!(matches!(err, TraderError::OrderRejected(_)));
        assert!(err.to_string().contains("MARKET_HALTED"));
    }

    #[test]
    fn test_reject_is_rejection() {
        let body = json!({
            "orderRejectTransaction": {"id": "7", "rejectReason": "INSUFFICIENT_MARGIN"},
            "errorMessage": "Insufficient margin"
        });
        let err = classify_order_response(&body, &order()).unwrap_err();
        assert!(err.to_string().contains("INSUFFICIENT_MARGIN"));
    }

    #[test]
    fn test_unknown_body_is_ambiguous() {
        let body = json!({"orderCreateTransaction": {"id": "100"}});
        let err = classify_order_response(&body, &order()).unwrap_err();
        assert!(matches!(err, TraderError::OrderAmbiguous(_)));
    }

    #[test]
    fn test_fill_without_price_uses_order_defaults() {
        let body = json!({"orderFillTransaction": {"id": "5"}});
        let fill = classify_order_response(&body, &order()).unwrap();
        assert_eq!(fill.instrument, "EUR_USD");
        assert_eq!(fill.units, 1000);
        assert_eq!(fill.price, None);
    }
}
