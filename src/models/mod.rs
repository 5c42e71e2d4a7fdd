use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One OHLCV sample reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// False for the bar that is still forming
    pub complete: bool,
}

/// Venue sampling granularity (OANDA candlestick codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    S5,
    S10,
    S15,
    S30,
    M1,
    M2,
    M4,
    M5,
    M10,
    M15,
    M30,
    H1,
    H2,
    H3,
    H4,
    H6,
    H8,
    H12,
    D,
    W,
}

impl Granularity {
    /// Finest granularity the venue offers, used to resolve a reference price
    pub const FINEST: Granularity = Granularity::S5;

    pub fn as_code(&self) -> &'static str {
        match self {
            Granularity::S5 => "S5",
            Granularity::S10 => "S10",
            Granularity::S15 => "S15",
            Granularity::S30 => "S30",
            Granularity::M1 => "M1",
            Granularity::M2 => "M2",
            Granularity::M4 => "M4",
            Granularity::M5 => "M5",
            Granularity::M10 => "M10",
            Granularity::M15 => "M15",
            Granularity::M30 => "M30",
            Granularity::H1 => "H1",
            Granularity::H2 => "H2",
            Granularity::H3 => "H3",
            Granularity::H4 => "H4",
            Granularity::H6 => "H6",
            Granularity::H8 => "H8",
            Granularity::H12 => "H12",
            Granularity::D => "D",
            Granularity::W => "W",
        }
    }

    /// Wall-clock length of one bar
    pub fn duration(&self) -> Duration {
        match self {
            Granularity::S5 => Duration::seconds(5),
            Granularity::S10 => Duration::seconds(10),
            Granularity::S15 => Duration::seconds(15),
            Granularity::S30 => Duration::seconds(30),
            Granularity::M1 => Duration::minutes(1),
            Granularity::M2 => Duration::minutes(2),
            Granularity::M4 => Duration::minutes(4),
            Granularity::M5 => Duration::minutes(5),
            Granularity::M10 => Duration::minutes(10),
            Granularity::M15 => Duration::minutes(15),
            Granularity::M30 => Duration::minutes(30),
            Granularity::H1 => Duration::hours(1),
            Granularity::H2 => Duration::hours(2),
            Granularity::H3 => Duration::hours(3),
            Granularity::H4 => Duration::hours(4),
            Granularity::H6 => Duration::hours(6),
            Granularity::H8 => Duration::hours(8),
            Granularity::H12 => Duration::hours(12),
            Granularity::D => Duration::days(1),
            Granularity::W => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let granularity = match s.trim().to_ascii_uppercase().as_str() {
            "S5" => Granularity::S5,
            "S10" => Granularity::S10,
            "S15" => Granularity::S15,
            "S30" => Granularity::S30,
            "M1" => Granularity::M1,
            "M2" => Granularity::M2,
            "M4" => Granularity::M4,
            "M5" => Granularity::M5,
            "M10" => Granularity::M10,
            "M15" => Granularity::M15,
            "M30" => Granularity::M30,
            "H1" => Granularity::H1,
            "H2" => Granularity::H2,
            "H3" => Granularity::H3,
            "H4" => Granularity::H4,
            "H6" => Granularity::H6,
            "H8" => Granularity::H8,
            "H12" => Granularity::H12,
            "D" => Granularity::D,
            "W" => Granularity::W,
            other => return Err(format!("unknown granularity code '{}'", other)),
        };
        Ok(granularity)
    }
}

impl TryFrom<String> for Granularity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.as_code().to_string()
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Apply the signed-units convention (positive = long, negative = short)
    pub fn signed_units(&self, magnitude: i64) -> i64 {
        match self {
            Direction::Long => magnitude.abs(),
            Direction::Short => -magnitude.abs(),
        }
    }

    pub fn from_units(units: i64) -> Option<Self> {
        match units {
            u if u > 0 => Some(Direction::Long),
            u if u < 0 => Some(Direction::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

/// Stop-loss and take-profit distances in pips
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BracketDistances {
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,
}

/// Directional decision read from the latest complete bar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Signal {
    Long(BracketDistances),
    Short(BracketDistances),
    Hold,
}

impl Signal {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Signal::Long(_) => Some(Direction::Long),
            Signal::Short(_) => Some(Direction::Short),
            Signal::Hold => None,
        }
    }

    pub fn distances(&self) -> Option<BracketDistances> {
        match self {
            Signal::Long(d) | Signal::Short(d) => Some(*d),
            Signal::Hold => None,
        }
    }
}

/// Venue-reported aggregate exposure for one instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub instrument: String,
    /// Positive or zero
    pub long_units: i64,
    /// Negative or zero (venue convention)
    pub short_units: i64,
}

impl Position {
    pub fn net_units(&self) -> i64 {
        self.long_units + self.short_units
    }

    pub fn is_open(&self) -> bool {
        self.long_units > 0 || self.short_units < 0
    }
}

/// An open trade as reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenTrade {
    pub id: String,
    pub instrument: String,
    pub current_units: i64,
    pub price: f64,
    pub unrealized_pl: f64,
}

/// Market order with both bracket legs attached at submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketOrder {
    pub instrument: String,
    pub units: i64,
    pub reference_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Decimal places the venue accepts for this instrument
    pub price_precision: u32,
    pub client_id: String,
}

impl BracketOrder {
    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_precision as usize, price)
    }
}

/// Fill details of an accepted market order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub transaction_id: String,
    pub instrument: String,
    pub units: i64,
    pub price: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_roundtrip_codes() {
        assert_eq!("H1".parse::<Granularity>().unwrap(), Granularity::H1);
        assert_eq!("m15".parse::<Granularity>().unwrap(), Granularity::M15);
        assert_eq!(Granularity::D.as_code(), "D");
        assert!("H5".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_granularity_durations() {
        assert_eq!(Granularity::S5.duration(), Duration::seconds(5));
        assert_eq!(Granularity::H4.duration(), Duration::hours(4));
        assert_eq!(Granularity::W.duration(), Duration::days(7));
    }

    #[test]
    fn test_granularity_deserializes_from_code() {
        let g: Granularity = serde_json::from_str("\"M5\"").unwrap();
        assert_eq!(g, Granularity::M5);
        assert!(serde_json::from_str::<Granularity>("\"X1\"").is_err());
    }

    #[test]
    fn test_signed_units_convention() {
        assert_eq!(Direction::Long.signed_units(1000), 1000);
        assert_eq!(Direction::Short.signed_units(1000), -1000);
        assert_eq!(Direction::Short.signed_units(-1000), -1000);
        assert_eq!(Direction::from_units(0), None);
        assert_eq!(Direction::from_units(-5), Some(Direction::Short));
    }

    #[test]
    fn test_position_open_detection() {
        let flat = Position {
            instrument: "EUR_USD".to_string(),
            long_units: 0,
            short_units: 0,
        };
        assert!(!flat.is_open());

        let short = Position {
            instrument: "EUR_USD".to_string(),
            long_units: 0,
            short_units: -1000,
        };
        assert!(short.is_open());
        assert_eq!(short.net_units(), -1000);
    }

    #[test]
    fn test_bracket_order_price_format() {
        let order = BracketOrder {
            instrument: "USD_JPY".to_string(),
            units: 1000,
            reference_price: 150.1234,
            stop_loss: 149.6234,
            take_profit: 151.1234,
            price_precision: 3,
            client_id: "x".to_string(),
        };
        assert_eq!(order.format_price(order.stop_loss), "149.623");
    }
}
