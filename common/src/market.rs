//! Market data records

use crate::order::OrderSide;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Kind of market data carried by a [`MarketData`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketDataType {
    /// Top-of-book quote
    Quote,
    /// Last trade
    Trade,
    /// Order book levels
    Orderbook,
    /// OHLCV bar
    Bar,
    /// Static instrument metadata
    InstrumentInfo,
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price
    pub price: f64,
    /// Size available at the level
    pub size: f64,
}

/// Typed market data payload, one case per [`MarketDataType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketDataPayload {
    /// Top-of-book quote
    Quote {
        /// Best bid price
        bid: f64,
        /// Best ask price
        ask: f64,
        /// Size at the best bid
        bid_size: Option<f64>,
        /// Size at the best ask
        ask_size: Option<f64>,
    },
    /// Last trade
    Trade {
        /// Trade price
        price: f64,
        /// Trade size
        size: f64,
        /// Aggressor side
        side: OrderSide,
        /// Venue trade ID
        trade_id: String,
    },
    /// Order book snapshot; bids descending by price, asks ascending.
    Orderbook {
        /// Bid levels
        bids: Vec<BookLevel>,
        /// Ask levels
        asks: Vec<BookLevel>,
    },
    /// OHLCV bar
    Bar {
        /// Open price
        open: f64,
        /// High price
        high: f64,
        /// Low price
        low: f64,
        /// Close price
        close: f64,
        /// Bar volume
        volume: f64,
    },
    /// Static instrument metadata, venue-defined fields
    InstrumentInfo(FxHashMap<String, serde_json::Value>),
}

impl MarketDataPayload {
    /// Tag of this payload.
    #[must_use]
    pub const fn data_type(&self) -> MarketDataType {
        match self {
            Self::Quote { .. } => MarketDataType::Quote,
            Self::Trade { .. } => MarketDataType::Trade,
            Self::Orderbook { .. } => MarketDataType::Orderbook,
            Self::Bar { .. } => MarketDataType::Bar,
            Self::InstrumentInfo(_) => MarketDataType::InstrumentInfo,
        }
    }

    /// Reference price for mark-to-market, when the payload carries one.
    ///
    /// Quote and order book payloads use the mid, trades use the trade
    /// price, bars use the close. Instrument metadata has no price.
    #[must_use]
    pub fn reference_price(&self) -> Option<f64> {
        match self {
            Self::Quote { bid, ask, .. } => Some((bid + ask) / 2.0),
            Self::Trade { price, .. } => Some(*price),
            Self::Orderbook { bids, asks } => match (bids.first(), asks.first()) {
                (Some(best_bid), Some(best_ask)) => Some((best_bid.price + best_ask.price) / 2.0),
                _ => None,
            },
            Self::Bar { close, .. } => Some(*close),
            Self::InstrumentInfo(_) => None,
        }
    }

    /// Mid price of an order book payload; `None` for other payloads or
    /// when either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<f64> {
        match self {
            Self::Orderbook { .. } => self.reference_price(),
            _ => None,
        }
    }

    /// Bid-ask spread of an order book payload.
    #[must_use]
    pub fn spread(&self) -> Option<f64> {
        match self {
            Self::Orderbook { bids, asks } => match (bids.first(), asks.first()) {
                (Some(best_bid), Some(best_ask)) => Some(best_ask.price - best_bid.price),
                _ => None,
            },
            _ => None,
        }
    }

    /// Liquidity available within `bps` basis points of the mid, as
    /// `(bid_liquidity, ask_liquidity)`. Zero on both sides when the
    /// payload is not a two-sided book.
    #[must_use]
    pub fn liquidity_within_bps(&self, bps: f64) -> (f64, f64) {
        let Self::Orderbook { bids, asks } = self else {
            return (0.0, 0.0);
        };
        let Some(mid) = self.mid_price() else {
            return (0.0, 0.0);
        };
        let threshold = mid * bps / 10_000.0;
        let bid_liquidity = bids
            .iter()
            .filter(|level| mid - level.price <= threshold)
            .map(|level| level.size)
            .sum();
        let ask_liquidity = asks
            .iter()
            .filter(|level| level.price - mid <= threshold)
            .map(|level| level.size)
            .sum();
        (bid_liquidity, ask_liquidity)
    }
}

/// Market data record as published by an external feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    /// Instrument the data refers to
    pub instrument_id: String,
    /// Venue timestamp
    pub timestamp: DateTime<Utc>,
    /// Venue the data came from
    pub exchange: String,
    /// Typed payload, tagged by `data_type`
    #[serde(flatten)]
    pub data: MarketDataPayload,
    /// Producer identifier, used for sequence tracking
    pub source: String,
    /// Per-source monotonic sequence number
    pub sequence_id: Option<u64>,
}

impl MarketData {
    /// Create a market data record stamped with the current time.
    #[must_use]
    pub fn new(
        instrument_id: impl Into<String>,
        exchange: impl Into<String>,
        data: MarketDataPayload,
        source: impl Into<String>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp: Utc::now(),
            exchange: exchange.into(),
            data,
            source: source.into(),
            sequence_id: None,
        }
    }

    /// Attach a per-source sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> MarketDataPayload {
        MarketDataPayload::Orderbook {
            bids: bids.iter().map(|&(price, size)| BookLevel { price, size }).collect(),
            asks: asks.iter().map(|&(price, size)| BookLevel { price, size }).collect(),
        }
    }

    #[test]
    fn quote_reference_price_is_mid() {
        let quote = MarketDataPayload::Quote {
            bid: 99.0,
            ask: 101.0,
            bid_size: Some(10.0),
            ask_size: None,
        };
        assert_relative_eq!(quote.reference_price().unwrap(), 100.0);
    }

    #[test]
    fn orderbook_mid_and_spread() {
        let payload = book(&[(99.0, 5.0), (98.0, 7.0)], &[(101.0, 4.0), (102.0, 9.0)]);
        assert_relative_eq!(payload.mid_price().unwrap(), 100.0);
        assert_relative_eq!(payload.spread().unwrap(), 2.0);
    }

    #[test]
    fn one_sided_book_has_no_mid() {
        let payload = book(&[(99.0, 5.0)], &[]);
        assert!(payload.mid_price().is_none());
        assert!(payload.reference_price().is_none());
    }

    #[test]
    fn liquidity_within_bps_sums_near_levels() {
        // Mid is 100; 100 bps = 1.0 in price.
        let payload = book(&[(99.5, 5.0), (98.0, 7.0)], &[(100.5, 4.0), (103.0, 9.0)]);
        let (bid_liq, ask_liq) = payload.liquidity_within_bps(100.0);
        assert_relative_eq!(bid_liq, 5.0);
        assert_relative_eq!(ask_liq, 4.0);
    }

    #[test]
    fn instrument_info_has_no_price() {
        let payload = MarketDataPayload::InstrumentInfo(FxHashMap::default());
        assert!(payload.reference_price().is_none());
    }

    #[test]
    fn market_data_serde_round_trip() {
        let record = MarketData::new(
            "BTC-USD",
            "SIM",
            MarketDataPayload::Bar {
                open: 100.0,
                high: 105.0,
                low: 99.5,
                close: 104.25,
                volume: 1_234.0,
            },
            "feed-1",
        )
        .with_sequence(7);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"data_type\":\"BAR\""));

        let back: MarketData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.instrument_id, record.instrument_id);
        assert_eq!(back.sequence_id, Some(7));
        assert_eq!(back.data.data_type(), MarketDataType::Bar);
        assert_relative_eq!(back.data.reference_price().unwrap(), 104.25);
    }

    #[test]
    fn trade_payload_serde_keeps_side_name() {
        let record = MarketData::new(
            "ETH-USD",
            "SIM",
            MarketDataPayload::Trade {
                price: 2500.0,
                size: 1.5,
                side: OrderSide::Sell,
                trade_id: "t-99".to_string(),
            },
            "feed-2",
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"data_type\":\"TRADE\""));
        assert!(json.contains("\"SELL\""));
        let back: MarketData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data.data_type(), MarketDataType::Trade);
    }
}
