//! Order value objects: side, order type, product and exchange.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl Side {
    /// Wire value used by the broker API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at the best available price.
    #[serde(rename = "MARKET")]
    Market,
    /// Execute at the limit price or better.
    #[serde(rename = "LIMIT")]
    Limit,
    /// Stop-loss limit: becomes a limit order once the trigger is hit.
    #[serde(rename = "SL")]
    StopLoss,
    /// Stop-loss market: becomes a market order once the trigger is hit.
    #[serde(rename = "SL-M")]
    StopLossMarket,
}

impl OrderType {
    /// Whether a limit price must accompany this order type.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLoss)
    }

    /// Whether a trigger price must accompany this order type.
    #[must_use]
    pub const fn requires_trigger_price(&self) -> bool {
        matches!(self, Self::StopLoss | Self::StopLossMarket)
    }

    /// Wire value used by the broker API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLoss => "SL",
            Self::StopLossMarket => "SL-M",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Margin product an order is placed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Product {
    /// Cash and carry (delivery).
    Cnc,
    /// Margin intraday squareoff.
    Mis,
    /// Normal (carry-forward derivatives).
    Nrml,
}

impl Product {
    /// Wire value used by the broker API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cnc => "CNC",
            Self::Mis => "MIS",
            Self::Nrml => "NRML",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange an instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    /// National Stock Exchange (cash).
    Nse,
    /// Bombay Stock Exchange (cash).
    Bse,
    /// NSE futures & options.
    Nfo,
    /// BSE futures & options.
    Bfo,
    /// Currency derivatives.
    Cds,
    /// Multi Commodity Exchange.
    Mcx,
}

impl Exchange {
    /// Margin segment that funds orders on this exchange.
    #[must_use]
    pub const fn segment(&self) -> Segment {
        match self {
            Self::Mcx => Segment::Commodity,
            Self::Nse | Self::Bse | Self::Nfo | Self::Bfo | Self::Cds => Segment::Equity,
        }
    }

    /// Wire value used by the broker API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Nfo => "NFO",
            Self::Bfo => "BFO",
            Self::Cds => "CDS",
            Self::Mcx => "MCX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Margin segment reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Equity and equity derivatives.
    Equity,
    /// Commodities.
    Commodity,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => f.write_str("equity"),
            Self::Commodity => f.write_str("commodity"),
        }
    }
}
