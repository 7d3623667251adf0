use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire form used by the broker order body ("BUY" / "SELL").
    pub fn as_wire(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Transit,
    Pending,
    Open,
    PartTraded,
    Traded,
    Cancelled,
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// True while the order can still execute (and can still be cancelled).
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            OrderStatus::Transit | OrderStatus::Pending | OrderStatus::Open | OrderStatus::PartTraded
        )
    }
}

/// One order from today's order book, normalized from provider shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub order_id: String,
    pub security_id: String,
    pub status: OrderStatus,
    pub quantity: i64,
}

/// One account position, normalized from provider shape.
///
/// Direction is carried by the sign of `net_qty`: positive = long,
/// negative = short, zero = flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub security_id: String,
    pub trading_symbol: String,
    pub exchange_segment: String,
    pub product_type: String,
    pub net_qty: i64,
}

impl BrokerPosition {
    pub fn is_open(&self) -> bool {
        self.net_qty != 0
    }
}

/// An order the governor submits. Only market day-orders ever leave this
/// system, and only to flatten an existing position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub security_id: String,
    pub exchange_segment: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: String,
    pub product_type: String,
    pub validity: String,
}

impl OrderIntent {
    /// The market order that closes `pos`: opposite side, full held quantity.
    pub fn exit_for(pos: &BrokerPosition) -> OrderIntent {
        let side = if pos.net_qty > 0 { Side::Sell } else { Side::Buy };
        OrderIntent {
            security_id: pos.security_id.clone(),
            exchange_segment: pos.exchange_segment.clone(),
            side,
            quantity: pos.net_qty.abs(),
            order_type: "MARKET".to_string(),
            product_type: pos.product_type.clone(),
            validity: "DAY".to_string(),
        }
    }
}

/// A successfully resolved account balance, tagged with the endpoint that
/// yielded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReading {
    pub amount: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}
