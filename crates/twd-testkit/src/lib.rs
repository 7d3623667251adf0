//! Test doubles and fixtures for driving the governor without a brokerage.

pub mod stub_broker;

pub use stub_broker::StubBroker;

use twd_schemas::{BrokerOrder, BrokerPosition, OrderStatus};

/// An intraday NSE equity position; positive `net_qty` is long.
pub fn position(security_id: &str, symbol: &str, net_qty: i64) -> BrokerPosition {
    BrokerPosition {
        security_id: security_id.to_string(),
        trading_symbol: symbol.to_string(),
        exchange_segment: "NSE_EQ".to_string(),
        product_type: "INTRADAY".to_string(),
        net_qty,
    }
}

pub fn order(order_id: &str, status: OrderStatus) -> BrokerOrder {
    BrokerOrder {
        order_id: order_id.to_string(),
        security_id: "2885".to_string(),
        status,
        quantity: 1,
    }
}
