//! Live adapter for the Dhan trading API (v2).
//!
//! Every request carries the account token header and the client-level
//! deadline. Responses are decoded as loose JSON first and normalized by
//! pure functions, so the wire quirks stay testable without a server.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use twd_schemas::{BalanceReading, BrokerOrder, BrokerPosition, OrderIntent, OrderStatus};

use crate::api::{BrokerApi, BrokerError};
use crate::balance::resolve_balance;

/// Hard deadline on any single broker call. One stuck call must never
/// stall the evaluation loop past its tick.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fund endpoints probed for a balance, in trial order. Account
/// generations expose different subsets; the first 200 that yields a
/// resolvable positive figure wins.
const BALANCE_ENDPOINTS: &[&str] = &[
    "positions",
    "fundlimit",
    "margin",
    "account",
    "limits",
    "holdings",
    "profile",
];

pub struct DhanBroker {
    client: Client,
    base: String,
    token: String,
}

impl DhanBroker {
    /// `base` is the API root, e.g. `https://api.dhan.co/v2`.
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building broker http client")?;
        Ok(Self {
            client,
            base: base.into(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, BrokerError> {
        let resp = self
            .client
            .get(self.url(path))
            .header("access-token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BrokerError::Status(status.as_u16()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| BrokerError::Unparseable(e.to_string()))
    }
}

#[async_trait]
impl BrokerApi for DhanBroker {
    async fn fetch_balance(&self) -> Result<BalanceReading, BrokerError> {
        for endpoint in BALANCE_ENDPOINTS {
            match self.get_json(endpoint).await {
                Ok(body) => {
                    if let Some((amount, field)) = resolve_balance(&body) {
                        debug!(endpoint, field, amount, "balance resolved");
                        return Ok(BalanceReading {
                            amount,
                            source: format!("{endpoint}:{field}"),
                            fetched_at: Utc::now(),
                        });
                    }
                    debug!(endpoint, "payload carried no usable balance field");
                }
                Err(err) => debug!(endpoint, %err, "fund endpoint failed"),
            }
        }
        Err(BrokerError::NoBalance)
    }

    async fn fetch_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let body = self.get_json("orders").await?;
        Ok(decode_orders(&body))
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let body = self.get_json("positions").await?;
        Ok(decode_positions(&body))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let resp = self
            .client
            .delete(self.url(&format!("orders/{order_id}")))
            .header("access-token", &self.token)
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BrokerError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn place_exit_order(&self, intent: &OrderIntent) -> Result<String, BrokerError> {
        let resp = self
            .client
            .post(self.url("orders"))
            .header("access-token", &self.token)
            .json(&DhanOrderRequest::from_intent(intent))
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BrokerError::Status(status.as_u16()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| BrokerError::Unparseable(e.to_string()))?;
        Ok(order_id_of(&body))
    }
}

fn map_transport(err: reqwest::Error) -> BrokerError {
    if err.is_timeout() {
        BrokerError::Timeout
    } else {
        BrokerError::Connect(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire decoding
// ---------------------------------------------------------------------------

/// List payloads arrive either as a bare array or wrapped in `{"data": [..]}`.
fn rows(body: &Value) -> &[Value] {
    match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn decode_positions(body: &Value) -> Vec<BrokerPosition> {
    rows(body)
        .iter()
        .filter_map(|row| serde_json::from_value::<DhanPosition>(row.clone()).ok())
        .map(DhanPosition::into_position)
        .collect()
}

fn decode_orders(body: &Value) -> Vec<BrokerOrder> {
    rows(body)
        .iter()
        .filter_map(|row| serde_json::from_value::<DhanOrder>(row.clone()).ok())
        .map(DhanOrder::into_order)
        .collect()
}

/// The new-order response carries the assigned id as `orderId`, string or
/// numeric depending on the API generation. Empty means the broker accepted
/// the order but gave nothing to track it by.
fn order_id_of(body: &Value) -> String {
    match body.get("orderId") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhanPosition {
    #[serde(default)]
    security_id: String,
    #[serde(default)]
    trading_symbol: String,
    #[serde(default)]
    exchange_segment: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    net_qty: i64,
}

impl DhanPosition {
    fn into_position(self) -> BrokerPosition {
        BrokerPosition {
            security_id: self.security_id,
            trading_symbol: self.trading_symbol,
            exchange_segment: self.exchange_segment,
            product_type: self.product_type,
            net_qty: self.net_qty,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhanOrder {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    security_id: String,
    #[serde(default)]
    order_status: Option<OrderStatus>,
    #[serde(default)]
    quantity: i64,
}

impl DhanOrder {
    fn into_order(self) -> BrokerOrder {
        BrokerOrder {
            order_id: self.order_id,
            security_id: self.security_id,
            status: self.order_status.unwrap_or(OrderStatus::Unknown),
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DhanOrderRequest<'a> {
    transaction_type: &'static str,
    exchange_segment: &'a str,
    product_type: &'a str,
    order_type: &'a str,
    validity: &'a str,
    security_id: &'a str,
    quantity: i64,
}

impl<'a> DhanOrderRequest<'a> {
    fn from_intent(intent: &'a OrderIntent) -> Self {
        Self {
            transaction_type: intent.side.as_wire(),
            exchange_segment: &intent.exchange_segment,
            product_type: &intent.product_type,
            order_type: &intent.order_type,
            validity: &intent.validity,
            security_id: &intent.security_id,
            quantity: intent.quantity,
        }
    }
}
