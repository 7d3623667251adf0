//! The unwind that runs when the account must go flat.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use twd_broker::BrokerApi;
use twd_schemas::OrderIntent;

/// What the protocol managed to do. Failures are recorded per item; the
/// protocol never aborts early over one of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub trigger: String,
    pub orders_cancelled: u32,
    pub cancel_failures: Vec<String>,
    pub positions_exited: u32,
    pub exit_failures: Vec<String>,
}

impl EmergencyReport {
    pub fn clean(&self) -> bool {
        self.cancel_failures.is_empty() && self.exit_failures.is_empty()
    }
}

/// Best-effort unwind: cancel every working order, then flatten every open
/// position with an opposite-side market order. Each item is independent.
/// The caller closes the gate afterwards whatever happened here.
pub async fn run_protocol(broker: &dyn BrokerApi, trigger: &str) -> EmergencyReport {
    let mut report = EmergencyReport {
        trigger: trigger.to_string(),
        ..Default::default()
    };

    match broker.fetch_orders().await {
        Ok(orders) => {
            for order in orders.iter().filter(|o| o.status.is_working()) {
                match broker.cancel_order(&order.order_id).await {
                    Ok(()) => report.orders_cancelled += 1,
                    Err(err) => {
                        warn!(order_id = %order.order_id, %err, "cancel failed");
                        report
                            .cancel_failures
                            .push(format!("{}: {err}", order.order_id));
                    }
                }
            }
        }
        Err(err) => {
            error!(%err, "order book unavailable during emergency");
            report.cancel_failures.push(format!("order list: {err}"));
        }
    }

    match broker.fetch_positions().await {
        Ok(positions) => {
            for pos in positions.iter().filter(|p| p.is_open()) {
                let intent = OrderIntent::exit_for(pos);
                match broker.place_exit_order(&intent).await {
                    Ok(order_id) => {
                        info!(
                            symbol = %pos.trading_symbol,
                            side = intent.side.as_wire(),
                            qty = intent.quantity,
                            %order_id,
                            "exit order placed"
                        );
                        report.positions_exited += 1;
                    }
                    Err(err) => {
                        warn!(symbol = %pos.trading_symbol, %err, "exit failed");
                        report
                            .exit_failures
                            .push(format!("{}: {err}", pos.trading_symbol));
                    }
                }
            }
        }
        Err(err) => {
            error!(%err, "positions unavailable during emergency");
            report.exit_failures.push(format!("position list: {err}"));
        }
    }

    report
}
