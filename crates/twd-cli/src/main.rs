//! twd: operator CLI for the trading day governor daemon.
//!
//! Every verb is one HTTP call against the daemon, printed as
//! `key=value` lines so shell scripts can grep the result. The only
//! offline verb is `audit verify`, which re-hashes a JSONL log locally.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use twd_audit::VerifyResult;

#[derive(Parser)]
#[command(name = "twd")]
#[command(about = "Trading day governor CLI", long_about = None)]
struct Cli {
    /// Daemon address as host:port. Falls back to TWD_ADDR, then 127.0.0.1:8791.
    #[arg(long, global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness probe against the daemon
    Health,

    /// Print the current day record and the enforced limits
    Status,

    /// Force a fresh balance fetch through the broker endpoint chain
    Balance,

    /// Reopen the trading gate (manual override)
    Open {
        /// Note carried into the audit trail
        #[arg(long)]
        note: Option<String>,
    },

    /// Close the trading gate (manual override)
    Close {
        /// Note carried into the audit trail
        #[arg(long)]
        note: Option<String>,
    },

    /// Wipe today's record back to a fresh open day.
    /// Guardrail: refuses without --yes, the baseline and counters are lost.
    Reset {
        /// Acknowledge that the morning baseline and ceiling are discarded.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Cancel every working order, flatten every position, close the gate.
    /// Guardrail: refuses without --yes, this places real market orders.
    Emergency {
        /// Reason recorded in the audit trail
        #[arg(long)]
        reason: Option<String>,

        /// Acknowledge that exit orders go to the live account.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Tell the governor about order placements it has not polled yet
    RecordOrders {
        /// How many orders were just placed
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Re-hash a JSONL audit log and confirm the chain is intact
    Verify {
        /// Path to the audit log file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present so TWD_ADDR works the same as for the daemon.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let api = Api::new(resolve_addr(cli.addr.as_deref()))?;

    match cli.cmd {
        Commands::Health => {
            let v = api.get("/v1/health").await?;
            println!(
                "ok={} service={} version={}",
                v["ok"],
                text(&v["service"]),
                text(&v["version"])
            );
        }

        Commands::Status => {
            let v = api.get("/v1/status").await?;
            println!(
                "service={} version={} uptime_secs={}",
                text(&v["service"]),
                text(&v["version"]),
                v["uptime_secs"]
            );
            print_day(&v);
            let l = &v["limits"];
            println!(
                "loss_fraction={} max_orders={} tick_secs={}",
                l["loss_fraction"], l["max_orders"], l["tick_secs"]
            );
            println!(
                "session={}-{} tz={}",
                text(&l["session_open"]),
                text(&l["session_close"]),
                text(&l["timezone"])
            );
        }

        Commands::Balance => {
            let v = api.get("/v1/balance").await?;
            println!(
                "amount={} source={} fetched_at={}",
                v["amount"],
                text(&v["source"]),
                text(&v["fetched_at"])
            );
        }

        Commands::Open { note } => {
            let v = api
                .post("/v1/override", Some(json!({ "allow": true, "note": note })))
                .await?;
            print_day(&v);
        }

        Commands::Close { note } => {
            let v = api
                .post("/v1/override", Some(json!({ "allow": false, "note": note })))
                .await?;
            print_day(&v);
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!(
                    "REFUSING RESET: this wipes today's baseline, ceiling and counters. \
                     Re-run with: `twd reset --yes`"
                );
            }
            let v = api.post("/v1/reset", None).await?;
            println!("reset=true");
            print_day(&v);
        }

        Commands::Emergency { reason, yes } => {
            if !yes {
                bail!(
                    "REFUSING EMERGENCY: this cancels orders and flattens positions at market. \
                     Re-run with: `twd emergency --yes`"
                );
            }
            let v = api
                .post("/v1/emergency", Some(json!({ "reason": reason })))
                .await?;
            let protocol = &v["protocol"];
            println!("emergency=true trigger={}", text(&protocol["trigger"]));
            println!(
                "orders_cancelled={} positions_exited={} failures={}",
                protocol["orders_cancelled"],
                protocol["positions_exited"],
                len(&protocol["cancel_failures"]) + len(&protocol["exit_failures"])
            );
            print_day(&v);
        }

        Commands::RecordOrders { count } => {
            let v = api
                .post("/v1/orders/record", Some(json!({ "count": count })))
                .await?;
            println!("recorded={count}");
            print_day(&v);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { file } => match twd_audit::verify_chain(&file)? {
                VerifyResult::Valid { lines } => {
                    println!("chain_valid=true lines={lines}");
                }
                VerifyResult::Broken { line, reason } => {
                    bail!("chain broken at line {line}: {reason}");
                }
            },
        },
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

struct Api {
    base: String,
    http: reqwest::Client,
}

impl Api {
    fn new(addr: String) -> Result<Self> {
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr
        } else {
            format!("http://{addr}")
        };
        tracing::debug!(%base, "daemon address resolved");

        // Connect timeout only: emergency and balance calls may legitimately
        // take as long as the broker chain does.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("building http client")?;
        Ok(Self { base, http })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .with_context(|| format!("daemon unreachable at {}", self.base))?;
        Self::decode(resp).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut req = self.http.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("daemon unreachable at {}", self.base))?;
        Self::decode(resp).await
    }

    async fn decode(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let detail = body["error"].as_str().unwrap_or("no detail").to_string();
            bail!("daemon answered {status}: {detail}");
        }
        Ok(body)
    }
}

fn resolve_addr(flag: Option<&str>) -> String {
    if let Some(a) = flag {
        return a.to_string();
    }
    std::env::var("TWD_ADDR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "127.0.0.1:8791".to_string())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// Print the day record shared by every mutating response and /v1/status.
fn print_day(v: &Value) {
    println!("state={}", text(&v["state"]));
    let day = &v["day"];
    println!("date={}", text(&day["date"]));
    println!("trading_allowed={}", day["trading_allowed"]);
    println!("blocked_reason={}", text(&day["blocked_reason"]));
    println!("morning_balance={}", text(&day["morning_balance"]));
    println!("loss_ceiling={}", text(&day["loss_ceiling"]));
    println!("current_balance={}", text(&day["current_balance"]));
    println!("order_count={}", day["order_count"]);
    println!("emergency_triggered={}", day["emergency_triggered"]);
}

/// Value as bare text: strings lose their quotes, null prints empty.
fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "".to_string(),
        other => other.to_string(),
    }
}

fn len(v: &Value) -> usize {
    v.as_array().map(|a| a.len()).unwrap_or(0)
}
