use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Platform & Credentials
// ---------------------------------------------------------------------------

/// The MetaTrader platform a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "MT4", alias = "mt4")]
    Mt4,
    #[default]
    #[serde(rename = "MT5", alias = "mt5")]
    Mt5,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mt4 => "MT4",
            Platform::Mt5 => "MT5",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sensitive string (account password).
///
/// `Debug` and `Display` never print the value. `Serialize` does, because the
/// bridge protocol has to carry it; public views must not embed this type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only the terminal adapters should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Login parameters for a trading account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub login: u64,
    pub password: Secret,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Account state as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    pub profit: Decimal,
    pub currency: String,
    pub leverage: u32,
}

/// Last-known account state cached on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub login: u64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    pub profit: Decimal,
    pub currency: String,
    pub leverage: u32,
    pub connected: bool,
    pub last_update: DateTime<Utc>,
}

impl AccountSnapshot {
    /// Stamp a fresh terminal reading.
    pub fn capture(info: AccountInfo) -> Self {
        Self {
            login: info.login,
            server: info.server,
            balance: info.balance,
            equity: info.equity,
            margin: info.margin,
            free_margin: info.free_margin,
            profit: info.profit,
            currency: info.currency,
            leverage: info.leverage,
            connected: true,
            last_update: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Positions & Deals
// ---------------------------------------------------------------------------

/// Direction of a position or deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Terminal type codes: 0 is buy, everything else is reported as sell.
    pub fn from_terminal_type(code: i64) -> Self {
        if code == 0 {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

/// A currently open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub volume: Decimal,
    /// Open price.
    pub price: Decimal,
    pub price_current: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub profit: Decimal,
    pub swap: Decimal,
    /// Positions carry no fee in the terminal; always zero.
    pub fee: Decimal,
    /// Open time, unix seconds.
    pub time: i64,
    pub magic: i64,
    pub comment: String,
    pub external_id: String,
}

/// A historical execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub ticket: u64,
    pub order: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub volume: Decimal,
    pub price: Decimal,
    pub profit: Decimal,
    pub swap: Decimal,
    pub fee: Decimal,
    /// Execution time, unix seconds.
    pub time: i64,
    pub magic: i64,
    pub comment: String,
    pub external_id: String,
}

// ---------------------------------------------------------------------------
// History query
// ---------------------------------------------------------------------------

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

/// A history request after defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub symbol: Option<String>,
    /// Maximum number of deals returned. Zero means no cap.
    pub limit: usize,
}

impl HistoryQuery {
    /// The default window: the last 30 days up to `now`, capped at 100 deals.
    pub fn last_days(now: DateTime<Utc>) -> Self {
        Self {
            from: now - Duration::days(DEFAULT_HISTORY_DAYS),
            to: now,
            symbol: None,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Apply the client-side symbol filter and count cap, keeping retrieval order.
    pub fn apply(&self, deals: Vec<DealRecord>) -> Vec<DealRecord> {
        let filtered = deals
            .into_iter()
            .filter(|d| self.symbol.as_deref().map_or(true, |s| d.symbol == s));

        if self.limit == 0 {
            filtered.collect()
        } else {
            filtered.take(self.limit).collect()
        }
    }
}
