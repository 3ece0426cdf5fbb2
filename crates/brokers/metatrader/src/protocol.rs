use mtbridge_core::{AccountInfo, DealRecord, PositionRecord, Secret, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest frame body accepted from the bridge.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bridge error code: the terminal has no logged-in account.
pub const ERR_NO_SESSION: i64 = 100;

/// Requests sent from the Rust client TO the terminal bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeRequest {
    /// Start (or attach to) the terminal runtime.
    #[serde(rename = "initialize")]
    Initialize,
    /// Log in to a trading account.
    #[serde(rename = "login")]
    Login {
        server: String,
        login: u64,
        password: Secret,
    },
    /// Request current account state.
    #[serde(rename = "account_info")]
    AccountInfo,
    /// Request open positions.
    #[serde(rename = "positions_get")]
    PositionsGet,
    /// Request deal history for a window (unix seconds, inclusive).
    #[serde(rename = "history_deals_get")]
    HistoryDealsGet { from: i64, to: i64 },
    /// Stop the terminal runtime.
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Replies received FROM the terminal bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeReply {
    #[serde(rename = "initialized")]
    Initialized { version: String },
    #[serde(rename = "logged_in")]
    LoggedIn,
    #[serde(rename = "account")]
    Account { account: RawAccount },
    #[serde(rename = "positions")]
    Positions { positions: Vec<RawPosition> },
    #[serde(rename = "deals")]
    Deals { deals: Vec<RawDeal> },
    #[serde(rename = "shutdown_ack")]
    ShutdownAck,
    /// The terminal call failed; `code` is the terminal's last error code.
    #[serde(rename = "error")]
    Error { code: i64, message: String },
}

/// Account fields as the terminal names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAccount {
    pub login: u64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub profit: Decimal,
    pub currency: String,
    pub leverage: u32,
}

/// Position fields as the terminal names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: i64,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub price_current: Decimal,
    /// Zero when no stop loss is set.
    #[serde(default)]
    pub sl: Decimal,
    /// Zero when no take profit is set.
    #[serde(default)]
    pub tp: Decimal,
    pub profit: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    pub time: i64,
    #[serde(default)]
    pub magic: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub external_id: String,
}

/// Deal fields as the terminal names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDeal {
    pub ticket: u64,
    #[serde(default)]
    pub order: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: i64,
    pub volume: Decimal,
    pub price: Decimal,
    pub profit: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    pub time: i64,
    #[serde(default)]
    pub magic: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub external_id: String,
}

impl From<RawAccount> for AccountInfo {
    fn from(raw: RawAccount) -> Self {
        Self {
            login: raw.login,
            server: raw.server,
            balance: raw.balance,
            equity: raw.equity,
            margin: raw.margin,
            free_margin: raw.margin_free,
            profit: raw.profit,
            currency: raw.currency,
            leverage: raw.leverage,
        }
    }
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    (value > Decimal::ZERO).then_some(value)
}

impl From<RawPosition> for PositionRecord {
    fn from(raw: RawPosition) -> Self {
        Self {
            ticket: raw.ticket,
            symbol: raw.symbol,
            side: TradeSide::from_terminal_type(raw.kind),
            volume: raw.volume,
            price: raw.price_open,
            price_current: raw.price_current,
            stop_loss: non_zero(raw.sl),
            take_profit: non_zero(raw.tp),
            profit: raw.profit,
            swap: raw.swap,
            fee: Decimal::ZERO,
            time: raw.time,
            magic: raw.magic,
            comment: raw.comment,
            external_id: raw.external_id,
        }
    }
}

impl From<RawDeal> for DealRecord {
    fn from(raw: RawDeal) -> Self {
        Self {
            ticket: raw.ticket,
            order: raw.order,
            symbol: raw.symbol,
            side: TradeSide::from_terminal_type(raw.kind),
            volume: raw.volume,
            price: raw.price,
            profit: raw.profit,
            swap: raw.swap,
            fee: raw.fee,
            time: raw.time,
            magic: raw.magic,
            comment: raw.comment,
            external_id: raw.external_id,
        }
    }
}

/// Frame a message with a 4-byte length prefix (big-endian). `msg` must not
/// exceed [`MAX_FRAME_LEN`].
pub fn frame_message(msg: &[u8]) -> Vec<u8> {
    let len = msg.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    framed
}
