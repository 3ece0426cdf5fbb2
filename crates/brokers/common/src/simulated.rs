use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mtbridge_core::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Terminal error code for a rejected authorization.
pub const AUTH_FAILED_CODE: i64 = -6;

/// Configuration for the simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminalConfig {
    /// Starting balance for accounts created on first login.
    pub initial_balance: Decimal,
    /// Equity reported for new accounts.
    pub initial_equity: Decimal,
    /// Margin in use for new accounts.
    pub initial_margin: Decimal,
    pub currency: String,
    pub leverage: u32,
    /// Seed new accounts with a few positions and recent deals.
    pub seed_activity: bool,
    /// Make `initialize` fail, as when no terminal is installed.
    pub fail_initialize: bool,
}

impl Default for SimulatedTerminalConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::new(10_000, 0),
            initial_equity: Decimal::new(1_005_025, 2), // 10050.25
            initial_margin: Decimal::new(500, 0),
            currency: "USD".to_string(),
            leverage: 100,
            seed_activity: false,
            fail_initialize: false,
        }
    }
}

struct SimAccount {
    /// When set, logins must present this password.
    password: Option<Secret>,
    info: AccountInfo,
    positions: Vec<PositionRecord>,
    deals: Vec<DealRecord>,
}

#[derive(Default)]
struct SimState {
    /// Login of the live session, if any.
    session: Option<u64>,
    accounts: HashMap<u64, SimAccount>,
}

/// An in-process stand-in for the trading terminal.
///
/// Mirrors the real terminal's single-session model: each successful login
/// replaces the previous session. Unknown logins are accepted with any
/// non-empty password and get a fresh demo account.
pub struct SimulatedTerminal {
    config: SimulatedTerminalConfig,
    initialized: AtomicBool,
    state: Mutex<SimState>,
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedTerminalConfig) -> Self {
        Self {
            config,
            initialized: AtomicBool::new(false),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Demo terminal used by `--demo`: accounts come with sample activity.
    pub fn demo() -> Self {
        Self::new(SimulatedTerminalConfig {
            seed_activity: true,
            ..Default::default()
        })
    }

    /// Register an account that requires a specific password.
    pub fn with_account(mut self, server: &str, login: u64, password: &str) -> Self {
        let mut account = self.fresh_account(server, login, Utc::now());
        account.password = Some(Secret::new(password));
        self.state.get_mut().accounts.insert(login, account);
        self
    }

    /// Append deals to an account's history (created on demand).
    pub fn with_deals(mut self, login: u64, deals: Vec<DealRecord>) -> Self {
        let now = Utc::now();
        let account = self.account_entry(login, now);
        account.deals.extend(deals);
        self
    }

    /// Append open positions to an account (created on demand).
    pub fn with_positions(mut self, login: u64, positions: Vec<PositionRecord>) -> Self {
        let now = Utc::now();
        let account = self.account_entry(login, now);
        account.positions.extend(positions);
        self
    }

    /// Login of the live session.
    pub async fn active_login(&self) -> Option<u64> {
        self.state.lock().await.session
    }

    fn account_entry(&mut self, login: u64, now: DateTime<Utc>) -> &mut SimAccount {
        let fresh = self.fresh_account("Demo-Server", login, now);
        self.state.get_mut().accounts.entry(login).or_insert(fresh)
    }

    fn fresh_account(&self, server: &str, login: u64, now: DateTime<Utc>) -> SimAccount {
        let c = &self.config;
        let info = AccountInfo {
            login,
            server: server.to_string(),
            balance: c.initial_balance,
            equity: c.initial_equity,
            margin: c.initial_margin,
            free_margin: c.initial_equity - c.initial_margin,
            profit: c.initial_equity - c.initial_balance,
            currency: c.currency.clone(),
            leverage: c.leverage,
        };

        let (positions, deals) = if c.seed_activity {
            (seed_positions(now), seed_deals(now))
        } else {
            (Vec::new(), Vec::new())
        };

        SimAccount {
            password: None,
            info,
            positions,
            deals,
        }
    }

    fn require_initialized(&self) -> Result<(), TerminalError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(TerminalError::Init("terminal not initialized".to_string()))
        }
    }
}

#[async_trait]
impl TerminalClient for SimulatedTerminal {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn initialize(&self) -> Result<(), TerminalError> {
        if self.config.fail_initialize {
            return Err(TerminalError::Init(
                "terminal executable not found".to_string(),
            ));
        }
        if !self.initialized.swap(true, Ordering::SeqCst) {
            info!("Simulated terminal initialized");
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), TerminalError> {
        self.require_initialized()?;

        let auth_failed = || TerminalError::Auth {
            code: AUTH_FAILED_CODE,
            message: "Terminal: Authorization failed".to_string(),
        };
        if credentials.password.is_empty() {
            return Err(auth_failed());
        }

        let mut state = self.state.lock().await;
        let expected = state
            .accounts
            .get(&credentials.login)
            .and_then(|a| a.password.as_ref());
        if let Some(expected) = expected {
            if expected != &credentials.password {
                return Err(auth_failed());
            }
        }
        if !state.accounts.contains_key(&credentials.login) {
            let account = self.fresh_account(&credentials.server, credentials.login, Utc::now());
            state.accounts.insert(credentials.login, account);
        }

        if let Some(previous) = state.session.replace(credentials.login) {
            if previous != credentials.login {
                debug!(previous, login = credentials.login, "Simulated session replaced");
            }
        }
        Ok(())
    }

    async fn account_info(&self) -> Result<AccountInfo, TerminalError> {
        self.require_initialized()?;
        let state = self.state.lock().await;
        let login = state.session.ok_or(TerminalError::NoActiveSession)?;
        state
            .accounts
            .get(&login)
            .map(|a| a.info.clone())
            .ok_or(TerminalError::NoActiveSession)
    }

    async fn positions(&self) -> Result<Vec<PositionRecord>, TerminalError> {
        self.require_initialized()?;
        let state = self.state.lock().await;
        let login = state.session.ok_or(TerminalError::NoActiveSession)?;
        Ok(state
            .accounts
            .get(&login)
            .map(|a| a.positions.clone())
            .unwrap_or_default())
    }

    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DealRecord>, TerminalError> {
        self.require_initialized()?;
        let state = self.state.lock().await;
        let login = state.session.ok_or(TerminalError::NoActiveSession)?;
        let (from, to) = (from.timestamp(), to.timestamp());
        Ok(state
            .accounts
            .get(&login)
            .map(|a| {
                a.deals
                    .iter()
                    .filter(|d| d.time >= from && d.time <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn shutdown(&self) -> Result<(), TerminalError> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.state.lock().await.session = None;
            info!("Simulated terminal shut down");
        }
        Ok(())
    }
}

fn seed_positions(now: DateTime<Utc>) -> Vec<PositionRecord> {
    vec![PositionRecord {
        ticket: 500_001,
        symbol: "EURUSD".to_string(),
        side: TradeSide::Buy,
        volume: Decimal::new(10, 2),
        price: Decimal::new(108_450, 5),
        price_current: Decimal::new(108_952, 5),
        stop_loss: Some(Decimal::new(107_950, 5)),
        take_profit: None,
        profit: Decimal::new(5_025, 2),
        swap: Decimal::ZERO,
        fee: Decimal::ZERO,
        time: (now - Duration::hours(3)).timestamp(),
        magic: 0,
        comment: "demo".to_string(),
        external_id: String::new(),
    }]
}

fn seed_deals(now: DateTime<Utc>) -> Vec<DealRecord> {
    let sample = [
        (400_001, "EURUSD", TradeSide::Buy, 120_i64, Decimal::new(2_540, 2)),
        (400_002, "XAUUSD", TradeSide::Sell, 72, Decimal::new(-1_275, 2)),
        (400_003, "EURUSD", TradeSide::Sell, 24, Decimal::new(3_810, 2)),
    ];
    sample
        .into_iter()
        .map(|(ticket, symbol, side, hours_ago, profit)| DealRecord {
            ticket,
            order: ticket + 100_000,
            symbol: symbol.to_string(),
            side,
            volume: Decimal::new(10, 2),
            price: Decimal::ONE,
            profit,
            swap: Decimal::ZERO,
            fee: Decimal::ZERO,
            time: (now - Duration::hours(hours_ago)).timestamp(),
            magic: 0,
            comment: "demo".to_string(),
            external_id: String::new(),
        })
        .collect()
}
