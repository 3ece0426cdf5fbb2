use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Terminal Client Trait
// ---------------------------------------------------------------------------

/// Errors reported by a trading-terminal client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerminalError {
    #[error("Failed to initialize terminal: {0}")]
    Init(String),
    #[error("Login failed ({code}): {message}")]
    Auth { code: i64, message: String },
    #[error("No active terminal session")]
    NoActiveSession,
    #[error("Terminal transport error: {0}")]
    Transport(String),
    #[error("Terminal protocol error: {0}")]
    Protocol(String),
}

/// Blocking-call surface of an external trading terminal.
///
/// The terminal holds a single live session per process: a successful
/// `login` replaces whatever session existed before. Implementations are
/// shared behind an `Arc` and must tolerate concurrent calls.
#[async_trait]
pub trait TerminalClient: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Start the terminal runtime. Calling it again once initialized is a no-op.
    async fn initialize(&self) -> Result<(), TerminalError>;

    /// Whether `initialize` has succeeded and `shutdown` has not run since.
    fn is_initialized(&self) -> bool;

    /// Log in to a trading account, replacing the current session.
    async fn login(&self, credentials: &Credentials) -> Result<(), TerminalError>;

    /// Account state of the current session.
    async fn account_info(&self) -> Result<AccountInfo, TerminalError>;

    /// Open positions of the current session.
    async fn positions(&self) -> Result<Vec<PositionRecord>, TerminalError>;

    /// Raw deal history for the window, in terminal order.
    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DealRecord>, TerminalError>;

    /// Deal history with the symbol filter and count cap applied.
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<DealRecord>, TerminalError> {
        let deals = self.history_deals(query.from, query.to).await?;
        Ok(query.apply(deals))
    }

    /// Stop the terminal runtime. Always safe to call.
    async fn shutdown(&self) -> Result<(), TerminalError>;
}
