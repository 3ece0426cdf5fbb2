//! One-shot terminal queries for scripting.
//!
//! Each command initializes the terminal, logs in, runs a single query and
//! shuts the terminal down again. The outcome is always a JSON document;
//! the caller prints it and exits 0 on success, 1 on failure.

use chrono::Utc;
use mtbridge_core::{AccountSnapshot, Credentials, TerminalClient, TerminalError};
use mtbridge_service::HistoryRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// What to fetch after logging in.
#[derive(Debug, Clone)]
pub enum Query {
    /// Log in and report the account.
    Connect,
    /// Detailed account state.
    Account,
    Positions,
    History(HistoryRequest),
}

#[derive(Debug, thiserror::Error)]
enum QueryError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error(transparent)]
    Request(#[from] mtbridge_service::ServiceError),
}

/// Run `query` against a fresh terminal session and build the JSON result.
pub async fn run_standalone(
    terminal: Arc<dyn TerminalClient>,
    credentials: &Credentials,
    query: Query,
) -> (bool, Value) {
    let result = execute(terminal.as_ref(), credentials, query).await;

    if let Err(e) = terminal.shutdown().await {
        warn!("Terminal shutdown failed: {}", e);
    }

    match result {
        Ok(data) => (true, json!({ "success": true, "data": data })),
        Err(e) => (false, json!({ "success": false, "error": e.to_string() })),
    }
}

async fn execute(
    terminal: &dyn TerminalClient,
    credentials: &Credentials,
    query: Query,
) -> Result<Value, QueryError> {
    terminal.initialize().await?;
    terminal.login(credentials).await?;
    info!(login = credentials.login, server = %credentials.server, "Logged in");

    let data = match query {
        Query::Connect | Query::Account => {
            let account = AccountSnapshot::capture(terminal.account_info().await?);
            json!(account)
        }
        Query::Positions => {
            let positions = terminal.positions().await?;
            json!({
                "positions": positions,
                "count": positions.len(),
                "timestamp": Utc::now(),
            })
        }
        Query::History(request) => {
            let query = request.into_query(Utc::now())?;
            let trades = terminal.history(&query).await?;
            json!({
                "trades": trades,
                "count": trades.len(),
                "from": query.from,
                "to": query.to,
                "symbol": query.symbol,
                "limit": query.limit,
                "timestamp": Utc::now(),
            })
        }
    };
    Ok(data)
}
