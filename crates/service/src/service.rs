use crate::error::ServiceError;
use crate::registry::{Connection, ConnectionView, Registry};
use crate::request::{ConnectRequest, HistoryRequest};
use chrono::{DateTime, Utc};
use mtbridge_core::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectOutcome {
    pub connection_id: String,
    pub account: AccountSnapshot,
}

/// Result of a history query.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub trades: Vec<DealRecord>,
    pub count: usize,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Owns the connection registry and the terminal client.
///
/// The terminal keeps one live session per process, so the registry holds at
/// most one connection at a time: `connect` is refused while another
/// connection is live. Connects and disconnects are serialized by a session
/// gate; registry reads and terminal queries are not.
pub struct ConnectionService {
    terminal: Arc<dyn TerminalClient>,
    registry: Registry,
    session_gate: Mutex<()>,
}

impl ConnectionService {
    pub fn new(terminal: Arc<dyn TerminalClient>) -> Self {
        Self {
            terminal,
            registry: Registry::new(),
            session_gate: Mutex::new(()),
        }
    }

    pub fn terminal_name(&self) -> &str {
        self.terminal.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.terminal.is_initialized()
    }

    /// Start the terminal runtime.
    pub async fn initialize(&self) -> Result<(), ServiceError> {
        self.terminal.initialize().await?;
        Ok(())
    }

    /// Log in and register a new connection.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectOutcome, ServiceError> {
        let credentials = request.credentials()?;
        let platform = request.platform;

        let _gate = self.session_gate.lock().await;
        if let Some(active) = self.registry.active_id().await {
            warn!(active = %active, login = credentials.login, "Connect refused: session in use");
            return Err(ServiceError::SessionInUse(active));
        }

        if !self.terminal.is_initialized() {
            self.terminal.initialize().await?;
        }

        info!(
            login = credentials.login,
            server = %credentials.server,
            platform = %platform,
            "Connecting account"
        );
        if let Err(e) = self.terminal.login(&credentials).await {
            warn!(login = credentials.login, error = %e, "Login failed");
            return Err(e.into());
        }

        let account = AccountSnapshot::capture(self.terminal.account_info().await?);
        let connected_at = Utc::now();
        let id = Connection::make_id(platform, credentials.login, connected_at);

        self.registry
            .put(Connection {
                id: id.clone(),
                credentials,
                platform,
                account: account.clone(),
                connected_at,
            })
            .await;

        info!(connection_id = %id, "Connected");
        Ok(ConnectOutcome {
            connection_id: id,
            account,
        })
    }

    /// Fails with `NotFound` unless `id` names a live connection.
    pub async fn ensure_connection(&self, id: &str) -> Result<(), ServiceError> {
        self.registry.get(id).await?;
        Ok(())
    }

    /// Fetch fresh account state and cache it on the connection.
    pub async fn account(&self, id: &str) -> Result<AccountSnapshot, ServiceError> {
        self.ensure_connection(id).await?;

        let account = AccountSnapshot::capture(self.terminal.account_info().await?);
        self.registry.update_snapshot(id, account.clone()).await?;
        Ok(account)
    }

    pub async fn positions(&self, id: &str) -> Result<Vec<PositionRecord>, ServiceError> {
        self.ensure_connection(id).await?;
        Ok(self.terminal.positions().await?)
    }

    pub async fn history(
        &self,
        id: &str,
        request: HistoryRequest,
    ) -> Result<HistoryPage, ServiceError> {
        self.ensure_connection(id).await?;

        let query = request.into_query(Utc::now())?;
        let trades = self.terminal.history(&query).await?;
        Ok(HistoryPage {
            count: trades.len(),
            trades,
            from: query.from,
            to: query.to,
        })
    }

    /// Drop a connection from the registry.
    pub async fn disconnect(&self, id: &str) -> Result<(), ServiceError> {
        let _gate = self.session_gate.lock().await;
        let removed = self.registry.remove(id).await?;
        info!(connection_id = %id, login = removed.credentials.login, "Disconnected");
        Ok(())
    }

    pub async fn connections(&self) -> BTreeMap<String, ConnectionView> {
        self.registry.list_all().await
    }

    /// Stop the terminal runtime. Registered connections are dropped with the process.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let remaining = self.registry.len().await;
        if remaining > 0 {
            info!(remaining, "Shutting down with live connections");
        }
        self.terminal.shutdown().await?;
        Ok(())
    }
}
