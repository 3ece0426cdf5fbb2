use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mtbridge_core::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Configuration for reaching the terminal bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaTraderConfig {
    /// Host address of the bridge (e.g. "127.0.0.1").
    pub host: String,
    /// Port the bridge listens on.
    pub port: u16,
}

impl Default for MetaTraderConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
        }
    }
}

/// MetaTrader terminal client.
///
/// Talks to a bridge process running next to the terminal over TCP using
/// length-prefixed JSON messages. One request is in flight at a time; the
/// stream lock serializes callers.
///
/// If the connection drops after a successful `initialize`, the next request
/// reconnects and replays the last successful login before it is sent.
pub struct MetaTraderBridge {
    config: MetaTraderConfig,
    stream: Mutex<Option<TcpStream>>,
    initialized: AtomicBool,
    /// Set when a transport error dropped a stream that `shutdown` did not close.
    lost: AtomicBool,
    /// Credentials of the last successful login, replayed on reconnect.
    session: Mutex<Option<Credentials>>,
}

impl MetaTraderBridge {
    pub fn new(config: MetaTraderConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            initialized: AtomicBool::new(false),
            lost: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Send a message to the bridge.
    async fn send(stream: &mut TcpStream, msg: &BridgeRequest) -> Result<(), TerminalError> {
        let json = serde_json::to_vec(msg)
            .map_err(|e| TerminalError::Protocol(format!("Serialization error: {}", e)))?;
        if json.len() > MAX_FRAME_LEN {
            return Err(TerminalError::Protocol(format!(
                "Request of {} bytes exceeds frame limit",
                json.len()
            )));
        }
        let framed = frame_message(&json);

        stream
            .write_all(&framed)
            .await
            .map_err(|e| TerminalError::Transport(format!("Write error: {}", e)))?;

        Ok(())
    }

    /// Read a single framed reply from the bridge.
    async fn recv(stream: &mut TcpStream) -> Result<BridgeReply, TerminalError> {
        // Read 4-byte length prefix
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| TerminalError::Transport(format!("Read error: {}", e)))?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TerminalError::Protocol(format!(
                "Frame of {} bytes exceeds limit",
                len
            )));
        }

        // Read message body
        let mut body = vec![0u8; len];
        stream
            .read_exact(&mut body)
            .await
            .map_err(|e| TerminalError::Transport(format!("Read error: {}", e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| TerminalError::Protocol(format!("Deserialization error: {}", e)))
    }

    async fn exchange(
        stream: &mut TcpStream,
        msg: &BridgeRequest,
    ) -> Result<BridgeReply, TerminalError> {
        Self::send(stream, msg).await?;
        Self::recv(stream).await
    }

    /// Open a stream and complete the `initialize` handshake on it.
    async fn handshake(&self) -> Result<TcpStream, TerminalError> {
        let addr = self.addr();
        info!("Connecting to terminal bridge at {}", addr);

        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TerminalError::Init(format!("TCP connect to {} failed: {}", addr, e)))?;

        let reply = Self::exchange(&mut stream, &BridgeRequest::Initialize)
            .await
            .map_err(|e| TerminalError::Init(e.to_string()))?;

        match reply {
            BridgeReply::Initialized { version } => {
                info!("Terminal bridge initialized (terminal v{})", version);
                Ok(stream)
            }
            BridgeReply::Error { code, message } => {
                Err(TerminalError::Init(format!("{} (code {})", message, code)))
            }
            other => Err(TerminalError::Init(format!(
                "Unexpected initial reply: {:?}",
                other
            ))),
        }
    }

    /// Re-establish a dropped stream and restore the session on it.
    async fn reconnect(&self) -> Result<TcpStream, TerminalError> {
        let mut stream = self.handshake().await?;

        let saved = self.session.lock().await.clone();
        if let Some(credentials) = saved {
            let msg = BridgeRequest::Login {
                server: credentials.server.clone(),
                login: credentials.login,
                password: credentials.password,
            };
            match Self::exchange(&mut stream, &msg).await? {
                BridgeReply::LoggedIn => {
                    info!(login = credentials.login, "Session restored after reconnect")
                }
                other => warn!(
                    login = credentials.login,
                    "Session not restored after reconnect: {:?}", other
                ),
            }
        }

        self.lost.store(false, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(stream)
    }

    /// One request/reply round trip. A transport failure drops the stream;
    /// the next call reconnects.
    async fn request(&self, msg: &BridgeRequest) -> Result<BridgeReply, TerminalError> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            if !self.lost.load(Ordering::SeqCst) {
                return Err(TerminalError::Init("Bridge not initialized".to_string()));
            }
            *guard = Some(self.reconnect().await?);
        }
        let stream = guard
            .as_mut()
            .ok_or_else(|| TerminalError::Init("Bridge not initialized".to_string()))?;

        let result = Self::exchange(stream, msg).await;

        if let Err(TerminalError::Transport(reason)) = &result {
            warn!(%reason, "Lost connection to terminal bridge");
            *guard = None;
            self.initialized.store(false, Ordering::SeqCst);
            self.lost.store(true, Ordering::SeqCst);
        }
        result
    }
}

/// Map an `error` reply to a query failure.
fn query_error(code: i64, message: String) -> TerminalError {
    if code == ERR_NO_SESSION {
        TerminalError::NoActiveSession
    } else {
        TerminalError::Protocol(format!("Terminal error {}: {}", code, message))
    }
}

fn unexpected(reply: BridgeReply) -> TerminalError {
    TerminalError::Protocol(format!("Unexpected reply: {:?}", reply))
}

#[async_trait]
impl TerminalClient for MetaTraderBridge {
    fn name(&self) -> &str {
        "metatrader"
    }

    async fn initialize(&self) -> Result<(), TerminalError> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() && self.is_initialized() {
            return Ok(());
        }

        let stream = self.handshake().await?;
        *guard = Some(stream);
        self.lost.store(false, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), TerminalError> {
        let msg = BridgeRequest::Login {
            server: credentials.server.clone(),
            login: credentials.login,
            password: credentials.password.clone(),
        };

        match self.request(&msg).await? {
            BridgeReply::LoggedIn => {
                debug!(login = credentials.login, server = %credentials.server, "Bridge login ok");
                *self.session.lock().await = Some(credentials.clone());
                Ok(())
            }
            BridgeReply::Error { code, message } => Err(TerminalError::Auth { code, message }),
            other => Err(unexpected(other)),
        }
    }

    async fn account_info(&self) -> Result<AccountInfo, TerminalError> {
        match self.request(&BridgeRequest::AccountInfo).await? {
            BridgeReply::Account { account } => Ok(account.into()),
            BridgeReply::Error { code, message } => Err(query_error(code, message)),
            other => Err(unexpected(other)),
        }
    }

    async fn positions(&self) -> Result<Vec<PositionRecord>, TerminalError> {
        match self.request(&BridgeRequest::PositionsGet).await? {
            BridgeReply::Positions { positions } => {
                Ok(positions.into_iter().map(PositionRecord::from).collect())
            }
            BridgeReply::Error { code, message } => Err(query_error(code, message)),
            other => Err(unexpected(other)),
        }
    }

    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DealRecord>, TerminalError> {
        let msg = BridgeRequest::HistoryDealsGet {
            from: from.timestamp(),
            to: to.timestamp(),
        };

        match self.request(&msg).await? {
            BridgeReply::Deals { deals } => Ok(deals.into_iter().map(DealRecord::from).collect()),
            BridgeReply::Error { code, message } => Err(query_error(code, message)),
            other => Err(unexpected(other)),
        }
    }

    async fn shutdown(&self) -> Result<(), TerminalError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            // Best effort: the bridge may already be gone.
            if Self::send(&mut stream, &BridgeRequest::Shutdown).await.is_ok() {
                let _ = Self::recv(&mut stream).await;
            }
            let _ = stream.shutdown().await;
            info!("Disconnected from terminal bridge");
        }
        *self.session.lock().await = None;
        self.lost.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn read_request(stream: &mut TcpStream) -> Option<BridgeRequest> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.ok()?;
        let mut body = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.ok()?;
        serde_json::from_slice(&body).ok()
    }

    async fn write_reply(stream: &mut TcpStream, reply: &BridgeReply) {
        let json = serde_json::to_vec(reply).unwrap();
        stream.write_all(&frame_message(&json)).await.unwrap();
    }

    fn raw_account(login: u64) -> RawAccount {
        RawAccount {
            login,
            server: "Demo-Server".to_string(),
            balance: dec!(10000),
            equity: dec!(10050.25),
            margin: dec!(500),
            margin_free: dec!(9550.25),
            profit: dec!(50.25),
            currency: "USD".to_string(),
            leverage: 100,
        }
    }

    /// One bridge connection: accepts password "x" only and answers queries
    /// for the logged-in account. Closes the socket instead of answering the
    /// `drop_on`-th `account_info` counted across connections.
    async fn serve_connection(
        mut stream: TcpStream,
        account_calls: Arc<AtomicUsize>,
        drop_on: Option<usize>,
    ) {
        let mut session: Option<u64> = None;
        while let Some(req) = read_request(&mut stream).await {
            let reply = match req {
                BridgeRequest::Initialize => BridgeReply::Initialized {
                    version: "5.0.4000".to_string(),
                },
                BridgeRequest::Login {
                    login, password, ..
                } => {
                    if password.expose() == "x" {
                        session = Some(login);
                        BridgeReply::LoggedIn
                    } else {
                        BridgeReply::Error {
                            code: -6,
                            message: "Authorization failed".to_string(),
                        }
                    }
                }
                BridgeRequest::AccountInfo => {
                    let call = account_calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if drop_on == Some(call) {
                        return;
                    }
                    match session {
                        Some(login) => BridgeReply::Account {
                            account: raw_account(login),
                        },
                        None => BridgeReply::Error {
                            code: ERR_NO_SESSION,
                            message: "No session".to_string(),
                        },
                    }
                }
                BridgeRequest::PositionsGet => BridgeReply::Positions {
                    positions: Vec::new(),
                },
                BridgeRequest::HistoryDealsGet { .. } => BridgeReply::Deals {
                    deals: (1..=3)
                        .map(|t| RawDeal {
                            ticket: t,
                            order: 0,
                            symbol: if t == 2 { "XAUUSD" } else { "EURUSD" }.to_string(),
                            kind: 0,
                            volume: dec!(0.1),
                            price: dec!(1.1),
                            profit: dec!(1),
                            swap: dec!(0),
                            fee: dec!(0),
                            time: 1_700_000_000,
                            magic: 0,
                            comment: String::new(),
                            external_id: String::new(),
                        })
                        .collect(),
                },
                BridgeRequest::Shutdown => {
                    write_reply(&mut stream, &BridgeReply::ShutdownAck).await;
                    break;
                }
            };
            write_reply(&mut stream, &reply).await;
        }
    }

    async fn spawn_bridge_with(drop_on: Option<usize>) -> MetaTraderConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let account_calls = Arc::new(AtomicUsize::new(0));

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, account_calls.clone(), drop_on));
            }
        });

        MetaTraderConfig {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    async fn spawn_fake_bridge() -> MetaTraderConfig {
        spawn_bridge_with(None).await
    }

    fn creds(password: &str) -> Credentials {
        Credentials {
            server: "Demo-Server".to_string(),
            login: 12345,
            password: Secret::new(password),
        }
    }

    #[tokio::test]
    async fn test_initialize_login_and_account_info() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();
        assert!(bridge.is_initialized());

        // Second initialize is a no-op on the same stream.
        bridge.initialize().await.unwrap();

        assert_eq!(
            bridge.account_info().await.unwrap_err(),
            TerminalError::NoActiveSession
        );

        bridge.login(&creds("x")).await.unwrap();
        let info = bridge.account_info().await.unwrap();
        assert_eq!(info.login, 12345);
        assert_eq!(info.free_margin, dec!(9550.25));
    }

    #[tokio::test]
    async fn test_bad_password_is_auth_error() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();

        match bridge.login(&creds("nope")).await {
            Err(TerminalError::Auth { code, message }) => {
                assert_eq!(code, -6);
                assert!(message.contains("Authorization"));
            }
            other => panic!("Expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_applies_filter_and_limit() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();
        bridge.login(&creds("x")).await.unwrap();

        let mut query = HistoryQuery::last_days(Utc::now());
        query.symbol = Some("EURUSD".to_string());
        query.limit = 1;

        let deals = bridge.history(&query).await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].ticket, 1);
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_init_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let bridge = MetaTraderBridge::new(MetaTraderConfig {
            host: "127.0.0.1".to_string(),
            port,
        });
        assert!(matches!(
            bridge.initialize().await,
            Err(TerminalError::Init(_))
        ));
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let bridge = MetaTraderBridge::new(MetaTraderConfig::default());
        assert!(matches!(
            bridge.positions().await,
            Err(TerminalError::Init(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();
        bridge.shutdown().await.unwrap();
        bridge.shutdown().await.unwrap();
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_reconnects_and_restores_session_after_drop() {
        let bridge = MetaTraderBridge::new(spawn_bridge_with(Some(2)).await);
        bridge.initialize().await.unwrap();
        bridge.login(&creds("x")).await.unwrap();
        assert_eq!(bridge.account_info().await.unwrap().login, 12345);

        // The bridge closes the socket mid-request.
        assert!(matches!(
            bridge.account_info().await,
            Err(TerminalError::Transport(_))
        ));
        assert!(!bridge.is_initialized());

        // Next call opens a new stream and logs in again before querying.
        let info = bridge.account_info().await.unwrap();
        assert_eq!(info.login, 12345);
        assert!(bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_no_reconnect_after_shutdown() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();
        bridge.shutdown().await.unwrap();
        assert!(matches!(
            bridge.positions().await,
            Err(TerminalError::Init(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_request_rejected_before_sending() {
        let bridge = MetaTraderBridge::new(spawn_fake_bridge().await);
        bridge.initialize().await.unwrap();

        let huge = Credentials {
            server: "s".repeat(MAX_FRAME_LEN),
            login: 12345,
            password: Secret::new("x"),
        };
        assert!(matches!(
            bridge.login(&huge).await,
            Err(TerminalError::Protocol(_))
        ));

        // Nothing was written, so the stream stays usable.
        assert!(bridge.is_initialized());
        assert!(bridge.positions().await.unwrap().is_empty());
    }
}
