use chrono::{DateTime, Utc};
use mtbridge_core::{AccountSnapshot, Credentials, Platform};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Connection not found: {0}")]
    NotFound(String),
}

/// One logical connection created by a successful connect.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub credentials: Credentials,
    pub platform: Platform,
    pub account: AccountSnapshot,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    /// `{platform}_{login}_{unix_time}`.
    pub fn make_id(platform: Platform, login: u64, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", platform, login, at.timestamp())
    }

    /// Everything except the password.
    pub fn public_view(&self) -> ConnectionView {
        ConnectionView {
            account: self.account.clone(),
            server: self.credentials.server.clone(),
            login: self.credentials.login,
            platform: self.platform,
            connected_at: self.connected_at,
        }
    }
}

/// Connection fields safe to expose over the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionView {
    pub account: AccountSnapshot,
    pub server: String,
    pub login: u64,
    pub platform: Platform,
    pub connected_at: DateTime<Utc>,
}

/// In-memory connection registry.
///
/// A single lock guards the map; it is held only for the map access itself.
#[derive(Default)]
pub struct Registry {
    connections: Mutex<HashMap<String, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, silently replacing one with the same id.
    pub async fn put(&self, connection: Connection) {
        self.connections
            .lock()
            .await
            .insert(connection.id.clone(), connection);
    }

    pub async fn get(&self, id: &str) -> Result<Connection, RegistryError> {
        self.connections
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub async fn update_snapshot(
        &self,
        id: &str,
        account: AccountSnapshot,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock().await;
        let connection = connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        connection.account = account;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<Connection, RegistryError> {
        self.connections
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Public views keyed by id, in id order.
    pub async fn list_all(&self) -> BTreeMap<String, ConnectionView> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|(id, c)| (id.clone(), c.public_view()))
            .collect()
    }

    /// Id of some live record, if any.
    pub async fn active_id(&self) -> Option<String> {
        self.connections.lock().await.keys().next().cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtbridge_core::Secret;
    use rust_decimal_macros::dec;

    fn connection(login: u64) -> Connection {
        let now = Utc::now();
        Connection {
            id: Connection::make_id(Platform::Mt5, login, now),
            credentials: Credentials {
                server: "Demo-Server".to_string(),
                login,
                password: Secret::new("s3cret"),
            },
            platform: Platform::Mt5,
            account: AccountSnapshot {
                login,
                server: "Demo-Server".to_string(),
                balance: dec!(10000),
                equity: dec!(10000),
                margin: dec!(0),
                free_margin: dec!(10000),
                profit: dec!(0),
                currency: "USD".to_string(),
                leverage: 100,
                connected: true,
                last_update: now,
            },
            connected_at: now,
        }
    }

    #[test]
    fn test_connection_id_format() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            Connection::make_id(Platform::Mt5, 12345, at),
            "MT5_12345_1700000000"
        );
        assert_eq!(Connection::make_id(Platform::Mt4, 9, at), "MT4_9_1700000000");
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let registry = Registry::new();
        let conn = connection(1);
        let id = conn.id.clone();

        registry.put(conn).await;
        assert_eq!(registry.get(&id).await.unwrap().credentials.login, 1);
        assert_eq!(registry.len().await, 1);

        registry.remove(&id).await.unwrap();
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.remove(&id).await.unwrap_err(),
            RegistryError::NotFound(id.clone())
        );
        assert!(registry.get(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_id() {
        let registry = Registry::new();
        let first = connection(1);
        let mut second = first.clone();
        second.credentials.server = "Other".to_string();

        registry.put(first.clone()).await;
        registry.put(second).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(&first.id).await.unwrap().credentials.server, "Other");
    }

    #[tokio::test]
    async fn test_update_snapshot() {
        let registry = Registry::new();
        let conn = connection(1);
        let id = conn.id.clone();
        let mut snapshot = conn.account.clone();
        snapshot.balance = dec!(12345.67);

        assert!(registry.update_snapshot(&id, snapshot.clone()).await.is_err());

        registry.put(conn).await;
        registry.update_snapshot(&id, snapshot).await.unwrap();
        assert_eq!(registry.get(&id).await.unwrap().account.balance, dec!(12345.67));
    }

    #[tokio::test]
    async fn test_list_all_hides_password() {
        let registry = Registry::new();
        registry.put(connection(1)).await;
        registry.put(connection(2)).await;

        let listed = registry.list_all().await;
        assert_eq!(listed.len(), 2);

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("s3cret"));
    }
}
