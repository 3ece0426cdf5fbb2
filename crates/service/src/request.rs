use crate::error::ServiceError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use mtbridge_core::{Credentials, HistoryQuery, Platform, Secret};
use serde::Deserialize;

/// Body of `POST /connect`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub server: String,
    pub login: u64,
    pub password: Secret,
    #[serde(default)]
    pub platform: Platform,
}

impl ConnectRequest {
    /// Check required fields are present and build the terminal credentials.
    pub fn credentials(&self) -> Result<Credentials, ServiceError> {
        if self.server.trim().is_empty() {
            return Err(ServiceError::Validation("server is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(ServiceError::Validation("password is required".to_string()));
        }
        Ok(Credentials {
            server: self.server.clone(),
            login: self.login,
            password: self.password.clone(),
        })
    }
}

/// Body of `POST /history/{id}`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryRequest {
    pub symbol: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// Maximum number of trades; 0 disables the cap.
    pub limit: Option<usize>,
}

impl HistoryRequest {
    /// Resolve defaults against `now`: last 30 days, limit 100.
    pub fn into_query(self, now: DateTime<Utc>) -> Result<HistoryQuery, ServiceError> {
        let mut query = HistoryQuery::last_days(now);

        if let Some(from) = non_blank(self.from_date) {
            query.from = parse_datetime("from_date", &from)?;
        }
        if let Some(to) = non_blank(self.to_date) {
            query.to = parse_datetime("to_date", &to)?;
        }
        if query.from > query.to {
            return Err(ServiceError::Validation(
                "from_date must not be after to_date".to_string(),
            ));
        }

        query.symbol = non_blank(self.symbol);
        if let Some(limit) = self.limit {
            query.limit = limit;
        }
        Ok(query)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts RFC 3339, naive ISO date-times (taken as UTC) and plain dates.
pub fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ServiceError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(ServiceError::Validation(format!(
        "{} is not a valid ISO date: {}",
        field, value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("d", "2024-03-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-01T12:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-01 12:30:00.000").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-01T12:30").unwrap(), expected);
        assert_eq!(parse_datetime("d", "2024-03-01 12:30").unwrap(), expected);
        assert_eq!(
            parse_datetime("d", "2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        let err = parse_datetime("from_date", "yesterday").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("from_date")));
    }

    #[test]
    fn test_history_defaults() {
        let now = Utc::now();
        let query = HistoryRequest::default().into_query(now).unwrap();
        assert_eq!(query.to, now);
        assert_eq!(query.from, now - Duration::days(30));
        assert_eq!(query.limit, 100);
        assert_eq!(query.symbol, None);
    }

    #[test]
    fn test_history_blank_symbol_means_all() {
        let request = HistoryRequest {
            symbol: Some("  ".to_string()),
            limit: Some(2),
            ..Default::default()
        };
        let query = request.into_query(Utc::now()).unwrap();
        assert_eq!(query.symbol, None);
        assert_eq!(query.limit, 2);
    }

    #[test]
    fn test_history_inverted_window_rejected() {
        let request = HistoryRequest {
            from_date: Some("2024-02-01".to_string()),
            to_date: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(request.into_query(Utc::now()).is_err());
    }

    #[test]
    fn test_connect_request_defaults_platform() {
        let request: ConnectRequest =
            serde_json::from_str(r#"{"server":"Demo-Server","login":12345,"password":"x"}"#)
                .unwrap();
        assert_eq!(request.platform, Platform::Mt5);
        assert_eq!(request.credentials().unwrap().login, 12345);
    }

    #[test]
    fn test_connect_request_keeps_server_verbatim() {
        let request: ConnectRequest =
            serde_json::from_str(r#"{"server":" Broker-Live 2 ","login":7,"password":"x"}"#)
                .unwrap();
        assert_eq!(request.credentials().unwrap().server, " Broker-Live 2 ");

        let blank: ConnectRequest =
            serde_json::from_str(r#"{"server":"   ","login":7,"password":"x"}"#).unwrap();
        assert!(matches!(
            blank.credentials(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_connect_request_requires_password() {
        let request: ConnectRequest = serde_json::from_str(
            r#"{"server":"Demo-Server","login":1,"password":"","platform":"MT4"}"#,
        )
        .unwrap();
        assert!(matches!(
            request.credentials(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_connect_request_rejects_string_login() {
        let parsed = serde_json::from_str::<ConnectRequest>(
            r#"{"server":"Demo-Server","login":"abc","password":"x"}"#,
        );
        assert!(parsed.is_err());
    }
}
