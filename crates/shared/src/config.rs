use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub dynamodb_table: String,
    /// DynamoDB Local などの接続先。指定時はテーブルを自動作成する
    pub dynamodb_endpoint: Option<String>,
    pub environment: String,
    pub aws_region: String,
    pub port: u16,
    /// プッシュ通知を持たないストア向けのライブクエリ再取得間隔
    pub live_query_poll: Duration,
    pub notification_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の参照関数から設定を組み立てる（テストでは環境変数を汚さないために使う）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("dynamodb") => StoreBackend::DynamoDb,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            store_backend,
            dynamodb_table: lookup("DYNAMODB_TABLE").unwrap_or_else(|| "todo-demo-dev".to_string()),
            dynamodb_endpoint: lookup("DYNAMODB_ENDPOINT").filter(|s| !s.is_empty()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string()),
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            live_query_poll: Duration::from_millis(positive_or(&lookup, "LIVE_QUERY_POLL_MS", 2000)?),
            notification_ttl: Duration::from_secs(parse_or(&lookup, "NOTIFICATION_TTL_SECS", 5)?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

/// 0 を許さない数値設定（再取得間隔など）
fn positive_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_or(lookup, name, default)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.dynamodb_table, "todo-demo-dev");
        assert_eq!(config.dynamodb_endpoint, None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.live_query_poll, Duration::from_millis(2000));
        assert_eq!(config.notification_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_dynamodb_backend_with_local_endpoint() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "dynamodb"),
            ("DYNAMODB_TABLE", "todos-test"),
            ("DYNAMODB_ENDPOINT", "http://localhost:8000"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::DynamoDb);
        assert_eq!(config.dynamodb_table, "todos-test");
        assert_eq!(config.dynamodb_endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "PORT",
                value: "eighty".to_string()
            }
        );

        let err = Config::from_lookup(lookup_from(&[("LIVE_QUERY_POLL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "LIVE_QUERY_POLL_MS", .. }));

        let err = Config::from_lookup(lookup_from(&[("STORE_BACKEND", "convex")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "STORE_BACKEND", .. }));
    }
}
