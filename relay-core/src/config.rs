use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub enabled_types: Vec<String>,
    pub socket: SocketConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub expo: ExpoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    pub server_url: String,
    pub extra_push_auth_key: String,
    pub path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpoConfig {
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub default_sound: String,
    pub default_ttl: u32,
    pub default_priority: String,
    pub batch_size: usize,
    pub max_concurrency: usize,
}

impl ExpoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        Config {
            enabled_types: env::var("ENABLED_TYPES")
                .unwrap_or_else(|_| "private_chat,group_chat".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            socket: SocketConfig {
                server_url: env::var("SOCKET_SERVER_URL")
                    .unwrap_or_else(|_| "http://localhost:9100".to_string()),
                extra_push_auth_key: env::var("SOCKET_EXTRA_PUSH_AUTH_KEY")
                    .unwrap_or_default(),
                path: non_empty_or(env::var("SOCKET_PATH").ok(), "/socket.io/"),
                timeout_secs: parse_or(env::var("SOCKET_TIMEOUT_SECS").ok(), 10),
            },
            store: StoreConfig {
                db_path: non_empty_or(env::var("DB_PATH").ok(), "./data/push_relay"),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                api_port: env::var("API_PORT")
                    .or_else(|_| env::var("PORT"))
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
                api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            },
            expo: ExpoConfig {
                access_token: env::var("EXPO_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
                timeout_secs: parse_or(env::var("EXPO_TIMEOUT_SECS").ok(), 30),
                max_retries: parse_or(env::var("EXPO_MAX_RETRIES").ok(), 3),
                base_delay_ms: parse_or(env::var("EXPO_BASE_DELAY_MS").ok(), 1000),
                default_sound: non_empty_or(env::var("EXPO_DEFAULT_SOUND").ok(), "default"),
                default_ttl: parse_or(env::var("EXPO_DEFAULT_TTL").ok(), 3600),
                default_priority: non_empty_or(env::var("EXPO_DEFAULT_PRIORITY").ok(), "normal"),
                batch_size: parse_or(env::var("EXPO_BATCH_SIZE").ok(), 100),
                max_concurrency: parse_or(env::var("EXPO_MAX_CONCURRENCY").ok(), 6),
            },
        }
    }

    pub fn kind_enabled(&self, kind: &str) -> bool {
        self.enabled_types.iter().any(|t| t == kind)
    }
}

// Numeric zero means "use default" across the configuration surface.
fn parse_or<T>(value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialEq + From<u8>,
{
    match value.and_then(|v| v.parse::<T>().ok()) {
        Some(v) if v != T::from(0u8) => v,
        _ => default,
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_default() {
        assert_eq!(parse_or::<u32>(Some("0".to_string()), 3), 3);
        assert_eq!(parse_or::<u32>(Some("5".to_string()), 3), 5);
        assert_eq!(parse_or::<u32>(None, 3), 3);
        assert_eq!(parse_or::<u32>(Some("garbage".to_string()), 3), 3);
    }

    #[test]
    fn empty_string_means_default() {
        assert_eq!(non_empty_or(Some(String::new()), "/socket.io/"), "/socket.io/");
        assert_eq!(non_empty_or(Some("/ws/".to_string()), "/socket.io/"), "/ws/");
    }
}
