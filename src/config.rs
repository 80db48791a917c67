//! Environment Configuration
//!
//! All runtime configuration comes from environment variables; there are
//! no flags and no config files. Anything unset falls back to a default,
//! and a missing `TOKEN_SECRET` gets a random 32-byte secret generated
//! at boot (signed tokens then only survive for that process).

use rand::RngCore;
use tracing::info;

pub const ENV_TOKEN_SECRET: &str = "TOKEN_SECRET";
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_TCP_PORT: &str = "TCP_PORT";
pub const ENV_SHARD_COUNT: &str = "SHARD_COUNT";
pub const ENV_LOGGING_ENVIRONMENT: &str = "LOGGING_ENVIRONMENT";
pub const ENV_LOGGING_LEVEL: &str = "LOGGING_LEVEL";

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_TCP_PORT: u16 = 9090;
pub const DEFAULT_SHARD_COUNT: usize = 64;
pub const DEFAULT_LOGGING_ENVIRONMENT: &str = "production";
pub const DEFAULT_LOGGING_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_secret: Vec<u8>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// TCP listen port
    pub tcp_port: u16,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `production` selects JSON logs, anything else pretty output
    pub environment: String,
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default shard count for new buckets
    pub shard_count: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let token_secret = match env_str(ENV_TOKEN_SECRET) {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => generate_random_secret(),
        };

        Self {
            auth: AuthConfig { token_secret },
            server: ServerConfig {
                http_port: env_parsed(ENV_SERVER_PORT, DEFAULT_SERVER_PORT),
                tcp_port: env_parsed(ENV_TCP_PORT, DEFAULT_TCP_PORT),
            },
            logging: LoggingConfig {
                environment: env_str(ENV_LOGGING_ENVIRONMENT)
                    .unwrap_or_else(|| DEFAULT_LOGGING_ENVIRONMENT.to_string()),
                level: env_str(ENV_LOGGING_LEVEL)
                    .unwrap_or_else(|| DEFAULT_LOGGING_LEVEL.to_string()),
            },
            store: StoreConfig {
                shard_count: env_parsed(ENV_SHARD_COUNT, DEFAULT_SHARD_COUNT),
            },
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn generate_random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    info!("generated random token secret for this session");
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Env vars are process-global; only assert the fields this test
        // does not mutate elsewhere.
        let config = Config::from_env();
        assert!(!config.auth.token_secret.is_empty());
        assert!(config.store.shard_count >= 1);
    }

    #[test]
    fn test_env_parsed_falls_back_on_garbage() {
        std::env::set_var("VAULTKV_TEST_PORT", "not-a-number");
        assert_eq!(env_parsed("VAULTKV_TEST_PORT", 1234u16), 1234);
        std::env::set_var("VAULTKV_TEST_PORT", " 4321 ");
        assert_eq!(env_parsed("VAULTKV_TEST_PORT", 1234u16), 4321);
        std::env::remove_var("VAULTKV_TEST_PORT");
    }

    #[test]
    fn test_random_secret_length() {
        assert_eq!(generate_random_secret().len(), 32);
        assert_ne!(generate_random_secret(), generate_random_secret());
    }

    #[test]
    fn test_auth_config_debug_redacts() {
        let cfg = AuthConfig {
            token_secret: b"super-secret".to_vec(),
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
