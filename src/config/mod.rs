use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub limiter: LimiterConfig,
    pub smtp: SmtpConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "development" | "dev" => Some(Environment::Development),
            "staging" | "stage" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Upper bound on waiting for in-flight requests once shutdown starts
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_idle_time_secs: u64,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Sustained refill rate in requests per second
    pub rps: f64,
    pub burst: u32,
    /// Key clients by X-Forwarded-For / X-Real-IP instead of the peer address.
    /// Only enable behind a proxy that overwrites those headers.
    pub trust_forwarded_for: bool,
    pub sweep_interval_secs: u64,
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub max_request_size_bytes: usize,
}

impl AppConfig {
    /// Preset for `environment` (or `APP_ENV` when `None`), then specific env vars
    pub fn load(environment: Option<Environment>) -> Self {
        let environment = environment.unwrap_or_else(|| {
            env::var("APP_ENV")
                .ok()
                .and_then(|v| Environment::parse(&v))
                .unwrap_or(Environment::Development)
        });

        Self::for_environment(environment).with_env_overrides()
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_SHUTDOWN_TIMEOUT_SECS") {
            self.server.shutdown_timeout_secs = v.parse().unwrap_or(self.server.shutdown_timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_MIN_CONNECTIONS") {
            self.database.min_connections = v.parse().unwrap_or(self.database.min_connections);
        }
        if let Ok(v) = env::var("DATABASE_MAX_IDLE_TIME_SECS") {
            self.database.max_idle_time_secs = v.parse().unwrap_or(self.database.max_idle_time_secs);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Limiter overrides
        if let Ok(v) = env::var("LIMITER_ENABLED") {
            self.limiter.enabled = v.parse().unwrap_or(self.limiter.enabled);
        }
        if let Ok(v) = env::var("LIMITER_RPS") {
            self.limiter.rps = v.parse().unwrap_or(self.limiter.rps);
        }
        if let Ok(v) = env::var("LIMITER_BURST") {
            self.limiter.burst = v.parse().unwrap_or(self.limiter.burst);
        }
        if let Ok(v) = env::var("LIMITER_TRUST_FORWARDED_FOR") {
            self.limiter.trust_forwarded_for = v.parse().unwrap_or(self.limiter.trust_forwarded_for);
        }

        // SMTP overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.smtp.host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.smtp.port = v.parse().unwrap_or(self.smtp.port);
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.smtp.username = v;
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.smtp.password = v;
        }
        if let Ok(v) = env::var("SMTP_SENDER") {
            self.smtp.sender = v;
        }

        // CORS overrides
        if let Ok(v) = env::var("CORS_TRUSTED_ORIGINS") {
            self.cors.trusted_origins = parse_origins(&v);
        }

        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 4000,
                shutdown_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 25,
                min_connections: 0,
                max_idle_time_secs: 15 * 60,
                connection_timeout: 30,
            },
            limiter: LimiterConfig {
                enabled: true,
                rps: 2.0,
                burst: 4,
                trust_forwarded_for: false,
                sweep_interval_secs: 60,
                stale_after_secs: 3 * 60,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 25,
                username: String::new(),
                password: String::new(),
                sender: "Marquee <no-reply@marquee.local>".to_string(),
            },
            cors: CorsConfig {
                trusted_origins: vec!["http://localhost:9000".to_string()],
            },
            api: ApiConfig {
                max_request_size_bytes: 1_048_576, // 1MB
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 50;
        config.database.connection_timeout = 10;
        config.limiter.rps = 5.0;
        config.limiter.burst = 10;
        config.cors.trusted_origins = vec!["https://staging.marquee.example".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.server.shutdown_timeout_secs = 10;
        config.database.max_connections = 100;
        config.database.min_connections = 5;
        config.database.connection_timeout = 5;
        config.limiter.rps = 10.0;
        config.limiter.burst = 20;
        config.cors.trusted_origins = vec!["https://marquee.example".to_string()];
        config
    }
}

/// Trusted origins arrive as a single space separated list
pub fn parse_origins(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.server.port, 4000);
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.burst, 4);
        assert!(!config.limiter.trust_forwarded_for);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.limiter.burst > AppConfig::development().limiter.burst);
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn explicit_environment_selects_preset() {
        let config = AppConfig::load(Some(Environment::Staging));
        assert_eq!(config.environment, Environment::Staging);
    }

    #[test]
    fn parses_space_separated_origins() {
        let origins = parse_origins("http://a.example  https://b.example\thttp://c.example");
        assert_eq!(
            origins,
            vec!["http://a.example", "https://b.example", "http://c.example"]
        );
        assert!(parse_origins("   ").is_empty());
    }

    #[test]
    fn parses_environment_names() {
        assert_eq!(Environment::parse("prod"), Some(Environment::Production));
        assert_eq!(Environment::parse("staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("qa"), None);
        assert_eq!(Environment::Development.as_str(), "development");
    }
}
