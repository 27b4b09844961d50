use clap::Parser;

use crate::config::{parse_origins, AppConfig, Environment};

/// Command-line flags. Each one, when given, overrides the value loaded from
/// the environment preset and environment variables.
#[derive(Debug, Default, Parser)]
#[command(name = "marquee-api")]
#[command(about = "Marquee movie catalog JSON API")]
#[command(version)]
pub struct Args {
    #[arg(long, help = "API server port")]
    pub port: Option<u16>,

    #[arg(long, value_parser = parse_environment, help = "Environment (development|staging|production)")]
    pub env: Option<Environment>,

    #[arg(long = "db-dsn", help = "PostgreSQL DSN")]
    pub db_dsn: Option<String>,

    #[arg(long = "db-max-open-conns", help = "PostgreSQL max open connections")]
    pub db_max_open_conns: Option<u32>,

    #[arg(long = "db-max-idle-time", help = "PostgreSQL max connection idle time in seconds")]
    pub db_max_idle_time: Option<u64>,

    #[arg(long = "limiter-enabled", help = "Enable rate limiter (true|false)")]
    pub limiter_enabled: Option<bool>,

    #[arg(long = "limiter-rps", help = "Rate limiter maximum requests per second")]
    pub limiter_rps: Option<f64>,

    #[arg(long = "limiter-burst", help = "Rate limiter maximum burst")]
    pub limiter_burst: Option<u32>,

    #[arg(long = "limiter-trust-forwarded-for", help = "Key clients by X-Forwarded-For / X-Real-IP")]
    pub limiter_trust_forwarded_for: Option<bool>,

    #[arg(long = "smtp-host")]
    pub smtp_host: Option<String>,

    #[arg(long = "smtp-port")]
    pub smtp_port: Option<u16>,

    #[arg(long = "smtp-username")]
    pub smtp_username: Option<String>,

    #[arg(long = "smtp-password")]
    pub smtp_password: Option<String>,

    #[arg(long = "smtp-sender")]
    pub smtp_sender: Option<String>,

    #[arg(long = "cors-trusted-origins", help = "Trusted CORS origins (space separated)")]
    pub cors_trusted_origins: Option<String>,
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    Environment::parse(value).ok_or_else(|| format!("unknown environment '{}'", value))
}

impl Args {
    /// Builds the effective configuration. `--env` selects the preset before
    /// environment variables and the remaining flags are applied.
    pub fn into_config(self) -> AppConfig {
        let mut config = AppConfig::load(self.env);
        self.apply(&mut config);
        config
    }

    pub fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dsn) = self.db_dsn {
            config.database.url = dsn;
        }
        if let Some(n) = self.db_max_open_conns {
            config.database.max_connections = n;
        }
        if let Some(secs) = self.db_max_idle_time {
            config.database.max_idle_time_secs = secs;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.rps = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(trust) = self.limiter_trust_forwarded_for {
            config.limiter.trust_forwarded_for = trust;
        }
        if let Some(host) = self.smtp_host {
            config.smtp.host = host;
        }
        if let Some(port) = self.smtp_port {
            config.smtp.port = port;
        }
        if let Some(username) = self.smtp_username {
            config.smtp.username = username;
        }
        if let Some(password) = self.smtp_password {
            config.smtp.password = password;
        }
        if let Some(sender) = self.smtp_sender {
            config.smtp.sender = sender;
        }
        if let Some(origins) = self.cors_trusted_origins {
            config.cors.trusted_origins = parse_origins(&origins);
        }
    }
}
