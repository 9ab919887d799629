/// Configuration for the API server
///
/// Configuration comes from environment variables. In development a `.env`
/// file next to the binary is loaded first.
///
/// # Environment Variables
///
/// - `API_HOST`: host to bind to (default: 0.0.0.0)
/// - `API_PORT`: port to bind to (default: 8080)
/// - `CORS_ORIGINS`: comma-separated allowed origins, `*` for any (default: `*`)
/// - `PRODUCTION`: `true` enables HSTS and JSON logs by default (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `JWT_SECRET`: HS256 signing secret, at least 32 characters (required)
/// - `MAIL_API_URL` / `MAIL_API_KEY`: mail provider endpoint and key; when
///   either is missing, mail is written to the log instead. Both are
///   required when `PRODUCTION` is set.
/// - `MAIL_FROM`: sender address (default: noreply@pmboard.dev)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `json` in production)
///
/// # Example
///
/// ```no_run
/// use pmboard_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Minimum length of `JWT_SECRET`
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    pub mail: MailConfig,

    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    pub max_connections: u32,
}

/// JWT configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret. Generate with `openssl rand -hex 32`.
    pub secret: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig").field("secret", &"<redacted>").finish()
    }
}

/// Mail provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,

    pub api_key: Option<String>,

    pub from: String,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

impl MailConfig {
    /// URL and key, when both are configured
    pub fn provider(&self) -> Option<(&str, &str)> {
        match (&self.api_url, &self.api_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from the process environment (and `.env`)
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = non_empty(lookup("API_HOST")).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let production = parse_or(&lookup, "PRODUCTION", false)?;

        let database_url = non_empty(lookup("DATABASE_URL"))
            .context("DATABASE_URL environment variable is required")?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret =
            lookup("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if jwt_secret.chars().count() < MIN_JWT_SECRET_LENGTH {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LENGTH
            );
        }

        let default_format = if production {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };
        let format = parse_or(&lookup, "LOG_FORMAT", default_format)?;

        let mail = MailConfig {
            api_url: non_empty(lookup("MAIL_API_URL")),
            api_key: non_empty(lookup("MAIL_API_KEY")),
            from: non_empty(lookup("MAIL_FROM"))
                .unwrap_or_else(|| "noreply@pmboard.dev".to_string()),
        };
        if production && mail.provider().is_none() {
            anyhow::bail!("MAIL_API_URL and MAIL_API_KEY are required in production");
        }

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig { secret: jwt_secret },
            mail,
            logging: LoggingConfig { format },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin is allowed
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.cors_allows_any());
        assert!(!config.api.production);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.mail.provider().is_none());
        assert_eq!(config.mail.from, "noreply@pmboard.dev");
    }

    #[test]
    fn test_explicit_values() {
        let config = load(&[
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "3000"),
            ("CORS_ORIGINS", "https://app.pmboard.dev, https://admin.pmboard.dev"),
            ("PRODUCTION", "true"),
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("DATABASE_MAX_CONNECTIONS", "25"),
            ("JWT_SECRET", SECRET),
            ("MAIL_API_URL", "https://mail.example.com/send"),
            ("MAIL_API_KEY", "key"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(
            config.api.cors_origins,
            vec!["https://app.pmboard.dev", "https://admin.pmboard.dev"]
        );
        assert!(!config.cors_allows_any());
        assert!(config.api.production);
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.mail.provider(),
            Some(("https://mail.example.com/send", "key"))
        );
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = load(&[("DATABASE_URL", "postgresql://localhost/pmboard")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", "too-short"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
            ("API_PORT", "eighty"),
        ])
        .is_err());

        assert!(load(&[
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
            ("LOG_FORMAT", "xml"),
        ])
        .is_err());
    }

    #[test]
    fn test_production_requires_mail_provider() {
        let err = load(&[
            ("PRODUCTION", "true"),
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MAIL_API_URL"));

        assert!(load(&[
            ("PRODUCTION", "true"),
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
            ("MAIL_API_URL", "https://mail.example.com/send"),
        ])
        .is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/pmboard"),
            ("JWT_SECRET", SECRET),
            ("MAIL_API_URL", "https://mail.example.com/send"),
            ("MAIL_API_KEY", "super-secret-mail-key"),
        ])
        .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains(SECRET));
        assert!(!debug.contains("super-secret-mail-key"));
    }
}
