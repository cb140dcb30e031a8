use serde::{Deserialize, Serialize, Serializer};
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(ConfigError::Invalid {
                key: "DATABASE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    #[serde(serialize_with = "serialize_redacted_url")]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub featured_limit: u32,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProviderKind {
    Firebase,
    SharedSecret,
}

impl std::str::FromStr for IdentityProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firebase" => Ok(IdentityProviderKind::Firebase),
            "shared_secret" | "shared-secret" | "hs256" => Ok(IdentityProviderKind::SharedSecret),
            other => Err(ConfigError::Invalid {
                key: "AUTH_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub identity_provider: IdentityProviderKind,
    pub firebase_project_id: Option<String>,
    pub jwks_url: String,
    #[serde(skip_serializing)]
    pub shared_secret: Option<String>,
    pub verify_timeout_ms: u64,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Connection URL with any password replaced, for dumps and logs.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

fn serialize_redacted_url<S: Serializer>(url: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match url {
        Some(raw) => serializer.serialize_some(&redact_url(raw)),
        None => serializer.serialize_none(),
    }
}

/// Google's signing keys for Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

impl AppConfig {
    /// Environment preset plus env overrides. Not validated here: callers
    /// validate once every override (including command-line flags) is applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::for_environment(environment).with_env_overrides()
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = env::var("SKILLVERSE_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            self.database.backend = v.parse()?;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
            if env::var("DATABASE_BACKEND").is_err() {
                self.database.backend = StoreBackend::Postgres;
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_OP_TIMEOUT_MS") {
            self.database.op_timeout_ms = v.parse().unwrap_or(self.database.op_timeout_ms);
        }

        // API overrides
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_FEATURED_LIMIT") {
            self.api.featured_limit = v.parse().unwrap_or(self.api.featured_limit);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("AUTH_PROVIDER") {
            self.security.identity_provider = v.parse()?;
        }
        if let Ok(v) = env::var("FIREBASE_PROJECT_ID") {
            self.security.firebase_project_id = Some(v);
        }
        if let Ok(v) = env::var("AUTH_JWKS_URL") {
            self.security.jwks_url = v;
        }
        if let Ok(v) = env::var("AUTH_SHARED_SECRET") {
            self.security.shared_secret = Some(v);
        }
        if let Ok(v) = env::var("AUTH_VERIFY_TIMEOUT_MS") {
            self.security.verify_timeout_ms = v.parse().unwrap_or(self.security.verify_timeout_ms);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(self)
    }

    /// Check that the secrets the selected backends need are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        match self.security.identity_provider {
            IdentityProviderKind::Firebase => {
                if self.security.firebase_project_id.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Missing("FIREBASE_PROJECT_ID"));
                }
                let parsed = url::Url::parse(&self.security.jwks_url).map_err(|_| ConfigError::Invalid {
                    key: "AUTH_JWKS_URL",
                    value: self.security.jwks_url.clone(),
                })?;
                if parsed.scheme() != "https" && self.environment != Environment::Development {
                    return Err(ConfigError::Invalid {
                        key: "AUTH_JWKS_URL",
                        value: self.security.jwks_url.clone(),
                    });
                }
            }
            IdentityProviderKind::SharedSecret => {
                if self.security.shared_secret.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Missing("AUTH_SHARED_SECRET"));
                }
                if self.environment == Environment::Production {
                    return Err(ConfigError::Invalid {
                        key: "AUTH_PROVIDER",
                        value: "shared_secret".to_string(),
                    });
                }
            }
        }

        if self.api.default_page_size == 0 || self.api.default_page_size > self.api.max_page_size {
            return Err(ConfigError::Invalid {
                key: "API_DEFAULT_PAGE_SIZE",
                value: self.api.default_page_size.to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 10,
                connect_timeout_secs: 30,
                op_timeout_ms: 5_000,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 100,
                featured_limit: 6,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                identity_provider: IdentityProviderKind::SharedSecret,
                firebase_project_id: None,
                jwks_url: FIREBASE_JWKS_URL.to_string(),
                shared_secret: Some("skillverse-dev-secret".to_string()),
                verify_timeout_ms: 5_000,
                cors_origins: vec!["http://localhost:5173".to_string(), "http://localhost:3000".to_string()],
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connect_timeout_secs: 10,
                op_timeout_ms: 3_000,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 50,
                featured_limit: 6,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                identity_provider: IdentityProviderKind::Firebase,
                firebase_project_id: None,
                jwks_url: FIREBASE_JWKS_URL.to_string(),
                shared_secret: None,
                verify_timeout_ms: 3_000,
                cors_origins: vec!["https://staging.skillverse.app".to_string()],
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connect_timeout_secs: 5,
                op_timeout_ms: 2_000,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 50,
                featured_limit: 6,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                identity_provider: IdentityProviderKind::Firebase,
                firebase_project_id: None,
                jwks_url: FIREBASE_JWKS_URL.to_string(),
                shared_secret: None,
                verify_timeout_ms: 2_000,
                cors_origins: vec!["https://skillverse.app".to_string()],
            },
        }
    }
}

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    ($config:expr) => {
        matches!($config.environment, $crate::config::Environment::Development)
    };
}
