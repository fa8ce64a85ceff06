/// Configuration management for the Plaza server
use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// "development" or "production"; controls CORS behavior
    pub environment: String,
    /// Allowed CORS origins in production
    pub cors_origins: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    /// Directory where data-export bundles are written
    pub export_directory: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub token_ttl_secs: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub moderator_rps: u32,
    pub burst_size: u32,
}

/// Retention policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days before audit log rows are eligible for hard deletion
    pub audit_days: i64,
    /// Days before channel events are pruned from the event log
    pub event_days: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> HubResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("PLAZA_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("PLAZA_PORT")
            .unwrap_or_else(|_| "8380".to_string())
            .parse()
            .map_err(|_| HubError::Validation("Invalid port number".to_string()))?;
        let environment =
            env::var("PLAZA_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let cors_origins = env::var("PLAZA_CORS_ORIGINS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let data_directory: PathBuf = env::var("PLAZA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("PLAZA_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("plaza.sqlite"));
        let export_directory = env::var("PLAZA_EXPORT_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("exports"));

        let jwt_secret = env::var("PLAZA_JWT_SECRET")
            .map_err(|_| HubError::Validation("JWT secret required".to_string()))?;
        let token_ttl_secs = env::var("PLAZA_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);

        let rate_limit_enabled = env::var("PLAZA_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let authenticated_rps = env::var("PLAZA_RATE_LIMIT_AUTHENTICATED_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let unauthenticated_rps = env::var("PLAZA_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let moderator_rps = env::var("PLAZA_RATE_LIMIT_MODERATOR_RPS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);
        let burst_size = env::var("PLAZA_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let audit_days = env::var("PLAZA_AUDIT_RETENTION_DAYS")
            .unwrap_or_else(|_| "365".to_string())
            .parse()
            .unwrap_or(365);
        let event_days = env::var("PLAZA_EVENT_RETENTION_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse()
            .unwrap_or(14);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                environment,
                cors_origins,
            },
            storage: StorageConfig {
                data_directory,
                database,
                export_directory,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl_secs,
            },
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                moderator_rps,
                burst_size,
            },
            retention: RetentionConfig {
                audit_days,
                event_days,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> HubResult<()> {
        if self.service.hostname.is_empty() {
            return Err(HubError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(HubError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.service.environment == "production" && self.service.cors_origins.is_empty() {
            return Err(HubError::Validation(
                "Production deployments must configure PLAZA_CORS_ORIGINS".to_string(),
            ));
        }

        if self.retention.audit_days <= 0 {
            return Err(HubError::Validation(
                "Audit retention must be at least one day".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.service.environment == "production"
    }
}
