/// Application context and dependency wiring
use crate::{
    audit::AuditLogger,
    config::ServerConfig,
    db,
    directory::{DepartmentManager, EmployeeManager},
    error::HubResult,
    knowledge::{CategoryManager, FeedManager, PostManager},
    moderation::{AppealManager, ModerationManager, PunishmentManager},
    notify::{EventLog, EventLogConfig, NotificationStore},
    privacy::{ConsentManager, PrivacyRequestManager},
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    // Ledgers
    pub audit: Arc<AuditLogger>,
    pub events: Arc<EventLog>,
    // Workflows
    pub moderation: Arc<ModerationManager>,
    pub appeals: Arc<AppealManager>,
    pub punishments: Arc<PunishmentManager>,
    // Privacy & compliance
    pub consents: Arc<ConsentManager>,
    pub privacy_requests: Arc<PrivacyRequestManager>,
    // Directory
    pub departments: Arc<DepartmentManager>,
    pub employees: Arc<EmployeeManager>,
    // Knowledge base
    pub categories: Arc<CategoryManager>,
    pub posts: Arc<PostManager>,
    pub feed: Arc<FeedManager>,
    // Notifications
    pub notifications: Arc<NotificationStore>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> HubResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::init_schema(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire all services over an existing pool. Used directly by tests with
    /// an in-memory database.
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let audit = AuditLogger::new(pool.clone(), config.retention.audit_days);
        let events = EventLog::new(pool.clone(), EventLogConfig::default());

        let moderation = Arc::new(ModerationManager::new(pool.clone(), audit.clone()));
        let appeals = Arc::new(AppealManager::new(pool.clone(), audit.clone()));
        let punishments = Arc::new(PunishmentManager::new(pool.clone()));

        let consents = Arc::new(ConsentManager::new(pool.clone(), audit.clone()));
        let privacy_requests = Arc::new(PrivacyRequestManager::new(
            pool.clone(),
            audit.clone(),
            config.storage.export_directory.clone(),
        ));

        let departments = Arc::new(DepartmentManager::new(pool.clone()));
        let employees = Arc::new(EmployeeManager::new(pool.clone()));

        let categories = Arc::new(CategoryManager::new(pool.clone()));
        let posts = Arc::new(PostManager::new(pool.clone()));
        let feed = Arc::new(FeedManager::new(pool.clone()));

        let notifications = Arc::new(NotificationStore::new(pool.clone(), events.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db: pool,
            audit: Arc::new(audit),
            events: Arc::new(events),
            moderation,
            appeals,
            punishments,
            consents,
            privacy_requests,
            departments,
            employees,
            categories,
            posts,
            feed,
            notifications,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> HubResult<()> {
        for dir in [
            &config.storage.data_directory,
            &config.storage.export_directory,
        ] {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
