use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// An in-memory sqlite database lives inside a single connection, so the
    /// pool is pinned to one.
    pub fn for_url(url: &str) -> Self {
        let mut config = Self {
            url: url.to_string(),
            ..Default::default()
        };
        if url.starts_with("sqlite") && url.contains(":memory:") {
            config.max_connections = 1;
            config.min_connections = 1;
        }
        config
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        let mut db = Self::for_url(&cfg.database_url);
        db.connect_timeout = cfg.network_timeout();
        db.acquire_timeout = cfg.network_timeout();
        db
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::for_url(database_url)).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        ServiceError::DatabaseError(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Connects using the loaded configuration and brings the schema up to date.
pub async fn connect_and_migrate(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let pool = establish_connection_with_config(&DbConfig::from(cfg)).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    pool.ping().await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sqlite_uses_single_connection() {
        let cfg = DbConfig::for_url("sqlite::memory:");
        assert_eq!(cfg.max_connections, 1);

        let cfg = DbConfig::for_url("postgres://localhost/storefront");
        assert_eq!(cfg.max_connections, 10);
    }

    #[tokio::test]
    async fn migrations_run_twice_without_error() {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
    }
}
