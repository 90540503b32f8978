//! Persistence for tenants, conversations and document chunks
//!
//! One Postgres pool serves every path. Conversations are read back right
//! after they are written, so there is no separate read connection.

pub mod models;
mod repository;

pub use repository::{format_vector, ChunkResult, Repository, TenantUpdate};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Shared Postgres connection pool
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(&config.url);
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);
    options
}

impl DbPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting to database"
        );

        let conn = Database::connect(connect_options(config))
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("failed to connect: {}", e),
            })?;

        info!("Database connection established");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Readiness check
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("ping failed: {}", e),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_follow_config() {
        let config = DatabaseConfig {
            url: "postgres://db/hybridrag".to_string(),
            max_connections: 12,
            min_connections: 3,
            connect_timeout_secs: 4,
            idle_timeout_secs: 90,
        };

        let options = connect_options(&config);

        assert_eq!(options.get_url(), "postgres://db/hybridrag");
        assert_eq!(options.get_max_connections(), Some(12));
        assert_eq!(options.get_min_connections(), Some(3));
        assert_eq!(options.get_connect_timeout(), Some(Duration::from_secs(4)));
    }
}
