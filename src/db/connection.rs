use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseConnection as SeaOrmConnection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type DatabaseConnection = Arc<SeaOrmConnection>;

pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    /// Open the default catalog database
    pub async fn new() -> Result<Self> {
        let db_path = Self::db_path()?;
        Self::connect(&db_path).await
    }

    /// Connect to a specific database path
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        info!("Connecting to database at: {}", db_url);

        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let connection = SeaOrmDatabase::connect(opt)
            .await
            .context("Failed to connect to database")?;

        use sea_orm::{ConnectionTrait, Statement};
        connection
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                "PRAGMA foreign_keys = ON",
            ))
            .await
            .context("Failed to enable foreign key constraints")?;

        // WAL keeps chunk writes from blocking concurrent readers
        connection
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                "PRAGMA journal_mode = WAL",
            ))
            .await
            .context("Failed to enable WAL mode")?;

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    pub fn get_connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    fn db_path() -> Result<std::path::PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join("aerial").join("catalog.db"))
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        use crate::db::migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        let pending = Migrator::get_pending_migrations(&*self.connection)
            .await
            .context("Failed to get pending migrations")?
            .len();

        if pending > 0 {
            Migrator::up(&*self.connection, None)
                .await
                .context("Failed to run migrations")?;
            info!("Applied {} database migration(s)", pending);
        }

        Ok(())
    }
}
