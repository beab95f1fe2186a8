mod abuse;
mod audit;
mod chain;
mod channel;
mod delivery;
mod identity;
mod message;
mod user;

pub use channel::is_consent_current;
pub use delivery::DeliveryJobStats;
pub use message::{ContactHistoryRow, InboxEntry, SendOutcome};
pub use user::insufficient_balance;

use std::sync::Once;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::config::{PersistenceMode, StoreConfig};
use crate::error::{DbError, DbResult};
use crate::file_backend::FileStore;

static INSTALL_DRIVERS: Once = Once::new();

fn ensure_any_drivers_installed() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// The persistence mode actually running behind a [`Store`]. Never branched
/// on outside this crate — components call `Store` methods, not `Backend`.
pub enum Backend {
    Sql(AnyPool),
    File(FileStore),
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub mode: PersistenceMode,
    pub healthy: bool,
    pub detail: String,
}

pub struct Store {
    pub(crate) backend: Backend,
    pub(crate) mode: PersistenceMode,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> DbResult<Self> {
        match config.mode {
            PersistenceMode::Strict => {
                info!(url = %config.database_url_masked(), "connecting to Postgres (strict mode)");
                ensure_any_drivers_installed();
                let pool = AnyPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
                    .connect(&config.database_url)
                    .await
                    .map_err(|e| DbError::Connection(format!("postgres: {e}")))?;
                Ok(Self {
                    backend: Backend::Sql(pool),
                    mode: PersistenceMode::Strict,
                })
            }
            PersistenceMode::Embedded => {
                info!(path = %config.sqlite_path, "opening embedded SQLite store");
                ensure_any_drivers_installed();
                let url = format!("sqlite://{}?mode=rwc", config.sqlite_path);
                let attempt = AnyPoolOptions::new()
                    .max_connections(config.max_connections.min(8))
                    .connect(&url)
                    .await;
                match attempt {
                    Ok(pool) => Ok(Self {
                        backend: Backend::Sql(pool),
                        mode: PersistenceMode::Embedded,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            path = %config.sqlite_path,
                            error = %e,
                            "embedded SQLite store unavailable, degrading to file-backed store"
                        );
                        let file_store = FileStore::open(config.file_root.clone()).await?;
                        Ok(Self {
                            backend: Backend::File(file_store),
                            mode: PersistenceMode::File,
                        })
                    }
                }
            }
            PersistenceMode::File => {
                info!(root = %config.file_root, "opening file-backed store");
                let file_store = FileStore::open(config.file_root.clone()).await?;
                Ok(Self {
                    backend: Backend::File(file_store),
                    mode: PersistenceMode::File,
                })
            }
        }
    }

    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }

    /// Runs the SQL migrations against Strict/Embedded backends. A no-op in
    /// file mode (nothing to migrate — the JSON layout is the schema).
    pub async fn migrate(&self) -> DbResult<()> {
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::migrate!("./migrations")
                    .run(pool)
                    .await
                    .map_err(|e| DbError::Migration(e.to_string()))?;
                Ok(())
            }
            Backend::File(_) => Ok(()),
        }
    }

    pub async fn health_check(&self) -> HealthStatus {
        match &self.backend {
            Backend::Sql(pool) => {
                let ok = sqlx::query("SELECT 1").fetch_one(pool).await.is_ok();
                HealthStatus {
                    mode: self.mode,
                    healthy: ok,
                    detail: if ok { "ok".into() } else { "ping failed".into() },
                }
            }
            Backend::File(_) => HealthStatus {
                mode: self.mode,
                healthy: true,
                detail: "file-backed, no liveness probe needed".into(),
            },
        }
    }

    pub(crate) fn sql(&self) -> DbResult<&AnyPool> {
        match &self.backend {
            Backend::Sql(pool) => Ok(pool),
            Backend::File(_) => Err(DbError::InvalidInput(
                "operation requires a SQL-backed store".into(),
            )),
        }
    }

    pub(crate) fn file(&self) -> DbResult<&FileStore> {
        match &self.backend {
            Backend::File(fs) => Ok(fs),
            Backend::Sql(_) => Err(DbError::InvalidInput(
                "operation requires a file-backed store".into(),
            )),
        }
    }
}
