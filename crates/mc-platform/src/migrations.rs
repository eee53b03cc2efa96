//! Run-once migrations gated by the store's ledger

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{PlatformError, Result};
use crate::store::{MigrationLedger, RecordStore};

#[async_trait]
pub trait Migration: Send + Sync {
    /// Stable identifier recorded in the ledger
    fn id(&self) -> &str;

    async fn up(&self, store: &dyn RecordStore) -> Result<()>;

    async fn down(&self, _store: &dyn RecordStore) -> Result<()> {
        Ok(())
    }
}

/// Applies registered migrations in registration order, skipping any the
/// ledger already lists. A migration is recorded only after `up` succeeds.
#[derive(Default)]
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Returns the ids applied by this call
    pub async fn apply_pending(
        &self,
        store: &dyn RecordStore,
        ledger: &dyn MigrationLedger,
    ) -> Result<Vec<String>> {
        let mut applied = Vec::new();

        for migration in &self.migrations {
            let id = migration.id();
            if ledger.is_applied(id).await? {
                debug!(migration = id, "Migration already applied, skipping");
                continue;
            }

            info!(migration = id, "Applying migration");
            if let Err(e) = migration.up(store).await {
                error!(migration = id, error = %e, "Migration failed");
                return Err(PlatformError::Migration {
                    id: id.to_string(),
                    source: Box::new(e),
                });
            }

            ledger.mark_applied(id).await?;
            applied.push(id.to_string());
        }

        if applied.is_empty() {
            debug!("No pending migrations");
        } else {
            info!("Applied {} migration(s)", applied.len());
        }
        Ok(applied)
    }
}
