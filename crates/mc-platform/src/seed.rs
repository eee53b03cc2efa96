//! Initial superuser seeding
//!
//! Creates the primary administrator and the automation service account on
//! first startup. Registered as a migration so the ledger keeps it run-once.

use async_trait::async_trait;
use mc_config::SeedConfig;
use tracing::info;

use crate::error::Result;
use crate::migrations::Migration;
use crate::store::RecordStore;

pub const INITIAL_SUPERUSERS_MIGRATION: &str = "1748353396_initial_superusers";

pub struct InitialSuperusersMigration {
    seed: SeedConfig,
}

impl InitialSuperusersMigration {
    pub fn new(seed: SeedConfig) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl Migration for InitialSuperusersMigration {
    fn id(&self) -> &str {
        INITIAL_SUPERUSERS_MIGRATION
    }

    async fn up(&self, store: &dyn RecordStore) -> Result<()> {
        // Check both before creating either.
        let accounts = [
            ("admin", self.seed.admin.require("admin")?),
            ("service account", self.seed.service_account.require("service account")?),
        ];

        for (label, (email, password)) in accounts {
            if store.find_superuser_by_email(email).await?.is_some() {
                info!(account = label, email, "Superuser already exists, skipping");
                continue;
            }
            let user = store.create_superuser(email, password).await?;
            info!(account = label, email = %user.email, id = %user.id, "Created superuser");
        }

        Ok(())
    }

    // Seeded accounts are never removed.
    async fn down(&self, _store: &dyn RecordStore) -> Result<()> {
        Ok(())
    }
}
