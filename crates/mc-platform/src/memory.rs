//! In-memory record store for tests and embedding

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use mc_common::{JobRequest, NewJobRequest, RecordId, Superuser, Superusers, Collection};

use crate::error::{PlatformError, Result};
use crate::password::hash_password;
use crate::store::{normalize_email, require_password, MigrationLedger, RecordStore};

#[derive(Default)]
struct Inner {
    superusers: Vec<Superuser>,
    job_requests: HashMap<RecordId, JobRequest>,
    migrations: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_request_count(&self) -> usize {
        self.inner.lock().job_requests.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_superuser(&self, email: &str, password: &str) -> Result<Superuser> {
        let email = normalize_email(email)?;
        require_password(password)?;
        let password_hash = hash_password(password)?;

        let mut inner = self.inner.lock();
        if inner.superusers.iter().any(|u| u.email == email) {
            return Err(PlatformError::duplicate(Superusers::NAME, "email", email));
        }

        let user = Superuser {
            id: RecordId::generate(),
            email,
            password_hash,
            created: Utc::now(),
        };
        inner.superusers.push(user.clone());
        Ok(user)
    }

    async fn find_superuser_by_email(&self, email: &str) -> Result<Option<Superuser>> {
        let email = email.trim().to_lowercase();
        let inner = self.inner.lock();
        Ok(inner.superusers.iter().find(|u| u.email == email).cloned())
    }

    async fn count_superusers(&self) -> Result<u64> {
        Ok(self.inner.lock().superusers.len() as u64)
    }

    async fn create_job_request(&self, new: NewJobRequest) -> Result<JobRequest> {
        new.validate()?;
        let record = new.into_record(RecordId::generate(), Utc::now());
        self.inner
            .lock()
            .job_requests
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_job_request(&self, id: &RecordId) -> Result<Option<JobRequest>> {
        Ok(self.inner.lock().job_requests.get(id).cloned())
    }
}

#[async_trait]
impl MigrationLedger for InMemoryStore {
    async fn is_applied(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().migrations.iter().any(|m| m == id))
    }

    async fn mark_applied(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.migrations.iter().any(|m| m == id) {
            inner.migrations.push(id.to_string());
        }
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().migrations.clone())
    }
}
