//! Narrow interface to the record store.
//!
//! The server only needs to create and look up a handful of record kinds, and
//! to know which migrations have already run. Anything richer belongs to the
//! storage backend.

use async_trait::async_trait;
use mc_common::{JobRequest, NewJobRequest, RecordId, Superuser};

use crate::error::{PlatformError, Result};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a privileged account. Fails with `Duplicate` if the email is taken.
    async fn create_superuser(&self, email: &str, password: &str) -> Result<Superuser>;

    async fn find_superuser_by_email(&self, email: &str) -> Result<Option<Superuser>>;

    async fn count_superusers(&self) -> Result<u64>;

    /// Validate and persist a job request. The returned record is committed.
    async fn create_job_request(&self, new: NewJobRequest) -> Result<JobRequest>;

    async fn get_job_request(&self, id: &RecordId) -> Result<Option<JobRequest>>;
}

/// Record of which migrations have been applied to this store.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    async fn is_applied(&self, id: &str) -> Result<bool>;

    async fn mark_applied(&self, id: &str) -> Result<()>;

    /// Applied migration ids in application order
    async fn applied(&self) -> Result<Vec<String>>;
}

/// Trimmed, lowercased email; rejects values without an `@`.
pub(crate) fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(PlatformError::validation(format!("invalid email address: {:?}", email))),
    }
}

pub(crate) fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(PlatformError::validation("password must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Example.COM ").unwrap(), "admin@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("admin@").is_err());
        assert!(normalize_email("").is_err());
    }

    #[test]
    fn test_require_password() {
        assert!(require_password("secret").is_ok());
        assert!(matches!(
            require_password(""),
            Err(PlatformError::Validation { .. })
        ));
    }
}
