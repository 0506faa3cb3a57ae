use crate::constants::tokens::{EXPIRY_FORMAT, LOCK_STALE_AFTER_SECS};
use crate::errors::ClientError;
use crate::utils::fs_atomic::atomic_write_json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKey {
    Organization,
    Tenant(String),
}

impl CredentialKey {
    pub fn file_name(&self) -> String {
        match self {
            CredentialKey::Organization => "token.json".to_string(),
            CredentialKey::Tenant(id) => format!("tenant_token_{}.json", id),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CredentialKey::Organization => "organization token".to_string(),
            CredentialKey::Tenant(id) => format!("tenant token for '{}'", id),
        }
    }
}

/// On-disk credential shape. `expiresAt` carries the remote service's own
/// `YYYY-MM-DD HH:MM:SS` UTC formatting; an unparseable value counts as
/// expired rather than trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub token: String,
    pub expires_at: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_since: Option<String>,
}

impl CredentialRecord {
    pub fn active(token: impl Into<String>, expires_at: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: expires_at.into(),
            locked: false,
            locked_since: None,
        }
    }

    pub fn locked_placeholder(now: NaiveDateTime) -> Self {
        Self {
            token: String::new(),
            expires_at: String::new(),
            locked: true,
            locked_since: Some(now.format(EXPIRY_FORMAT).to_string()),
        }
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        match NaiveDateTime::parse_from_str(&self.expires_at, EXPIRY_FORMAT) {
            Ok(expires_at) => now > expires_at,
            Err(_) => true,
        }
    }

    /// A lock older than the staleness threshold belongs to a refresh that
    /// never finished; treating it as live would wedge every later run.
    /// A lock we cannot date gets the same treatment.
    pub fn lock_is_stale(&self, now: NaiveDateTime) -> bool {
        if !self.locked {
            return false;
        }
        match self
            .locked_since
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, EXPIRY_FORMAT).ok())
        {
            Some(since) => (now - since).num_seconds() > LOCK_STALE_AFTER_SECS,
            None => true,
        }
    }

    pub fn is_usable(&self, now: NaiveDateTime) -> bool {
        !self.locked && !self.is_expired(now)
    }
}

/// One JSON file per credential key under the credentials directory. Reads
/// are tolerant (missing or corrupt files read as absent, which forces a
/// refresh); writes are atomic and permission-restricted.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &CredentialKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn read(&self, key: &CredentialKey) -> Option<CredentialRecord> {
        let raw = std::fs::read_to_string(self.path_for(key)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn write(&self, key: &CredentialKey, record: &CredentialRecord) -> Result<(), ClientError> {
        let value = serde_json::to_value(record).map_err(|err| {
            ClientError::internal(format!("Cannot serialize credential record: {}", err))
        })?;
        atomic_write_json(self.path_for(key), &value, 0o600).map_err(|err| {
            ClientError::internal(format!(
                "Cannot persist {}: {}",
                key.describe(),
                err
            ))
        })
    }

    /// Mark the key as mid-refresh and hand back a lease. The caller must
    /// either `complete` the lease with the fresh record or let it drop, in
    /// which case the placeholder is rolled back so other runs are not left
    /// waiting on a refresh that never happened.
    pub fn acquire(
        &self,
        key: &CredentialKey,
        now: NaiveDateTime,
    ) -> Result<RefreshLease<'_>, ClientError> {
        self.write(key, &CredentialRecord::locked_placeholder(now))?;
        Ok(RefreshLease {
            store: self,
            key: key.clone(),
            done: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

pub struct RefreshLease<'a> {
    store: &'a CredentialStore,
    key: CredentialKey,
    done: bool,
}

impl RefreshLease<'_> {
    pub fn complete(mut self, record: &CredentialRecord) -> Result<(), ClientError> {
        self.store.write(&self.key, record)?;
        self.done = true;
        Ok(())
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(record) = self.store.read(&self.key) {
            if record.locked {
                let _ = std::fs::remove_file(self.store.path_for(&self.key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .expect("valid date")
            .and_hms_opt(h, m, s)
            .expect("valid time")
    }

    #[test]
    fn expiry_is_a_strict_cutoff() {
        let record = CredentialRecord::active("tok", "2024-05-10 12:00:00");
        assert!(!record.is_expired(at(12, 0, 0)));
        assert!(record.is_expired(at(12, 0, 1)));
    }

    #[test]
    fn unparseable_expiry_counts_as_expired() {
        let record = CredentialRecord::active("tok", "soon");
        assert!(record.is_expired(at(0, 0, 0)));
    }

    #[test]
    fn lock_staleness_window() {
        let mut record = CredentialRecord::locked_placeholder(at(12, 0, 0));
        assert!(!record.lock_is_stale(at(12, 0, 30)));
        assert!(record.lock_is_stale(at(12, 1, 1)));
        record.locked_since = None;
        assert!(record.lock_is_stale(at(12, 0, 0)));
    }

    #[test]
    fn tenant_keys_get_their_own_files() {
        assert_eq!(CredentialKey::Organization.file_name(), "token.json");
        assert_eq!(
            CredentialKey::Tenant("t-9".to_string()).file_name(),
            "tenant_token_t-9.json"
        );
    }
}
