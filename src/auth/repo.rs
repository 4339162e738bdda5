//! Storage interfaces for accounts and trusted devices.
//!
//! The orchestrator only sees the `AccountStore`/`DeviceStore` traits. The
//! Postgres implementations back production; the in-memory implementations
//! back tests and single-instance experiments, so the auth flows never
//! depend on the storage's concrete form.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use super::models::{Account, AccountTier, Device, NewAccount};

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Create an account. Fails on duplicate email; callers are expected to
    /// have checked first and to treat a race as a conflict.
    async fn insert(&self, new: NewAccount) -> Result<Account>;

    async fn mark_email_verified(&self, account_id: Uuid) -> Result<()>;

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Existence check for one (account, fingerprint) pairing.
    async fn is_known(&self, account_id: Uuid, fingerprint: &str) -> Result<bool>;

    /// Idempotent upsert: an existing pairing is returned untouched, a new
    /// one is created with all timestamps set.
    async fn register(
        &self,
        account_id: Uuid,
        fingerprint: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Device>;

    /// Refresh `last_used_at` with a single direct update. Last writer wins;
    /// the timestamp is a freshness hint, not a security control.
    async fn touch(&self, account_id: Uuid, fingerprint: &str) -> Result<()>;
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = r"
            SELECT id, email, password_hash, first_name, last_name, active,
                   email_verified, tier::text AS tier, customer_id,
                   billing_customer_id, created_at, updated_at
            FROM accounts
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Account>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by email")
    }

    async fn insert(&self, new: NewAccount) -> Result<Account> {
        let query = r"
            INSERT INTO accounts
                (email, password_hash, first_name, last_name, email_verified, tier, customer_id)
            VALUES ($1, $2, $3, $4, $5, $6::account_tier, $7)
            RETURNING id, email, password_hash, first_name, last_name, active,
                      email_verified, tier::text AS tier, customer_id,
                      billing_customer_id, created_at, updated_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query_as::<_, Account>(query)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(new.email_verified)
            .bind(AccountTier::Free.as_db())
            .bind(&new.customer_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert account")
    }

    async fn mark_email_verified(&self, account_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET email_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark account email verified")?;
        Ok(())
    }

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET password_hash = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }
}

pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn is_known(&self, account_id: Uuid, fingerprint: &str) -> Result<bool> {
        let query = r"
            SELECT 1
            FROM devices
            WHERE account_id = $1
              AND fingerprint = $2
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check device trust")?;
        Ok(row.is_some())
    }

    async fn register(
        &self,
        account_id: Uuid,
        fingerprint: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Device> {
        // Base path is find-existing; the unique (account_id, fingerprint)
        // index makes the insert race-safe.
        let select = r"
            SELECT id, account_id, fingerprint, user_agent, ip_address,
                   created_at, updated_at, last_used_at
            FROM devices
            WHERE account_id = $1
              AND fingerprint = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = select
        );
        let existing = sqlx::query_as::<_, Device>(select)
            .bind(account_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup device")?;
        if let Some(device) = existing {
            return Ok(device);
        }

        let insert = r"
            INSERT INTO devices
                (account_id, fingerprint, user_agent, ip_address,
                 created_at, updated_at, last_used_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW(), NOW())
            ON CONFLICT (account_id, fingerprint) DO NOTHING
            RETURNING id, account_id, fingerprint, user_agent, ip_address,
                      created_at, updated_at, last_used_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert
        );
        let inserted = sqlx::query_as::<_, Device>(insert)
            .bind(account_id)
            .bind(fingerprint)
            .bind(user_agent)
            .bind(ip_address)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to register device")?;
        if let Some(device) = inserted {
            return Ok(device);
        }

        // Lost the insert race; the winning row is the device we want.
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = select
        );
        sqlx::query_as::<_, Device>(select)
            .bind(account_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to re-read device after conflict")?
            .ok_or_else(|| anyhow!("device row vanished after insert conflict"))
    }

    async fn touch(&self, account_id: Uuid, fingerprint: &str) -> Result<()> {
        // Single direct update, never read-modify-write.
        let query = r"
            UPDATE devices
            SET last_used_at = NOW(),
                updated_at = NOW()
            WHERE account_id = $1
              AND fingerprint = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(fingerprint)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch device")?;
        Ok(())
    }
}

/// Map-backed account store for tests and single-instance use.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the active flag; exists so deactivated-account behavior is
    /// reachable without a database.
    pub async fn set_active(&self, account_id: Uuid, active: bool) {
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get_mut(&account_id) {
            account.active = active;
            account.updated_at = Utc::now();
        }
    }

    pub async fn count(&self) -> usize {
        self.accounts.lock().await.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn insert(&self, new: NewAccount) -> Result<Account> {
        let mut accounts = self.accounts.lock().await;
        if accounts.values().any(|account| account.email == new.email) {
            return Err(anyhow!("duplicate email: {}", new.email));
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            active: true,
            email_verified: new.email_verified,
            tier: AccountTier::Free,
            customer_id: new.customer_id,
            billing_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn mark_email_verified(&self, account_id: Uuid) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow!("no such account: {account_id}"))?;
        account.email_verified = true;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow!("no such account: {account_id}"))?;
        account.password_hash = password_hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }
}

/// Map-backed device registry keyed by (account, fingerprint).
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: Mutex<HashMap<(Uuid, String), Device>>,
}

impl MemoryDeviceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.devices.lock().await.len()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn is_known(&self, account_id: Uuid, fingerprint: &str) -> Result<bool> {
        let devices = self.devices.lock().await;
        Ok(devices.contains_key(&(account_id, fingerprint.to_string())))
    }

    async fn register(
        &self,
        account_id: Uuid,
        fingerprint: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Device> {
        let mut devices = self.devices.lock().await;
        let key = (account_id, fingerprint.to_string());
        if let Some(device) = devices.get(&key) {
            return Ok(device.clone());
        }
        let now = Utc::now();
        let device = Device {
            id: Uuid::new_v4(),
            account_id,
            fingerprint: fingerprint.to_string(),
            user_agent: user_agent.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_used_at: now,
        };
        devices.insert(key, device.clone());
        Ok(device)
    }

    async fn touch(&self, account_id: Uuid, fingerprint: &str) -> Result<()> {
        let mut devices = self.devices.lock().await;
        let key = (account_id, fingerprint.to_string());
        if let Some(device) = devices.get_mut(&key) {
            let now = Utc::now();
            device.last_used_at = now;
            device.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
            email_verified: false,
            customer_id: "cus_TEST".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_account_store_enforces_unique_email() -> Result<()> {
        let store = MemoryAccountStore::new();
        store.insert(new_account("alice@example.com")).await?;
        assert!(store.insert(new_account("alice@example.com")).await.is_err());
        assert_eq!(store.count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn memory_account_store_updates_flags() -> Result<()> {
        let store = MemoryAccountStore::new();
        let account = store.insert(new_account("alice@example.com")).await?;
        assert!(!account.email_verified);

        store.mark_email_verified(account.id).await?;
        store.update_password_hash(account.id, "$argon2id$new").await?;
        store.set_active(account.id, false).await;

        let reloaded = store
            .find_by_email("alice@example.com")
            .await?
            .expect("account exists");
        assert!(reloaded.email_verified);
        assert!(!reloaded.active);
        assert_eq!(reloaded.password_hash, "$argon2id$new");
        Ok(())
    }

    #[tokio::test]
    async fn memory_device_register_is_idempotent() -> Result<()> {
        let store = MemoryDeviceStore::new();
        let account_id = Uuid::new_v4();

        let first = store
            .register(account_id, "fp-1", Some("agent"), Some("10.0.0.1"))
            .await?;
        let second = store.register(account_id, "fp-1", None, None).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(second.user_agent.as_deref(), Some("agent"));
        assert_eq!(store.count().await, 1);
        assert!(store.is_known(account_id, "fp-1").await?);
        assert!(!store.is_known(account_id, "fp-2").await?);
        Ok(())
    }

    #[tokio::test]
    async fn memory_device_touch_moves_last_used() -> Result<()> {
        let store = MemoryDeviceStore::new();
        let account_id = Uuid::new_v4();
        let device = store.register(account_id, "fp-1", None, None).await?;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch(account_id, "fp-1").await?;

        let devices = store.devices.lock().await;
        let touched = devices
            .get(&(account_id, "fp-1".to_string()))
            .expect("device exists");
        assert!(touched.last_used_at > device.last_used_at);
        assert_eq!(touched.created_at, device.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn memory_device_touch_on_unknown_pair_is_noop() -> Result<()> {
        let store = MemoryDeviceStore::new();
        store.touch(Uuid::new_v4(), "fp-none").await?;
        assert_eq!(store.count().await, 0);
        Ok(())
    }
}
