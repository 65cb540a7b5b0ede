//! Ciphertext storage (SQLite) with time-based expiry.
//!
//! One row per access code in the `contents` table. A row with a NULL
//! `encrypted_data` is a reservation handed out by the allocator; a row with
//! data is live content. Every read and write filters on `expires_at > now`,
//! so a row past its expiry is invisible whether or not the retention task has
//! deleted it yet. All methods are blocking; call them from `spawn_blocking`.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

use crate::content::code::AccessCode;
use crate::db::DbPool;
use crate::error::ExchangeError;

/// How updates interact with the expiry clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryPolicy {
    /// Expiry stays anchored at first creation; updates never extend it
    #[default]
    Anchored,
    /// Every successful update restarts the full TTL from the update time
    Sliding,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Lifetime of live content
    pub ttl: Duration,
    /// Lifetime of a reserved code that never received content
    pub reservation_ttl: Duration,
    pub expiry_policy: ExpiryPolicy,
    /// Upper bound on generate-and-check rounds per allocation
    pub allocation_attempts: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            reservation_ttl: Duration::hours(24),
            expiry_policy: ExpiryPolicy::Anchored,
            allocation_attempts: 16,
        }
    }
}

/// A live record as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub access_code: AccessCode,
    pub encrypted_data: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a bounded allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Allocated(AccessCode),
    Exhausted,
}

#[derive(Clone)]
pub struct ContentStore {
    db: DbPool,
    settings: StoreSettings,
}

impl ContentStore {
    pub fn new(db: DbPool, settings: StoreSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, ExchangeError> {
        self.db
            .lock()
            .map_err(|e| ExchangeError::Internal(format!("DB lock error: {}", e)))
    }

    /// Reserve a fresh random code that no live record holds.
    pub fn reserve_code(&self, now: DateTime<Utc>) -> Result<Allocation, ExchangeError> {
        self.reserve_code_with(now, AccessCode::generate)
    }

    /// Reserve a code drawn from `generate`, retrying on collision up to
    /// `allocation_attempts` times.
    pub fn reserve_code_with(
        &self,
        now: DateTime<Utc>,
        mut generate: impl FnMut() -> AccessCode,
    ) -> Result<Allocation, ExchangeError> {
        let mut conn = self.lock()?;
        let expires_at = now + self.settings.reservation_ttl;

        for attempt in 1..=self.settings.allocation_attempts {
            let code = generate();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM contents WHERE access_code = ?1 AND expires_at <= ?2",
                params![code.as_str(), now.timestamp_millis()],
            )?;
            let inserted = tx.execute(
                "INSERT INTO contents (access_code, encrypted_data, created_at, expires_at)
                 VALUES (?1, NULL, ?2, ?3)
                 ON CONFLICT(access_code) DO NOTHING",
                params![
                    code.as_str(),
                    now.timestamp_millis(),
                    expires_at.timestamp_millis()
                ],
            )?;
            tx.commit()?;

            if inserted == 1 {
                tracing::debug!("Reserved access code {} on attempt {}", code, attempt);
                return Ok(Allocation::Allocated(code));
            }
            tracing::debug!("Access code collision on attempt {}", attempt);
        }

        tracing::warn!(
            "Access code allocation exhausted after {} attempts",
            self.settings.allocation_attempts
        );
        Ok(Allocation::Exhausted)
    }

    /// Store content under `code`.
    ///
    /// Fills a live reservation for the code if one exists, otherwise inserts
    /// a new row. Fails with `DuplicateCode` when the code already holds live
    /// content. `created_at` is clamped to `now` so a client clock running
    /// ahead cannot stretch the retention window.
    pub fn create(
        &self,
        code: &AccessCode,
        encrypted_data: &str,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<StoredRecord, ExchangeError> {
        let created_at = created_at.min(now);
        let expires_at = created_at + self.settings.ttl;
        if expires_at <= now {
            return Err(ExchangeError::Validation(
                "createdAt is older than the retention window".to_string(),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM contents WHERE access_code = ?1 AND expires_at <= ?2",
            params![code.as_str(), now.timestamp_millis()],
        )?;
        let filled = tx.execute(
            "UPDATE contents SET encrypted_data = ?2, created_at = ?3, expires_at = ?4
             WHERE access_code = ?1 AND encrypted_data IS NULL",
            params![
                code.as_str(),
                encrypted_data,
                created_at.timestamp_millis(),
                expires_at.timestamp_millis()
            ],
        )?;
        let stored = if filled == 1 {
            1
        } else {
            tx.execute(
                "INSERT INTO contents (access_code, encrypted_data, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(access_code) DO NOTHING",
                params![
                    code.as_str(),
                    encrypted_data,
                    created_at.timestamp_millis(),
                    expires_at.timestamp_millis()
                ],
            )?
        };
        if stored == 0 {
            return Err(ExchangeError::DuplicateCode);
        }
        tx.commit()?;

        tracing::debug!(
            "Stored content for {} ({} bytes, reservation filled: {})",
            code,
            encrypted_data.len(),
            filled == 1
        );

        Ok(StoredRecord {
            access_code: code.clone(),
            encrypted_data: encrypted_data.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Fetch live content. Absent, reserved-but-empty and expired codes all
    /// yield `None`.
    pub fn get(
        &self,
        code: &AccessCode,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredRecord>, ExchangeError> {
        let conn = self.lock()?;
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT encrypted_data, created_at, expires_at FROM contents
                 WHERE access_code = ?1 AND encrypted_data IS NOT NULL AND expires_at > ?2",
                params![code.as_str(), now.timestamp_millis()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((encrypted_data, created_at, expires_at)) => Ok(Some(StoredRecord {
                access_code: code.clone(),
                encrypted_data,
                created_at: from_millis(created_at)?,
                expires_at: from_millis(expires_at)?,
            })),
            None => Ok(None),
        }
    }

    /// Replace the ciphertext of live content in place. `created_at` never
    /// changes; `expires_at` moves only under `ExpiryPolicy::Sliding`.
    pub fn update(
        &self,
        code: &AccessCode,
        encrypted_data: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        let conn = self.lock()?;
        let now_ms = now.timestamp_millis();
        let updated = match self.settings.expiry_policy {
            ExpiryPolicy::Anchored => conn.execute(
                "UPDATE contents SET encrypted_data = ?2, updated_at = ?3
                 WHERE access_code = ?1 AND encrypted_data IS NOT NULL AND expires_at > ?3",
                params![code.as_str(), encrypted_data, now_ms],
            )?,
            ExpiryPolicy::Sliding => conn.execute(
                "UPDATE contents SET encrypted_data = ?2, updated_at = ?3, expires_at = ?4
                 WHERE access_code = ?1 AND encrypted_data IS NOT NULL AND expires_at > ?3",
                params![
                    code.as_str(),
                    encrypted_data,
                    now_ms,
                    (now + self.settings.ttl).timestamp_millis()
                ],
            )?,
        };

        if updated == 0 {
            return Err(ExchangeError::NotFoundOrExpired);
        }
        tracing::debug!("Updated content for {} ({} bytes)", code, encrypted_data.len());
        Ok(())
    }

    /// Delete every row whose expiry has passed, reservations included.
    ///
    /// Returns the number of rows purged.
    pub fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, ExchangeError> {
        let conn = self.lock()?;
        let purged = conn.execute(
            "DELETE FROM contents WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(purged)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, ExchangeError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ExchangeError::Internal(format!("Invalid stored timestamp {}", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn code(raw: &str) -> AccessCode {
        AccessCode::parse(raw).unwrap()
    }

    fn test_store(settings: StoreSettings) -> (ContentStore, tempfile::TempDir) {
        let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = crate::db::init_db(tmp_dir.path().to_str().unwrap()).expect("Failed to init DB");
        (ContentStore::new(db, settings), tmp_dir)
    }

    #[test]
    fn test_create_then_get() {
        let (store, _dir) = test_store(StoreSettings::default());
        store.create(&code("A1b2"), "cipher-1", t0(), t0()).unwrap();

        let record = store.get(&code("A1b2"), t0()).unwrap().unwrap();
        assert_eq!(record.encrypted_data, "cipher-1");
        assert_eq!(record.created_at, t0());
        assert_eq!(record.expires_at, t0() + Duration::hours(24));
    }

    #[test]
    fn test_unknown_code_is_none() {
        let (store, _dir) = test_store(StoreSettings::default());
        assert!(store.get(&code("nope"), t0()).unwrap().is_none());
    }

    #[test]
    fn test_ttl_boundary_and_anchored_update() {
        let (store, _dir) = test_store(StoreSettings::default());
        let c = code("A1b2");
        store.create(&c, "v1", t0(), t0()).unwrap();

        store
            .update(&c, "v2", t0() + Duration::hours(12))
            .unwrap();

        let before = store
            .get(&c, t0() + Duration::hours(23) + Duration::minutes(59))
            .unwrap()
            .expect("record should still be live");
        assert_eq!(before.encrypted_data, "v2");
        assert_eq!(before.created_at, t0());
        assert_eq!(before.expires_at, t0() + Duration::hours(24));

        let after = t0() + Duration::hours(24) + Duration::minutes(1);
        assert!(store.get(&c, after).unwrap().is_none());
        assert_eq!(
            store.update(&c, "v3", after),
            Err(ExchangeError::NotFoundOrExpired)
        );
    }

    #[test]
    fn test_sliding_policy_extends_expiry() {
        let (store, _dir) = test_store(StoreSettings {
            expiry_policy: ExpiryPolicy::Sliding,
            ..StoreSettings::default()
        });
        let c = code("S1de");
        store.create(&c, "v1", t0(), t0()).unwrap();
        store.update(&c, "v2", t0() + Duration::hours(12)).unwrap();

        let record = store
            .get(&c, t0() + Duration::hours(24) + Duration::minutes(1))
            .unwrap()
            .expect("sliding update should extend the window");
        assert_eq!(record.created_at, t0());
        assert_eq!(record.expires_at, t0() + Duration::hours(36));
    }

    #[test]
    fn test_duplicate_live_code_rejected() {
        let (store, _dir) = test_store(StoreSettings::default());
        let c = code("Dup1");
        store.create(&c, "first", t0(), t0()).unwrap();
        assert_eq!(
            store.create(&c, "second", t0(), t0() + Duration::minutes(5)),
            Err(ExchangeError::DuplicateCode)
        );
        // The original content is untouched
        let record = store.get(&c, t0() + Duration::minutes(5)).unwrap().unwrap();
        assert_eq!(record.encrypted_data, "first");
    }

    #[test]
    fn test_expired_code_can_be_reused() {
        let (store, _dir) = test_store(StoreSettings::default());
        let c = code("Re05");
        store.create(&c, "old", t0(), t0()).unwrap();

        let later = t0() + Duration::hours(25);
        store.create(&c, "new", later, later).unwrap();
        let record = store.get(&c, later).unwrap().unwrap();
        assert_eq!(record.encrypted_data, "new");
        assert_eq!(record.created_at, later);
    }

    #[test]
    fn test_future_created_at_is_clamped() {
        let (store, _dir) = test_store(StoreSettings::default());
        let record = store
            .create(&code("Fut1"), "x", t0() + Duration::days(30), t0())
            .unwrap();
        assert_eq!(record.created_at, t0());
        assert_eq!(record.expires_at, t0() + Duration::hours(24));
    }

    #[test]
    fn test_stale_created_at_rejected() {
        let (store, _dir) = test_store(StoreSettings::default());
        let result = store.create(&code("Old1"), "x", t0() - Duration::hours(25), t0());
        assert!(matches!(result, Err(ExchangeError::Validation(_))));
    }

    #[test]
    fn test_reservation_is_invisible_until_filled() {
        let (store, _dir) = test_store(StoreSettings::default());
        let c = match store.reserve_code(t0()).unwrap() {
            Allocation::Allocated(c) => c,
            Allocation::Exhausted => panic!("empty store cannot be exhausted"),
        };

        assert!(store.get(&c, t0()).unwrap().is_none());
        assert_eq!(
            store.update(&c, "early", t0()),
            Err(ExchangeError::NotFoundOrExpired)
        );

        store.create(&c, "filled", t0(), t0()).unwrap();
        assert_eq!(store.get(&c, t0()).unwrap().unwrap().encrypted_data, "filled");
    }

    #[test]
    fn test_allocation_retries_then_exhausts() {
        let (store, _dir) = test_store(StoreSettings {
            allocation_attempts: 3,
            ..StoreSettings::default()
        });
        store.create(&code("Busy"), "live", t0(), t0()).unwrap();

        let mut calls = 0;
        let result = store
            .reserve_code_with(t0(), || {
                calls += 1;
                code("Busy")
            })
            .unwrap();
        assert_eq!(result, Allocation::Exhausted);
        assert_eq!(calls, 3);

        // A collision followed by a free code succeeds on the second round
        let mut candidates = vec![code("Free"), code("Busy")];
        let result = store
            .reserve_code_with(t0(), || candidates.pop().unwrap())
            .unwrap();
        assert_eq!(result, Allocation::Allocated(code("Free")));
    }

    #[test]
    fn test_reservation_blocks_reallocation_until_it_expires() {
        let (store, _dir) = test_store(StoreSettings {
            reservation_ttl: Duration::hours(1),
            allocation_attempts: 1,
            ..StoreSettings::default()
        });
        let same = || code("Same");

        assert_eq!(
            store.reserve_code_with(t0(), same).unwrap(),
            Allocation::Allocated(code("Same"))
        );
        assert_eq!(
            store
                .reserve_code_with(t0() + Duration::minutes(30), same)
                .unwrap(),
            Allocation::Exhausted
        );
        assert_eq!(
            store
                .reserve_code_with(t0() + Duration::minutes(61), same)
                .unwrap(),
            Allocation::Allocated(code("Same"))
        );
    }

    #[test]
    fn test_delete_expired_only_purges_past_rows() {
        let (store, _dir) = test_store(StoreSettings::default());
        store.create(&code("Gone"), "a", t0(), t0()).unwrap();
        let fresh = t0() + Duration::hours(20);
        store.create(&code("Stay"), "b", fresh, fresh).unwrap();

        let purge_at = t0() + Duration::hours(24) + Duration::minutes(1);
        assert_eq!(store.delete_expired(purge_at).unwrap(), 1);
        assert!(store.get(&code("Stay"), purge_at).unwrap().is_some());
        assert_eq!(
            store.update(&code("Gone"), "resurrect", purge_at),
            Err(ExchangeError::NotFoundOrExpired)
        );
        assert_eq!(store.delete_expired(purge_at).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_creates_exactly_one_wins() {
        let (store, _dir) = test_store(StoreSettings::default());
        let store = Arc::new(store);
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.create(&code("Race"), &format!("writer-{}", i), t0(), t0())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let dups = results
            .iter()
            .filter(|r| matches!(r, Err(ExchangeError::DuplicateCode)))
            .count();
        assert_eq!((wins, dups), (1, 1));
    }
}
