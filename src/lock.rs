//! Optimistic per-record locking.
//!
//! A lock is an edge-shaped record from the holder's identity to the target
//! record, scoped to a security session and bounded by a TTL. Acquisition
//! is one conditional upsert statement: a pre-query inside the statement
//! decides whether a live foreign lock exists, and if so the upsert selects
//! no row, so the call observes "no lock obtained". Two concurrent
//! acquirers therefore race at the database, not in this layer; exactly one
//! observes a returned row.
//!
//! Contention is not an error: `lock` returns `Ok(None)` and the caller
//! retries or abandons.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::db::transport::{AqlQuery, Transport};
use crate::db::Config;
use crate::error::{BasaltError, Result};
use crate::exec::Identity;
use crate::model::{Document, LockRecord};
use crate::registry::Registry;
use crate::types::{RecordId, SessionId};

/// Acquires, renews, and releases record locks for one (identity, session)
/// pair.
pub struct LockManager<T: Transport> {
    transport: Arc<T>,
    registry: Arc<Registry>,
    identity: Identity,
    session: SessionId,
    ttl: Duration,
    grace: Duration,
    // Advisory locked-by-me hints, keyed by target id, holding the expiry
    // last observed from the database. Entries become stale at expiry plus
    // grace; the database remains the source of truth for every
    // acquisition decision.
    cache: Mutex<LruCache<RecordId, OffsetDateTime>>,
}

impl<T: Transport> LockManager<T> {
    /// Manager for one caller identity and session.
    pub fn new(
        transport: Arc<T>,
        registry: Arc<Registry>,
        identity: Identity,
        session: SessionId,
        config: &Config,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.lock_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            transport,
            registry,
            identity,
            session,
            ttl: config.lock_ttl(),
            grace: config.lock_cache_grace(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The session this manager acquires under.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The identity this manager acquires as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Attempts to acquire or renew the lock on `target`.
    ///
    /// `Ok(None)` means a live lock is held by a foreign (identity,
    /// session). Renewal by this manager's own pair is idempotent and only
    /// advances the expiry.
    pub fn lock(&self, target: &RecordId) -> Result<Option<LockRecord>> {
        let now = OffsetDateTime::now_utc();
        let expires = now + self.ttl;
        let query = self.acquire_statement(target, now, expires);
        let rows = self.transport.run(&query)?;
        let Some(row) = rows.into_iter().next() else {
            debug!(record = %target, "lock held elsewhere");
            return Ok(None);
        };
        let record = LockRecord::from_document(&Document::from_value(row)?)?;
        self.cache.lock().put(target.clone(), record.expires);
        Ok(Some(record))
    }

    /// Soft-deletes this manager's own lock on `target`.
    ///
    /// Scoped to the caller's identity and session; another session's lock
    /// cannot be released from here. A stale or missing lock surfaces as
    /// [`BasaltError::NotFound`].
    pub fn unlock(&self, target: &RecordId) -> Result<()> {
        self.cache.lock().pop(target);
        let query = self.release_statement(target);
        let rows = self.transport.run(&query)?;
        if rows.is_empty() {
            return Err(BasaltError::NotFound("lock"));
        }
        Ok(())
    }

    /// Advisory hint: whether this manager believes it still holds
    /// `target`. Never a substitute for the database-level check.
    pub fn is_locked_by_me(&self, target: &RecordId) -> bool {
        let now = OffsetDateTime::now_utc();
        match self.cache.lock().get(target) {
            Some(expires) => *expires + self.grace > now,
            None => false,
        }
    }

    fn acquire_statement(
        &self,
        target: &RecordId,
        now: OffsetDateTime,
        expires: OffsetDateTime,
    ) -> AqlQuery {
        let locks = self.registry.lock_collection();
        let model = LockRecord::MODEL_TYPE;
        let text = format!(
            "LET live = (
  FOR l IN {locks}
    FILTER l._to == @target
    FILTER l.ModelType == '{model}'
    FILTER l.IsDeleted != true
    FILTER l.Expires > @now
    RETURN l
)
LET foreign = (
  FOR l IN live
    FILTER l._from != @holder || l.SecuritySessionId != @session
    RETURN l
)
FOR x IN LENGTH(foreign) == 0 ? [true] : []
  UPSERT {{ _to: @target, ModelType: '{model}', IsDeleted: false }}
    INSERT {{ _from: @holder, _to: @target, ModelType: '{model}', SecuritySessionId: @session, Expires: @expires, IsDeleted: false }}
    UPDATE {{ _from: @holder, SecuritySessionId: @session, Expires: @expires }}
    IN {locks}
  RETURN NEW"
        );
        AqlQuery::text(text)
            .bind("target", json!(target.0))
            .bind("holder", json!(self.identity.id.0))
            .bind("session", json!(self.session.0))
            .bind("now", json!(epoch_millis(now)))
            .bind("expires", json!(epoch_millis(expires)))
    }

    fn release_statement(&self, target: &RecordId) -> AqlQuery {
        let locks = self.registry.lock_collection();
        let model = LockRecord::MODEL_TYPE;
        let text = format!(
            "FOR l IN {locks}
  FILTER l._to == @target
  FILTER l.ModelType == '{model}'
  FILTER l._from == @holder
  FILTER l.SecuritySessionId == @session
  FILTER l.IsDeleted != true
  UPDATE l WITH {{ IsDeleted: true }} IN {locks}
  RETURN OLD"
        );
        AqlQuery::text(text)
            .bind("target", json!(target.0))
            .bind("holder", json!(self.identity.id.0))
            .bind("session", json!(self.session.0))
    }
}

fn epoch_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}
