//! Persistence interface
//!
//! One async trait per logical collection. The engine only ever talks to
//! storage through these; the in-memory backend serves development and tests,
//! the PostgreSQL backend serves production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::compliance::types::{
    AccessLogEntry, BillRecord, CommunicationLogEntry, ConsentRecord, DataCategory,
    ProcessingPurpose, SubjectRecord,
};
use crate::crypto::HashedIdentifier;
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::{Collection, InMemoryStore};
pub use postgres::PostgresStore;

/// Consent ledger storage
#[async_trait]
pub trait ConsentRepository: Send + Sync {
    /// Insert every record or none of them
    async fn insert_batch(&self, records: &[ConsentRecord]) -> Result<()>;

    /// Records for the tuple that are given and not withdrawn
    async fn find_active(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
    ) -> Result<Vec<ConsentRecord>>;

    /// Stamp `withdrawn_at` on every active record for the tuple.
    /// Returns the number of records stamped.
    async fn mark_withdrawn(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Full history for a subject, oldest first
    async fn history(&self, subject_id: &str) -> Result<Vec<ConsentRecord>>;
}

/// Append-only access log storage
#[async_trait]
pub trait AccessLogRepository: Send + Sync {
    async fn append(&self, entry: &AccessLogEntry) -> Result<()>;

    /// Most recent first, at most `limit` entries
    async fn recent_for_subject(&self, subject_id: &str, limit: usize)
        -> Result<Vec<AccessLogEntry>>;
}

/// Hashed communication metadata storage
#[async_trait]
pub trait CommunicationLogRepository: Send + Sync {
    async fn insert(&self, entry: &CommunicationLogEntry) -> Result<()>;

    /// Delete entries whose expiry is strictly before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    /// Any entry sent from or to `party` created at or after `since`
    async fn has_entries_for_hash_since(
        &self,
        party: &HashedIdentifier,
        since: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Externally owned User collection
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn find(&self, subject_id: &str) -> Result<Option<SubjectRecord>>;

    async fn upsert(&self, subject: &SubjectRecord) -> Result<()>;

    /// Remove the subject together with its consents, bills and messages.
    /// The access log is never touched. Returns false if nothing existed.
    async fn delete_with_dependents(&self, subject_id: &str) -> Result<bool>;
}

/// Externally owned Bill collection, read-only to the engine
#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Any bill in pending or overdue state
    async fn has_outstanding(&self, subject_id: &str) -> Result<bool>;

    async fn bills_for_subject(&self, subject_id: &str) -> Result<Vec<BillRecord>>;
}

/// Externally owned Message collection, read-only to the engine
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Any message for the subject created at or after `since`
    async fn has_messages_since(&self, subject_id: &str, since: DateTime<Utc>) -> Result<bool>;
}

/// Everything the engine needs from a single backend
pub trait ComplianceStore:
    ConsentRepository
    + AccessLogRepository
    + CommunicationLogRepository
    + SubjectRepository
    + BillingRepository
    + MessageRepository
    + 'static
{
}

impl<T> ComplianceStore for T where
    T: ConsentRepository
        + AccessLogRepository
        + CommunicationLogRepository
        + SubjectRepository
        + BillingRepository
        + MessageRepository
        + 'static
{
}
