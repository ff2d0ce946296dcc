use super::{
    AccessLogRepository, BillingRepository, CommunicationLogRepository, ConsentRepository,
    MessageRepository, SubjectRepository,
};
use crate::compliance::types::{
    AccessLogEntry, BillRecord, CommunicationLogEntry, ConsentRecord, DataCategory,
    MessageRecord, ProcessingPurpose, SubjectRecord,
};
use crate::crypto::HashedIdentifier;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Logical collection, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Consents,
    AccessLog,
    CommunicationLog,
    Subjects,
    Bills,
    Messages,
}

/// In-memory store
///
/// HashMap/Vec backed implementation of every repository trait.
/// Use for development and tests only.
///
/// # Limitations
/// - Data is lost on restart
/// - Single instance only
/// - Do not use in production
#[derive(Clone, Default)]
pub struct InMemoryStore {
    subjects: Arc<RwLock<HashMap<String, SubjectRecord>>>,
    consents: Arc<RwLock<Vec<ConsentRecord>>>,
    access_log: Arc<RwLock<Vec<AccessLogEntry>>>,
    communications: Arc<RwLock<Vec<CommunicationLogEntry>>>,
    bills: Arc<RwLock<Vec<BillRecord>>>,
    messages: Arc<RwLock<Vec<MessageRecord>>>,
    failing: Arc<std::sync::RwLock<HashSet<Collection>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail with a persistence error
    pub fn set_failing(&self, collection: Collection, failing: bool) {
        if let Ok(mut set) = self.failing.write() {
            if failing {
                set.insert(collection);
            } else {
                set.remove(&collection);
            }
        }
    }

    fn check(&self, collection: Collection) -> Result<()> {
        let failing = self
            .failing
            .read()
            .map(|set| set.contains(&collection))
            .unwrap_or(false);

        if failing {
            Err(Error::Persistence(format!(
                "{:?} collection unavailable",
                collection
            )))
        } else {
            Ok(())
        }
    }

    /// Seed a bill owned by an external system
    pub async fn insert_bill(&self, bill: BillRecord) {
        self.bills.write().await.push(bill);
    }

    /// Change the status of every bill of a subject
    pub async fn settle_bills(&self, subject_id: &str) {
        let mut bills = self.bills.write().await;
        for bill in bills.iter_mut().filter(|b| b.subject_id == subject_id) {
            bill.status = crate::compliance::types::BillStatus::Paid;
        }
    }

    /// Seed a message owned by an external system
    pub async fn insert_message(&self, message: MessageRecord) {
        self.messages.write().await.push(message);
    }

    pub async fn access_log_len(&self) -> usize {
        self.access_log.read().await.len()
    }

    pub async fn communication_entries(&self) -> Vec<CommunicationLogEntry> {
        self.communications.read().await.clone()
    }
}

#[async_trait]
impl ConsentRepository for InMemoryStore {
    async fn insert_batch(&self, records: &[ConsentRecord]) -> Result<()> {
        self.check(Collection::Consents)?;

        // Single write lock: readers see all records or none
        let mut consents = self.consents.write().await;
        consents.extend_from_slice(records);
        Ok(())
    }

    async fn find_active(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
    ) -> Result<Vec<ConsentRecord>> {
        self.check(Collection::Consents)?;

        let consents = self.consents.read().await;
        Ok(consents
            .iter()
            .filter(|c| c.subject_id == subject_id && c.matches(category, purpose) && c.is_active())
            .cloned()
            .collect())
    }

    async fn mark_withdrawn(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<usize> {
        self.check(Collection::Consents)?;

        let mut consents = self.consents.write().await;
        let mut stamped = 0;
        for consent in consents.iter_mut().filter(|c| {
            c.subject_id == subject_id && c.matches(category, purpose) && c.is_active()
        }) {
            consent.withdrawn_at = Some(withdrawn_at);
            stamped += 1;
        }
        Ok(stamped)
    }

    async fn history(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        self.check(Collection::Consents)?;

        let consents = self.consents.read().await;
        let mut history: Vec<ConsentRecord> = consents
            .iter()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
            .collect();
        history.sort_by_key(|c| c.consented_at);
        Ok(history)
    }
}

#[async_trait]
impl AccessLogRepository for InMemoryStore {
    async fn append(&self, entry: &AccessLogEntry) -> Result<()> {
        self.check(Collection::AccessLog)?;
        self.access_log.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent_for_subject(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>> {
        self.check(Collection::AccessLog)?;

        let log = self.access_log.read().await;
        let mut entries: Vec<AccessLogEntry> = log
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; reverse after
        entries.sort_by_key(|e| e.timestamp);
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl CommunicationLogRepository for InMemoryStore {
    async fn insert(&self, entry: &CommunicationLogEntry) -> Result<()> {
        self.check(Collection::CommunicationLog)?;
        self.communications.write().await.push(entry.clone());
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.check(Collection::CommunicationLog)?;

        let mut entries = self.communications.write().await;
        let before = entries.len();
        entries.retain(|e| e.expires_at >= now);
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        self.check(Collection::CommunicationLog)?;
        Ok(self.communications.read().await.len() as u64)
    }

    async fn has_entries_for_hash_since(
        &self,
        party: &HashedIdentifier,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        self.check(Collection::CommunicationLog)?;

        let entries = self.communications.read().await;
        Ok(entries.iter().any(|e| {
            e.created_at >= since && (&e.sender_hash == party || &e.recipient_hash == party)
        }))
    }
}

#[async_trait]
impl SubjectRepository for InMemoryStore {
    async fn find(&self, subject_id: &str) -> Result<Option<SubjectRecord>> {
        self.check(Collection::Subjects)?;
        Ok(self.subjects.read().await.get(subject_id).cloned())
    }

    async fn upsert(&self, subject: &SubjectRecord) -> Result<()> {
        self.check(Collection::Subjects)?;
        self.subjects
            .write()
            .await
            .insert(subject.id.clone(), subject.clone());
        Ok(())
    }

    async fn delete_with_dependents(&self, subject_id: &str) -> Result<bool> {
        self.check(Collection::Subjects)?;

        // Fixed lock order: subjects, consents, bills, messages
        let mut subjects = self.subjects.write().await;
        let mut consents = self.consents.write().await;
        let mut bills = self.bills.write().await;
        let mut messages = self.messages.write().await;

        let existed = subjects.remove(subject_id).is_some();
        consents.retain(|c| c.subject_id != subject_id);
        bills.retain(|b| b.subject_id != subject_id);
        messages.retain(|m| m.subject_id != subject_id);

        Ok(existed)
    }
}

#[async_trait]
impl BillingRepository for InMemoryStore {
    async fn has_outstanding(&self, subject_id: &str) -> Result<bool> {
        self.check(Collection::Bills)?;

        let bills = self.bills.read().await;
        Ok(bills
            .iter()
            .any(|b| b.subject_id == subject_id && b.status.is_outstanding()))
    }

    async fn bills_for_subject(&self, subject_id: &str) -> Result<Vec<BillRecord>> {
        self.check(Collection::Bills)?;

        let bills = self.bills.read().await;
        Ok(bills
            .iter()
            .filter(|b| b.subject_id == subject_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn has_messages_since(&self, subject_id: &str, since: DateTime<Utc>) -> Result<bool> {
        self.check(Collection::Messages)?;

        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .any(|m| m.subject_id == subject_id && m.created_at >= since))
    }
}
