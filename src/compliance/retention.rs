//! Retention Obligation Checker
//!
//! 消去リクエスト時点で、法的理由によりデータを保持すべきかを判定する。
//! 判定は読み取り専用で、独立した存在チェックの論理和。
//! - 未払い（pending / overdue）の請求がある
//! - 保持期間（既定3年）内に作成された通信記録がある
//!   （外部の Message コレクション、またはエンジン自身の通信保持ログで
//!   電話番号ハッシュが送信者・受信者に一致するもの）

use super::types::{RetentionWindow, SubjectRecord};
use crate::error::Result;
use crate::repository::{BillingRepository, CommunicationLogRepository, MessageRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// 保持義務の判定結果（永続化しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionAssessment {
    /// 未払いの請求がある
    pub outstanding_financial: bool,
    /// 保持期間内の通信記録がある
    pub recent_communications: bool,
    /// 判定日時
    pub assessed_at: DateTime<Utc>,
}

impl RetentionAssessment {
    /// いずれかの義務があれば完全消去はできない
    pub fn must_retain(&self) -> bool {
        self.outstanding_financial || self.recent_communications
    }
}

/// 保持義務チェッカー
#[derive(Clone)]
pub struct RetentionChecker {
    billing: Arc<dyn BillingRepository>,
    messages: Arc<dyn MessageRepository>,
    communications: Arc<dyn CommunicationLogRepository>,
    window: RetentionWindow,
}

impl RetentionChecker {
    pub fn new(
        billing: Arc<dyn BillingRepository>,
        messages: Arc<dyn MessageRepository>,
        communications: Arc<dyn CommunicationLogRepository>,
        window: RetentionWindow,
    ) -> Self {
        Self {
            billing,
            messages,
            communications,
            window,
        }
    }

    pub fn window(&self) -> RetentionWindow {
        self.window
    }

    /// 保持義務を評価
    pub async fn assess(&self, subject: &SubjectRecord) -> Result<RetentionAssessment> {
        let now = Utc::now();
        let cutoff = self.window.cutoff_from(now);
        let subject_id = subject.id.as_str();

        let logged = async {
            match &subject.phone_hash {
                Some(hash) => {
                    self.communications
                        .has_entries_for_hash_since(hash, cutoff)
                        .await
                }
                None => Ok(false),
            }
        };

        let (outstanding_financial, recent_messages, recent_logged) = tokio::try_join!(
            self.billing.has_outstanding(subject_id),
            self.messages.has_messages_since(subject_id, cutoff),
            logged,
        )?;

        debug!(
            subject_id,
            outstanding_financial, recent_messages, recent_logged, "retention obligations assessed"
        );

        Ok(RetentionAssessment {
            outstanding_financial,
            recent_communications: recent_messages || recent_logged,
            assessed_at: now,
        })
    }

    /// 保持すべきか
    pub async fn must_retain(&self, subject: &SubjectRecord) -> Result<bool> {
        Ok(self.assess(subject).await?.must_retain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::types::{
        BillRecord, BillStatus, Channel, CommunicationLogEntry, Direction, MessageRecord,
    };
    use crate::crypto::{content_digest, hash_identifier};
    use crate::error::Error;
    use crate::repository::{Collection, InMemoryStore};
    use chrono::Duration;

    fn checker(store: &InMemoryStore) -> RetentionChecker {
        RetentionChecker::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            RetentionWindow::years(3),
        )
    }

    fn subject() -> SubjectRecord {
        SubjectRecord::new("u1", "u1@example.com")
    }

    fn logged_sms(from: &str, to: &str, created_at: DateTime<Utc>) -> CommunicationLogEntry {
        CommunicationLogEntry {
            id: uuid::Uuid::new_v4(),
            sender_hash: hash_identifier(from, "phone-salt"),
            recipient_hash: hash_identifier(to, "phone-salt"),
            content_digest: content_digest("ping"),
            channel: Channel::Sms,
            direction: Direction::Outbound,
            created_at,
            message_length: 4,
            expires_at: RetentionWindow::years(3).expiry_from(created_at),
        }
    }

    #[tokio::test]
    async fn test_no_obligations() {
        let store = InMemoryStore::new();
        store.insert_bill(BillRecord::new("u1", 500, BillStatus::Paid)).await;

        assert!(!checker(&store).must_retain(&subject()).await.unwrap());
    }

    #[tokio::test]
    async fn test_overdue_bill_alone_blocks_erasure() {
        let store = InMemoryStore::new();
        store.insert_bill(BillRecord::new("u1", 500, BillStatus::Overdue)).await;

        let assessment = checker(&store).assess(&subject()).await.unwrap();
        assert!(assessment.outstanding_financial);
        assert!(!assessment.recent_communications);
        assert!(assessment.must_retain());
    }

    #[tokio::test]
    async fn test_recent_message_alone_blocks_erasure() {
        let store = InMemoryStore::new();
        store
            .insert_message(MessageRecord::new("u1", Channel::Sms, Utc::now() - Duration::days(30)))
            .await;

        let assessment = checker(&store).assess(&subject()).await.unwrap();
        assert!(!assessment.outstanding_financial);
        assert!(assessment.recent_communications);
    }

    #[tokio::test]
    async fn test_message_outside_window_is_ignored() {
        let store = InMemoryStore::new();
        store
            .insert_message(MessageRecord::new(
                "u1",
                Channel::Email,
                Utc::now() - Duration::days(4 * 365),
            ))
            .await;

        assert!(!checker(&store).must_retain(&subject()).await.unwrap());
    }

    #[tokio::test]
    async fn test_logged_communication_matches_phone_hash() {
        let store = InMemoryStore::new();
        let mut subject = subject();
        subject.phone_hash = Some(hash_identifier("+27821234567", "phone-salt"));

        store
            .insert(&logged_sms("+27110000000", "+27821234567", Utc::now()))
            .await
            .unwrap();

        let assessment = checker(&store).assess(&subject).await.unwrap();
        assert!(assessment.recent_communications);
        assert!(assessment.must_retain());
    }

    #[tokio::test]
    async fn test_logged_communication_of_other_party_is_ignored() {
        let store = InMemoryStore::new();
        let mut subject = subject();
        subject.phone_hash = Some(hash_identifier("+27821234567", "phone-salt"));

        store
            .insert(&logged_sms("+27110000000", "+27119999999", Utc::now()))
            .await
            .unwrap();
        store
            .insert(&logged_sms(
                "+27821234567",
                "+27110000000",
                Utc::now() - Duration::days(4 * 365),
            ))
            .await
            .unwrap();

        assert!(!checker(&store).must_retain(&subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates() {
        let store = InMemoryStore::new();
        store.set_failing(Collection::Bills, true);

        assert!(matches!(
            checker(&store).must_retain(&subject()).await,
            Err(Error::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_communication_log_failure_propagates() {
        let store = InMemoryStore::new();
        store.set_failing(Collection::CommunicationLog, true);
        let mut subject = subject();
        subject.phone_hash = Some(hash_identifier("+27821234567", "phone-salt"));

        assert!(checker(&store).assess(&subject).await.is_err());
    }
}
