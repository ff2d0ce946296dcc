//! Consent Manager
//!
//! 同意台帳。付与は1タプルにつき1レコードとして追記し、撤回は既存レコードに
//! 撤回日時を記録するだけで履歴は消さない。

use super::types::*;
use crate::error::{Error, Result};
use crate::repository::ConsentRepository;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 同意台帳
#[derive(Clone)]
pub struct ConsentLedger {
    repository: Arc<dyn ConsentRepository>,
}

impl ConsentLedger {
    /// 新しい同意台帳を作成
    pub fn new(repository: Arc<dyn ConsentRepository>) -> Self {
        Self { repository }
    }

    /// 同意を記録
    ///
    /// 1回のユーザー操作に含まれる全タプルをまとめて書き込む（全件成功か全件失敗）。
    pub async fn record_consent(
        &self,
        subject_id: &str,
        grants: &[ConsentGrant],
        context: &RequestContext,
    ) -> Result<Vec<ConsentRecord>> {
        if subject_id.is_empty() {
            return Err(Error::Validation("subject id must not be empty".to_string()));
        }

        let records: Vec<ConsentRecord> = grants
            .iter()
            .map(|grant| ConsentRecord::from_grant(subject_id, grant, context))
            .collect();

        if records.is_empty() {
            return Ok(records);
        }

        self.repository.insert_batch(&records).await?;

        info!(
            subject_id,
            records = records.len(),
            "consent decisions recorded"
        );
        Ok(records)
    }

    /// 同意が現在有効か
    ///
    /// 永続化層の障害時は同意なしとして扱う（fail closed）。
    pub async fn has_active_consent(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
    ) -> bool {
        match self
            .repository
            .find_active(subject_id, category, purpose)
            .await
        {
            Ok(records) => records.iter().any(ConsentRecord::is_active),
            Err(e) => {
                warn!(
                    subject_id,
                    %category,
                    %purpose,
                    error = %e,
                    "consent lookup failed, denying processing"
                );
                false
            }
        }
    }

    /// 同意を撤回
    ///
    /// 撤回した件数を返す。有効な同意がなければ0。
    pub async fn withdraw_consent(
        &self,
        subject_id: &str,
        category: DataCategory,
        purpose: ProcessingPurpose,
    ) -> Result<usize> {
        let stamped = self
            .repository
            .mark_withdrawn(subject_id, category, purpose, Utc::now())
            .await?;

        if stamped == 0 {
            debug!(subject_id, %category, %purpose, "no active consent to withdraw");
        } else {
            info!(subject_id, %category, %purpose, stamped, "consent withdrawn");
        }

        Ok(stamped)
    }

    /// 同意履歴を取得（撤回済みを含む、古い順）
    pub async fn consent_history(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        self.repository.history(subject_id).await
    }

    /// 有効な同意のみ取得
    pub async fn active_consents(&self, subject_id: &str) -> Result<Vec<ConsentRecord>> {
        Ok(self
            .repository
            .history(subject_id)
            .await?
            .into_iter()
            .filter(ConsentRecord::is_active)
            .collect())
    }

    /// データ主体の同意統計を取得
    pub async fn statistics(&self, subject_id: &str) -> Result<ConsentStatistics> {
        let history = self.repository.history(subject_id).await?;

        let mut stats = ConsentStatistics {
            total_records: history.len(),
            ..ConsentStatistics::default()
        };

        for record in &history {
            if record.withdrawn_at.is_some() {
                stats.withdrawn_records += 1;
            } else if record.consent_given {
                stats.active_records += 1;
            } else {
                stats.refused_records += 1;
            }

            *stats
                .records_by_purpose
                .entry(record.purpose.to_string())
                .or_insert(0) += 1;
        }

        Ok(stats)
    }
}

/// 同意統計
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentStatistics {
    /// 総レコード数
    pub total_records: usize,
    /// 有効な同意数
    pub active_records: usize,
    /// 撤回された同意数
    pub withdrawn_records: usize,
    /// 拒否として記録された数
    pub refused_records: usize,
    /// 目的別レコード数
    pub records_by_purpose: HashMap<String, usize>,
}
