//! Access Audit Log
//!
//! 規制対象データへの全アクセスを追記専用で記録する。
//! 書き込み失敗は呼び出し元に伝播しない（ベストエフォート）。失敗は
//! 運用ログに error として出し、破棄件数カウンタで観測できるようにする。

use super::types::*;
use crate::error::Result;
use crate::repository::AccessLogRepository;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// レポートのデフォルト上限
pub const DEFAULT_REPORT_LIMIT: usize = 1000;

/// アクセス監査ログ
#[derive(Clone)]
pub struct AccessAuditLog {
    repository: Arc<dyn AccessLogRepository>,
    report_limit: usize,
    dropped: Arc<AtomicU64>,
}

impl AccessAuditLog {
    /// 新しい監査ログを作成
    pub fn new(repository: Arc<dyn AccessLogRepository>) -> Self {
        Self {
            repository,
            report_limit: DEFAULT_REPORT_LIMIT,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// レポート上限を設定
    pub fn with_report_limit(mut self, limit: usize) -> Self {
        self.report_limit = limit.max(1);
        self
    }

    /// アクセスを記録
    ///
    /// 失敗しても `Err` は返さない。結果は破棄してよい。
    pub async fn log_access(&self, entry: AccessLogEntry) -> WriteOutcome {
        match self.repository.append(&entry).await {
            Ok(()) => {
                debug!(
                    subject_id = %entry.subject_id,
                    action = %entry.action,
                    category = %entry.category,
                    "access recorded"
                );
                WriteOutcome::Recorded(entry.id)
            }
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    subject_id = %entry.subject_id,
                    action = %entry.action,
                    purpose = %entry.purpose,
                    error = %e,
                    dropped_total = dropped,
                    "audit entry dropped"
                );
                WriteOutcome::Dropped
            }
        }
    }

    /// データ主体へのアクセス履歴（新しい順、デフォルト上限）
    pub async fn generate_report(&self, subject_id: &str) -> Result<Vec<AccessLogEntry>> {
        self.generate_report_with_limit(subject_id, self.report_limit)
            .await
    }

    /// データ主体へのアクセス履歴（新しい順）
    pub async fn generate_report_with_limit(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<AccessLogEntry>> {
        self.repository.recent_for_subject(subject_id, limit).await
    }

    /// これまでに破棄したエントリ数
    pub fn dropped_entries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
