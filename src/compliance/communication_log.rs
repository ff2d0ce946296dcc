//! Communication Retention Log
//!
//! 送受信メッセージのメタデータをハッシュ化して記録し、保持期限を過ぎたものを
//! 定期スイープで削除する。本文は保存せず、SHA-256ダイジェストのみ残す。

use super::types::*;
use crate::crypto::{content_digest, IdentifierHasher};
use crate::error::Result;
use crate::repository::CommunicationLogRepository;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 通信保持ログ
#[derive(Clone)]
pub struct CommunicationRetentionLog {
    repository: Arc<dyn CommunicationLogRepository>,
    hasher: Arc<IdentifierHasher>,
    window: RetentionWindow,
    dropped: Arc<AtomicU64>,
}

impl CommunicationRetentionLog {
    pub fn new(
        repository: Arc<dyn CommunicationLogRepository>,
        hasher: Arc<IdentifierHasher>,
        window: RetentionWindow,
    ) -> Self {
        Self {
            repository,
            hasher,
            window,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 記録するエントリを組み立てる（送受信者は電話用ソルトでハッシュ化）
    pub fn build_entry(
        &self,
        from: &str,
        to: &str,
        content: &str,
        channel: Channel,
        direction: Direction,
    ) -> CommunicationLogEntry {
        let created_at = Utc::now();
        CommunicationLogEntry {
            id: Uuid::new_v4(),
            sender_hash: self.hasher.hash_phone(from),
            recipient_hash: self.hasher.hash_phone(to),
            content_digest: content_digest(content),
            channel,
            direction,
            created_at,
            message_length: content.chars().count(),
            expires_at: self.window.expiry_from(created_at),
        }
    }

    /// 通信を記録（ベストエフォート）
    pub async fn log_communication(
        &self,
        from: &str,
        to: &str,
        content: &str,
        channel: Channel,
        direction: Direction,
    ) -> WriteOutcome {
        let entry = self.build_entry(from, to, content, channel, direction);

        match self.repository.insert(&entry).await {
            Ok(()) => {
                debug!(%channel, %direction, expires_at = %entry.expires_at, "communication logged");
                WriteOutcome::Recorded(entry.id)
            }
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    %channel,
                    %direction,
                    error = %e,
                    dropped_total = dropped,
                    "communication log entry dropped"
                );
                WriteOutcome::Dropped
            }
        }
    }

    /// 期限切れエントリを削除して件数を返す
    pub async fn sweep_expired(&self) -> Result<u64> {
        let deleted = self.repository.delete_expired(Utc::now()).await?;
        if deleted > 0 {
            info!(deleted, "expired communication log entries swept");
        }
        Ok(deleted)
    }

    /// 一定間隔でスイープを実行するタスクを起動
    ///
    /// 外部スケジューラがない環境向け。失敗は記録して次の周期で再試行する。
    pub fn spawn_sweep_task(&self, period: Duration) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = log.sweep_expired().await {
                    error!(error = %e, "communication log sweep failed");
                }
            }
        })
    }

    /// これまでに破棄したエントリ数
    pub fn dropped_entries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn window(&self) -> RetentionWindow {
        self.window
    }
}
