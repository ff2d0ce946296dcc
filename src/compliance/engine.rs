//! Compliance Engine
//!
//! 暗号コア・同意台帳・監査ログ・保持義務チェック・権利行使・通信保持ログを
//! 1つの設定と1つのストレージから組み立てるファサード。

use super::audit_log::AccessAuditLog;
use super::communication_log::CommunicationRetentionLog;
use super::consent_manager::ConsentLedger;
use super::data_subject_requests::{DataSubjectRights, ErasureReport, ExportBundle};
use super::retention::RetentionChecker;
use super::types::*;
use crate::config::ComplianceConfig;
use crate::crypto::{context, FieldCipher, IdentifierHasher};
use crate::error::Result;
use crate::repository::{ComplianceStore, SubjectRepository};
use std::sync::Arc;
use tracing::{info, warn};

/// 書き込み前の平文プロフィール
#[derive(Debug, Clone, Default)]
pub struct SubjectProfile {
    pub full_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
}

/// コンプライアンスエンジン
#[derive(Clone)]
pub struct ComplianceEngine {
    cipher: Arc<FieldCipher>,
    hasher: Arc<IdentifierHasher>,
    subjects: Arc<dyn SubjectRepository>,
    consents: ConsentLedger,
    audit: AccessAuditLog,
    retention: RetentionChecker,
    rights: DataSubjectRights,
    communications: CommunicationRetentionLog,
}

impl ComplianceEngine {
    /// 設定とストレージからエンジンを作成
    ///
    /// 鍵が無い・長さが違う場合は `Error::Configuration` で起動を止める。
    pub fn new<S: ComplianceStore>(config: &ComplianceConfig, store: S) -> Result<Self> {
        config.validate()?;
        if config.uses_dev_salts() {
            warn!(
                "hash salt not provisioned (PII_PHONE_HASH_SALT / PII_ID_HASH_SALT), \
                 using INSECURE development default; never run this in production"
            );
        }

        let store = Arc::new(store);
        let cipher = Arc::new(FieldCipher::from_config(config)?);
        let hasher = Arc::new(IdentifierHasher::from_config(config)?);
        let window = RetentionWindow::years(config.communication_retention_years);

        let consents = ConsentLedger::new(store.clone());
        let audit = AccessAuditLog::new(store.clone()).with_report_limit(config.report_limit);
        let retention =
            RetentionChecker::new(store.clone(), store.clone(), store.clone(), window);
        let rights = DataSubjectRights::new(
            store.clone(),
            store.clone(),
            consents.clone(),
            audit.clone(),
            retention.clone(),
            cipher.clone(),
            config.retention_statement.clone(),
            config.legal_citation.clone(),
        );
        let communications = CommunicationRetentionLog::new(store.clone(), hasher.clone(), window);

        info!(
            retention_years = config.communication_retention_years,
            report_limit = config.report_limit,
            "compliance engine initialised"
        );

        Ok(Self {
            cipher,
            hasher,
            subjects: store,
            consents,
            audit,
            retention,
            rights,
            communications,
        })
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    pub fn hasher(&self) -> &IdentifierHasher {
        &self.hasher
    }

    pub fn consents(&self) -> &ConsentLedger {
        &self.consents
    }

    pub fn audit(&self) -> &AccessAuditLog {
        &self.audit
    }

    pub fn retention(&self) -> &RetentionChecker {
        &self.retention
    }

    pub fn rights(&self) -> &DataSubjectRights {
        &self.rights
    }

    pub fn communications(&self) -> &CommunicationRetentionLog {
        &self.communications
    }

    /// プロフィールを暗号化・ハッシュ化して保存し、作成を監査ログに記録
    pub async fn register_subject(
        &self,
        subject_id: &str,
        profile: SubjectProfile,
        request: &RequestContext,
    ) -> Result<SubjectRecord> {
        let mut record = SubjectRecord::new(subject_id, profile.email);
        let mut fields = vec!["email"];

        if let Some(name) = profile.full_name.as_deref() {
            record.full_name = Some(self.cipher.encrypt(name, context::NAME)?);
            fields.push("full_name");
        }
        if let Some(phone) = profile.phone.as_deref() {
            record.phone = Some(self.cipher.encrypt(phone, context::PHONE)?);
            record.phone_hash = Some(self.hasher.hash_phone(phone));
            fields.push("phone");
        }
        if let Some(id_number) = profile.national_id.as_deref() {
            record.national_id = Some(self.cipher.encrypt(id_number, context::NATIONAL_ID)?);
            record.national_id_hash = Some(self.hasher.hash_national_id(id_number));
            fields.push("national_id");
        }
        if let Some(address) = profile.address.as_deref() {
            record.address = Some(self.cipher.encrypt(address, context::ADDRESS)?);
            fields.push("address");
        }

        self.subjects.upsert(&record).await?;

        self.audit
            .log_access(
                AccessLogEntry::new(
                    subject_id,
                    AccessAction::Create,
                    DataCategory::PersonalIdentifier,
                    ProcessingPurpose::ServiceProvision,
                )
                .with_fields(fields)
                .with_context(request),
            )
            .await;

        Ok(record)
    }

    /// アクセス権: エクスポート
    pub async fn export_data(
        &self,
        subject_id: &str,
        request: &RequestContext,
    ) -> Result<ExportBundle> {
        self.rights.export_data(subject_id, request).await
    }

    /// 消去権: 削除または匿名化
    pub async fn delete_data(
        &self,
        subject_id: &str,
        reason: &str,
        request: &RequestContext,
    ) -> Result<ErasureReport> {
        self.rights.delete_data(subject_id, reason, request).await
    }
}
