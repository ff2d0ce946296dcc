//! Data Subject Requests
//!
//! アクセス権（復号済みエクスポート）と消去権（完全削除または匿名化）の処理。
//!
//! 消去の状態遷移:
//!
//! ```text
//! Requested → ObligationChecked → {FullyDeleted | Anonymized} → Logged
//! ```
//!
//! 保持義務チェックを飛ばす経路はない。チェックは破壊的書き込みの直前に1回だけ行う。
//! チェックと書き込みは別々のリポジトリを経由するため1トランザクションにはできず、
//! その間に作成された請求・通信記録は判定に反映されない（既知の競合）。

use super::audit_log::AccessAuditLog;
use super::consent_manager::ConsentLedger;
use super::retention::{RetentionAssessment, RetentionChecker};
use super::types::*;
use crate::crypto::{context, EncryptedField, FieldCipher};
use crate::error::{Error, Result};
use crate::repository::{BillingRepository, SubjectRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// データ主体レコードのフィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectField {
    FullName,
    Email,
    Phone,
    PhoneHash,
    NationalId,
    NationalIdHash,
    Address,
    AccountStatus,
    CreatedAt,
    Bills,
    Messages,
    Consents,
    AccessLog,
}

impl SubjectField {
    /// 全フィールド
    pub const ALL: &'static [SubjectField] = &[
        SubjectField::FullName,
        SubjectField::Email,
        SubjectField::Phone,
        SubjectField::PhoneHash,
        SubjectField::NationalId,
        SubjectField::NationalIdHash,
        SubjectField::Address,
        SubjectField::AccountStatus,
        SubjectField::CreatedAt,
        SubjectField::Bills,
        SubjectField::Messages,
        SubjectField::Consents,
        SubjectField::AccessLog,
    ];

    /// 監査ログ・エクスポートで使う名前
    pub fn name(&self) -> &'static str {
        match self {
            SubjectField::FullName => "full_name",
            SubjectField::Email => "email",
            SubjectField::Phone => "phone",
            SubjectField::PhoneHash => "phone_hash",
            SubjectField::NationalId => "national_id",
            SubjectField::NationalIdHash => "national_id_hash",
            SubjectField::Address => "address",
            SubjectField::AccountStatus => "is_active",
            SubjectField::CreatedAt => "created_at",
            SubjectField::Bills => "bills",
            SubjectField::Messages => "messages",
            SubjectField::Consents => "consents",
            SubjectField::AccessLog => "access_log",
        }
    }
}

/// 匿名化時のフィールドの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDisposition {
    /// 値を消す
    Clear,
    /// 固定の匿名値で上書き
    Sentinel,
    /// アカウントを無効化
    Deactivate,
    /// 請求・サービス上必要なため保持
    Retain,
}

/// 匿名化ポリシー表
///
/// 全フィールドをここで分類する。表にないフィールドは匿名化でエラーになる。
pub const ANONYMIZATION_POLICY: &[(SubjectField, FieldDisposition)] = &[
    (SubjectField::FullName, FieldDisposition::Clear),
    (SubjectField::Email, FieldDisposition::Sentinel),
    (SubjectField::Phone, FieldDisposition::Clear),
    (SubjectField::PhoneHash, FieldDisposition::Clear),
    (SubjectField::NationalId, FieldDisposition::Clear),
    (SubjectField::NationalIdHash, FieldDisposition::Clear),
    (SubjectField::Address, FieldDisposition::Clear),
    (SubjectField::AccountStatus, FieldDisposition::Deactivate),
    (SubjectField::CreatedAt, FieldDisposition::Retain),
    (SubjectField::Bills, FieldDisposition::Retain),
    (SubjectField::Messages, FieldDisposition::Retain),
    (SubjectField::Consents, FieldDisposition::Retain),
    (SubjectField::AccessLog, FieldDisposition::Retain),
];

/// フィールドの扱いを引く
pub fn disposition_for(field: SubjectField) -> Option<FieldDisposition> {
    ANONYMIZATION_POLICY
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, d)| *d)
}

/// 匿名化後のメールアドレス
pub fn anonymized_email(subject_id: &str) -> String {
    format!("deleted_{}@anonymized.invalid", subject_id)
}

/// ポリシー表に従って匿名化したレコードを作る
pub fn anonymize_subject(subject: &SubjectRecord, now: DateTime<Utc>) -> Result<SubjectRecord> {
    let mut anonymized = subject.clone();

    for field in SubjectField::ALL {
        let disposition = disposition_for(*field).ok_or_else(|| {
            Error::Validation(format!(
                "field {} has no anonymization classification",
                field.name()
            ))
        })?;

        match (field, disposition) {
            (_, FieldDisposition::Retain) => {}
            (SubjectField::FullName, FieldDisposition::Clear) => anonymized.full_name = None,
            (SubjectField::Phone, FieldDisposition::Clear) => anonymized.phone = None,
            (SubjectField::PhoneHash, FieldDisposition::Clear) => anonymized.phone_hash = None,
            (SubjectField::NationalId, FieldDisposition::Clear) => anonymized.national_id = None,
            (SubjectField::NationalIdHash, FieldDisposition::Clear) => {
                anonymized.national_id_hash = None
            }
            (SubjectField::Address, FieldDisposition::Clear) => anonymized.address = None,
            (SubjectField::Email, FieldDisposition::Sentinel) => {
                anonymized.email = anonymized_email(&subject.id)
            }
            (SubjectField::AccountStatus, FieldDisposition::Deactivate) => {
                anonymized.is_active = false
            }
            (field, disposition) => {
                return Err(Error::Validation(format!(
                    "disposition {:?} cannot be applied to {}",
                    disposition,
                    field.name()
                )))
            }
        }
    }

    anonymized.anonymized_at = Some(now);
    Ok(anonymized)
}

/// エクスポート時に復号できなかったフィールド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub field: String,
    pub reason: String,
}

/// エクスポートのメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    /// 保持期間の説明
    pub retention_period: String,
    pub legal_basis: LegalBasis,
    /// 根拠条文
    pub legal_citation: String,
}

/// アクセス権に基づくエクスポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub subject_id: String,
    /// 復号済みのプロフィール
    pub profile: BTreeMap<String, String>,
    /// 復号に失敗したフィールド（エクスポート全体は失敗させない）
    pub failed_fields: Vec<FieldFailure>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub consents: Vec<ConsentRecord>,
    pub bills: Vec<BillRecord>,
    /// 監査ログが読めなかった場合は None
    pub access_history: Option<Vec<AccessLogEntry>>,
    pub metadata: ExportMetadata,
}

impl ExportBundle {
    /// 全フィールドを復号できたか
    pub fn is_complete(&self) -> bool {
        self.failed_fields.is_empty()
    }
}

/// 消去処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErasureState {
    Requested,
    ObligationChecked,
    FullyDeleted,
    Anonymized,
    Logged,
}

/// 消去の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErasureOutcome {
    FullyDeleted,
    Anonymized,
}

impl ErasureOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ErasureOutcome::FullyDeleted => "fully_deleted",
            ErasureOutcome::Anonymized => "anonymized",
        }
    }
}

/// 消去リクエストの処理結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureReport {
    pub subject_id: String,
    pub reason: String,
    pub outcome: ErasureOutcome,
    /// 判断に使った保持義務の評価
    pub assessment: RetentionAssessment,
    /// 辿った状態（終端は Logged）
    pub states: Vec<ErasureState>,
    /// 監査ログに記録できたか
    pub audit_recorded: bool,
    pub completed_at: DateTime<Utc>,
}

/// データ主体の権利行使を処理する
#[derive(Clone)]
pub struct DataSubjectRights {
    subjects: Arc<dyn SubjectRepository>,
    billing: Arc<dyn BillingRepository>,
    consents: ConsentLedger,
    audit: AccessAuditLog,
    retention: RetentionChecker,
    cipher: Arc<FieldCipher>,
    retention_statement: String,
    legal_citation: String,
}

impl DataSubjectRights {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subjects: Arc<dyn SubjectRepository>,
        billing: Arc<dyn BillingRepository>,
        consents: ConsentLedger,
        audit: AccessAuditLog,
        retention: RetentionChecker,
        cipher: Arc<FieldCipher>,
        retention_statement: impl Into<String>,
        legal_citation: impl Into<String>,
    ) -> Self {
        Self {
            subjects,
            billing,
            consents,
            audit,
            retention,
            cipher,
            retention_statement: retention_statement.into(),
            legal_citation: legal_citation.into(),
        }
    }

    /// アクセス権: 全データを復号してエクスポート
    pub async fn export_data(
        &self,
        subject_id: &str,
        request: &RequestContext,
    ) -> Result<ExportBundle> {
        let subject = self
            .subjects
            .find(subject_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no data held for subject {}", subject_id)))?;

        let exported_fields = [
            SubjectField::FullName,
            SubjectField::Email,
            SubjectField::Phone,
            SubjectField::NationalId,
            SubjectField::Address,
            SubjectField::Consents,
            SubjectField::Bills,
            SubjectField::AccessLog,
        ];
        self.audit
            .log_access(
                AccessLogEntry::new(
                    subject_id,
                    AccessAction::Export,
                    DataCategory::PersonalIdentifier,
                    ProcessingPurpose::LegalCompliance,
                )
                .with_fields(exported_fields.iter().map(|f| f.name()))
                .with_context(request),
            )
            .await;

        let mut profile = BTreeMap::new();
        let mut failed_fields = Vec::new();
        profile.insert(SubjectField::Email.name().to_string(), subject.email.clone());

        let encrypted: [(SubjectField, &Option<EncryptedField>, &str); 4] = [
            (SubjectField::FullName, &subject.full_name, context::NAME),
            (SubjectField::Phone, &subject.phone, context::PHONE),
            (SubjectField::NationalId, &subject.national_id, context::NATIONAL_ID),
            (SubjectField::Address, &subject.address, context::ADDRESS),
        ];
        for (field, value, ctx) in encrypted {
            let Some(value) = value else { continue };
            match self.cipher.decrypt(value, ctx) {
                Ok(plaintext) => {
                    profile.insert(field.name().to_string(), plaintext);
                }
                Err(e) => {
                    warn!(subject_id, field = field.name(), "field could not be decrypted for export");
                    failed_fields.push(FieldFailure {
                        field: field.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let consents = self.consents.consent_history(subject_id).await?;
        let bills = self.billing.bills_for_subject(subject_id).await?;
        let access_history = match self.audit.generate_report(subject_id).await {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(subject_id, error = %e, "access history unavailable for export");
                None
            }
        };

        info!(
            subject_id,
            failed = failed_fields.len(),
            "personal data exported"
        );

        Ok(ExportBundle {
            subject_id: subject.id,
            profile,
            failed_fields,
            is_active: subject.is_active,
            created_at: subject.created_at,
            consents,
            bills,
            access_history,
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                retention_period: self.retention_statement.clone(),
                legal_basis: LegalBasis::LegalObligation,
                legal_citation: self.legal_citation.clone(),
            },
        })
    }

    /// 消去権: 保持義務に応じて完全削除か匿名化を行う
    pub async fn delete_data(
        &self,
        subject_id: &str,
        reason: &str,
        request: &RequestContext,
    ) -> Result<ErasureReport> {
        let mut states = vec![ErasureState::Requested];

        let subject = self
            .subjects
            .find(subject_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no data held for subject {}", subject_id)))?;

        let assessment = self.retention.assess(&subject).await?;
        states.push(ErasureState::ObligationChecked);

        let outcome = if assessment.must_retain() {
            let anonymized = anonymize_subject(&subject, Utc::now())?;
            self.subjects.upsert(&anonymized).await?;
            states.push(ErasureState::Anonymized);
            ErasureOutcome::Anonymized
        } else {
            self.subjects.delete_with_dependents(subject_id).await?;
            states.push(ErasureState::FullyDeleted);
            ErasureOutcome::FullyDeleted
        };

        let touched: Vec<&str> = match outcome {
            ErasureOutcome::FullyDeleted => SubjectField::ALL
                .iter()
                .filter(|f| **f != SubjectField::AccessLog)
                .map(|f| f.name())
                .collect(),
            ErasureOutcome::Anonymized => ANONYMIZATION_POLICY
                .iter()
                .filter(|(_, d)| *d != FieldDisposition::Retain)
                .map(|(f, _)| f.name())
                .collect(),
        };

        let audit_outcome = self
            .audit
            .log_access(
                AccessLogEntry::new(
                    subject_id,
                    AccessAction::Delete,
                    DataCategory::PersonalIdentifier,
                    ProcessingPurpose::LegalCompliance,
                )
                .with_fields(touched)
                .with_context(request)
                .with_details(format!("{}: {}", outcome.as_str(), reason)),
            )
            .await;
        states.push(ErasureState::Logged);

        info!(
            subject_id,
            outcome = outcome.as_str(),
            outstanding_financial = assessment.outstanding_financial,
            recent_communications = assessment.recent_communications,
            "erasure request resolved"
        );

        Ok(ErasureReport {
            subject_id: subject_id.to_string(),
            reason: reason.to_string(),
            outcome,
            assessment,
            states,
            audit_recorded: audit_outcome.is_recorded(),
            completed_at: Utc::now(),
        })
    }
}
