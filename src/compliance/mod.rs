//! Personal Data Protection & Consent Compliance Engine
//!
//! 個人データ保護法制に対応するための機械的な保証を提供します。
//!
//! ## 主要機能
//!
//! - **同意台帳**: データカテゴリ×処理目的ごとの同意の付与・撤回・照会
//! - **アクセス監査ログ**: 規制対象データへの全アクセスを追記専用で記録
//! - **保持義務チェック**: 未払い請求・通信記録保持期間による消去のブロック
//! - **データ主体の権利**: 復号済みエクスポート、完全削除または匿名化
//! - **通信保持ログ**: ハッシュ化メタデータの記録と期限切れスイープ
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use pii_compliance::compliance::*;
//! use pii_compliance::config::ComplianceConfig;
//! use pii_compliance::repository::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ComplianceConfig::new(std::env::var("PII_ENCRYPTION_KEY")?)
//!     .with_salts("phone-salt", "id-salt");
//! let engine = ComplianceEngine::new(&config, InMemoryStore::new())?;
//!
//! let report = engine
//!     .delete_data("user-42", "subject request", &RequestContext::default())
//!     .await?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod audit_log;
pub mod communication_log;
pub mod consent_manager;
pub mod data_subject_requests;
pub mod engine;
pub mod retention;
pub mod types;

pub use audit_log::AccessAuditLog;
pub use communication_log::CommunicationRetentionLog;
pub use consent_manager::{ConsentLedger, ConsentStatistics};
pub use data_subject_requests::{
    DataSubjectRights, ErasureOutcome, ErasureReport, ErasureState, ExportBundle, FieldDisposition,
    SubjectField, ANONYMIZATION_POLICY,
};
pub use engine::{ComplianceEngine, SubjectProfile};
pub use retention::{RetentionAssessment, RetentionChecker};
pub use types::*;
